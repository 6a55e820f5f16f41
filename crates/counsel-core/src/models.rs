use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an analysis request. A record with no status at all is
/// treated as new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Complete => "complete",
            RequestStatus::Failed => "failed",
        }
    }
}

/// One document + prompt submission and everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_summary: Option<String>,
    #[serde(default)]
    pub chat_history: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRequest {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            document_uri: None,
            status: None,
            error_message: None,
            detailed_analysis: None,
            initial_summary: None,
            chat_history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_document_uri(mut self, uri: impl Into<String>) -> Self {
        self.document_uri = Some(uri.into());
        self
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Anything other than `complete` sends the next turn through the full
    /// first-pass pipeline.
    pub fn needs_first_pass(&self) -> bool {
        self.status != Some(RequestStatus::Complete)
    }
}

/// A retrievable fragment of a document. Immutable apart from the embedding
/// fallback record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub request_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingProvenance>,
}

/// Stored on a chunk only when the vector index rejected the upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingProvenance {
    pub model: String,
    pub recorded_at: DateTime<Utc>,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Queries derived from the document for one research run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuerySet {
    pub queries: Vec<String>,
}

impl SearchQuerySet {
    pub const MAX_QUERIES: usize = 5;

    /// Parse a model reply with one query per line, tolerating bullets and
    /// numbering.
    pub fn parse(reply: &str) -> Self {
        let queries = reply
            .lines()
            .map(strip_list_marker)
            .filter(|line| !line.is_empty())
            .take(Self::MAX_QUERIES)
            .map(str::to_string)
            .collect();
        Self { queries }
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line);
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return stripped.trim();
        }
    }
    line.trim()
}

/// One external search hit, kept with the query that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchFinding {
    pub source_title: String,
    pub source_url: String,
    pub excerpt: String,
    pub originating_query: String,
}

impl ResearchFinding {
    pub const EXCERPT_CHARS: usize = 500;

    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: &str,
        query: impl Into<String>,
    ) -> Self {
        Self {
            source_title: title.into(),
            source_url: url.into(),
            excerpt: truncate_chars(content, Self::EXCERPT_CHARS).to_string(),
            originating_query: query.into(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "**Source**: {}\n**URL**: {}\n**Content**: {}...\n**Query Context**: {}\n---",
            self.source_title, self.source_url, self.excerpt, self.originating_query
        )
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_pass_needed_until_complete() {
        let mut request = AnalysisRequest::new("req-1", "Is my lease fair?");
        assert!(request.needs_first_pass());
        for status in [
            RequestStatus::Pending,
            RequestStatus::Processing,
            RequestStatus::Failed,
        ] {
            request.status = Some(status);
            assert!(request.needs_first_pass());
        }
        request.status = Some(RequestStatus::Complete);
        assert!(!request.needs_first_pass());
    }

    #[test]
    fn status_serializes_lowercase_and_absent_status_is_omitted() {
        let request = AnalysisRequest::new("req-2", "prompt");
        let value = serde_json::to_value(&request).expect("serialize");
        assert!(value.get("status").is_none());

        let value = serde_json::to_value(request.with_status(RequestStatus::Complete))
            .expect("serialize");
        assert_eq!(value["status"], "complete");
    }

    #[test]
    fn query_parsing_strips_markers_and_caps_count() {
        let reply = "- tenancy deposit law\n\n* eviction notice period\n1. rent increase limits\n2) subletting consent\nlandlord repair duty\nextra query";
        let set = SearchQuerySet::parse(reply);
        assert_eq!(
            set.queries,
            vec![
                "tenancy deposit law",
                "eviction notice period",
                "rent increase limits",
                "subletting consent",
                "landlord repair duty",
            ]
        );
    }

    #[test]
    fn finding_renders_traceable_record() {
        let content = "é".repeat(600);
        let finding = ResearchFinding::new("Case A", "https://law.example/a", &content, "deposit");
        assert_eq!(finding.excerpt.chars().count(), 500);

        let rendered = finding.render();
        assert!(rendered.starts_with("**Source**: Case A\n**URL**: https://law.example/a\n"));
        assert!(rendered.ends_with("...\n**Query Context**: deposit\n---"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("häuser", 2), "hä");
        assert_eq!(truncate_chars("", 3), "");
    }
}
