//! Deterministic stand-ins for the external collaborators, used by tests and
//! offline runs.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::ports::{Embedder, GenerativeModel, SearchHit, WebSearch};

#[derive(Debug, Clone)]
enum StubReply {
    Text(String),
    Fail,
}

/// One recorded call to a [`StubModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub prompt: String,
    pub system: Option<String>,
}

/// Scripted generative model: the first rule whose needle occurs in the
/// prompt decides the reply.
pub struct StubModel {
    name: String,
    rules: Vec<(String, StubReply)>,
    default: StubReply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl StubModel {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            default: StubReply::Text(format!("[{name}] stub response")),
            name,
            rules: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond_to(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules
            .push((needle.into(), StubReply::Text(reply.into())));
        self
    }

    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.rules.push((needle.into(), StubReply::Fail));
        self
    }

    pub fn with_default_text(mut self, reply: impl Into<String>) -> Self {
        self.default = StubReply::Text(reply.into());
        self
    }

    pub fn failing_by_default(mut self) -> Self {
        self.default = StubReply::Fail;
        self
    }

    /// Canned replies covering every pipeline stage, for offline runs.
    pub fn offline() -> Self {
        let presentation = crate::agents::PRESENTATION_SECTIONS
            .iter()
            .map(|section| {
                format!("## {section}\nOffline mode: no generative model is configured for this section.")
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        Self::new("offline")
            .respond_to("focused web search queries", "tenancy law\ncontract enforceability")
            .respond_to("Structure the answer", presentation)
            .respond_to(
                "--- User's Current Question ---",
                "Offline mode: the retrieved passages are shown in the document context.",
            )
            .with_default_text("Offline analysis: configure a generative model provider for real output.")
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn calls_containing(&self, needle: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.prompt.contains(needle))
            .collect()
    }

    fn reply_for(&self, prompt: &str, system: Option<&str>) -> &StubReply {
        self.rules
            .iter()
            .find(|(needle, _)| {
                prompt.contains(needle.as_str())
                    || system.is_some_and(|system| system.contains(needle.as_str()))
            })
            .map(|(_, reply)| reply)
            .unwrap_or(&self.default)
    }
}

#[async_trait]
impl GenerativeModel for StubModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, ServiceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                system: system.map(str::to_string),
            });
        }
        match self.reply_for(prompt, system) {
            StubReply::Text(text) => Ok(text.clone()),
            StubReply::Fail => Err(ServiceError::Unavailable(format!(
                "{} scripted failure",
                self.name
            ))),
        }
    }
}

/// Web search returning the same hits for every query unless told to fail.
pub struct StubSearch {
    hits: Vec<SearchHit>,
    fail_all: bool,
    fail_needles: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl StubSearch {
    pub fn new() -> Self {
        Self {
            hits: Vec::new(),
            fail_all: false,
            fail_needles: Vec::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }

    /// A single generic hit per query, for offline runs.
    pub fn offline() -> Self {
        Self::new().with_hits(vec![SearchHit {
            title: "Offline search".into(),
            url: "offline://search".into(),
            content: "No web search provider is configured.".into(),
        }])
    }

    pub fn with_hits(mut self, hits: Vec<SearchHit>) -> Self {
        self.hits = hits;
        self
    }

    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_needles.push(needle.into());
        self
    }

    /// Every query received, in arrival order.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }
}

impl Default for StubSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebSearch for StubSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        _depth: &str,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        let scripted_failure = self
            .fail_needles
            .iter()
            .any(|needle| query.contains(needle.as_str()));
        if self.fail_all || scripted_failure {
            return Err(ServiceError::Http {
                status: 502,
                body: "stub search failure".into(),
            });
        }
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

/// Hashed bag-of-words embedder: texts sharing words land close together.
pub struct HashEmbedder {
    dimensions: usize,
    fail_on: Option<String>,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            fail_on: None,
        }
    }

    /// Fail for any text containing `needle`.
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on = Some(needle.into());
        self
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dimensions as u64) as usize
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-embedder"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        if let Some(needle) = &self.fail_on {
            if text.contains(needle.as_str()) {
                return Err(ServiceError::Unavailable("stub embedding failure".into()));
            }
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| token.len() > 2)
        {
            vector[self.bucket(&token.to_lowercase())] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[tokio::test]
    async fn rules_match_in_order_and_calls_are_recorded() {
        let model = StubModel::new("m")
            .respond_to("alpha", "A")
            .fail_on("beta")
            .with_default_text("D");

        assert_eq!(model.generate("alpha beta", None).await.unwrap(), "A");
        assert!(model.generate("beta", None).await.is_err());
        assert_eq!(model.generate("gamma", Some("sys")).await.unwrap(), "D");

        let calls = model.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].system.as_deref(), Some("sys"));
    }

    #[tokio::test]
    async fn hash_embedder_groups_related_text() {
        let embedder = HashEmbedder::default();
        let rent = embedder.embed("monthly rent payment due").await.unwrap();
        let rent_again = embedder.embed("rent payment is due monthly").await.unwrap();
        let pets = embedder.embed("pets allowed with written consent").await.unwrap();

        assert!(cosine_similarity(&rent, &rent_again) > cosine_similarity(&rent, &pets));
        assert_eq!(rent.len(), 256);
    }

    #[tokio::test]
    async fn search_respects_max_results_and_failures() {
        let hit = SearchHit {
            title: "t".into(),
            url: "u".into(),
            content: "c".into(),
        };
        let search = StubSearch::new()
            .with_hits(vec![hit.clone(), hit.clone(), hit])
            .fail_on("broken");

        assert_eq!(search.search("ok", 2, "basic").await.unwrap().len(), 2);
        assert!(search.search("broken query", 5, "basic").await.is_err());
        assert_eq!(search.queries(), vec!["ok", "broken query"]);
    }
}
