use serde::{Deserialize, Serialize};
use tracing::warn;

use super::presentation::PRESENTATION_FAILED;
use crate::models::ConversationTurn;
use crate::ports::DynModel;

pub const REPLY_FAILED: &str = "Sorry, I encountered an error while generating a response.";

const PREAMBLE: &str = "You are a legal assistant answering follow-up questions about the user's legal document.\n\n\
You may be given three sources:\n\
1. Initial Analysis: the summary and detailed analysis produced when the document was first reviewed.\n\
2. Conversation History: the dialogue so far.\n\
3. Document Context for Current Query: passages of the document retrieved for this question.\n\n\
Rules:\n\
- Ground the answer in the Document Context for Current Query first.\n\
- Use the Initial Analysis next, then the Conversation History, to complete the answer without repeating yourself.\n\
- Cite your sources; quote the document text you rely on.\n\
- Address the user directly and keep a helpful tone.\n";

/// Stored first-pass results, injected only on the first follow-up.
#[derive(Debug, Clone, Copy)]
pub struct InitialAnalysis<'a> {
    /// `None` when the presentation stage failed.
    pub summary: Option<&'a str>,
    pub detailed: &'a str,
}

/// Everything the responder needs for one follow-up turn.
#[derive(Debug, Clone, Copy)]
pub struct FollowUpContext<'a> {
    pub query: &'a str,
    pub retrieved: &'a str,
    pub history: &'a [ConversationTurn],
    pub initial: Option<InitialAnalysis<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Generated(String),
    Failed(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Generated(text) => text,
            Reply::Failed(_) => REPLY_FAILED,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Reply::Generated(_))
    }
}

/// Single-call conversational answer generator for follow-up turns.
pub struct ConversationalResponder {
    model: DynModel,
}

impl ConversationalResponder {
    pub fn new(model: DynModel) -> Self {
        Self { model }
    }

    pub async fn respond(&self, context: FollowUpContext<'_>) -> Reply {
        let prompt = build_prompt(&context);
        match self.model.generate(&prompt, None).await {
            Ok(text) => Reply::Generated(text),
            Err(err) => {
                warn!(error = %err, "conversational response failed");
                Reply::Failed(err.to_string())
            }
        }
    }
}

pub fn build_prompt(context: &FollowUpContext<'_>) -> String {
    let initial = context
        .initial
        .map(|initial| {
            format!(
                "Initial Summary:\n{}\n\nInitial Detailed Analysis:\n{}",
                initial.summary.unwrap_or(PRESENTATION_FAILED),
                initial.detailed
            )
        })
        .unwrap_or_else(|| "Not available for this turn.".to_string());

    let history = if context.history.is_empty() {
        "This is the first question.".to_string()
    } else {
        context
            .history
            .iter()
            .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let retrieved = if context.retrieved.trim().is_empty() {
        "No specific context was retrieved for this query."
    } else {
        context.retrieved
    };

    format!(
        "{PREAMBLE}\n--- Initial Analysis ---\n{initial}\n\
--- Conversation History ---\n{history}\n\
--- Document Context for Current Query ---\n{retrieved}\n\
--- User's Current Question ---\n{}",
        context.query
    )
}
