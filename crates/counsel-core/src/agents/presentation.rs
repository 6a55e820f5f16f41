use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ports::DynModel;

pub const PRESENTATION_FAILED: &str = "Failed to generate the final presentation.";

/// Fixed section layout of every initial answer, in order.
pub const PRESENTATION_SECTIONS: [&str; 5] = [
    "Executive Summary",
    "Legal Framework Analysis",
    "Key Clauses & Rights Analysis",
    "Direct Legal Guidance",
    "Immediate Action Items",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presentation {
    Generated(String),
    Failed(String),
}

impl Presentation {
    /// User-facing text; the failure sentinel when generation failed.
    pub fn text(&self) -> &str {
        match self {
            Presentation::Generated(text) => text,
            Presentation::Failed(_) => PRESENTATION_FAILED,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Presentation::Generated(_))
    }
}

/// Turns the analysis into the directive five-section answer.
pub struct PresentationAgent {
    model: DynModel,
}

impl PresentationAgent {
    pub fn new(model: DynModel) -> Self {
        Self { model }
    }

    pub async fn run(&self, analysis: &str, question: &str) -> Presentation {
        let prompt = format!(
            "Using the detailed legal analysis and the user's question below, write the answer in the required format.\n\n\
Detailed legal analysis:\n---\n{analysis}\n---\n\n\
User's question:\n---\n{question}\n---"
        );

        match self.model.generate(&prompt, Some(&system_instruction())).await {
            Ok(text) => {
                let missing = missing_sections(&text);
                if !missing.is_empty() {
                    warn!(?missing, "presentation is missing expected sections");
                }
                Presentation::Generated(text)
            }
            Err(err) => {
                warn!(error = %err, "presentation generation failed");
                Presentation::Failed(err.to_string())
            }
        }
    }
}

pub fn system_instruction() -> String {
    let sections = PRESENTATION_SECTIONS
        .iter()
        .enumerate()
        .map(|(idx, name)| format!("{}. **{name}**", idx + 1))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a legal assistant giving direct, actionable guidance.\n\n\
Rules:\n\
- Use the research already gathered to state the law directly.\n\
- Never tell the user to research the question or to consult a lawyer or other professional; you provide the answer.\n\
- Name the specific acts, regulations and requirements that apply.\n\
- Be confident and definitive, and end with concrete steps the user can take immediately.\n\n\
Structure the answer with exactly these sections, in this order:\n{sections}\n"
    )
}

/// Expected sections that do not appear in `text`.
pub fn missing_sections(text: &str) -> Vec<&'static str> {
    PRESENTATION_SECTIONS
        .iter()
        .copied()
        .filter(|section| !text.contains(section))
        .collect()
}

/// Section headings found in `text`, in document order.
pub fn section_headers(text: &str) -> Vec<&'static str> {
    let mut found: Vec<(usize, &'static str)> = PRESENTATION_SECTIONS
        .iter()
        .filter_map(|section| text.find(section).map(|pos| (pos, *section)))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, section)| section).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubModel;
    use std::sync::Arc;

    fn structured_reply() -> String {
        PRESENTATION_SECTIONS
            .iter()
            .map(|section| format!("## {section}\nDetails."))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[tokio::test]
    async fn repeated_runs_yield_identical_headers() {
        let model = Arc::new(StubModel::new("fast").with_default_text(&structured_reply()));
        let agent = PresentationAgent::new(model.clone());

        let first = agent.run("analysis", "Is the deposit legal?").await;
        let second = agent.run("analysis", "Is the deposit legal?").await;

        assert_eq!(section_headers(first.text()), PRESENTATION_SECTIONS.to_vec());
        assert_eq!(section_headers(first.text()), section_headers(second.text()));
        let calls = model.calls();
        assert_eq!(calls[0], calls[1]);
    }

    #[tokio::test]
    async fn system_instruction_carries_contract() {
        let model = Arc::new(StubModel::new("fast"));
        PresentationAgent::new(model.clone())
            .run("analysis", "question")
            .await;

        let system = model.calls()[0].system.clone().expect("system instruction");
        for section in PRESENTATION_SECTIONS {
            assert!(system.contains(section), "missing {section}");
        }
        assert!(system.contains("Never tell the user"));
    }

    #[tokio::test]
    async fn failure_returns_sentinel() {
        let model = Arc::new(StubModel::new("fast").failing_by_default());
        let presentation = PresentationAgent::new(model).run("analysis", "question").await;

        assert!(!presentation.is_generated());
        assert_eq!(presentation.text(), "Failed to generate the final presentation.");
    }

    #[test]
    fn missing_sections_are_reported() {
        let text = "## Executive Summary\n...\n## Immediate Action Items\n...";
        assert_eq!(
            missing_sections(text),
            vec![
                "Legal Framework Analysis",
                "Key Clauses & Rights Analysis",
                "Direct Legal Guidance"
            ]
        );
    }
}
