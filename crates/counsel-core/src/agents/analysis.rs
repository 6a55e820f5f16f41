use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::research::ResearchOutcome;
use crate::error::ServiceError;
use crate::models::truncate_chars;
use crate::ports::ModelSet;

pub const NO_FEEDBACK: &str = "No feedback available.";

const DRAFT_RESEARCH_CHARS: usize = 4000;
const VERIFY_CONTEXT_CHARS: usize = 1500;
const VERIFY_RESEARCH_CHARS: usize = 1500;

/// Verifier output; absence is explicit rather than a magic string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feedback {
    Provided(String),
    Unavailable,
}

impl Feedback {
    pub fn prompt_text(&self) -> &str {
        match self {
            Feedback::Provided(text) => text,
            Feedback::Unavailable => NO_FEEDBACK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// Refined analysis, or the draft when refinement failed.
    pub text: String,
    pub feedback: Feedback,
    pub refined: bool,
}

/// Draft, verify, refine. Only the draft is mandatory.
pub struct AnalysisAgent {
    models: ModelSet,
}

impl AnalysisAgent {
    pub fn new(models: ModelSet) -> Self {
        Self { models }
    }

    /// Fails only when the draft cannot be produced.
    pub async fn run(
        &self,
        document_context: &str,
        research: &ResearchOutcome,
    ) -> Result<AnalysisOutput, ServiceError> {
        let research_text = research.render();

        let draft = self.draft(document_context, &research_text).await?;
        info!(draft_chars = draft.len(), "analysis draft generated");

        let feedback = self.verify(document_context, &research_text, &draft).await;
        let (text, refined) = match self.refine(&draft, &feedback).await {
            Ok(text) => (text, true),
            Err(err) => {
                warn!(error = %err, "refinement failed; keeping draft");
                (draft, false)
            }
        };

        Ok(AnalysisOutput {
            text,
            feedback,
            refined,
        })
    }

    async fn draft(&self, document_context: &str, research: &str) -> Result<String, ServiceError> {
        let prompt = format!(
            "You are a thorough legal analyst. Write an authoritative analysis of the document below.\n\n\
1. Applicable legal framework: name the specific laws, acts and regulations that govern this document, using the research findings.\n\
2. Legal requirements: explain mandatory clauses, notice periods, deposit limits and similar obligations.\n\
3. Legal context: cite the precedents, judgments or statutory provisions found in the research.\n\
4. Compliance gaps: state where the document departs from what the law requires.\n\n\
PRIMARY SOURCE (document):\n{document_context}\n\n\
LEGAL RESEARCH FINDINGS:\n{}\n\n\
Be definitive, quote sections or precedents where available, and distinguish what the law requires from what the document provides, including jurisdiction-specific rules.",
            truncate_chars(research, DRAFT_RESEARCH_CHARS)
        );
        self.models.pro.generate(&prompt, None).await
    }

    async fn verify(&self, document_context: &str, research: &str, draft: &str) -> Feedback {
        let prompt = format!(
            "Review the legal analysis below for accuracy, completeness and consistency. Check that:\n\
- statements about the document match the document\n\
- external research is attributed and relevant\n\
- sources do not contradict each other\n\
- every key legal issue is addressed\n\n\
Document excerpt:\n---\n{}\n---\n\n\
Research excerpt:\n---\n{}\n---\n\n\
Analysis under review:\n---\n{draft}\n---\n\n\
Reply with bulleted corrections or improvements.",
            truncate_chars(document_context, VERIFY_CONTEXT_CHARS),
            truncate_chars(research, VERIFY_RESEARCH_CHARS),
        );
        match self.models.fast.generate(&prompt, None).await {
            Ok(text) => Feedback::Provided(text),
            Err(err) => {
                warn!(error = %err, "verification failed; continuing without feedback");
                Feedback::Unavailable
            }
        }
    }

    async fn refine(&self, draft: &str, feedback: &Feedback) -> Result<String, ServiceError> {
        let prompt = format!(
            "Refine the draft analysis using the reviewer feedback and produce the final, accurate and complete legal analysis.\n\n\
Draft analysis:\n---\n{draft}\n---\n\n\
Reviewer feedback:\n---\n{}\n---\n\n\
Return only the refined analysis.",
            feedback.prompt_text()
        );
        self.models.pro.generate(&prompt, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubModel;
    use std::sync::Arc;

    const DRAFT_MARKER: &str = "thorough legal analyst";
    const VERIFY_MARKER: &str = "Review the legal analysis";
    const REFINE_MARKER: &str = "Refine the draft analysis";

    fn agent(fast: Arc<StubModel>, pro: Arc<StubModel>) -> AnalysisAgent {
        AnalysisAgent::new(ModelSet::new(fast, pro))
    }

    #[tokio::test]
    async fn verify_failure_still_refines_with_fallback_feedback() {
        let fast = Arc::new(StubModel::new("fast").fail_on(VERIFY_MARKER));
        let pro = Arc::new(
            StubModel::new("pro")
                .respond_to(DRAFT_MARKER, "DRAFT")
                .respond_to(REFINE_MARKER, "REFINED"),
        );

        let output = agent(fast, pro.clone())
            .run("Lease text", &ResearchOutcome::NoResults)
            .await
            .expect("analysis");

        assert_eq!(output.text, "REFINED");
        assert_eq!(output.feedback, Feedback::Unavailable);
        assert!(output.refined);
        let refine_calls = pro.calls_containing(REFINE_MARKER);
        assert_eq!(refine_calls.len(), 1);
        assert!(refine_calls[0].prompt.contains("No feedback available."));
    }

    #[tokio::test]
    async fn refine_failure_falls_back_to_draft() {
        let fast = Arc::new(StubModel::new("fast").with_default_text("- fix clause 4"));
        let pro = Arc::new(
            StubModel::new("pro")
                .respond_to(DRAFT_MARKER, "DRAFT")
                .fail_on(REFINE_MARKER),
        );

        let output = agent(fast, pro)
            .run("Lease text", &ResearchOutcome::NoResults)
            .await
            .expect("analysis");

        assert_eq!(output.text, "DRAFT");
        assert!(!output.refined);
        assert_eq!(output.feedback, Feedback::Provided("- fix clause 4".into()));
    }

    #[tokio::test]
    async fn draft_failure_is_fatal() {
        let fast = Arc::new(StubModel::new("fast"));
        let pro = Arc::new(StubModel::new("pro").fail_on(DRAFT_MARKER));

        let result = agent(fast.clone(), pro)
            .run("Lease text", &ResearchOutcome::NoResults)
            .await;

        assert!(result.is_err());
        assert!(fast.calls().is_empty(), "verify must not run without a draft");
    }

    #[tokio::test]
    async fn prompts_bound_research_and_context() {
        let fast = Arc::new(StubModel::new("fast"));
        let pro = Arc::new(StubModel::new("pro").with_default_text("DRAFT"));
        let context = format!("{}CONTEXT-TAIL", "c".repeat(1500));

        agent(fast.clone(), pro.clone())
            .run(&context, &ResearchOutcome::Failed("down".into()))
            .await
            .expect("analysis");

        let draft_call = &pro.calls_containing(DRAFT_MARKER)[0];
        assert!(draft_call.prompt.contains("CONTEXT-TAIL"));
        assert!(draft_call.prompt.contains("Research failed due to technical issues."));
        let verify_call = &fast.calls_containing(VERIFY_MARKER)[0];
        assert!(!verify_call.prompt.contains("CONTEXT-TAIL"));
    }
}
