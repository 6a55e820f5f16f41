use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use tracing::{info, instrument, warn};

use crate::agents::{
    AnalysisAgent, AnalysisOutput, Feedback, Presentation, PresentationAgent, ResearchAgent,
    ResearchOutcome,
};
use crate::metrics;
use crate::trace::TraceEvent;

pub(crate) const KEY_DOCUMENT: &str = "document.context";
pub(crate) const KEY_QUESTION: &str = "user.question";
pub(crate) const KEY_RESEARCH: &str = "research.outcome";
pub(crate) const KEY_ANALYSIS: &str = "analysis.output";
pub(crate) const KEY_ANALYSIS_FAILED: &str = "analysis.failed";
pub(crate) const KEY_ANALYSIS_ERROR: &str = "analysis.error";
pub(crate) const KEY_PRESENTATION: &str = "presentation.output";
pub(crate) const KEY_TRACE: &str = "trace.events";

async fn push_trace(context: &Context, stage: &str, message: impl Into<String>) {
    let mut events: Vec<TraceEvent> = context.get(KEY_TRACE).await.unwrap_or_default();
    events.push(TraceEvent::new(stage, message));
    context.set(KEY_TRACE, &events).await;
}

pub struct ResearchTask {
    agent: Arc<ResearchAgent>,
}

impl ResearchTask {
    pub fn new(agent: Arc<ResearchAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Task for ResearchTask {
    fn id(&self) -> &str {
        "research"
    }

    #[instrument(name = "task.research", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let document: String = context.get(KEY_DOCUMENT).await.unwrap_or_default();

        let outcome = self.agent.run(&document).await;
        let summary = match &outcome {
            ResearchOutcome::Findings(findings) => format!("{} findings", findings.len()),
            ResearchOutcome::NoResults => "no external research found".to_string(),
            ResearchOutcome::Failed(reason) => format!("failed: {reason}"),
        };
        if outcome.is_degraded() {
            metrics::record_degraded("research");
        }

        info!(findings = outcome.findings().len(), "research task completed");
        context.set(KEY_RESEARCH, &outcome).await;
        push_trace(&context, "research", summary.clone()).await;

        Ok(TaskResult::new(
            Some(format!("Research: {summary}")),
            NextAction::ContinueAndExecute,
        ))
    }
}

pub struct AnalysisTask {
    agent: Arc<AnalysisAgent>,
}

impl AnalysisTask {
    pub fn new(agent: Arc<AnalysisAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Task for AnalysisTask {
    fn id(&self) -> &str {
        "analysis"
    }

    #[instrument(name = "task.analysis", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let document: String = context.get(KEY_DOCUMENT).await.unwrap_or_default();
        let research: ResearchOutcome = context
            .get(KEY_RESEARCH)
            .await
            .unwrap_or(ResearchOutcome::NoResults);

        match self.agent.run(&document, &research).await {
            Ok(output) => {
                let verified = output.feedback != Feedback::Unavailable;
                if !verified {
                    metrics::record_degraded("verify");
                }
                if !output.refined {
                    metrics::record_degraded("refine");
                }
                context.set(KEY_ANALYSIS, &output).await;
                context.set_sync(KEY_ANALYSIS_FAILED, false);

                push_trace(&context, "draft", "draft generated").await;
                let verify_note = if verified {
                    "feedback received"
                } else {
                    "no feedback available"
                };
                push_trace(&context, "verify", verify_note).await;
                let refine_note = if output.refined {
                    format!("{} chars", output.text.len())
                } else {
                    "refinement failed; kept draft".to_string()
                };
                push_trace(&context, "refine", refine_note).await;

                Ok(TaskResult::new(
                    Some("Analysis completed".to_string()),
                    NextAction::ContinueAndExecute,
                ))
            }
            Err(err) => {
                warn!(error = %err, "analysis draft failed");
                context.set_sync(KEY_ANALYSIS_FAILED, true);
                context.set(KEY_ANALYSIS_ERROR, err.to_string()).await;
                push_trace(&context, "draft", format!("failed: {err}")).await;

                Ok(TaskResult::new(
                    Some("Analysis draft failed".to_string()),
                    NextAction::ContinueAndExecute,
                ))
            }
        }
    }
}

pub struct PresentationTask {
    agent: Arc<PresentationAgent>,
}

impl PresentationTask {
    pub fn new(agent: Arc<PresentationAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Task for PresentationTask {
    fn id(&self) -> &str {
        "presentation"
    }

    #[instrument(name = "task.presentation", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let analysis: Option<AnalysisOutput> = context.get(KEY_ANALYSIS).await;
        let question: String = context.get(KEY_QUESTION).await.unwrap_or_default();
        let analysis_text = analysis.map(|output| output.text).unwrap_or_default();

        let presentation = self.agent.run(&analysis_text, &question).await;
        let message = match &presentation {
            Presentation::Generated(text) => format!("{} chars", text.len()),
            Presentation::Failed(reason) => {
                metrics::record_degraded("presentation");
                format!("failed: {reason}")
            }
        };
        context.set(KEY_PRESENTATION, &presentation).await;
        push_trace(&context, "presentation", message).await;

        Ok(TaskResult::new(
            Some(presentation.text().to_string()),
            NextAction::End,
        ))
    }
}

/// Terminal step taken when no draft analysis exists.
#[derive(Default)]
pub struct AnalysisFailedTask;

#[async_trait]
impl Task for AnalysisFailedTask {
    fn id(&self) -> &str {
        "analysis_failed"
    }

    #[instrument(name = "task.analysis_failed", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let reason: String = context
            .get(KEY_ANALYSIS_ERROR)
            .await
            .unwrap_or_else(|| "analysis draft unavailable".to_string());
        warn!(%reason, "skipping presentation");
        Ok(TaskResult::new(Some(reason), NextAction::End))
    }
}
