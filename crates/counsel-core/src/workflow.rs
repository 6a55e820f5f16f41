use std::sync::Arc;

use graph_flow::{
    ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, Session, SessionStorage,
    Task,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::agents::{
    AnalysisAgent, AnalysisOutput, Presentation, PresentationAgent, ResearchAgent,
    ResearchOutcome,
};
use crate::error::CounselError;
use crate::tasks::{
    AnalysisFailedTask, AnalysisTask, KEY_ANALYSIS, KEY_ANALYSIS_ERROR, KEY_ANALYSIS_FAILED,
    KEY_DOCUMENT, KEY_PRESENTATION, KEY_QUESTION, KEY_RESEARCH, KEY_TRACE, PresentationTask,
    ResearchTask,
};
use crate::trace::TraceEvent;

/// The three agents that make up a first analysis pass.
#[derive(Clone)]
pub struct FirstPassAgents {
    pub research: Arc<ResearchAgent>,
    pub analysis: Arc<AnalysisAgent>,
    pub presentation: Arc<PresentationAgent>,
}

/// Everything a completed first pass produced.
#[derive(Debug, Clone)]
pub struct FirstPassOutcome {
    pub research: ResearchOutcome,
    pub analysis: AnalysisOutput,
    pub presentation: Presentation,
    pub trace: Vec<TraceEvent>,
}

#[derive(Clone)]
struct FirstPassTasks {
    research: Arc<ResearchTask>,
    analysis: Arc<AnalysisTask>,
    presentation: Arc<PresentationTask>,
    analysis_failed: Arc<AnalysisFailedTask>,
}

/// Research, then analysis, then presentation; presentation is skipped
/// when no draft analysis exists.
pub struct FirstPassWorkflow {
    graph: Arc<graph_flow::Graph>,
    tasks: FirstPassTasks,
}

impl FirstPassWorkflow {
    pub fn new(agents: FirstPassAgents) -> Self {
        let tasks = FirstPassTasks {
            research: Arc::new(ResearchTask::new(agents.research)),
            analysis: Arc::new(AnalysisTask::new(agents.analysis)),
            presentation: Arc::new(PresentationTask::new(agents.presentation)),
            analysis_failed: Arc::new(AnalysisFailedTask),
        };

        let graph = GraphBuilder::new("counsel_first_pass")
            .add_task(tasks.research.clone())
            .add_task(tasks.analysis.clone())
            .add_task(tasks.presentation.clone())
            .add_task(tasks.analysis_failed.clone())
            .add_edge(tasks.research.id(), tasks.analysis.id())
            .add_conditional_edge(
                tasks.analysis.id(),
                |ctx| !ctx.get_sync::<bool>(KEY_ANALYSIS_FAILED).unwrap_or(true),
                tasks.presentation.id(),
                tasks.analysis_failed.id(),
            )
            .set_start_task(tasks.research.id())
            .build();

        Self {
            graph: Arc::new(graph),
            tasks,
        }
    }

    /// Runs one first pass over `document_context`, answering `question`.
    #[instrument(skip(self, document_context, question), fields(context_chars = document_context.len()))]
    pub async fn run(
        &self,
        document_context: &str,
        question: &str,
    ) -> Result<FirstPassOutcome, CounselError> {
        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(self.graph.clone(), storage.clone());

        let session_id = format!("first-pass-{}", Uuid::new_v4());
        let session = Session::new_from_task(session_id.clone(), self.tasks.research.id());
        session
            .context
            .set(KEY_DOCUMENT, document_context.to_string())
            .await;
        session.context.set(KEY_QUESTION, question.to_string()).await;

        storage
            .save(session)
            .await
            .map_err(|err| CounselError::Workflow(format!("failed to persist session: {err}")))?;

        loop {
            let result = runner
                .run(&session_id)
                .await
                .map_err(|err| CounselError::Workflow(format!("graph execution failure: {err}")))?;

            match result.status {
                ExecutionStatus::Completed => break,
                ExecutionStatus::WaitingForInput => continue,
                ExecutionStatus::Error(message) => return Err(CounselError::Workflow(message)),
            }
        }

        let session = storage
            .get(&session_id)
            .await
            .map_err(|err| CounselError::Workflow(format!("failed to reload session: {err}")))?
            .ok_or_else(|| CounselError::Workflow("session missing after execution".into()))?;
        let context = &session.context;

        let trace: Vec<TraceEvent> = context.get(KEY_TRACE).await.unwrap_or_default();
        debug!(events = trace.len(), "first pass finished");

        if context.get::<bool>(KEY_ANALYSIS_FAILED).await.unwrap_or(true) {
            let reason: String = context
                .get(KEY_ANALYSIS_ERROR)
                .await
                .unwrap_or_else(|| "analysis draft unavailable".to_string());
            return Err(CounselError::AnalysisFailed(reason));
        }

        let analysis: AnalysisOutput = context
            .get(KEY_ANALYSIS)
            .await
            .ok_or_else(|| CounselError::Workflow("analysis output missing".into()))?;
        let research: ResearchOutcome = context
            .get(KEY_RESEARCH)
            .await
            .unwrap_or(ResearchOutcome::NoResults);
        let presentation: Presentation = context
            .get(KEY_PRESENTATION)
            .await
            .ok_or_else(|| CounselError::Workflow("presentation output missing".into()))?;

        Ok(FirstPassOutcome {
            research,
            analysis,
            presentation,
            trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{ResearchSettings, analysis::NO_FEEDBACK};
    use crate::ports::ModelSet;
    use crate::stub::{StubModel, StubSearch};

    fn agents(model: Arc<StubModel>, search: Arc<StubSearch>) -> FirstPassAgents {
        FirstPassAgents {
            research: Arc::new(ResearchAgent::new(
                model.clone(),
                search,
                ResearchSettings::default(),
            )),
            analysis: Arc::new(AnalysisAgent::new(ModelSet::single(model.clone()))),
            presentation: Arc::new(PresentationAgent::new(model)),
        }
    }

    #[tokio::test]
    async fn runs_all_three_stages_in_order() {
        let model = Arc::new(StubModel::offline());
        let workflow = FirstPassWorkflow::new(agents(model.clone(), Arc::new(StubSearch::offline())));

        let outcome = workflow
            .run("Clause 4. The deposit is capped at two months rent.", "Is the deposit lawful?")
            .await
            .unwrap();

        let stages: Vec<&str> = outcome.trace.iter().map(|event| event.stage.as_str()).collect();
        assert_eq!(stages, vec!["research", "draft", "verify", "refine", "presentation"]);
        assert!(outcome.presentation.is_generated());
        assert!(!outcome.analysis.text.is_empty());
        let presentation_calls = model.calls_containing("User's question:");
        assert_eq!(presentation_calls.len(), 1);
        assert!(presentation_calls[0].prompt.contains("Is the deposit lawful?"));
        assert!(presentation_calls[0].system.is_some());
    }

    #[tokio::test]
    async fn failed_draft_skips_presentation() {
        let model = Arc::new(StubModel::offline().fail_on("thorough legal analyst"));
        let workflow = FirstPassWorkflow::new(agents(model.clone(), Arc::new(StubSearch::offline())));

        let err = workflow.run("Some lease text.", "Summarise").await.unwrap_err();

        assert!(matches!(err, CounselError::AnalysisFailed(_)));
        assert!(model.calls_containing("User's question:").is_empty());
    }

    #[tokio::test]
    async fn degraded_research_and_verification_still_present() {
        let model = Arc::new(StubModel::offline().fail_on("Review the legal analysis"));
        let workflow = FirstPassWorkflow::new(agents(model, Arc::new(StubSearch::failing())));

        let outcome = workflow.run("Lease text.", "Summarise").await.unwrap();

        assert!(outcome.research.is_degraded());
        assert_eq!(outcome.analysis.feedback.prompt_text(), NO_FEEDBACK);
        assert!(outcome.presentation.is_generated());
    }
}
