use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agents::{
    AnalysisAgent, ConversationalResponder, FollowUpContext, InitialAnalysis, PresentationAgent,
    ResearchAgent,
};
use crate::context::ServiceContext;
use crate::error::CounselError;
use crate::ingest::{DocumentIndexer, IndexReport};
use crate::metrics;
use crate::models::{AnalysisRequest, ConversationTurn, RequestStatus};
use crate::retrieval::{PASSAGE_SEPARATOR, Retriever};
use crate::store::RequestPatch;
use crate::trace::{TraceEvent, TurnTrace, trace_markdown};
use crate::workflow::{FirstPassAgents, FirstPassWorkflow};

/// Which path a turn took through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnKind {
    FirstAnalysis,
    FollowUp {
        /// History was empty, so the stored analysis was injected.
        first_follow_up: bool,
    },
}

impl TurnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnKind::FirstAnalysis => "first_analysis",
            TurnKind::FollowUp { .. } => "follow_up",
        }
    }
}

/// Answer to one conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReply {
    pub request_id: String,
    pub kind: TurnKind,
    pub answer: String,
    pub trace: Vec<TraceEvent>,
}

impl TurnReply {
    pub fn trace_markdown(&self) -> String {
        trace_markdown(&self.trace)
    }
}

/// Owns every analysis request and decides, per turn, between the first
/// analysis pass and a follow-up answer.
pub struct Orchestrator {
    services: ServiceContext,
    workflow: FirstPassWorkflow,
    indexer: DocumentIndexer,
    retriever: Retriever,
    responder: ConversationalResponder,
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Orchestrator {
    pub fn new(services: ServiceContext) -> Self {
        let settings = &services.settings;
        let workflow = FirstPassWorkflow::new(FirstPassAgents {
            research: Arc::new(ResearchAgent::new(
                services.models.fast.clone(),
                services.search.clone(),
                settings.research.clone(),
            )),
            analysis: Arc::new(AnalysisAgent::new(services.models.clone())),
            presentation: Arc::new(PresentationAgent::new(services.models.fast.clone())),
        });
        let indexer = DocumentIndexer::new(
            settings.segmenter,
            services.chunks.clone(),
            services.embedder.clone(),
            services.index.clone(),
        );
        let retriever = Retriever::new(
            services.embedder.clone(),
            services.index.clone(),
            services.chunks.clone(),
        );
        let responder = ConversationalResponder::new(services.models.fast.clone());

        Self {
            services,
            workflow,
            indexer,
            retriever,
            responder,
            turn_locks: DashMap::new(),
        }
    }

    pub fn services(&self) -> &ServiceContext {
        &self.services
    }

    /// Persist a new request in the `pending` state and return its id.
    pub async fn create_request(
        &self,
        prompt: &str,
        document_uri: Option<&str>,
    ) -> Result<String, CounselError> {
        let id = Uuid::new_v4().to_string();
        let mut request = AnalysisRequest::new(&id, prompt).with_status(RequestStatus::Pending);
        if let Some(uri) = document_uri {
            request = request.with_document_uri(uri);
        }
        self.services
            .documents
            .create(request)
            .await
            .map_err(CounselError::store)?;
        info!(request_id = %id, "analysis request created");
        Ok(id)
    }

    /// Segment and index extracted document text for an existing request.
    pub async fn index_document(
        &self,
        request_id: &str,
        text: &str,
    ) -> Result<IndexReport, CounselError> {
        self.request(request_id).await?;
        self.indexer.index_document(request_id, text).await
    }

    pub async fn request(&self, request_id: &str) -> Result<AnalysisRequest, CounselError> {
        self.services
            .documents
            .get(request_id)
            .await
            .map_err(CounselError::store)?
            .ok_or_else(|| CounselError::RequestNotFound(request_id.to_string()))
    }

    /// Handle one user turn. Turns on the same request run one at a time.
    #[instrument(skip(self, query), fields(query_chars = query.len()))]
    pub async fn handle_turn(
        &self,
        request_id: &str,
        query: &str,
    ) -> Result<TurnReply, CounselError> {
        let lock = self
            .turn_locks
            .entry(request_id.to_string())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.run_turn(request_id, query).await
        };

        // Held by the map and by `lock`: nobody else is queued on this request.
        self.turn_locks
            .remove_if(request_id, |_, entry| Arc::strong_count(entry) <= 2);
        result
    }

    async fn run_turn(&self, request_id: &str, query: &str) -> Result<TurnReply, CounselError> {
        let started = Instant::now();
        let request = self.request(request_id).await?;
        let (kind, result) = if request.needs_first_pass() {
            let kind = TurnKind::FirstAnalysis;
            (kind, self.first_pass(&request, query).await)
        } else {
            let kind = TurnKind::FollowUp {
                first_follow_up: request.chat_history.is_empty(),
            };
            (kind, self.follow_up(&request, query, kind).await)
        };

        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::record_turn(
            kind.as_str(),
            outcome,
            started.elapsed().as_millis() as u64,
        );
        result
    }

    async fn first_pass(
        &self,
        request: &AnalysisRequest,
        query: &str,
    ) -> Result<TurnReply, CounselError> {
        let request_id = request.id.as_str();
        let documents = &self.services.documents;
        info!(request_id, status = ?request.status, "running first analysis pass");

        documents
            .update(request_id, RequestPatch::status(RequestStatus::Processing))
            .await
            .map_err(CounselError::store)?;

        let texts = match self.services.chunks.get_all(request_id).await {
            Ok(texts) => texts,
            Err(err) => {
                let err = CounselError::store(err);
                self.mark_failed(request_id, &err).await;
                return Err(err);
            }
        };
        if texts.is_empty() {
            let err = CounselError::NoChunks;
            self.mark_failed(request_id, &err).await;
            return Err(err);
        }

        let document_context = texts.join("\n\n");
        let question = if query.trim().is_empty() {
            request.prompt.as_str()
        } else {
            query
        };

        let outcome = match self.workflow.run(&document_context, question).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.mark_failed(request_id, &err).await;
                return Err(err);
            }
        };

        let answer = outcome.presentation.text().to_string();
        let summary = outcome
            .presentation
            .is_generated()
            .then(|| answer.clone());
        documents
            .update(
                request_id,
                RequestPatch {
                    status: Some(RequestStatus::Complete),
                    error_message: Some(None),
                    detailed_analysis: Some(outcome.analysis.text.clone()),
                    initial_summary: Some(summary),
                    chat_history: Some(Vec::new()),
                },
            )
            .await
            .map_err(CounselError::store)?;

        info!(
            request_id,
            findings = outcome.research.findings().len(),
            analysis_chars = outcome.analysis.text.len(),
            "first analysis pass complete"
        );

        Ok(TurnReply {
            request_id: request_id.to_string(),
            kind: TurnKind::FirstAnalysis,
            answer,
            trace: outcome.trace,
        })
    }

    async fn follow_up(
        &self,
        request: &AnalysisRequest,
        query: &str,
        kind: TurnKind,
    ) -> Result<TurnReply, CounselError> {
        let request_id = request.id.as_str();
        let first_follow_up = matches!(
            kind,
            TurnKind::FollowUp {
                first_follow_up: true
            }
        );
        let mut trace = TurnTrace::default();

        let retrieved = self
            .retriever
            .retrieve(query, request_id, self.services.settings.neighbors)
            .await;
        let passages = if retrieved.is_empty() {
            0
        } else {
            retrieved.split(PASSAGE_SEPARATOR).count()
        };
        trace.record("retrieval", format!("{passages} passages"));

        let initial = if first_follow_up {
            request
                .detailed_analysis
                .as_deref()
                .map(|detailed| InitialAnalysis {
                    summary: request.initial_summary.as_deref(),
                    detailed,
                })
        } else {
            None
        };

        let reply = self
            .responder
            .respond(FollowUpContext {
                query,
                retrieved: &retrieved,
                history: &request.chat_history,
                initial,
            })
            .await;
        if reply.is_generated() {
            trace.record("reply", format!("{} chars", reply.text().len()));
        } else {
            metrics::record_degraded("reply");
            trace.record("reply", "generation failed; apology returned");
        }

        let answer = reply.text().to_string();
        self.services
            .documents
            .append_history(
                request_id,
                vec![ConversationTurn::user(query), ConversationTurn::model(&answer)],
            )
            .await
            .map_err(CounselError::store)?;

        info!(request_id, first_follow_up, passages, "follow-up answered");

        Ok(TurnReply {
            request_id: request_id.to_string(),
            kind,
            answer,
            trace: trace.into_events(),
        })
    }

    async fn mark_failed(&self, request_id: &str, err: &CounselError) {
        warn!(request_id, error = %err, "first analysis pass failed");
        if let Err(update_err) = self
            .services
            .documents
            .update(request_id, RequestPatch::failed(err.to_string()))
            .await
        {
            warn!(request_id, error = %update_err, "could not record failure on request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_kind_serialises_with_a_type_tag() {
        let first = serde_json::to_value(TurnKind::FirstAnalysis).unwrap();
        assert_eq!(first, serde_json::json!({ "type": "first_analysis" }));

        let follow_up = serde_json::to_value(TurnKind::FollowUp {
            first_follow_up: true,
        })
        .unwrap();
        assert_eq!(
            follow_up,
            serde_json::json!({ "type": "follow_up", "first_follow_up": true })
        );
    }

    #[tokio::test]
    async fn created_requests_start_pending() {
        let orchestrator = Orchestrator::new(ServiceContext::offline());

        let id = orchestrator
            .create_request("Review my lease", Some("uploads/lease.pdf"))
            .await
            .unwrap();
        let request = orchestrator.request(&id).await.unwrap();

        assert_eq!(request.status, Some(RequestStatus::Pending));
        assert_eq!(request.document_uri.as_deref(), Some("uploads/lease.pdf"));
        assert!(request.needs_first_pass());
    }

    #[tokio::test]
    async fn turn_locks_are_released_after_turns_finish() {
        let orchestrator = Orchestrator::new(ServiceContext::offline());
        let id = orchestrator.create_request("Review my lease", None).await.unwrap();
        orchestrator
            .index_document(
                &id,
                "Clause 1. The tenant pays rent of 900 euros on the first day of every month. \
Clause 2. Late payment incurs a five percent penalty on the outstanding amount.",
            )
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            orchestrator.handle_turn(&id, "Summarise"),
            orchestrator.handle_turn(&id, "What is the penalty?"),
        );
        first.unwrap();
        second.unwrap();
        assert!(orchestrator.turn_locks.is_empty());

        let missing = orchestrator.handle_turn("missing", "Hello?").await;
        assert!(matches!(missing, Err(CounselError::RequestNotFound(_))));
        assert!(orchestrator.turn_locks.is_empty());
    }

    #[tokio::test]
    async fn indexing_requires_an_existing_request() {
        let orchestrator = Orchestrator::new(ServiceContext::offline());

        let err = orchestrator
            .index_document("missing", "Some text.")
            .await
            .unwrap_err();

        assert!(matches!(err, CounselError::RequestNotFound(_)));
    }
}
