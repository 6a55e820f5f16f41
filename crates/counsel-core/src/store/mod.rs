mod memory;

pub use memory::{MemoryChunkStore, MemoryDocumentStore};

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{AnalysisRequest, Chunk, ConversationTurn, EmbeddingProvenance, RequestStatus};

/// Partial update merged into a stored request. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPatch {
    pub status: Option<RequestStatus>,
    pub error_message: Option<Option<String>>,
    pub detailed_analysis: Option<String>,
    pub initial_summary: Option<Option<String>>,
    pub chat_history: Option<Vec<ConversationTurn>>,
}

impl RequestPatch {
    pub fn status(status: RequestStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(RequestStatus::Failed),
            error_message: Some(Some(message.into())),
            ..Self::default()
        }
    }

    pub fn apply(self, request: &mut AnalysisRequest) {
        if let Some(status) = self.status {
            request.status = Some(status);
        }
        if let Some(error_message) = self.error_message {
            request.error_message = error_message;
        }
        if let Some(analysis) = self.detailed_analysis {
            request.detailed_analysis = Some(analysis);
        }
        if let Some(summary) = self.initial_summary {
            request.initial_summary = summary;
        }
        if let Some(history) = self.chat_history {
            request.chat_history = history;
        }
    }
}

/// Persistent analysis request records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, request: AnalysisRequest) -> anyhow::Result<()>;

    async fn get(&self, request_id: &str) -> anyhow::Result<Option<AnalysisRequest>>;

    /// Merge `patch` into the stored record; errors if the record is missing.
    async fn update(&self, request_id: &str, patch: RequestPatch) -> anyhow::Result<()>;

    /// Atomically append `turns` to the stored history.
    async fn append_history(
        &self,
        request_id: &str,
        turns: Vec<ConversationTurn>,
    ) -> anyhow::Result<()>;
}

pub type DynDocumentStore = Arc<dyn DocumentStore>;

/// Per-request chunk storage; append-only apart from embedding fallbacks.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store `texts` under fresh identifiers, returned in input order.
    async fn save_chunks(&self, request_id: &str, texts: Vec<String>) -> anyhow::Result<Vec<Chunk>>;

    /// Texts for `ids` in the given order; unknown identifiers are skipped.
    async fn get_by_ids(&self, request_id: &str, ids: &[String]) -> anyhow::Result<Vec<String>>;

    async fn get_all(&self, request_id: &str) -> anyhow::Result<Vec<String>>;

    async fn record_embedding(
        &self,
        request_id: &str,
        chunk_id: &str,
        provenance: EmbeddingProvenance,
    ) -> anyhow::Result<()>;

    async fn get_chunk(&self, request_id: &str, chunk_id: &str) -> anyhow::Result<Option<Chunk>>;
}

pub type DynChunkStore = Arc<dyn ChunkStore>;
