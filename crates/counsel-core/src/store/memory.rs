use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::{ChunkStore, DocumentStore, RequestPatch};
use crate::models::{AnalysisRequest, Chunk, ConversationTurn, EmbeddingProvenance};

/// In-memory request records for tests and offline runs.
#[derive(Default)]
pub struct MemoryDocumentStore {
    records: DashMap<String, AnalysisRequest>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, request: AnalysisRequest) -> anyhow::Result<()> {
        self.records.insert(request.id.clone(), request);
        Ok(())
    }

    async fn get(&self, request_id: &str) -> anyhow::Result<Option<AnalysisRequest>> {
        Ok(self.records.get(request_id).map(|entry| entry.clone()))
    }

    async fn update(&self, request_id: &str, patch: RequestPatch) -> anyhow::Result<()> {
        let mut entry = self
            .records
            .get_mut(request_id)
            .ok_or_else(|| anyhow!("request {request_id} not found"))?;
        patch.apply(&mut entry);
        Ok(())
    }

    async fn append_history(
        &self,
        request_id: &str,
        turns: Vec<ConversationTurn>,
    ) -> anyhow::Result<()> {
        // The shard guard is held for the whole append.
        let mut entry = self
            .records
            .get_mut(request_id)
            .ok_or_else(|| anyhow!("request {request_id} not found"))?;
        entry.chat_history.extend(turns);
        Ok(())
    }
}

/// In-memory chunk storage keyed by request.
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: DashMap<String, Vec<Chunk>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn save_chunks(&self, request_id: &str, texts: Vec<String>) -> anyhow::Result<Vec<Chunk>> {
        let created_at = Utc::now();
        let saved: Vec<Chunk> = texts
            .into_iter()
            .map(|text| Chunk {
                id: Uuid::new_v4().to_string(),
                request_id: request_id.to_string(),
                text,
                created_at,
                embedding: None,
            })
            .collect();

        self.chunks
            .entry(request_id.to_string())
            .or_default()
            .extend(saved.iter().cloned());
        debug!(request_id, count = saved.len(), "saved chunks");
        Ok(saved)
    }

    async fn get_by_ids(&self, request_id: &str, ids: &[String]) -> anyhow::Result<Vec<String>> {
        let Some(chunks) = self.chunks.get(request_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| chunks.iter().find(|chunk| &chunk.id == id))
            .map(|chunk| chunk.text.clone())
            .collect())
    }

    async fn get_all(&self, request_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .chunks
            .get(request_id)
            .map(|chunks| chunks.iter().map(|chunk| chunk.text.clone()).collect())
            .unwrap_or_default())
    }

    async fn record_embedding(
        &self,
        request_id: &str,
        chunk_id: &str,
        provenance: EmbeddingProvenance,
    ) -> anyhow::Result<()> {
        let mut chunks = self
            .chunks
            .get_mut(request_id)
            .ok_or_else(|| anyhow!("no chunks stored for request {request_id}"))?;
        let chunk = chunks
            .iter_mut()
            .find(|chunk| chunk.id == chunk_id)
            .ok_or_else(|| anyhow!("chunk {chunk_id} not found"))?;
        chunk.embedding = Some(provenance);
        Ok(())
    }

    async fn get_chunk(&self, request_id: &str, chunk_id: &str) -> anyhow::Result<Option<Chunk>> {
        Ok(self.chunks.get(request_id).and_then(|chunks| {
            chunks.iter().find(|chunk| chunk.id == chunk_id).cloned()
        }))
    }
}
