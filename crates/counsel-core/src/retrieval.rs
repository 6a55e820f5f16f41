use anyhow::{Context, anyhow};
use tracing::{debug, warn};

use crate::metrics;
use crate::ports::{DocumentFilter, DynEmbedder, DynVectorIndex};
use crate::store::DynChunkStore;

/// Visible separator between retrieved passages.
pub const PASSAGE_SEPARATOR: &str = "\n---\n";

/// Narrows a document down to the passages relevant to one question.
pub struct Retriever {
    embedder: DynEmbedder,
    index: DynVectorIndex,
    chunks: DynChunkStore,
}

impl Retriever {
    pub fn new(embedder: DynEmbedder, index: DynVectorIndex, chunks: DynChunkStore) -> Self {
        Self {
            embedder,
            index,
            chunks,
        }
    }

    /// Concatenated passages for `query`, or an empty string when nothing
    /// could be retrieved.
    pub async fn retrieve(&self, query: &str, request_id: &str, k: usize) -> String {
        match self.passages(query, request_id, k).await {
            Ok(passages) => {
                debug!(request_id, passages = passages.len(), "retrieved passages");
                passages.join(PASSAGE_SEPARATOR)
            }
            Err(err) => {
                warn!(request_id, error = %err, "retrieval degraded to empty context");
                metrics::record_degraded("retrieval");
                String::new()
            }
        }
    }

    async fn passages(&self, query: &str, request_id: &str, k: usize) -> anyhow::Result<Vec<String>> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .context("query embedding failed")?;
        let ids = self
            .index
            .find_neighbors(&vector, k, &DocumentFilter::for_request(request_id))
            .await
            .context("neighbour search failed")?;
        if ids.is_empty() {
            return Err(anyhow!("no neighbours found"));
        }
        let passages = self.chunks.get_by_ids(request_id, &ids).await?;
        if passages.is_empty() {
            return Err(anyhow!("{} neighbour ids missing from chunk store", ids.len()));
        }
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryVectorIndex;
    use crate::ports::{Embedder, IndexDatapoint, VectorIndex};
    use crate::store::{ChunkStore, MemoryChunkStore};
    use crate::stub::HashEmbedder;
    use std::sync::Arc;

    async fn seeded() -> (Retriever, Arc<MemoryVectorIndex>) {
        let embedder = Arc::new(HashEmbedder::default());
        let index = Arc::new(MemoryVectorIndex::new());
        let chunks = Arc::new(MemoryChunkStore::new());

        for (request_id, texts) in [
            (
                "lease",
                vec![
                    "Rent is due monthly on the first day.",
                    "Late payment incurs a five percent penalty.",
                    "Pets require written consent from the landlord.",
                ],
            ),
            ("other", vec!["Rent penalty clauses in an unrelated contract."]),
        ] {
            let saved = chunks
                .save_chunks(request_id, texts.into_iter().map(String::from).collect())
                .await
                .unwrap();
            let mut points = Vec::new();
            for chunk in saved {
                points.push(IndexDatapoint {
                    vector: embedder.embed(&chunk.text).await.unwrap(),
                    id: chunk.id,
                    request_id: request_id.to_string(),
                });
            }
            index.upsert(points).await.unwrap();
        }

        (Retriever::new(embedder, index.clone(), chunks), index)
    }

    #[tokio::test]
    async fn returns_nearest_passages_joined() {
        let (retriever, _) = seeded().await;

        let context = retriever.retrieve("What is the late payment penalty?", "lease", 2).await;

        let passages: Vec<&str> = context.split(PASSAGE_SEPARATOR).collect();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0], "Late payment incurs a five percent penalty.");
        assert!(!context.contains("unrelated contract"));
    }

    #[tokio::test]
    async fn zero_neighbours_yield_empty_string() {
        let (retriever, _) = seeded().await;
        assert_eq!(retriever.retrieve("rent", "unknown-request", 5).await, "");
    }

    #[tokio::test]
    async fn embedding_failure_yields_empty_string() {
        let retriever = Retriever::new(
            Arc::new(HashEmbedder::default().fail_on("rent")),
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(MemoryChunkStore::new()),
        );
        assert_eq!(retriever.retrieve("rent due?", "lease", 5).await, "");
    }

    #[tokio::test]
    async fn dangling_neighbour_ids_yield_empty_string() {
        let embedder = Arc::new(HashEmbedder::default());
        let index = Arc::new(MemoryVectorIndex::new());
        index
            .upsert(vec![IndexDatapoint {
                id: "ghost".into(),
                vector: embedder.embed("rent").await.unwrap(),
                request_id: "lease".into(),
            }])
            .await
            .unwrap();
        let retriever = Retriever::new(embedder, index, Arc::new(MemoryChunkStore::new()));

        assert_eq!(retriever.retrieve("rent", "lease", 5).await, "");
    }
}
