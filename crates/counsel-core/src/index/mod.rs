#[cfg(feature = "qdrant-index")]
pub mod qdrant;
#[cfg(feature = "qdrant-index")]
pub use qdrant::{FastEmbedder, QdrantIndexConfig, QdrantVectorIndex};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ServiceError;
use crate::ports::{DocumentFilter, IndexDatapoint, VectorIndex};

/// Brute-force cosine index for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryVectorIndex {
    points: DashMap<String, IndexDatapoint>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, datapoints: Vec<IndexDatapoint>) -> Result<(), ServiceError> {
        for point in datapoints {
            self.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn find_neighbors(
        &self,
        vector: &[f32],
        k: usize,
        filter: &DocumentFilter,
    ) -> Result<Vec<String>, ServiceError> {
        let mut scored: Vec<(String, f32)> = self
            .points
            .iter()
            .filter(|entry| entry.request_id == filter.request_id)
            .map(|entry| (entry.id.clone(), cosine_similarity(vector, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored.into_iter().map(|(id, _)| id).collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Cosine similarity in `[-1, 1]`; zero for mismatched or degenerate vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
