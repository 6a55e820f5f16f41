//! Contracts for the external collaborators the pipeline calls.
//!
//! Every call made through these traits is fallible remote I/O and is
//! bounded by [`with_timeout`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Text generation with an optional system-level instruction.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, ServiceError>;
}

pub type DynModel = Arc<dyn GenerativeModel>;

/// The two quality/cost tiers used by the agents.
#[derive(Clone)]
pub struct ModelSet {
    /// Extraction, verification, presentation and conversational replies.
    pub fast: DynModel,
    /// Drafting and refining the analysis.
    pub pro: DynModel,
}

impl ModelSet {
    pub fn new(fast: DynModel, pro: DynModel) -> Self {
        Self { fast, pro }
    }

    /// Use the same model for both tiers.
    pub fn single(model: DynModel) -> Self {
        Self {
            fast: model.clone(),
            pro: model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        depth: &str,
    ) -> Result<Vec<SearchHit>, ServiceError>;
}

pub type DynSearch = Arc<dyn WebSearch>;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded alongside fallback embeddings.
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}

pub type DynEmbedder = Arc<dyn Embedder>;

/// A vector stored in the index, restricted to the document it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDatapoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub request_id: String,
}

/// Neighbour searches never cross documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFilter {
    pub request_id: String,
}

impl DocumentFilter {
    pub fn for_request(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, datapoints: Vec<IndexDatapoint>) -> Result<(), ServiceError>;

    /// Identifiers of the `k` nearest datapoints, closest first.
    async fn find_neighbors(
        &self,
        vector: &[f32],
        k: usize,
        filter: &DocumentFilter,
    ) -> Result<Vec<String>, ServiceError>;

    fn backend(&self) -> &'static str;
}

pub type DynVectorIndex = Arc<dyn VectorIndex>;

/// Bound a collaborator call by `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout(limit)),
    }
}

/// Wraps a port so every call through it is bounded by `limit`.
pub struct Timed<P: ?Sized> {
    inner: Arc<P>,
    limit: Duration,
}

impl<P: ?Sized> Timed<P> {
    pub fn new(inner: Arc<P>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

pub fn timed_model(inner: DynModel, limit: Duration) -> DynModel {
    Arc::new(Timed::new(inner, limit))
}

pub fn timed_search(inner: DynSearch, limit: Duration) -> DynSearch {
    Arc::new(Timed::new(inner, limit))
}

pub fn timed_embedder(inner: DynEmbedder, limit: Duration) -> DynEmbedder {
    Arc::new(Timed::new(inner, limit))
}

pub fn timed_index(inner: DynVectorIndex, limit: Duration) -> DynVectorIndex {
    Arc::new(Timed::new(inner, limit))
}

#[async_trait]
impl GenerativeModel for Timed<dyn GenerativeModel> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, ServiceError> {
        with_timeout(self.limit, self.inner.generate(prompt, system)).await
    }
}

#[async_trait]
impl WebSearch for Timed<dyn WebSearch> {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        depth: &str,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        with_timeout(self.limit, self.inner.search(query, max_results, depth)).await
    }
}

#[async_trait]
impl Embedder for Timed<dyn Embedder> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        with_timeout(self.limit, self.inner.embed(text)).await
    }
}

#[async_trait]
impl VectorIndex for Timed<dyn VectorIndex> {
    async fn upsert(&self, datapoints: Vec<IndexDatapoint>) -> Result<(), ServiceError> {
        with_timeout(self.limit, self.inner.upsert(datapoints)).await
    }

    async fn find_neighbors(
        &self,
        vector: &[f32],
        k: usize,
        filter: &DocumentFilter,
    ) -> Result<Vec<String>, ServiceError> {
        with_timeout(self.limit, self.inner.find_neighbors(vector, k, filter)).await
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}
