use std::sync::Arc;

use tracing::info;

use crate::agents::ResearchSettings;
use crate::config::{Config, EmbeddingProvider, IndexBackend, ModelProvider, SearchProvider};
use crate::error::CounselError;
use crate::index::MemoryVectorIndex;
use crate::ports::{
    DynEmbedder, DynSearch, DynVectorIndex, ModelSet, VectorIndex, timed_embedder, timed_model,
    timed_search,
};
use crate::providers::{GeminiEmbedder, GeminiModel, TavilySearch};
use crate::segmenter::Segmenter;
use crate::store::{DynChunkStore, DynDocumentStore, MemoryChunkStore, MemoryDocumentStore};
use crate::stub::{HashEmbedder, StubModel, StubSearch};

/// Tunables shared by ingestion, the first pass and follow-up turns.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub segmenter: Segmenter,
    /// Passages retrieved per follow-up question.
    pub neighbors: usize,
    pub research: ResearchSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            segmenter: Segmenter::default(),
            neighbors: 5,
            research: ResearchSettings::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            segmenter: Segmenter::from(config.segmenter),
            neighbors: config.retrieval.neighbors.max(1),
            research: ResearchSettings {
                max_results_per_query: config.search.max_results,
                search_depth: config.search.depth.clone(),
                ..ResearchSettings::default()
            },
        }
    }
}

/// Every external collaborator the pipeline talks to, wired once at startup.
#[derive(Clone)]
pub struct ServiceContext {
    pub models: ModelSet,
    pub search: DynSearch,
    pub embedder: DynEmbedder,
    pub index: DynVectorIndex,
    pub documents: DynDocumentStore,
    pub chunks: DynChunkStore,
    pub settings: PipelineSettings,
}

impl ServiceContext {
    /// Deterministic in-process services; no network access.
    pub fn offline() -> Self {
        Self {
            models: ModelSet::single(Arc::new(StubModel::offline())),
            search: Arc::new(StubSearch::offline()),
            embedder: Arc::new(HashEmbedder::default()),
            index: Arc::new(MemoryVectorIndex::new()),
            documents: Arc::new(MemoryDocumentStore::new()),
            chunks: Arc::new(MemoryChunkStore::new()),
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_models(mut self, models: ModelSet) -> Self {
        self.models = models;
        self
    }

    pub fn with_search(mut self, search: DynSearch) -> Self {
        self.search = search;
        self
    }

    pub fn with_embedder(mut self, embedder: DynEmbedder) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_index(mut self, index: DynVectorIndex) -> Self {
        self.index = index;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the live service set described by `config`. Every remote port
    /// is wrapped in its configured timeout.
    pub async fn from_config(config: &Config) -> Result<Self, CounselError> {
        let models = match config.llm.provider {
            ModelProvider::Gemini => {
                let key = config.llm_api_key()?;
                let timeout = config.llm.timeout();
                let fast = GeminiModel::new(key.clone(), &config.llm.fast_model, timeout)
                    .map_err(anyhow::Error::from)?;
                let pro = GeminiModel::new(key, &config.llm.pro_model, timeout)
                    .map_err(anyhow::Error::from)?;
                ModelSet::new(
                    timed_model(Arc::new(fast), timeout),
                    timed_model(Arc::new(pro), timeout),
                )
            }
            ModelProvider::Stub => ModelSet::single(Arc::new(StubModel::offline())),
        };

        let search: DynSearch = match config.search.provider {
            SearchProvider::Tavily => {
                let timeout = config.search.timeout();
                let tavily = TavilySearch::new(config.search_api_key()?, timeout)
                    .map_err(anyhow::Error::from)?;
                timed_search(Arc::new(tavily), timeout)
            }
            SearchProvider::Stub => Arc::new(StubSearch::offline()),
        };

        let embedder = build_embedder(config).await?;
        let index = build_index(config).await?;

        info!(
            llm = ?config.llm.provider,
            search = ?config.search.provider,
            embedding = ?config.embedding.provider,
            index = index.backend(),
            "service context ready"
        );

        Ok(Self {
            models,
            search,
            embedder,
            index,
            documents: Arc::new(MemoryDocumentStore::new()),
            chunks: Arc::new(MemoryChunkStore::new()),
            settings: PipelineSettings::from_config(config),
        })
    }
}

async fn build_embedder(config: &Config) -> Result<DynEmbedder, CounselError> {
    let timeout = config.embedding.timeout();
    match config.embedding.provider {
        EmbeddingProvider::Gemini => {
            let embedder = GeminiEmbedder::new(
                config.embedding_api_key()?,
                &config.embedding.model,
                timeout,
            )
            .map_err(anyhow::Error::from)?;
            Ok(timed_embedder(Arc::new(embedder), timeout))
        }
        #[cfg(feature = "qdrant-index")]
        EmbeddingProvider::Fastembed => {
            let embedder = crate::index::FastEmbedder::new().await?;
            Ok(timed_embedder(Arc::new(embedder), timeout))
        }
        #[cfg(not(feature = "qdrant-index"))]
        EmbeddingProvider::Fastembed => Err(CounselError::InvalidConfiguration(
            "embedding.provider = \"fastembed\" requires the qdrant-index feature".into(),
        )),
        EmbeddingProvider::Stub => Ok(Arc::new(HashEmbedder::new(config.embedding.dimensions))),
    }
}

async fn build_index(config: &Config) -> Result<DynVectorIndex, CounselError> {
    match config.index.backend {
        IndexBackend::Memory => Ok(Arc::new(MemoryVectorIndex::new())),
        #[cfg(feature = "qdrant-index")]
        IndexBackend::Qdrant => {
            let index = crate::index::QdrantVectorIndex::new(crate::index::QdrantIndexConfig {
                url: config.index.url.clone(),
                collection: config.index.collection.clone(),
                concurrency_limit: config.index.concurrency_limit,
                dimension: config.embedding.dimensions,
            })
            .await?;
            Ok(crate::ports::timed_index(
                Arc::new(index),
                config.index.timeout(),
            ))
        }
        #[cfg(not(feature = "qdrant-index"))]
        IndexBackend::Qdrant => Err(CounselError::InvalidConfiguration(
            "index.backend = \"qdrant\" requires the qdrant-index feature".into(),
        )),
    }
}
