use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use fastembed::TextEmbedding;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointId, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::ports::{DocumentFilter, Embedder, IndexDatapoint, VectorIndex};

const KEY_REQUEST: &str = "request_id";

#[derive(Clone, Debug)]
pub struct QdrantIndexConfig {
    pub url: String,
    pub collection: String,
    pub concurrency_limit: usize,
    pub dimension: usize,
}

/// Qdrant-backed vector index; points carry their request id as payload.
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
    semaphore: Arc<Semaphore>,
}

impl QdrantVectorIndex {
    pub async fn new(config: QdrantIndexConfig) -> anyhow::Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .build()
            .map_err(|err| anyhow!("failed to create Qdrant client: {err}"))?;

        ensure_collection(&client, &config.collection, config.dimension).await?;

        Ok(Self {
            client,
            collection: config.collection,
            semaphore: Arc::new(Semaphore::new(config.concurrency_limit.max(1))),
        })
    }

    async fn permit(&self) -> Result<tokio::sync::OwnedSemaphorePermit, ServiceError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServiceError::Unavailable("qdrant semaphore closed".into()))
    }
}

async fn ensure_collection(
    client: &Qdrant,
    collection: &str,
    dimension: usize,
) -> anyhow::Result<()> {
    if client.collection_exists(collection).await? {
        return Ok(());
    }

    client
        .create_collection(
            CreateCollectionBuilder::new(collection)
                .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
        )
        .await
        .map_err(|err| anyhow!("failed to create qdrant collection '{collection}': {err}"))?;
    info!(collection, dimension, "created qdrant collection");
    Ok(())
}

fn point_id_to_string(id: Option<PointId>) -> Option<String> {
    match id?.point_id_options? {
        PointIdOptions::Uuid(uuid) => Some(uuid),
        PointIdOptions::Num(num) => Some(num.to_string()),
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(&self, datapoints: Vec<IndexDatapoint>) -> Result<(), ServiceError> {
        if datapoints.is_empty() {
            return Ok(());
        }
        let _permit = self.permit().await?;

        let count = datapoints.len();
        let mut points = Vec::with_capacity(count);
        for point in datapoints {
            let payload: qdrant_client::Payload =
                serde_json::json!({ KEY_REQUEST: point.request_id })
                    .try_into()
                    .map_err(|err| ServiceError::Malformed(format!("invalid payload: {err}")))?;
            points.push(PointStruct::new(point.id, point.vector, payload));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|err| ServiceError::Transport(format!("qdrant upsert failed: {err}")))?;

        debug!(count, collection = %self.collection, "upserted datapoints into qdrant");
        Ok(())
    }

    async fn find_neighbors(
        &self,
        vector: &[f32],
        k: usize,
        filter: &DocumentFilter,
    ) -> Result<Vec<String>, ServiceError> {
        let _permit = self.permit().await?;

        let restriction = Filter::all([Condition::matches(KEY_REQUEST, filter.request_id.clone())]);
        let search = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), k as u64)
                    .filter(restriction),
            )
            .await
            .map_err(|err| ServiceError::Transport(format!("qdrant search failed: {err}")))?;

        Ok(search
            .result
            .into_iter()
            .filter_map(|point| point_id_to_string(point.id))
            .collect())
    }

    fn backend(&self) -> &'static str {
        "qdrant"
    }
}

/// Local FastEmbed model used alongside the Qdrant index.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl FastEmbedder {
    pub async fn new() -> anyhow::Result<Self> {
        let (model, dimension) = tokio::task::spawn_blocking(|| -> anyhow::Result<_> {
            let mut model = TextEmbedding::try_new(Default::default())
                .map_err(|err| anyhow!("failed to initialise FastEmbed model: {err}"))?;

            let warmup = model
                .embed(vec!["counsel warmup"], Some(1))
                .map_err(|err| anyhow!("failed to warm up FastEmbed model: {err}"))?;
            let dimension = warmup
                .first()
                .map(|vector| vector.len())
                .filter(|len| *len > 0)
                .ok_or_else(|| anyhow!("FastEmbed warmup returned no embedding rows"))?;

            Ok((model, dimension))
        })
        .await??;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        "fastembed-default"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let model = self.model.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<f32>, ServiceError> {
            let mut model = model
                .lock()
                .map_err(|_| ServiceError::Unavailable("embedding model poisoned".into()))?;
            let embeddings = model
                .embed(vec![text], Some(1))
                .map_err(|err| ServiceError::Unavailable(format!("failed to embed text: {err}")))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| ServiceError::Malformed("embedding model returned empty result".into()))
        })
        .await
        .map_err(|err| ServiceError::Unavailable(format!("embedding task panicked: {err}")))?
    }
}
