use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CounselError;
use crate::models::EmbeddingProvenance;
use crate::ports::{DynEmbedder, DynVectorIndex, IndexDatapoint};
use crate::segmenter::Segmenter;
use crate::store::DynChunkStore;

/// Outcome of indexing one document's text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub request_id: String,
    pub chunks_saved: usize,
    pub embedded: usize,
    pub upserted: bool,
    /// Chunks whose embedding was stored on the chunk because the upsert failed.
    pub fallback_recorded: usize,
}

impl IndexReport {
    /// True when segmentation produced nothing worth storing.
    pub fn is_empty(&self) -> bool {
        self.chunks_saved == 0
    }
}

/// Segments extracted text, stores the chunks and feeds the vector index.
pub struct DocumentIndexer {
    segmenter: Segmenter,
    chunks: DynChunkStore,
    embedder: DynEmbedder,
    index: DynVectorIndex,
}

impl DocumentIndexer {
    pub fn new(
        segmenter: Segmenter,
        chunks: DynChunkStore,
        embedder: DynEmbedder,
        index: DynVectorIndex,
    ) -> Self {
        Self {
            segmenter,
            chunks,
            embedder,
            index,
        }
    }

    /// Only a failure to store the chunks is an error; embedding and index
    /// failures degrade.
    pub async fn index_document(
        &self,
        request_id: &str,
        text: &str,
    ) -> Result<IndexReport, CounselError> {
        let mut report = IndexReport {
            request_id: request_id.to_string(),
            ..IndexReport::default()
        };

        let segments = self.segmenter.segment(text);
        if segments.is_empty() {
            info!(request_id, "no indexable text in document");
            return Ok(report);
        }

        let saved = self
            .chunks
            .save_chunks(request_id, segments)
            .await
            .map_err(CounselError::store)?;
        report.chunks_saved = saved.len();

        let mut datapoints = Vec::with_capacity(saved.len());
        for chunk in &saved {
            match self.embedder.embed(&chunk.text).await {
                Ok(vector) => datapoints.push(IndexDatapoint {
                    id: chunk.id.clone(),
                    vector,
                    request_id: request_id.to_string(),
                }),
                Err(err) => {
                    warn!(request_id, chunk_id = %chunk.id, error = %err, "embedding failed; chunk skipped");
                }
            }
        }
        report.embedded = datapoints.len();

        if datapoints.is_empty() {
            warn!(request_id, "no chunk embeddings produced; retrieval will be ungrounded");
            return Ok(report);
        }

        match self.index.upsert(datapoints.clone()).await {
            Ok(()) => {
                report.upserted = true;
            }
            Err(err) => {
                warn!(request_id, error = %err, "vector upsert failed; storing embeddings on chunks");
                report.fallback_recorded = self.record_fallback(request_id, datapoints).await;
            }
        }

        info!(
            request_id,
            chunks = report.chunks_saved,
            embedded = report.embedded,
            upserted = report.upserted,
            "document indexed"
        );
        Ok(report)
    }

    async fn record_fallback(&self, request_id: &str, datapoints: Vec<IndexDatapoint>) -> usize {
        let model = self.embedder.model_name().to_string();
        let mut recorded = 0;
        for point in datapoints {
            let provenance = EmbeddingProvenance {
                model: model.clone(),
                recorded_at: Utc::now(),
                values: point.vector,
            };
            match self
                .chunks
                .record_embedding(request_id, &point.id, provenance)
                .await
            {
                Ok(()) => recorded += 1,
                Err(err) => warn!(request_id, chunk_id = %point.id, error = %err, "failed to record fallback embedding"),
            }
        }
        recorded
    }
}
