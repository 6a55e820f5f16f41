//! Counsel core: retrieval-augmented legal document analysis built on `graph_flow`.
//!
//! A document's text is segmented and indexed once. The first turn on a
//! request runs the research, analysis and presentation agents as a graph;
//! later turns answer follow-up questions from retrieved passages and the
//! stored conversation.

pub mod agents;
mod config;
mod context;
mod conversation;
mod error;
pub mod index;
mod ingest;
pub mod metrics;
mod models;
pub mod ports;
pub mod providers;
mod retrieval;
mod security;
mod segmenter;
pub mod store;
pub mod stub;
mod tasks;
mod telemetry;
mod trace;
mod workflow;

pub use config::{
    Config, ConfigLoader, EmbeddingConfig, EmbeddingProvider, IndexBackend, IndexConfig,
    LlmConfig, LoggingConfig, ModelProvider, RetrievalConfig, SearchConfig, SearchProvider,
    SegmenterConfig,
};
pub use context::{PipelineSettings, ServiceContext};
pub use conversation::{Orchestrator, TurnKind, TurnReply};
pub use error::{CounselError, ServiceError};
pub use ingest::{DocumentIndexer, IndexReport};
pub use models::{
    AnalysisRequest, Chunk, ConversationTurn, EmbeddingProvenance, RequestStatus,
    ResearchFinding, SearchQuerySet, TurnRole, truncate_chars,
};
pub use retrieval::{PASSAGE_SEPARATOR, Retriever};
pub use security::{SecretValue, require_env};
pub use segmenter::{Segmenter, segment};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceEvent, TraceRecord, TurnTrace, persist_trace, trace_markdown};
pub use workflow::{FirstPassAgents, FirstPassOutcome, FirstPassWorkflow};
