use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Core error type surfaced to callers of the counsel pipeline.
#[derive(Debug, Error)]
pub enum CounselError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error: Could not find the specified document (request {0}).")]
    RequestNotFound(String),
    #[error("Could not find text chunks.")]
    NoChunks,
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),
    #[error("store failure: {0}")]
    Store(String),
    #[error("workflow failure: {0}")]
    Workflow(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CounselError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

/// Failure of a single call to an external collaborator (model, search,
/// embedding, vector index).
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
