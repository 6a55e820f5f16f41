use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use counsel_core::ports::VectorIndex;
use counsel_core::{ConfigLoader, Orchestrator, ServiceContext};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::info;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    turn_permits: Arc<Semaphore>,
    max_turns: usize,
    trace_dir: Option<Arc<PathBuf>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapacityReport {
    pub max_turns: usize,
    pub available_turns: usize,
    pub active_turns: usize,
}

/// Why a turn could not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermitError {
    Exhausted,
    Closed,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            orchestrator: Arc::new(orchestrator),
            turn_permits: Arc::new(Semaphore::new(max_turns)),
            max_turns,
            trace_dir: None,
        }
    }

    pub fn with_trace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trace_dir = Some(Arc::new(dir.into()));
        self
    }

    pub async fn try_new(config: &AppConfig) -> Result<Self> {
        let services = if config.offline {
            info!("serving with offline services");
            ServiceContext::offline()
        } else {
            let pipeline = ConfigLoader::load(config.config_path.clone())?;
            ServiceContext::from_config(&pipeline).await?
        };

        let mut state = Self::new(Orchestrator::new(services), config.max_concurrent_turns);
        if let Some(dir) = &config.trace_dir {
            state = state.with_trace_dir(dir.clone());
        }
        Ok(state)
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    pub fn trace_dir(&self) -> Option<Arc<PathBuf>> {
        self.trace_dir.clone()
    }

    pub fn retrieval_mode(&self) -> &'static str {
        self.orchestrator.services().index.backend()
    }

    pub fn try_acquire_turn(&self) -> std::result::Result<OwnedSemaphorePermit, PermitError> {
        match self.turn_permits.clone().try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits) => Err(PermitError::Exhausted),
            Err(TryAcquireError::Closed) => Err(PermitError::Closed),
        }
    }

    pub fn capacity(&self) -> CapacityReport {
        let available = self.turn_permits.available_permits();
        CapacityReport {
            max_turns: self.max_turns,
            available_turns: available,
            active_turns: self.max_turns.saturating_sub(available),
        }
    }
}
