use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::CounselError;

const DEFAULT_FILTER: &str = "info,counsel_core=info";

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Log output settings shared by the CLI and the HTTP service.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    /// Filter directive used when `RUST_LOG` is unset.
    pub env_filter: Option<String>,
    pub with_ansi: bool,
    pub with_target: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            env_filter: None,
            with_ansi: true,
            with_target: false,
        }
    }
}

impl TelemetryOptions {
    pub fn with_level(self, level: impl Into<String>) -> Self {
        Self {
            env_filter: Some(level.into()),
            ..self
        }
    }

    fn filter_directive(&self, rust_log: Option<String>) -> String {
        rust_log
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.env_filter.clone())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string())
    }
}

/// Install the process-wide subscriber. Later calls are no-ops.
pub fn init_telemetry(options: TelemetryOptions) -> Result<(), CounselError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let directive = options.filter_directive(std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directive).map_err(|err| {
        INSTALLED.store(false, Ordering::SeqCst);
        CounselError::InvalidConfiguration(format!("bad log filter `{directive}`: {err}"))
    })?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(options.with_ansi)
                .with_target(options.with_target),
        )
        .try_init()
        .map_err(|err| CounselError::InvalidConfiguration(format!("logging setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_wins_over_configured_level() {
        let options = TelemetryOptions::default().with_level("debug");
        assert_eq!(options.filter_directive(Some("warn".into())), "warn");
        assert_eq!(options.filter_directive(Some("  ".into())), "debug");
        assert_eq!(options.filter_directive(None), "debug");
    }

    #[test]
    fn falls_back_to_default_filter() {
        assert_eq!(
            TelemetryOptions::default().filter_directive(None),
            DEFAULT_FILTER
        );
    }
}
