use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub max_concurrent_turns: usize,
    /// Pipeline configuration file; `None` defers to `COUNSEL_CONFIG` / `./counsel.toml`.
    pub config_path: Option<PathBuf>,
    /// Run against the deterministic offline services.
    pub offline: bool,
    pub trace_dir: Option<PathBuf>,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8080";
    const DEFAULT_MAX_TURNS: usize = 4;

    pub fn from_env() -> Result<Self> {
        let raw_addr = env::var("COUNSEL_API_ADDR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = raw_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid COUNSEL_API_ADDR `{raw_addr}`"))?;

        let max_concurrent_turns = env::var("COUNSEL_MAX_CONCURRENT_TURNS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(Self::DEFAULT_MAX_TURNS);

        let config_path = non_empty_var("COUNSEL_CONFIG").map(PathBuf::from);
        let trace_dir = non_empty_var("COUNSEL_TRACE_DIR").map(PathBuf::from);
        let offline = non_empty_var("COUNSEL_API_OFFLINE")
            .and_then(|value| parse_bool(&value))
            .unwrap_or(false);

        Ok(Self {
            listen_addr,
            max_concurrent_turns,
            config_path,
            offline,
            trace_dir,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
