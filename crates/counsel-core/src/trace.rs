//! Stage-by-stage record of what happened during a conversation turn.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub stage: String,
    pub message: String,
    pub timestamp_ms: u128,
}

impl TraceEvent {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            timestamp_ms: now_ms(),
        }
    }
}

/// Ordered events of a single turn.
#[derive(Debug, Clone, Default)]
pub struct TurnTrace(Vec<TraceEvent>);

impl TurnTrace {
    pub fn record(&mut self, stage: impl Into<String>, message: impl Into<String>) {
        self.0.push(TraceEvent::new(stage, message));
    }

    pub fn stages(&self) -> Vec<&str> {
        self.0.iter().map(|event| event.stage.as_str()).collect()
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.0
    }
}

impl FromIterator<TraceEvent> for TurnTrace {
    fn from_iter<I: IntoIterator<Item = TraceEvent>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Numbered markdown list, one line per stage.
pub fn trace_markdown(events: &[TraceEvent]) -> String {
    if events.is_empty() {
        return "_no stages recorded_".to_string();
    }
    events
        .iter()
        .enumerate()
        .fold(String::from("### Turn Trace\n"), |mut out, (idx, event)| {
            let _ = writeln!(out, "{}. **{}**: {}", idx + 1, event.stage, event.message);
            out
        })
}

/// On-disk shape of a persisted turn trace.
#[derive(Debug, Serialize, Deserialize)]
pub struct TraceRecord {
    pub request_id: String,
    pub written_at_ms: u128,
    pub events: Vec<TraceEvent>,
}

/// Write `events` as `<dir>/<request_id>-<millis>.json`, creating `dir` if needed.
pub fn persist_trace<P: AsRef<Path>>(
    dir: P,
    request_id: &str,
    events: &[TraceEvent],
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("cannot create trace directory {}", dir.display()))?;

    let record = TraceRecord {
        request_id: request_id.to_string(),
        written_at_ms: now_ms(),
        events: events.to_vec(),
    };
    let path = dir.join(format!("{}-{}.json", request_id, record.written_at_ms));
    fs::write(&path, serde_json::to_vec_pretty(&record)?)
        .with_context(|| format!("cannot write trace {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_trace_keeps_stage_order() {
        let mut trace = TurnTrace::default();
        trace.record("retrieval", "4 passages");
        trace.record("reply", "812 chars");

        assert_eq!(trace.stages(), vec!["retrieval", "reply"]);

        let markdown = trace_markdown(&trace.into_events());
        assert!(markdown.contains("1. **retrieval**: 4 passages"));
        assert!(markdown.contains("2. **reply**: 812 chars"));
    }

    #[test]
    fn empty_trace_has_placeholder() {
        assert_eq!(trace_markdown(&[]), "_no stages recorded_");
    }

    #[test]
    fn persisted_record_carries_request_id() {
        let dir = tempfile::tempdir().expect("temp dir");
        let events = vec![TraceEvent::new("retrieval", "2 passages")];

        let path = persist_trace(dir.path().join("nested"), "req-7", &events).expect("persist");

        let raw = std::fs::read_to_string(&path).expect("read back");
        let record: TraceRecord = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(record.request_id, "req-7");
        assert_eq!(record.events, events);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("req-7-"));
    }
}
