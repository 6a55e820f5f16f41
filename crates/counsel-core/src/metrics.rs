use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};

struct PipelineMetrics {
    turns: Counter<u64>,
    turn_duration_ms: Histogram<f64>,
    degraded: Counter<u64>,
}

static METRICS: OnceCell<PipelineMetrics> = OnceCell::new();

fn handles() -> &'static PipelineMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("counsel.pipeline");
        PipelineMetrics {
            turns: meter
                .u64_counter("counsel_turns_total")
                .with_description("Conversation turns handled, by kind and outcome")
                .init(),
            turn_duration_ms: meter
                .f64_histogram("counsel_turn_duration_ms")
                .with_description("End-to-end turn latency in milliseconds")
                .init(),
            degraded: meter
                .u64_counter("counsel_degraded_total")
                .with_description("Pipeline stages that fell back to a degraded value")
                .init(),
        }
    })
}

/// Record a finished turn (no-op unless a meter provider is installed).
pub fn record_turn(kind: &str, outcome: &str, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("kind", kind.to_string()),
        KeyValue::new("outcome", outcome.to_string()),
    ];
    metrics.turns.add(1, &attrs);
    metrics.turn_duration_ms.record(duration_ms as f64, &attrs);
}

/// Record a stage that degraded instead of failing the turn.
pub fn record_degraded(stage: &str) {
    handles()
        .degraded
        .add(1, &[KeyValue::new("stage", stage.to_string())]);
}
