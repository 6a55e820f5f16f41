use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::{AppState, CapacityReport};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    retrieval_mode: &'static str,
    capacity: CapacityReport,
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let capacity = state.capacity();
    let status = if capacity.available_turns == 0 {
        "busy"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status,
        retrieval_mode: state.retrieval_mode(),
        capacity,
    })
}
