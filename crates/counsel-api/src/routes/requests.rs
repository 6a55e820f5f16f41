use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use counsel_core::{AnalysisRequest, TraceEvent, TurnKind, persist_trace};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiResult, AppError};
use crate::state::{AppState, PermitError};

pub fn requests_router() -> Router<AppState> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/turns", post(create_turn))
}

#[derive(Debug, Deserialize)]
struct CreateRequestBody {
    prompt: String,
    /// Extracted document text.
    text: String,
    document_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRequestResponse {
    request_id: String,
    chunks_indexed: usize,
    embedded: usize,
    upserted: bool,
}

#[derive(Debug, Deserialize)]
struct TurnBody {
    query: String,
}

#[derive(Debug, Serialize)]
struct TurnResponse {
    request_id: String,
    kind: TurnKind,
    answer: String,
    trace: Vec<TraceEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_path: Option<String>,
}

async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> ApiResult<(StatusCode, Json<CreateRequestResponse>)> {
    if body.prompt.trim().is_empty() {
        return Err(AppError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "prompt must not be empty",
        ));
    }

    let orchestrator = state.orchestrator();
    let request_id = orchestrator
        .create_request(&body.prompt, body.document_uri.as_deref())
        .await?;
    let report = orchestrator.index_document(&request_id, &body.text).await?;
    info!(request_id = %request_id, chunks = report.chunks_saved, "request created");

    Ok((
        StatusCode::CREATED,
        Json(CreateRequestResponse {
            request_id,
            chunks_indexed: report.chunks_saved,
            embedded: report.embedded,
            upserted: report.upserted,
        }),
    ))
}

async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AnalysisRequest>> {
    let request = state.orchestrator().request(&id).await?;
    Ok(Json(request))
}

async fn create_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TurnBody>,
) -> ApiResult<Json<TurnResponse>> {
    let _permit = state.try_acquire_turn().map_err(|err| match err {
        PermitError::Exhausted => AppError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "turn capacity reached; retry once a slot frees up",
        ),
        PermitError::Closed => {
            AppError::new(StatusCode::SERVICE_UNAVAILABLE, "turn executor unavailable")
        }
    })?;

    let reply = state.orchestrator().handle_turn(&id, &body.query).await?;

    let trace_path = match state.trace_dir() {
        Some(dir) => match persist_trace(dir.as_path(), &reply.request_id, &reply.trace) {
            Ok(path) => Some(path.display().to_string()),
            Err(err) => {
                warn!(request_id = %reply.request_id, error = %err, "failed to persist trace");
                None
            }
        },
        None => None,
    };

    Ok(Json(TurnResponse {
        request_id: reply.request_id,
        kind: reply.kind,
        answer: reply.answer,
        trace: reply.trace,
        trace_path,
    }))
}
