use axum::{Json, http::StatusCode, response::IntoResponse};
use counsel_core::CounselError;
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(error: impl ToString) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let payload = ErrorResponse {
            error: self.message,
        };
        (self.status, Json(payload)).into_response()
    }
}

impl From<CounselError> for AppError {
    fn from(error: CounselError) -> Self {
        let status = match &error {
            CounselError::RequestNotFound(_) => StatusCode::NOT_FOUND,
            CounselError::NoChunks | CounselError::AnalysisFailed(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

pub type ApiResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_http_statuses() {
        let missing = AppError::from(CounselError::RequestNotFound("r".into()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let no_chunks = AppError::from(CounselError::NoChunks);
        assert_eq!(no_chunks.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(no_chunks.to_string(), "Could not find text chunks.");

        let store = AppError::from(CounselError::Store("disk full".into()));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
