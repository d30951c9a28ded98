use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mixlytics_core::error::{ErrorKind, PipelineError};
use serde_json::json;
use tracing::error;

/// Largest metrics batch a single ingest request may carry.
pub const MAX_METRICS_BATCH: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("metrics batch of {0} rows exceeds the maximum of {MAX_METRICS_BATCH}")]
    BatchTooLarge(usize),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// HTTP status for each pipeline failure kind. Client mistakes map to 4xx,
/// data/model preconditions to 422, transient store trouble to 503.
fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientData
        | ErrorKind::PrerequisiteMissing
        | ErrorKind::DegenerateInput
        | ErrorKind::NumericalInstability
        | ErrorKind::InfeasibleConstraints => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Self::BatchTooLarge(_) => {
                (StatusCode::BAD_REQUEST, "batch_too_large", self.to_string())
            }
            Self::Pipeline(err) => {
                let kind = err.kind();
                if kind == ErrorKind::Internal {
                    error!(error = %err, "pipeline failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        kind.as_str(),
                        "internal server error".to_string(),
                    )
                } else {
                    (status_for(kind), kind.as_str(), err.to_string())
                }
            }
            Self::Internal(err) => {
                error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));
        (status, body).into_response()
    }
}
