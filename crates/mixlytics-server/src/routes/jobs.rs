use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

/// `GET /api/accounts/{account_id}/jobs/{job_id}` — poll a job.
///
/// Jobs belonging to other accounts read as missing. A non-terminal job
/// past its TTL is reported failed with a timeout error.
#[tracing::instrument(skip(state))]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path((account_id, job_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let job = state.queue.get_job(&account_id, &job_id).await?;
    Ok(Json(json!({
        "data": {
            "job_id": job.id,
            "account_id": job.account_id,
            "job_type": job.job_type.as_str(),
            "status": job.status.as_str(),
            "result": job.result,
            "error": job.error,
            "created_at": job.created_at.to_rfc3339(),
            "updated_at": job.updated_at.to_rfc3339(),
        }
    })))
}
