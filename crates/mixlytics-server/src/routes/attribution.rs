use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mixlytics_core::job::{AttributionJobParams, JobParams};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitAttributionRequest {
    /// Recompute even when a stored result is still fresh.
    #[serde(default)]
    pub force: bool,
    /// Fixed bootstrap seed for reproducible confidence intervals.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// `POST /api/accounts/{account_id}/attribution` — queue an attribution run.
///
/// Responds `202 Accepted` with the job to poll. When an equivalent job is
/// already in flight the response carries that job instead of a new one.
#[tracing::instrument(skip(state))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Json(req): Json<SubmitAttributionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !state.metrics.account_exists(&account_id).await? {
        return Err(AppError::NotFound(format!(
            "account '{account_id}' not found"
        )));
    }

    let params = JobParams::Attribution(AttributionJobParams {
        force: req.force,
        seed: req.seed,
    });
    let outcome = state.queue.submit(&account_id, params).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "job_id": outcome.job.id,
            "status": outcome.job.status.as_str(),
            "created": outcome.created,
        })),
    ))
}

/// `GET /api/accounts/{account_id}/attribution/latest` — most recent
/// unexpired stored result, 404 when none exists.
#[tracing::instrument(skip(state))]
pub async fn latest(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.metrics.account_exists(&account_id).await? {
        return Err(AppError::NotFound(format!(
            "account '{account_id}' not found"
        )));
    }

    let stored = state
        .attributions
        .load_latest_attribution(&account_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "no attribution result for account '{account_id}'"
            ))
        })?;

    Ok(Json(json!({
        "data": {
            "attribution_id": stored.id,
            "account_id": stored.account_id,
            "computed_at": stored.computed_at.to_rfc3339(),
            "expires_at": stored.expires_at.to_rfc3339(),
            "result": stored.result,
        }
    })))
}
