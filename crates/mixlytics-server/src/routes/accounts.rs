use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mixlytics_core::metrics::MetricPoint;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{AppError, MAX_METRICS_BATCH};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct IngestMetricsRequest {
    pub metrics: Vec<MetricPoint>,
}

/// Random, URL-safe account identifier.
fn generate_account_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    format!("acct_{}", suffix.to_lowercase())
}

/// `POST /api/accounts` — register an account and mint its id.
#[tracing::instrument(skip(state))]
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_string()));
    }
    if name.len() > 200 {
        return Err(AppError::BadRequest(
            "name must be at most 200 characters".to_string(),
        ));
    }

    let account_id = generate_account_id();
    state.metrics.create_account(&account_id, name).await?;
    info!(account_id, name, "account created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "data": {
                "account_id": account_id,
                "name": name,
            }
        })),
    ))
}

/// `POST /api/accounts/{account_id}/metrics` — upsert a batch of daily
/// channel rows. Re-sent rows replace what is stored for the same channel
/// and date.
#[tracing::instrument(skip(state, req))]
pub async fn ingest_metrics(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Json(req): Json<IngestMetricsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !state.metrics.account_exists(&account_id).await? {
        return Err(AppError::NotFound(format!(
            "account '{account_id}' not found"
        )));
    }
    if req.metrics.is_empty() {
        return Err(AppError::BadRequest(
            "metrics must not be empty".to_string(),
        ));
    }
    if req.metrics.len() > MAX_METRICS_BATCH {
        return Err(AppError::BatchTooLarge(req.metrics.len()));
    }
    for (row, point) in req.metrics.iter().enumerate() {
        validate_point(row, point)?;
    }

    let written = state.metrics.upsert_points(&account_id, &req.metrics).await?;
    info!(account_id, rows = written, "metrics ingested");
    Ok(Json(json!({ "accepted": written })))
}

fn validate_point(row: usize, point: &MetricPoint) -> Result<(), AppError> {
    if point.channel.trim().is_empty() {
        return Err(AppError::BadRequest(format!(
            "row {row}: channel must not be empty"
        )));
    }
    if !point.spend.is_finite() || point.spend < 0.0 {
        return Err(AppError::BadRequest(format!(
            "row {row}: spend must be finite and non-negative"
        )));
    }
    if !point.revenue.is_finite() || point.revenue < 0.0 {
        return Err(AppError::BadRequest(format!(
            "row {row}: revenue must be finite and non-negative"
        )));
    }
    let counts = [
        point.impressions,
        point.clicks,
        point.conversions,
        point.new_customers,
        point.returning_customers,
    ];
    if counts.iter().any(|c| *c < 0) {
        return Err(AppError::BadRequest(format!(
            "row {row}: counts must be non-negative"
        )));
    }
    Ok(())
}
