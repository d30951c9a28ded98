use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use mixlytics_core::job::ForecastJobParams;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::orchestrator::pipeline;
use crate::state::AppState;

/// Horizon used when the caller does not pick one.
const DEFAULT_HORIZON_DAYS: u32 = 30;

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub horizon_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    pub horizon_days: Option<u32>,
    /// Per-channel daily spend scenario; channels left out hold their last
    /// observed spend.
    #[serde(default)]
    pub future_spend: Option<BTreeMap<String, Vec<f64>>>,
}

/// `GET /api/accounts/{account_id}/forecast?horizon_days=N` — forecast under
/// last observed spend, computed in the request.
#[tracing::instrument(skip(state))]
pub async fn forecast(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Query(query): Query<ForecastQuery>,
) -> Result<impl IntoResponse, AppError> {
    let params = ForecastJobParams {
        horizon_days: query.horizon_days.unwrap_or(DEFAULT_HORIZON_DAYS),
        future_spend: None,
    };
    let result = pipeline::run_forecast(&state, &account_id, &params).await?;
    Ok(Json(json!({ "data": result })))
}

/// `POST /api/accounts/{account_id}/forecast` — forecast under an explicit
/// spend scenario.
#[tracing::instrument(skip(state))]
pub async fn forecast_scenario(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Json(req): Json<ForecastRequest>,
) -> Result<impl IntoResponse, AppError> {
    let params = ForecastJobParams {
        horizon_days: req.horizon_days.unwrap_or(DEFAULT_HORIZON_DAYS),
        future_spend: req.future_spend,
    };
    let result = pipeline::run_forecast(&state, &account_id, &params).await?;
    Ok(Json(json!({ "data": result })))
}
