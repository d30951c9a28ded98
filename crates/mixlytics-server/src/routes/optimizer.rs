use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use mixlytics_core::job::OptimizerJobParams;
use mixlytics_core::results::AllocationScenario;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::orchestrator::pipeline;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CompareScenariosRequest {
    pub scenarios: Vec<AllocationScenario>,
}

/// `POST /api/accounts/{account_id}/optimizer` — allocate a budget across
/// channels using the account's most recent attribution result.
#[tracing::instrument(skip(state))]
pub async fn optimize(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Json(req): Json<OptimizerJobParams>,
) -> Result<impl IntoResponse, AppError> {
    let result = pipeline::run_optimizer(&state, &account_id, &req).await?;
    Ok(Json(json!({ "data": result })))
}

/// `POST /api/accounts/{account_id}/optimizer/scenarios` — evaluate explicit
/// allocations side by side.
#[tracing::instrument(skip(state))]
pub async fn scenarios(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Json(req): Json<CompareScenariosRequest>,
) -> Result<impl IntoResponse, AppError> {
    let comparison = pipeline::run_scenarios(&state, &account_id, &req.scenarios).await?;
    Ok(Json(json!({ "data": comparison })))
}
