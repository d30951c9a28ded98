use std::sync::Arc;

use chrono::{Duration, Utc};
use mixlytics_core::error::{PipelineError, PipelineResult};
use mixlytics_core::job::{AttributionJobParams, ForecastJobParams, OptimizerJobParams};
use mixlytics_core::metrics::MetricSeries;
use mixlytics_core::results::{
    AllocationScenario, AttributionResult, ForecastResult, OptimizationResult, ScenarioComparison,
};
use mixlytics_core::store::StoredAttribution;
use mixlytics_models::attribution::{calculate_attribution, AttributionParams};
use mixlytics_models::forecast::{self, ForecastParams};
use mixlytics_models::optimizer::{compare_scenarios, optimize_budget};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::cache::ForecastCache;
use crate::state::AppState;

use super::with_retries;

/// Run the attribution model for an account.
///
/// A stored, unexpired result short-circuits the computation unless the
/// caller forces a recompute. Fresh results are persisted best effort; a
/// failed write never fails the run.
pub async fn run_attribution(
    state: &AppState,
    account_id: &str,
    params: &AttributionJobParams,
) -> PipelineResult<AttributionResult> {
    ensure_account(state, account_id).await?;

    if !params.force {
        if let Some(stored) = load_stored_attribution(state, account_id).await? {
            info!(account_id, attribution_id = %stored.id, "serving stored attribution result");
            return Ok(stored.result);
        }
    }

    let series = fetch_series(state, account_id).await?;
    if series.is_empty() {
        return Err(PipelineError::PrerequisiteMissing(format!(
            "no metric data ingested for account '{account_id}'"
        )));
    }

    let model_params = AttributionParams {
        alpha: state.config.ridge_alpha,
        bootstrap_iterations: state.config.bootstrap_iterations,
    };
    let mut rng: StdRng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let result = calculate_attribution(&series, &model_params, &mut rng)?;

    match state
        .attributions
        .save_attribution(account_id, &result, state.config.attribution_ttl())
        .await
    {
        Ok(id) => info!(account_id, attribution_id = %id, "attribution result stored"),
        Err(err) => warn!(account_id, error = %err, "attribution result not stored"),
    }

    Ok(result)
}

/// Run the revenue forecast for an account, synchronously.
///
/// Identical requests within the cache TTL are served from memory.
pub async fn run_forecast(
    state: &AppState,
    account_id: &str,
    params: &ForecastJobParams,
) -> PipelineResult<ForecastResult> {
    ensure_account(state, account_id).await?;

    let key = ForecastCache::signature(account_id, params);
    if let Some(result) = state.forecast_cache.get(&key).await {
        debug!(account_id, "forecast served from cache");
        return Ok(result);
    }

    let series = fetch_series(state, account_id).await?;
    if series.is_empty() {
        return Err(PipelineError::PrerequisiteMissing(format!(
            "no metric data ingested for account '{account_id}'"
        )));
    }

    let result = forecast::run_forecast(
        &series,
        &ForecastParams {
            horizon_days: params.horizon_days,
            future_spend: params.future_spend.clone(),
        },
    )?;
    state.forecast_cache.insert(key, result.clone()).await;
    Ok(result)
}

/// Run the budget optimizer for an account, synchronously, against its most
/// recent unexpired attribution result.
pub async fn run_optimizer(
    state: &AppState,
    account_id: &str,
    params: &OptimizerJobParams,
) -> PipelineResult<OptimizationResult> {
    ensure_account(state, account_id).await?;
    let stored = load_stored_attribution(state, account_id)
        .await?
        .ok_or_else(|| missing_attribution(account_id))?;
    optimize_budget(&stored.result, params.budget, params.constraints.as_ref())
}

/// Evaluate explicit allocation scenarios against the account's most recent
/// unexpired attribution result.
pub async fn run_scenarios(
    state: &AppState,
    account_id: &str,
    scenarios: &[AllocationScenario],
) -> PipelineResult<ScenarioComparison> {
    ensure_account(state, account_id).await?;
    let stored = load_stored_attribution(state, account_id)
        .await?
        .ok_or_else(|| missing_attribution(account_id))?;
    compare_scenarios(&stored.result, scenarios)
}

fn missing_attribution(account_id: &str) -> PipelineError {
    PipelineError::PrerequisiteMissing(format!(
        "no current attribution result for account '{account_id}'; run attribution first"
    ))
}

async fn ensure_account(state: &AppState, account_id: &str) -> PipelineResult<()> {
    let metrics = Arc::clone(&state.metrics);
    let account = account_id.to_string();
    let exists = with_retries(&state.config, "account lookup", move || {
        let metrics = Arc::clone(&metrics);
        let account = account.clone();
        async move { metrics.account_exists(&account).await }
    })
    .await?;
    if exists {
        Ok(())
    } else {
        Err(PipelineError::NotFound(format!(
            "account '{account_id}' not found"
        )))
    }
}

async fn fetch_series(state: &AppState, account_id: &str) -> PipelineResult<MetricSeries> {
    let since = Utc::now().date_naive() - Duration::days(state.config.lookback_days);
    let metrics = Arc::clone(&state.metrics);
    let account = account_id.to_string();
    with_retries(&state.config, "metrics fetch", move || {
        let metrics = Arc::clone(&metrics);
        let account = account.clone();
        async move { metrics.fetch_metrics(&account, since).await }
    })
    .await
}

async fn load_stored_attribution(
    state: &AppState,
    account_id: &str,
) -> PipelineResult<Option<StoredAttribution>> {
    let attributions = Arc::clone(&state.attributions);
    let account = account_id.to_string();
    with_retries(&state.config, "attribution lookup", move || {
        let attributions = Arc::clone(&attributions);
        let account = account.clone();
        async move { attributions.load_latest_attribution(&account).await }
    })
    .await
}
