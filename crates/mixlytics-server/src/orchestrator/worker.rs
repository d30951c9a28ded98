use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mixlytics_core::error::{PipelineError, PipelineResult};
use mixlytics_core::job::{Job, JobError, JobParams};
use tracing::{error, info, warn};

use crate::state::AppState;

use super::pipeline;

/// Interval between expiry sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background task pulling jobs off the queue until the process exits.
pub async fn run_worker_loop(state: Arc<AppState>, worker_id: usize) {
    let poll = state.config.worker_poll_interval();
    info!(worker_id, "worker started");
    loop {
        match state.jobs.claim_next(state.config.job_ttl()).await {
            Ok(Some(job)) => {
                info!(
                    worker_id,
                    job_id = %job.id,
                    job_type = job.job_type.as_str(),
                    "job claimed"
                );
                process_job(&state, &job).await;
            }
            Ok(None) => tokio::time::sleep(poll).await,
            Err(err) => {
                error!(worker_id, error = %err, "job claim failed");
                tokio::time::sleep(poll).await;
            }
        }
    }
}

/// Background task failing overdue jobs and dropping old records.
pub async fn run_sweeper_loop(state: Arc<AppState>) {
    let ttl = state.config.job_ttl();
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(err) = state.jobs.sweep_expired(ttl).await {
            error!(error = %err, "expiry sweep failed");
        }
        // Swept records stay readable for another TTL before deletion.
        let cutoff = Utc::now() - ttl * 2;
        if let Err(err) = state.jobs.purge_older_than(cutoff).await {
            error!(error = %err, "job purge failed");
        }
    }
}

/// Run one claimed job to a terminal state.
#[tracing::instrument(skip(state, job), fields(job_id = %job.id, job_type = job.job_type.as_str()))]
pub(crate) async fn process_job(state: &AppState, job: &Job) {
    match execute(state, job).await {
        Ok(result) => match state.jobs.complete(&job.id, &result).await {
            Ok(true) => info!(job_id = %job.id, "job completed"),
            Ok(false) => {
                warn!(job_id = %job.id, "job reached a terminal state elsewhere; result dropped")
            }
            Err(err) => error!(job_id = %job.id, error = %err, "job completion not recorded"),
        },
        Err(err) => {
            let job_error = JobError::from(&err);
            warn!(
                job_id = %job.id,
                kind = job_error.kind.as_str(),
                message = %job_error.message,
                "job failed"
            );
            if let Err(err) = state.jobs.fail(&job.id, &job_error).await {
                error!(job_id = %job.id, error = %err, "job failure not recorded");
            }
        }
    }
}

async fn execute(state: &AppState, job: &Job) -> PipelineResult<serde_json::Value> {
    let value = match &job.params {
        JobParams::Attribution(params) => {
            serde_json::to_value(pipeline::run_attribution(state, &job.account_id, params).await?)
        }
        JobParams::Forecast(params) => {
            serde_json::to_value(pipeline::run_forecast(state, &job.account_id, params).await?)
        }
        JobParams::Optimizer(params) => {
            serde_json::to_value(pipeline::run_optimizer(state, &job.account_id, params).await?)
        }
    };
    value.map_err(|err| PipelineError::Internal(err.into()))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use mixlytics_core::config::Config;
    use mixlytics_core::error::ErrorKind;
    use mixlytics_core::job::{AttributionJobParams, ForecastJobParams, JobStatus, OptimizerJobParams};
    use mixlytics_core::memory::{MemoryAttributionStore, MemoryJobStore, MemoryMetricsStore};
    use mixlytics_core::metrics::MetricPoint;
    use mixlytics_core::store::MetricsStore;

    use super::*;

    fn test_state() -> Arc<AppState> {
        let config = Config {
            store_retry_attempts: 1,
            store_retry_delay_ms: 1,
            bootstrap_iterations: 10,
            ..Config::default()
        };
        Arc::new(AppState::from_parts(
            Arc::new(MemoryMetricsStore::new()),
            Arc::new(MemoryAttributionStore::new()),
            Arc::new(MemoryJobStore::new()),
            config,
        ))
    }

    async fn seed_history(state: &AppState, account_id: &str, days: i64) {
        state
            .metrics
            .create_account(account_id, "Test Account")
            .await
            .unwrap();
        let today = Utc::now().date_naive();
        let mut points = Vec::new();
        for i in 0..days {
            let date = today - Duration::days(days - i);
            let spend = 90.0 + 25.0 * ((i as f64) / 8.0).sin();
            points.push(MetricPoint {
                date,
                channel: "search".to_string(),
                spend,
                revenue: spend * 3.0 + 40.0,
                impressions: 500,
                clicks: 25,
                conversions: 3,
                new_customers: 1,
                returning_customers: 2,
            });
        }
        state
            .metrics
            .upsert_points(account_id, &points)
            .await
            .unwrap();
    }

    async fn claim_and_process(state: &Arc<AppState>) -> Job {
        let job = state
            .jobs
            .claim_next(state.config.job_ttl())
            .await
            .unwrap()
            .unwrap();
        process_job(state, &job).await;
        state.jobs.get(&job.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn attribution_jobs_complete_with_a_result_payload() {
        let state = test_state();
        seed_history(&state, "acct_1", 90).await;
        let job = Job::new(
            "acct_1",
            JobParams::Attribution(AttributionJobParams {
                force: false,
                seed: Some(11),
            }),
        );
        state.jobs.insert(&job).await.unwrap();

        let done = claim_and_process(&state).await;
        assert_eq!(done.status, JobStatus::Completed);
        let result = done.result.unwrap();
        assert_eq!(result["n_samples"], 90);
        assert_eq!(result["model_version"], "ridge_v1");
        assert!(done.error.is_none());
    }

    #[tokio::test]
    async fn thin_history_fails_the_job_with_a_typed_error() {
        let state = test_state();
        seed_history(&state, "acct_1", 10).await;
        let job = Job::new(
            "acct_1",
            JobParams::Attribution(AttributionJobParams::default()),
        );
        state.jobs.insert(&job).await.unwrap();

        let done = claim_and_process(&state).await;
        assert_eq!(done.status, JobStatus::Failed);
        let error = done.error.unwrap();
        assert_eq!(error.kind, ErrorKind::InsufficientData);
        assert!(done.result.is_none());
    }

    #[tokio::test]
    async fn every_job_type_dispatches() {
        let state = test_state();
        seed_history(&state, "acct_1", 60).await;

        let forecast = Job::new(
            "acct_1",
            JobParams::Forecast(ForecastJobParams {
                horizon_days: 7,
                future_spend: None,
            }),
        );
        state.jobs.insert(&forecast).await.unwrap();
        let done = claim_and_process(&state).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result.unwrap()["horizon_days"], 7);

        // No stored attribution yet, so the optimizer job fails typed.
        let optimizer = Job::new(
            "acct_1",
            JobParams::Optimizer(OptimizerJobParams {
                budget: 500.0,
                constraints: None,
            }),
        );
        state.jobs.insert(&optimizer).await.unwrap();
        let done = claim_and_process(&state).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(
            done.error.unwrap().kind,
            ErrorKind::PrerequisiteMissing
        );
    }
}
