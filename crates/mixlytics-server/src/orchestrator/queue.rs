use std::sync::Arc;

use chrono::Utc;
use mixlytics_core::config::Config;
use mixlytics_core::error::{ErrorKind, PipelineError, PipelineResult};
use mixlytics_core::job::{Job, JobError, JobParams, JobStatus};
use mixlytics_core::store::JobStore;
use mixlytics_models::forecast::{MAX_HORIZON_DAYS, MIN_HORIZON_DAYS};
use tracing::{info, warn};

use super::with_retries;

/// Outcome of a submission; `created` is false when an equivalent job was
/// already in flight and that job is returned instead.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub job: Job,
    pub created: bool,
}

/// Submission and lookup frontend over the job store.
///
/// At most one non-terminal job per account and job type exists at a time;
/// duplicate submissions join the in-flight job.
pub struct JobQueue {
    jobs: Arc<dyn JobStore>,
    config: Arc<Config>,
}

impl JobQueue {
    pub fn new(jobs: Arc<dyn JobStore>, config: Arc<Config>) -> Self {
        Self { jobs, config }
    }

    pub async fn submit(
        &self,
        account_id: &str,
        params: JobParams,
    ) -> PipelineResult<SubmitOutcome> {
        validate_params(&params)?;
        let job_type = params.job_type();

        let jobs = Arc::clone(&self.jobs);
        let account = account_id.to_string();
        let existing = with_retries(&self.config, "active job lookup", move || {
            let jobs = Arc::clone(&jobs);
            let account = account.clone();
            async move { jobs.find_active(&account, job_type).await }
        })
        .await?;

        if let Some(job) = existing {
            if job.is_expired(self.config.job_ttl(), Utc::now()) {
                // Abandoned before a worker or the sweeper got to it; retire
                // the record so the new submission is not chained to it.
                let error = self.timeout_error();
                if let Err(err) = self.jobs.fail(&job.id, &error).await {
                    warn!(job_id = %job.id, error = %err, "timeout transition not persisted");
                }
            } else {
                info!(
                    account_id,
                    job_id = %job.id,
                    job_type = job_type.as_str(),
                    "duplicate submission joins the in-flight job"
                );
                return Ok(SubmitOutcome {
                    job,
                    created: false,
                });
            }
        }

        let job = Job::new(account_id, params);
        let jobs = Arc::clone(&self.jobs);
        let record = job.clone();
        with_retries(&self.config, "job insert", move || {
            let jobs = Arc::clone(&jobs);
            let record = record.clone();
            async move { jobs.insert(&record).await }
        })
        .await?;

        info!(account_id, job_id = %job.id, job_type = job_type.as_str(), "job queued");
        Ok(SubmitOutcome { job, created: true })
    }

    /// Look up a job on behalf of an account. Jobs belonging to other
    /// accounts read as missing. A non-terminal job past its TTL resolves
    /// to failed with a timeout error on this read; records that finished
    /// before expiring read as missing once the TTL passes.
    pub async fn get_job(&self, account_id: &str, job_id: &str) -> PipelineResult<Job> {
        let jobs = Arc::clone(&self.jobs);
        let id = job_id.to_string();
        let found = with_retries(&self.config, "job lookup", move || {
            let jobs = Arc::clone(&jobs);
            let id = id.clone();
            async move { jobs.get(&id).await }
        })
        .await?;

        let mut job = match found {
            Some(job) if job.account_id == account_id => job,
            _ => {
                return Err(PipelineError::NotFound(format!("job '{job_id}' not found")));
            }
        };

        if job.is_expired(self.config.job_ttl(), Utc::now()) {
            if job.is_terminal() {
                // Expired records stop being served. The one exception is a
                // timeout marker, which stays readable until the purge so a
                // poller learns how the job ended.
                let timed_out =
                    matches!(&job.error, Some(e) if e.kind == ErrorKind::Timeout);
                if !timed_out {
                    return Err(PipelineError::NotFound(format!("job '{job_id}' not found")));
                }
            } else {
                let error = self.timeout_error();
                // Persist the transition so workers stop seeing the job; the
                // read itself succeeds even when that write does not.
                if let Err(err) = self.jobs.fail(&job.id, &error).await {
                    warn!(job_id = %job.id, error = %err, "timeout transition not persisted");
                }
                job.status = JobStatus::Failed;
                job.error = Some(error);
                job.updated_at = Utc::now();
            }
        }

        Ok(job)
    }

    fn timeout_error(&self) -> JobError {
        JobError {
            kind: ErrorKind::Timeout,
            message: format!(
                "job did not finish within the {}h window",
                self.config.job_ttl_hours
            ),
        }
    }
}

/// Shape and range validation at submission time. Data-dependent checks
/// (history length, constraint feasibility against stored results) run when
/// the job executes.
fn validate_params(params: &JobParams) -> PipelineResult<()> {
    match params {
        JobParams::Attribution(_) => Ok(()),
        JobParams::Forecast(p) => {
            if !(MIN_HORIZON_DAYS..=MAX_HORIZON_DAYS).contains(&p.horizon_days) {
                return Err(PipelineError::InvalidInput(format!(
                    "horizon_days must be between {MIN_HORIZON_DAYS} and {MAX_HORIZON_DAYS}, got {}",
                    p.horizon_days
                )));
            }
            if let Some(scenario) = &p.future_spend {
                for (channel, values) in scenario {
                    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                        return Err(PipelineError::InvalidInput(format!(
                            "future spend for channel '{channel}' must be finite and non-negative"
                        )));
                    }
                }
            }
            Ok(())
        }
        JobParams::Optimizer(p) => {
            if !p.budget.is_finite() || p.budget <= 0.0 {
                return Err(PipelineError::InvalidInput(format!(
                    "budget must be a positive amount, got {}",
                    p.budget
                )));
            }
            if let Some(constraints) = &p.constraints {
                for (channel, bounds) in constraints {
                    for bound in [bounds.min, bounds.max].into_iter().flatten() {
                        if !bound.is_finite() || bound < 0.0 {
                            return Err(PipelineError::InvalidInput(format!(
                                "constraint bounds for '{channel}' must be non-negative"
                            )));
                        }
                    }
                    if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
                        if min > max {
                            return Err(PipelineError::InvalidInput(format!(
                                "channel '{channel}' has min {min} above max {max}"
                            )));
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use mixlytics_core::job::{AttributionJobParams, ForecastJobParams, OptimizerJobParams};
    use mixlytics_core::memory::MemoryJobStore;

    use super::*;

    fn queue() -> JobQueue {
        let config = Config {
            store_retry_attempts: 1,
            store_retry_delay_ms: 1,
            ..Config::default()
        };
        JobQueue::new(Arc::new(MemoryJobStore::new()), Arc::new(config))
    }

    fn attribution_params() -> JobParams {
        JobParams::Attribution(AttributionJobParams::default())
    }

    #[tokio::test]
    async fn duplicate_submissions_join_the_inflight_job() {
        let queue = queue();
        let first = queue.submit("acct_1", attribution_params()).await.unwrap();
        assert!(first.created);
        assert_eq!(first.job.status, JobStatus::Pending);

        let second = queue.submit("acct_1", attribution_params()).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.job.id, first.job.id);

        // A different account gets its own job.
        let other = queue.submit("acct_2", attribution_params()).await.unwrap();
        assert!(other.created);
        assert_ne!(other.job.id, first.job.id);
    }

    #[tokio::test]
    async fn lookups_are_scoped_to_the_owning_account() {
        let queue = queue();
        let submitted = queue.submit("acct_1", attribution_params()).await.unwrap();

        let seen = queue.get_job("acct_1", &submitted.job.id).await.unwrap();
        assert_eq!(seen.id, submitted.job.id);

        let err = queue
            .get_job("acct_2", &submitted.job.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = queue.get_job("acct_1", "no-such-job").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn overdue_jobs_read_as_failed_with_a_timeout() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = JobQueue::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::new(Config::default()),
        );

        let mut job = Job::new("acct_1", attribution_params());
        job.created_at = Utc::now() - chrono::Duration::hours(30);
        store.insert(&job).await.unwrap();

        let seen = queue.get_job("acct_1", &job.id).await.unwrap();
        assert_eq!(seen.status, JobStatus::Failed);
        let error = seen.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert!(error.message.contains("24h"));

        // The transition persisted; workers will not pick the job up.
        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);

        // A later poll still sees the timeout rather than a missing job.
        let again = queue.get_job("acct_1", &job.id).await.unwrap();
        assert_eq!(again.status, JobStatus::Failed);
        assert_eq!(again.error.unwrap().kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn expired_finished_jobs_read_as_missing() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = JobQueue::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::new(Config::default()),
        );

        let mut done = Job::new("acct_1", attribution_params());
        done.status = JobStatus::Completed;
        done.created_at = Utc::now() - chrono::Duration::hours(30);
        store.insert(&done).await.unwrap();

        let err = queue.get_job("acct_1", &done.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn stale_inflight_jobs_do_not_block_resubmission() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = JobQueue::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::new(Config::default()),
        );

        let mut stale = Job::new("acct_1", attribution_params());
        stale.created_at = Utc::now() - chrono::Duration::hours(30);
        store.insert(&stale).await.unwrap();

        let outcome = queue.submit("acct_1", attribution_params()).await.unwrap();
        assert!(outcome.created);
        assert_ne!(outcome.job.id, stale.id);

        // The abandoned job was retired on the way through.
        let retired = store.get(&stale.id).await.unwrap().unwrap();
        assert_eq!(retired.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn submission_validates_typed_params() {
        let queue = queue();

        let err = queue
            .submit(
                "acct_1",
                JobParams::Forecast(ForecastJobParams {
                    horizon_days: 365,
                    future_spend: None,
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = queue
            .submit(
                "acct_1",
                JobParams::Optimizer(OptimizerJobParams {
                    budget: -100.0,
                    constraints: None,
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        // In-range params queue fine.
        let ok = queue
            .submit(
                "acct_1",
                JobParams::Forecast(ForecastJobParams {
                    horizon_days: 30,
                    future_spend: None,
                }),
            )
            .await
            .unwrap();
        assert!(ok.created);
    }
}
