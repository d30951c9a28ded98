//! Store contracts the pipeline depends on.
//!
//! Implementations live in `mixlytics-duckdb` (durable) and
//! [`crate::memory`] (tests and ephemeral dev runs). The orchestrator only
//! ever talks to these traits, so backends can be swapped without touching
//! orchestration logic.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::job::{Job, JobError, JobType};
use crate::metrics::{MetricPoint, MetricSeries};
use crate::results::AttributionResult;

/// A persisted attribution result plus its cache envelope.
#[derive(Debug, Clone)]
pub struct StoredAttribution {
    pub id: String,
    pub account_id: String,
    pub result: AttributionResult,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait MetricsStore: Send + Sync + 'static {
    async fn create_account(&self, account_id: &str, name: &str) -> anyhow::Result<()>;

    async fn account_exists(&self, account_id: &str) -> anyhow::Result<bool>;

    /// Insert or replace points on (channel, date). Returns the number of
    /// rows written.
    async fn upsert_points(
        &self,
        account_id: &str,
        points: &[MetricPoint],
    ) -> anyhow::Result<usize>;

    /// All points for the account on or after `since`, ordered by
    /// (channel, date). An account with no data returns an empty series;
    /// callers check [`account_exists`](Self::account_exists) to tell an
    /// unknown account apart from an empty one.
    async fn fetch_metrics(
        &self,
        account_id: &str,
        since: NaiveDate,
    ) -> anyhow::Result<MetricSeries>;
}

#[async_trait::async_trait]
pub trait AttributionStore: Send + Sync + 'static {
    /// Persist a result with an expiry of `ttl` from now. Returns the stored
    /// row's id.
    async fn save_attribution(
        &self,
        account_id: &str,
        result: &AttributionResult,
        ttl: Duration,
    ) -> anyhow::Result<String>;

    /// Most recent non-expired result for the account, if any.
    async fn load_latest_attribution(
        &self,
        account_id: &str,
    ) -> anyhow::Result<Option<StoredAttribution>>;
}

#[async_trait::async_trait]
pub trait JobStore: Send + Sync + 'static {
    async fn insert(&self, job: &Job) -> anyhow::Result<()>;

    async fn get(&self, job_id: &str) -> anyhow::Result<Option<Job>>;

    /// The account's non-terminal job of the given type, if one exists.
    /// Backs the at-most-one-in-flight rule.
    async fn find_active(
        &self,
        account_id: &str,
        job_type: JobType,
    ) -> anyhow::Result<Option<Job>>;

    /// Atomically claim the oldest pending job: pending -> processing.
    /// Never hands the same job to two callers. Jobs older than `ttl` are
    /// skipped (the sweeper fails them instead).
    async fn claim_next(&self, ttl: Duration) -> anyhow::Result<Option<Job>>;

    /// processing|pending -> completed. Returns false (and changes nothing)
    /// when the job is already terminal or unknown.
    async fn complete(&self, job_id: &str, result: &serde_json::Value) -> anyhow::Result<bool>;

    /// processing|pending -> failed. Same idempotency as
    /// [`complete`](Self::complete).
    async fn fail(&self, job_id: &str, error: &JobError) -> anyhow::Result<bool>;

    /// Mark non-terminal jobs older than `ttl` as failed with a timeout
    /// error. Returns how many were marked.
    async fn sweep_expired(&self, ttl: Duration) -> anyhow::Result<u64>;

    /// Delete job records created before `cutoff`. Returns how many rows
    /// were removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}
