//! In-memory store implementations.
//!
//! Back the pipeline in unit/integration tests and in ephemeral dev runs
//! where no DuckDB file is wanted. Same contracts as the durable stores,
//! including atomic job claims.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::job::{Job, JobError, JobStatus, JobType};
use crate::metrics::{MetricPoint, MetricSeries};
use crate::results::AttributionResult;
use crate::store::{AttributionStore, JobStore, MetricsStore, StoredAttribution};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("memory store lock poisoned"))
}

#[derive(Default)]
struct MetricsInner {
    /// account_id -> display name
    accounts: HashMap<String, String>,
    /// account_id -> (channel, date) -> point
    points: HashMap<String, BTreeMap<(String, NaiveDate), MetricPoint>>,
}

#[derive(Default)]
pub struct MemoryMetricsStore {
    inner: Mutex<MetricsInner>,
}

impl MemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn create_account(&self, account_id: &str, name: &str) -> Result<()> {
        let mut inner = lock(&self.inner)?;
        inner
            .accounts
            .insert(account_id.to_string(), name.to_string());
        Ok(())
    }

    async fn account_exists(&self, account_id: &str) -> Result<bool> {
        let inner = lock(&self.inner)?;
        Ok(inner.accounts.contains_key(account_id))
    }

    async fn upsert_points(&self, account_id: &str, points: &[MetricPoint]) -> Result<usize> {
        let mut inner = lock(&self.inner)?;
        if !inner.accounts.contains_key(account_id) {
            bail!("unknown account: {account_id}");
        }
        let rows = inner.points.entry(account_id.to_string()).or_default();
        for p in points {
            rows.insert((p.channel.clone(), p.date), p.clone());
        }
        Ok(points.len())
    }

    async fn fetch_metrics(&self, account_id: &str, since: NaiveDate) -> Result<MetricSeries> {
        let inner = lock(&self.inner)?;
        let points = inner
            .points
            .get(account_id)
            .map(|rows| {
                rows.values()
                    .filter(|p| p.date >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(MetricSeries::new(account_id, points))
    }
}

#[derive(Default)]
pub struct MemoryAttributionStore {
    rows: Mutex<Vec<StoredAttribution>>,
}

impl MemoryAttributionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AttributionStore for MemoryAttributionStore {
    async fn save_attribution(
        &self,
        account_id: &str,
        result: &AttributionResult,
        ttl: Duration,
    ) -> Result<String> {
        let mut rows = lock(&self.rows)?;
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        rows.push(StoredAttribution {
            id: id.clone(),
            account_id: account_id.to_string(),
            result: result.clone(),
            computed_at: now,
            expires_at: now + ttl,
        });
        Ok(id)
    }

    async fn load_latest_attribution(
        &self,
        account_id: &str,
    ) -> Result<Option<StoredAttribution>> {
        let rows = lock(&self.rows)?;
        let now = Utc::now();
        Ok(rows
            .iter()
            .filter(|r| r.account_id == account_id && r.expires_at > now)
            .max_by_key(|r| r.computed_at)
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = lock(&self.jobs)?;
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        let jobs = lock(&self.jobs)?;
        Ok(jobs.get(job_id).cloned())
    }

    async fn find_active(&self, account_id: &str, job_type: JobType) -> Result<Option<Job>> {
        let jobs = lock(&self.jobs)?;
        Ok(jobs
            .values()
            .filter(|j| {
                j.account_id == account_id && j.job_type == job_type && !j.is_terminal()
            })
            .min_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned())
    }

    async fn claim_next(&self, ttl: Duration) -> Result<Option<Job>> {
        let mut jobs = lock(&self.jobs)?;
        let now = Utc::now();
        // Oldest eligible pending job; id breaks created_at ties so claim
        // order is deterministic.
        let next_id = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && !j.is_expired(ttl, now))
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|j| j.id.clone());
        match next_id.and_then(|id| jobs.get_mut(&id)) {
            Some(job) => {
                job.status = JobStatus::Processing;
                job.updated_at = now;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, job_id: &str, result: &serde_json::Value) -> Result<bool> {
        let mut jobs = lock(&self.jobs)?;
        match jobs.get_mut(job_id) {
            Some(job) if !job.is_terminal() => {
                job.status = JobStatus::Completed;
                job.result = Some(result.clone());
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail(&self, job_id: &str, error: &JobError) -> Result<bool> {
        let mut jobs = lock(&self.jobs)?;
        match jobs.get_mut(job_id) {
            Some(job) if !job.is_terminal() => {
                job.status = JobStatus::Failed;
                job.error = Some(error.clone());
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sweep_expired(&self, ttl: Duration) -> Result<u64> {
        let mut jobs = lock(&self.jobs)?;
        let now = Utc::now();
        let mut marked = 0;
        for job in jobs.values_mut() {
            if !job.is_terminal() && job.is_expired(ttl, now) {
                job.status = JobStatus::Failed;
                job.error = Some(JobError {
                    kind: ErrorKind::Timeout,
                    message: format!(
                        "job did not finish within the {}h window",
                        ttl.num_hours()
                    ),
                });
                job.updated_at = now;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut jobs = lock(&self.jobs)?;
        let before = jobs.len();
        jobs.retain(|_, j| j.created_at >= cutoff);
        Ok((before - jobs.len()) as u64)
    }
}
