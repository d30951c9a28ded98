use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use mixlytics_core::error::ErrorKind;
use mixlytics_core::job::{Job, JobError, JobParams, JobStatus, JobType};
use mixlytics_core::store::JobStore;

use crate::backend::{format_timestamp, parse_timestamp};
use crate::DuckDbBackend;

const JOB_COLUMNS: &str = "id, account_id, status, params_json, result_json, error_json, \
                           CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR)";

struct JobRowRaw {
    id: String,
    account_id: String,
    status: String,
    params_json: String,
    result_json: Option<String>,
    error_json: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_job_row(row: &duckdb::Row<'_>) -> duckdb::Result<JobRowRaw> {
    Ok(JobRowRaw {
        id: row.get(0)?,
        account_id: row.get(1)?,
        status: row.get(2)?,
        params_json: row.get(3)?,
        result_json: row.get(4)?,
        error_json: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn job_from_raw(raw: JobRowRaw) -> anyhow::Result<Job> {
    let params: JobParams = serde_json::from_str(&raw.params_json)?;
    let status = JobStatus::parse(&raw.status)
        .ok_or_else(|| anyhow::anyhow!("unknown job status '{}' for job {}", raw.status, raw.id))?;
    let result: Option<serde_json::Value> = raw
        .result_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    let error: Option<JobError> = raw
        .error_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    Ok(Job {
        id: raw.id,
        account_id: raw.account_id,
        job_type: params.job_type(),
        status,
        params,
        result,
        error,
        created_at: parse_timestamp(&raw.created_at)?,
        updated_at: parse_timestamp(&raw.updated_at)?,
    })
}

#[async_trait]
impl JobStore for DuckDbBackend {
    async fn insert(&self, job: &Job) -> anyhow::Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO jobs (id, account_id, job_type, status, params_json, \
                               result_json, error_json, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CAST(?8 AS TIMESTAMP), CAST(?9 AS TIMESTAMP))",
            duckdb::params![
                job.id,
                job.account_id,
                job.job_type.as_str(),
                job.status.as_str(),
                serde_json::to_string(&job.params)?,
                job.result.as_ref().map(serde_json::to_string).transpose()?,
                job.error.as_ref().map(serde_json::to_string).transpose()?,
                format_timestamp(job.created_at),
                format_timestamp(job.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))?;
        match stmt.query_row(duckdb::params![job_id], read_job_row) {
            Ok(raw) => Ok(Some(job_from_raw(raw)?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_active(
        &self,
        account_id: &str,
        job_type: JobType,
    ) -> anyhow::Result<Option<Job>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE account_id = ?1 AND job_type = ?2 AND status IN ('pending', 'processing') \
             ORDER BY created_at DESC \
             LIMIT 1"
        ))?;
        match stmt.query_row(duckdb::params![account_id, job_type.as_str()], read_job_row) {
            Ok(raw) => Ok(Some(job_from_raw(raw)?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn claim_next(&self, ttl: Duration) -> anyhow::Result<Option<Job>> {
        let now = Utc::now();
        let cutoff = format_timestamp(now - ttl);
        let mut conn = self.conn.lock().await;

        // Select and flip inside one transaction, while holding the
        // connection lock: no other claimer can observe the pending row.
        // Jobs past the TTL are left for the sweeper.
        let tx = conn.transaction()?;
        let raw = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs \
                 WHERE status = 'pending' AND created_at >= CAST(?1 AS TIMESTAMP) \
                 ORDER BY created_at, id \
                 LIMIT 1"
            ))?;
            match stmt.query_row(duckdb::params![cutoff], read_job_row) {
                Ok(raw) => Some(raw),
                Err(duckdb::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            }
        };
        let Some(raw) = raw else {
            return Ok(None);
        };
        tx.execute(
            "UPDATE jobs SET status = 'processing', updated_at = CAST(?1 AS TIMESTAMP) \
             WHERE id = ?2 AND status = 'pending'",
            duckdb::params![format_timestamp(now), raw.id],
        )?;
        tx.commit()?;

        let mut job = job_from_raw(raw)?;
        job.status = JobStatus::Processing;
        job.updated_at = now;
        Ok(Some(job))
    }

    async fn complete(&self, job_id: &str, result: &serde_json::Value) -> anyhow::Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE jobs SET status = 'completed', result_json = ?1, updated_at = CAST(?2 AS TIMESTAMP) \
             WHERE id = ?3 AND status IN ('pending', 'processing')",
            duckdb::params![
                serde_json::to_string(result)?,
                format_timestamp(Utc::now()),
                job_id
            ],
        )?;
        Ok(changed > 0)
    }

    async fn fail(&self, job_id: &str, error: &JobError) -> anyhow::Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE jobs SET status = 'failed', error_json = ?1, updated_at = CAST(?2 AS TIMESTAMP) \
             WHERE id = ?3 AND status IN ('pending', 'processing')",
            duckdb::params![
                serde_json::to_string(error)?,
                format_timestamp(Utc::now()),
                job_id
            ],
        )?;
        Ok(changed > 0)
    }

    async fn sweep_expired(&self, ttl: Duration) -> anyhow::Result<u64> {
        let now = Utc::now();
        let cutoff = format_timestamp(now - ttl);
        let error = JobError {
            kind: ErrorKind::Timeout,
            message: format!(
                "job did not finish within the {}h window",
                ttl.num_hours()
            ),
        };
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE jobs SET status = 'failed', error_json = ?1, updated_at = CAST(?2 AS TIMESTAMP) \
             WHERE status IN ('pending', 'processing') AND created_at < CAST(?3 AS TIMESTAMP)",
            duckdb::params![
                serde_json::to_string(&error)?,
                format_timestamp(now),
                cutoff
            ],
        )?;
        if changed > 0 {
            tracing::warn!(count = changed, "expired jobs marked failed");
        }
        Ok(changed as u64)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "DELETE FROM jobs WHERE created_at < CAST(?1 AS TIMESTAMP)",
            duckdb::params![format_timestamp(cutoff)],
        )?;
        if changed > 0 {
            tracing::debug!(count = changed, "old job records purged");
        }
        Ok(changed as u64)
    }
}
