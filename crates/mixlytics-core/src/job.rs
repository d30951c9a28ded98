//! Asynchronous job records and their state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, PipelineError};
use crate::results::SpendConstraint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Attribution,
    Forecast,
    Optimizer,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attribution => "attribution",
            Self::Forecast => "forecast",
            Self::Optimizer => "optimizer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "attribution" => Some(Self::Attribution),
            "forecast" => Some(Self::Forecast),
            "optimizer" => Some(Self::Optimizer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states are final; `complete`/`fail` on a terminal job is a
    /// no-op.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Structured failure payload attached to failed jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PipelineError> for JobError {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AttributionJobParams {
    /// Skip the stored-result shortcut and recompute even when a fresh
    /// result exists.
    #[serde(default)]
    pub force: bool,
    /// Fixed bootstrap seed; reproducible confidence intervals when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastJobParams {
    pub horizon_days: u32,
    /// Per-channel future spend scenario; absent channels hold their last
    /// observed spend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub future_spend: Option<BTreeMap<String, Vec<f64>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerJobParams {
    pub budget: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<BTreeMap<String, SpendConstraint>>,
}

/// Typed parameters for each job type; the job's `job_type` column is
/// derived from the variant so the two can never disagree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobParams {
    Attribution(AttributionJobParams),
    Forecast(ForecastJobParams),
    Optimizer(OptimizerJobParams),
}

impl JobParams {
    pub fn job_type(&self) -> JobType {
        match self {
            Self::Attribution(_) => JobType::Attribution,
            Self::Forecast(_) => JobType::Forecast,
            Self::Optimizer(_) => JobType::Optimizer,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub account_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub params: JobParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(account_id: impl Into<String>, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            job_type: params.job_type(),
            status: JobStatus::Pending,
            params,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// A job older than the TTL. Expired non-terminal jobs are reported
    /// failed with a timeout; expired terminal jobs are no longer served.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at > ttl
    }
}
