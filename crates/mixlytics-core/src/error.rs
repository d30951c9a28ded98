use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable failure kind, stable across the wire.
///
/// Serialized into job error payloads and HTTP error bodies so callers can
/// branch on the kind without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InsufficientData,
    PrerequisiteMissing,
    DegenerateInput,
    NumericalInstability,
    InfeasibleConstraints,
    Unavailable,
    NotFound,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::InsufficientData => "insufficient_data",
            Self::PrerequisiteMissing => "prerequisite_missing",
            Self::DegenerateInput => "degenerate_input",
            Self::NumericalInstability => "numerical_instability",
            Self::InfeasibleConstraints => "infeasible_constraints",
            Self::Unavailable => "unavailable",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

/// Failure taxonomy shared by the models and the orchestrator.
///
/// Model code returns these directly; the orchestrator translates them into
/// failed-job payloads, and the HTTP layer maps them onto status codes.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InsufficientData(String),

    #[error("{0}")]
    PrerequisiteMissing(String),

    #[error("{0}")]
    DegenerateInput(String),

    #[error("{0}")]
    NumericalInstability(String),

    #[error("{0}")]
    InfeasibleConstraints(String),

    /// A collaborator (data store, job store) stayed unreachable through the
    /// orchestrator's bounded retries. Transient, distinct from a permanent
    /// failure.
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    NotFound(String),

    /// A job exceeded its TTL without reaching a terminal state.
    #[error("{0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InsufficientData(_) => ErrorKind::InsufficientData,
            Self::PrerequisiteMissing(_) => ErrorKind::PrerequisiteMissing,
            Self::DegenerateInput(_) => ErrorKind::DegenerateInput,
            Self::NumericalInstability(_) => ErrorKind::NumericalInstability,
            Self::InfeasibleConstraints(_) => ErrorKind::InfeasibleConstraints,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
