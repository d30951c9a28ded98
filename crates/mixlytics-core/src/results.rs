//! Result payloads produced by the three models.
//!
//! Per-channel maps use `BTreeMap` so serialized output has a stable key
//! order regardless of build or platform.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Output of the ridge attribution model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionResult {
    pub model_version: String,
    pub r_squared: f64,
    /// Mean absolute percentage error between fitted and actual revenue, 0-100.
    pub mape: f64,
    pub n_samples: usize,
    /// Per-dollar lag-0 coefficient per channel; may be negative.
    pub coefficients: BTreeMap<String, f64>,
    /// Incremental revenue per incremental dollar at the current operating
    /// point; negative estimates are floored at zero here.
    pub marginal_roas: BTreeMap<String, f64>,
    /// 95% bootstrap interval on the lag-0 coefficient per channel.
    pub confidence_intervals: BTreeMap<String, ConfidenceInterval>,
    /// coefficient x total window spend per channel.
    pub contributions: BTreeMap<String, f64>,
    /// Mean daily spend per channel over the window; the optimizer's
    /// saturation curves anchor here.
    pub observed_spend: BTreeMap<String, f64>,
    /// Channels whose spend had zero variance in the window. Their
    /// coefficients are reported as zero rather than failing the run.
    pub degenerate_channels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Flat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub expected: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Output of the revenue forecast model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub horizon_days: u32,
    pub days: Vec<ForecastDay>,
    pub total_expected: f64,
    pub trend: TrendDirection,
    /// Additive day-of-week effect, Monday through Sunday.
    pub weekly_seasonality: Vec<f64>,
    /// Non-fatal caveats, e.g. short history or ignored scenario channels.
    pub warnings: Vec<String>,
}

/// Per-channel spend bounds accepted by the optimizer.
/// Defaults: min 0, max unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpendConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Output of the budget optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub recommendations: BTreeMap<String, f64>,
    /// Objective value at the recommended allocation.
    pub expected_revenue: f64,
    /// expected_revenue / budget.
    pub expected_roi: f64,
    pub budget: f64,
    pub constraints_applied: BTreeMap<String, SpendConstraint>,
    /// False when the iteration budget ran out; recommendations are then the
    /// best feasible point found.
    pub converged: bool,
    pub iterations: usize,
}

/// An explicit allocation to evaluate, as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationScenario {
    pub name: String,
    pub allocation: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub allocation: BTreeMap<String, f64>,
    pub total_spend: f64,
    pub expected_revenue: f64,
    pub expected_roi: f64,
}

/// Side-by-side evaluation of explicit allocation scenarios against the same
/// saturation curves the optimizer uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub scenarios: Vec<ScenarioOutcome>,
    /// Name of the highest-revenue scenario; `None` when no scenarios were
    /// given.
    pub best_scenario: Option<String>,
}
