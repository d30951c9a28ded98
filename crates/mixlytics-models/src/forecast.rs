//! Additive revenue forecast.
//!
//! Decomposes history into linear trend + weekly seasonality + per-channel
//! spend effects with a lightly regularized least squares, then projects
//! the components over the horizon. Entirely deterministic: identical
//! inputs always produce identical output.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use nalgebra::{DMatrix, DVector};

use mixlytics_core::error::{PipelineError, PipelineResult};
use mixlytics_core::metrics::MetricSeries;
use mixlytics_core::results::{ForecastDay, ForecastResult, TrendDirection};

use crate::linalg::{ridge_solve, standardize_columns, standardize_value};

pub const MIN_HORIZON_DAYS: u32 = 7;
pub const MAX_HORIZON_DAYS: u32 = 90;

/// Hard floor; below this the decomposition is meaningless.
pub const MIN_HISTORY_DAYS: usize = 14;
/// Soft floor; below this the result carries a warning.
pub const RECOMMENDED_HISTORY_DAYS: usize = 30;

/// 90th percentile of the standard normal; an 80% central interval spans
/// +/- this many residual standard deviations.
const Z_80: f64 = 1.2815515655446004;

/// Per-day widening factor applied to the interval as the forecast moves
/// away from the observed window.
const WIDENING_PER_DAY: f64 = 0.02;

/// Stabilizing penalty; small enough to leave the fit essentially least
/// squares.
const FIT_ALPHA: f64 = 1e-3;

#[derive(Debug, Clone)]
pub struct ForecastParams {
    pub horizon_days: u32,
    /// Per-channel future daily spend. Channels not listed hold their last
    /// observed spend; short vectors are padded with their final element.
    pub future_spend: Option<BTreeMap<String, Vec<f64>>>,
}

pub fn run_forecast(
    series: &MetricSeries,
    params: &ForecastParams,
) -> PipelineResult<ForecastResult> {
    if !(MIN_HORIZON_DAYS..=MAX_HORIZON_DAYS).contains(&params.horizon_days) {
        return Err(PipelineError::InvalidInput(format!(
            "horizon_days must be between {MIN_HORIZON_DAYS} and {MAX_HORIZON_DAYS}, got {}",
            params.horizon_days
        )));
    }
    if let Some(scenario) = &params.future_spend {
        for (channel, values) in scenario {
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(PipelineError::InvalidInput(format!(
                    "future_spend for channel '{channel}' must be non-negative"
                )));
            }
        }
    }

    let pivot = series.daily_pivot();
    let n = pivot.n_days();
    if n < MIN_HISTORY_DAYS {
        return Err(PipelineError::InsufficientData(format!(
            "forecasting requires at least {MIN_HISTORY_DAYS} distinct days of history, got {n}"
        )));
    }

    let mut warnings = Vec::new();
    if n < RECOMMENDED_HISTORY_DAYS {
        warnings.push(format!(
            "history covers only {n} days; forecasts are more reliable with at least {RECOMMENDED_HISTORY_DAYS}"
        ));
    }
    if let Some(scenario) = &params.future_spend {
        for channel in scenario.keys() {
            if !pivot.channels.contains(channel) {
                warnings.push(format!(
                    "future_spend channel '{channel}' has no history and was ignored"
                ));
            }
        }
    }

    let n_channels = pivot.channels.len();
    // Columns: normalized trend, 7 day-of-week indicators, one spend column
    // per channel.
    let n_features = 1 + 7 + n_channels;
    let t_scale = (n - 1).max(1) as f64;
    let raw = DMatrix::from_fn(n, n_features, |i, j| {
        if j == 0 {
            i as f64 / t_scale
        } else if j < 8 {
            let dow = pivot.dates[i].weekday().num_days_from_monday() as usize;
            if j - 1 == dow {
                1.0
            } else {
                0.0
            }
        } else {
            pivot.spend[j - 8][i]
        }
    });
    let standardized = standardize_columns(&raw);

    let y_mean = pivot.revenue.iter().sum::<f64>() / n as f64;
    let y_centered = DVector::from_fn(n, |i, _| pivot.revenue[i] - y_mean);
    let beta = ridge_solve(&standardized.matrix, &y_centered, FIT_ALPHA)?;

    let fitted = &standardized.matrix * &beta;
    let residual_var = (0..n)
        .map(|i| (y_centered[i] - fitted[i]).powi(2))
        .sum::<f64>()
        / n as f64;
    let residual_std = residual_var.sqrt();

    // Trend over the whole window in revenue units; direction thresholds on
    // a small fraction of mean revenue so noise reads as flat.
    let window_drift = if standardized.stds[0] > 0.0 {
        beta[0] / standardized.stds[0]
    } else {
        0.0
    };
    let drift_per_day = window_drift / t_scale;
    let flat_band = 0.001 * y_mean.abs().max(1.0);
    let trend = if drift_per_day > flat_band {
        TrendDirection::Increasing
    } else if drift_per_day < -flat_band {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Flat
    };

    // Day-of-week effects in revenue units, centered across the week.
    let mut weekly: Vec<f64> = (0..7)
        .map(|d| {
            let j = 1 + d;
            if standardized.stds[j] > 0.0 {
                beta[j] / standardized.stds[j]
            } else {
                0.0
            }
        })
        .collect();
    let weekly_mean = weekly.iter().sum::<f64>() / 7.0;
    for effect in &mut weekly {
        *effect -= weekly_mean;
    }

    let last_spend = series.last_spend_by_channel();
    let last_date = pivot
        .last_date()
        .ok_or_else(|| PipelineError::InsufficientData("history is empty".to_string()))?;

    let mut days = Vec::with_capacity(params.horizon_days as usize);
    let mut total_expected = 0.0;
    for h in 1..=params.horizon_days {
        let date = last_date + Duration::days(h as i64);
        let expected = predict_day(
            &pivot.channels,
            &standardized.means,
            &standardized.stds,
            &beta,
            y_mean,
            (n as f64 - 1.0 + h as f64) / t_scale,
            date,
            &last_spend,
            params.future_spend.as_ref(),
            h,
        );
        let half_width = Z_80 * residual_std * (1.0 + WIDENING_PER_DAY * h as f64).sqrt();
        total_expected += expected;
        days.push(ForecastDay {
            date,
            expected,
            lower: expected - half_width,
            upper: expected + half_width,
        });
    }

    Ok(ForecastResult {
        horizon_days: params.horizon_days,
        days,
        total_expected,
        trend,
        weekly_seasonality: weekly,
        warnings,
    })
}

/// Spend assumed for `channel` on future day `h` (1-based): the scenario
/// value when one is given, its last element when the scenario is shorter
/// than the horizon, the last observed spend otherwise.
fn future_spend_for(
    channel: &str,
    h: u32,
    last_spend: &BTreeMap<String, f64>,
    scenario: Option<&BTreeMap<String, Vec<f64>>>,
) -> f64 {
    if let Some(values) = scenario.and_then(|s| s.get(channel)) {
        if let Some(value) = values.get((h - 1) as usize).or_else(|| values.last()) {
            return *value;
        }
    }
    last_spend.get(channel).copied().unwrap_or(0.0)
}

#[allow(clippy::too_many_arguments)]
fn predict_day(
    channels: &[String],
    means: &[f64],
    stds: &[f64],
    beta: &DVector<f64>,
    y_mean: f64,
    t: f64,
    date: NaiveDate,
    last_spend: &BTreeMap<String, f64>,
    scenario: Option<&BTreeMap<String, Vec<f64>>>,
    h: u32,
) -> f64 {
    let mut prediction = y_mean;
    prediction += beta[0] * standardize_value(t, means[0], stds[0]);
    let dow = date.weekday().num_days_from_monday() as usize;
    for d in 0..7 {
        let j = 1 + d;
        let value = if d == dow { 1.0 } else { 0.0 };
        prediction += beta[j] * standardize_value(value, means[j], stds[j]);
    }
    for (c, channel) in channels.iter().enumerate() {
        let j = 8 + c;
        let spend = future_spend_for(channel, h, last_spend, scenario);
        prediction += beta[j] * standardize_value(spend, means[j], stds[j]);
    }
    prediction
}
