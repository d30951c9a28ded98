//! Ridge-regression channel attribution.
//!
//! Fits daily total revenue against lagged per-channel spend plus
//! seasonality indicators, then reads each channel's lag-0 coefficient as
//! its marginal ROAS. Confidence intervals come from a row-resampling
//! bootstrap driven by an injected random source, so a fixed seed makes the
//! whole run reproducible.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use mixlytics_core::error::{PipelineError, PipelineResult};
use mixlytics_core::metrics::{DailyPivot, MetricSeries};
use mixlytics_core::results::{AttributionResult, ConfidenceInterval};

use crate::linalg::{mape, percentile, r_squared, ridge_solve, standardize_columns};

pub const MODEL_VERSION: &str = "ridge_v1";

/// Spend lags in calendar days. Lag lookups before the series start are
/// zero-filled.
pub const SPEND_LAGS: [i64; 4] = [0, 7, 14, 30];

/// Minimum distinct days of history required for a fit.
pub const MIN_DAYS: usize = 60;

const CI_LOWER_PCT: f64 = 2.5;
const CI_UPPER_PCT: f64 = 97.5;

#[derive(Debug, Clone)]
pub struct AttributionParams {
    /// Ridge regularization strength. Fixed by configuration rather than
    /// learned; small samples (60-180 rows) need the variance guard.
    pub alpha: f64,
    pub bootstrap_iterations: usize,
}

impl Default for AttributionParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            bootstrap_iterations: 100,
        }
    }
}

/// Feature matrix layout: for each channel (sorted by name) one column per
/// lag in [`SPEND_LAGS`], then 7 day-of-week indicators, then 12
/// month-of-year indicators.
fn build_design(pivot: &DailyPivot) -> DMatrix<f64> {
    let n = pivot.n_days();
    let n_channels = pivot.channels.len();
    let n_lags = SPEND_LAGS.len();
    let spend_cols = n_channels * n_lags;
    let n_features = spend_cols + 7 + 12;

    DMatrix::from_fn(n, n_features, |i, j| {
        let date = pivot.dates[i];
        if j < spend_cols {
            let channel = j / n_lags;
            let lag = SPEND_LAGS[j % n_lags];
            pivot.spend_on(channel, date - Duration::days(lag))
        } else if j < spend_cols + 7 {
            let dow = date.weekday().num_days_from_monday() as usize;
            if j - spend_cols == dow {
                1.0
            } else {
                0.0
            }
        } else {
            let month = date.month0() as usize;
            if j - spend_cols - 7 == month {
                1.0
            } else {
                0.0
            }
        }
    })
}

/// Convert a coefficient on a standardized column back to per-original-unit
/// terms. Zero-variance columns carry no information; their coefficient is
/// zero by construction.
fn per_dollar(beta: f64, std: f64) -> f64 {
    if std > 0.0 {
        beta / std
    } else {
        0.0
    }
}

/// Center every column of `x` and the target on their own means.
/// Mirrors an unpenalized-intercept fit: the intercept is absorbed instead
/// of entering the ridge penalty.
fn center_in_place(x: &mut DMatrix<f64>, y: &mut DVector<f64>) {
    let n = x.nrows() as f64;
    for j in 0..x.ncols() {
        let mean = x.column(j).sum() / n;
        for i in 0..x.nrows() {
            x[(i, j)] -= mean;
        }
    }
    let y_mean = y.sum() / n;
    for i in 0..y.nrows() {
        y[i] -= y_mean;
    }
}

pub fn calculate_attribution(
    series: &MetricSeries,
    params: &AttributionParams,
    rng: &mut impl Rng,
) -> PipelineResult<AttributionResult> {
    let pivot = series.daily_pivot();
    let n = pivot.n_days();
    if n < MIN_DAYS {
        return Err(PipelineError::InsufficientData(format!(
            "attribution requires at least {MIN_DAYS} distinct days of history, got {n}"
        )));
    }

    let n_channels = pivot.channels.len();
    let n_lags = SPEND_LAGS.len();
    let raw = build_design(&pivot);
    let standardized = standardize_columns(&raw);

    let y_mean = pivot.revenue.iter().sum::<f64>() / n as f64;
    let y_centered = DVector::from_fn(n, |i, _| pivot.revenue[i] - y_mean);

    let beta = ridge_solve(&standardized.matrix, &y_centered, params.alpha)?;

    let fitted: Vec<f64> = (&standardized.matrix * &beta)
        .iter()
        .map(|v| v + y_mean)
        .collect();
    let r2 = r_squared(&pivot.revenue, &fitted);
    let fit_mape = mape(&pivot.revenue, &fitted);

    // Bootstrap the lag-0 coefficients: resample rows with replacement,
    // re-center on the resample, refit with the same penalty. Columns stay
    // scaled by the full-sample standard deviations, so every sample
    // de-standardizes with the same divisor as the point estimate.
    let mut samples: Vec<Vec<f64>> = vec![Vec::with_capacity(params.bootstrap_iterations); n_channels];
    for _ in 0..params.bootstrap_iterations {
        let idx: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        let mut xb = DMatrix::from_fn(n, standardized.matrix.ncols(), |i, j| {
            standardized.matrix[(idx[i], j)]
        });
        let mut yb = DVector::from_fn(n, |i, _| pivot.revenue[idx[i]]);
        center_in_place(&mut xb, &mut yb);
        let beta_b = match ridge_solve(&xb, &yb, params.alpha) {
            Ok(beta_b) => beta_b,
            // A pathological resample must not fail the whole run.
            Err(_) => continue,
        };
        for c in 0..n_channels {
            let j = c * n_lags;
            samples[c].push(per_dollar(beta_b[j], standardized.stds[j]));
        }
    }

    let total_spend = series.total_spend_by_channel();
    let observed_spend = series.mean_daily_spend_by_channel();

    let mut coefficients = BTreeMap::new();
    let mut marginal_roas = BTreeMap::new();
    let mut confidence_intervals = BTreeMap::new();
    let mut contributions = BTreeMap::new();
    let mut degenerate_channels = Vec::new();

    for (c, channel) in pivot.channels.iter().enumerate() {
        let j = c * n_lags;
        let point = per_dollar(beta[j], standardized.stds[j]);
        if standardized.stds[j] == 0.0 {
            degenerate_channels.push(channel.clone());
        }

        let lower = percentile(&samples[c], CI_LOWER_PCT).unwrap_or(point);
        let upper = percentile(&samples[c], CI_UPPER_PCT).unwrap_or(point);
        confidence_intervals.insert(
            channel.clone(),
            ConfidenceInterval {
                // Percentile intervals can exclude the point estimate on
                // skewed resamples; widen so lower <= point <= upper always.
                lower: lower.min(point),
                upper: upper.max(point),
            },
        );

        coefficients.insert(channel.clone(), point);
        marginal_roas.insert(channel.clone(), point.max(0.0));
        let spent = total_spend.get(channel).copied().unwrap_or(0.0);
        contributions.insert(channel.clone(), point * spent);
    }

    Ok(AttributionResult {
        model_version: MODEL_VERSION.to_string(),
        r_squared: r2,
        mape: fit_mape,
        n_samples: n,
        coefficients,
        marginal_roas,
        confidence_intervals,
        contributions,
        observed_spend,
        degenerate_channels,
    })
}
