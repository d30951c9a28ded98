//! Shared numerics for the regression models.

use mixlytics_core::error::{PipelineError, PipelineResult};
use nalgebra::{DMatrix, DVector};

/// A column-standardized design matrix plus the statistics needed to map
/// coefficients back to original units.
///
/// Zero-variance columns keep their raw standard deviation of 0.0 and are
/// emitted as all-zero columns, so their fitted coefficients are exactly
/// zero under any ridge penalty.
pub struct Standardized {
    pub matrix: DMatrix<f64>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

pub fn standardize_columns(raw: &DMatrix<f64>) -> Standardized {
    let n = raw.nrows() as f64;
    let mut means = Vec::with_capacity(raw.ncols());
    let mut stds = Vec::with_capacity(raw.ncols());
    for j in 0..raw.ncols() {
        let col = raw.column(j);
        let mean = col.sum() / n;
        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        means.push(mean);
        stds.push(var.sqrt());
    }
    let matrix = DMatrix::from_fn(raw.nrows(), raw.ncols(), |i, j| {
        if stds[j] > 0.0 {
            (raw[(i, j)] - means[j]) / stds[j]
        } else {
            0.0
        }
    });
    Standardized {
        matrix,
        means,
        stds,
    }
}

/// Standardize a single row (e.g. a future observation) with statistics
/// learned from the training matrix.
pub fn standardize_value(value: f64, mean: f64, std: f64) -> f64 {
    if std > 0.0 {
        (value - mean) / std
    } else {
        0.0
    }
}

/// Solve the ridge normal equations `(XᵀX + αI) β = Xᵀy`.
///
/// With `alpha > 0` the system is positive definite and Cholesky succeeds;
/// the explicit-inverse fallback and the error arm cover degenerate scales
/// where floating point breaks that guarantee.
pub fn ridge_solve(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    alpha: f64,
) -> PipelineResult<DVector<f64>> {
    let p = x.ncols();
    let xt_x = x.transpose() * x + DMatrix::<f64>::identity(p, p) * alpha;
    let xt_y = x.transpose() * y;
    if let Some(chol) = xt_x.clone().cholesky() {
        return Ok(chol.solve(&xt_y));
    }
    match xt_x.try_inverse() {
        Some(inv) => Ok(inv * xt_y),
        None => Err(PipelineError::NumericalInstability(
            "feature matrix is too ill-conditioned to fit".to_string(),
        )),
    }
}

/// Percentile with linear interpolation between order statistics.
/// `pct` is on the 0-100 scale. `None` for an empty sample.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let weight = rank - lo as f64;
    Some(sorted[lo] * (1.0 - weight) + sorted[hi] * weight)
}

/// Coefficient of determination. A flat target (zero total variance) scores
/// 1.0 when the fit is also flat, otherwise 0.0.
pub fn r_squared(actual: &[f64], fitted: &[f64]) -> f64 {
    let n = actual.len();
    if n == 0 {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(fitted)
        .map(|(y, f)| (y - f).powi(2))
        .sum();
    if ss_tot <= f64::EPSILON {
        if ss_res <= f64::EPSILON {
            return 1.0;
        }
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// Mean absolute percentage error on the 0-100 scale, guarded against
/// zero-revenue days.
pub fn mape(actual: &[f64], fitted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let sum: f64 = actual
        .iter()
        .zip(fitted)
        .map(|(y, f)| (y - f).abs() / (y.abs() + 1e-10))
        .sum();
    sum / actual.len() as f64 * 100.0
}
