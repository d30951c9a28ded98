//! Budget allocation over saturating response curves.
//!
//! Each channel gets a concave revenue curve anchored at its observed
//! operating point, and the optimizer runs projected gradient ascent on the
//! simplex defined by the budget and any per-channel bounds.

use std::collections::BTreeMap;

use mixlytics_core::error::{PipelineError, PipelineResult};
use mixlytics_core::results::{
    AllocationScenario, AttributionResult, OptimizationResult, ScenarioComparison,
    ScenarioOutcome, SpendConstraint,
};

pub const MAX_ITERATIONS: usize = 200;
pub const BUDGET_TOLERANCE: f64 = 1e-6;

const PROJECTION_ITERATIONS: usize = 100;
/// Backtracking stops once the step drops below this fraction of the budget.
const MIN_STEP_FRACTION: f64 = 1e-12;
/// A trial point must beat the incumbent by this much to count as progress.
const IMPROVEMENT_EPS: f64 = 1e-9;

/// Concave spend-to-revenue response for one channel.
///
/// `revenue(s) = 2 * roas * k * ln(1 + s/k)` with `k` the observed mean
/// daily spend, so the marginal return at the operating point equals the
/// measured marginal ROAS and halves each time spend doubles past it.
#[derive(Debug, Clone, Copy)]
pub struct SaturationCurve {
    pub roas: f64,
    pub k: f64,
}

impl SaturationCurve {
    pub fn new(roas: f64, observed_spend: f64) -> Self {
        Self {
            roas,
            k: observed_spend.max(1.0),
        }
    }

    pub fn revenue(&self, spend: f64) -> f64 {
        2.0 * self.roas * self.k * (spend / self.k).ln_1p()
    }

    pub fn marginal(&self, spend: f64) -> f64 {
        2.0 * self.roas / (1.0 + spend / self.k)
    }
}

/// Allocate `budget` across the attribution's channels.
///
/// Channels and their curves come from the attribution result; `constraints`
/// may pin per-channel floors and caps. The returned allocation sums to the
/// budget within [`BUDGET_TOLERANCE`].
pub fn optimize_budget(
    attribution: &AttributionResult,
    budget: f64,
    constraints: Option<&BTreeMap<String, SpendConstraint>>,
) -> PipelineResult<OptimizationResult> {
    if !budget.is_finite() || budget <= 0.0 {
        return Err(PipelineError::InvalidInput(format!(
            "budget must be a positive amount, got {budget}"
        )));
    }
    let channels: Vec<String> = attribution.marginal_roas.keys().cloned().collect();
    if channels.is_empty() {
        return Err(PipelineError::InvalidInput(
            "attribution result has no channels to allocate across".to_string(),
        ));
    }

    let applied: BTreeMap<String, SpendConstraint> =
        constraints.cloned().unwrap_or_default();
    for (channel, bounds) in &applied {
        if !attribution.marginal_roas.contains_key(channel) {
            return Err(PipelineError::InvalidInput(format!(
                "constraint references unknown channel '{channel}'"
            )));
        }
        for bound in [bounds.min, bounds.max].into_iter().flatten() {
            if !bound.is_finite() || bound < 0.0 {
                return Err(PipelineError::InvalidInput(format!(
                    "constraint bounds for '{channel}' must be non-negative"
                )));
            }
        }
        if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
            if min > max {
                return Err(PipelineError::InfeasibleConstraints(format!(
                    "channel '{channel}' has min {min} above max {max}"
                )));
            }
        }
    }

    let lo: Vec<f64> = channels
        .iter()
        .map(|c| applied.get(c).and_then(|b| b.min).unwrap_or(0.0))
        .collect();
    let hi: Vec<f64> = channels
        .iter()
        .map(|c| applied.get(c).and_then(|b| b.max).unwrap_or(f64::INFINITY))
        .collect();

    let total_min: f64 = lo.iter().sum();
    if total_min > budget + BUDGET_TOLERANCE {
        return Err(PipelineError::InfeasibleConstraints(format!(
            "spend floors total {total_min:.2}, above the budget {budget:.2}"
        )));
    }
    if hi.iter().all(|h| h.is_finite()) {
        let total_max: f64 = hi.iter().sum();
        if total_max < budget - BUDGET_TOLERANCE {
            return Err(PipelineError::InfeasibleConstraints(format!(
                "spend caps total {total_max:.2}, below the budget {budget:.2}"
            )));
        }
    }

    let curves: Vec<SaturationCurve> = channels
        .iter()
        .map(|c| {
            SaturationCurve::new(
                attribution.marginal_roas[c],
                attribution.observed_spend.get(c).copied().unwrap_or(0.0),
            )
        })
        .collect();

    // Start proportional to marginal ROAS, uniform when every channel is flat.
    let roas_total: f64 = curves.iter().map(|c| c.roas).sum();
    let mut x: Vec<f64> = if roas_total > 0.0 {
        curves.iter().map(|c| budget * c.roas / roas_total).collect()
    } else {
        vec![budget / channels.len() as f64; channels.len()]
    };
    project_onto_budget(&mut x, &lo, &hi, budget);

    let mut best = objective(&curves, &x);
    let mut iterations = 0;
    let mut converged = false;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let grad: Vec<f64> = curves
            .iter()
            .zip(&x)
            .map(|(curve, spend)| curve.marginal(*spend))
            .collect();

        let mut improved = false;
        let mut step = budget;
        while step > budget * MIN_STEP_FRACTION {
            let mut trial: Vec<f64> = x
                .iter()
                .zip(&grad)
                .map(|(spend, g)| spend + step * g)
                .collect();
            project_onto_budget(&mut trial, &lo, &hi, budget);
            let value = objective(&curves, &trial);
            if value > best + IMPROVEMENT_EPS {
                x = trial;
                best = value;
                improved = true;
                break;
            }
            step *= 0.5;
        }
        if !improved {
            converged = true;
            break;
        }
    }

    let recommendations: BTreeMap<String, f64> =
        channels.into_iter().zip(x).collect();
    Ok(OptimizationResult {
        expected_revenue: best,
        expected_roi: best / budget,
        recommendations,
        budget,
        constraints_applied: applied,
        converged,
        iterations,
    })
}

/// Evaluate caller-supplied allocations against the same response curves.
pub fn compare_scenarios(
    attribution: &AttributionResult,
    scenarios: &[AllocationScenario],
) -> PipelineResult<ScenarioComparison> {
    let mut outcomes = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        let mut revenue = 0.0;
        let mut total_spend = 0.0;
        for (channel, spend) in &scenario.allocation {
            let roas = attribution.marginal_roas.get(channel).ok_or_else(|| {
                PipelineError::InvalidInput(format!(
                    "scenario '{}' allocates to unknown channel '{channel}'",
                    scenario.name
                ))
            })?;
            if !spend.is_finite() || *spend < 0.0 {
                return Err(PipelineError::InvalidInput(format!(
                    "scenario '{}' has a negative spend for '{channel}'",
                    scenario.name
                )));
            }
            let observed = attribution.observed_spend.get(channel).copied().unwrap_or(0.0);
            revenue += SaturationCurve::new(*roas, observed).revenue(*spend);
            total_spend += spend;
        }
        let expected_roi = if total_spend > 0.0 {
            revenue / total_spend
        } else {
            0.0
        };
        outcomes.push(ScenarioOutcome {
            name: scenario.name.clone(),
            allocation: scenario.allocation.clone(),
            total_spend,
            expected_revenue: revenue,
            expected_roi,
        });
    }

    // First scenario wins ties.
    let mut best_scenario: Option<&ScenarioOutcome> = None;
    for outcome in &outcomes {
        match best_scenario {
            Some(current) if current.expected_revenue >= outcome.expected_revenue => {}
            _ => best_scenario = Some(outcome),
        }
    }
    let best_scenario = best_scenario.map(|o| o.name.clone());
    Ok(ScenarioComparison {
        scenarios: outcomes,
        best_scenario,
    })
}

fn objective(curves: &[SaturationCurve], x: &[f64]) -> f64 {
    curves
        .iter()
        .zip(x)
        .map(|(curve, spend)| curve.revenue(*spend))
        .sum()
}

/// Euclidean projection onto `{ x : sum(x) = budget, lo <= x <= hi }`.
///
/// Bisects on the shift `lambda` in `clamp(x + lambda)`; the clamped sum is
/// nondecreasing in `lambda`, and the feasibility checks above guarantee the
/// target is bracketed. Any leftover bisection residual lands on the first
/// channel with headroom.
fn project_onto_budget(x: &mut [f64], lo: &[f64], hi: &[f64], budget: f64) {
    let spread = budget + x.iter().map(|v| v.abs()).sum::<f64>() + 1.0;
    let mut lambda_lo = -spread;
    let mut lambda_hi = spread;
    for _ in 0..PROJECTION_ITERATIONS {
        let mid = 0.5 * (lambda_lo + lambda_hi);
        let total: f64 = x
            .iter()
            .zip(lo.iter().zip(hi))
            .map(|(v, (l, h))| (v + mid).clamp(*l, *h))
            .sum();
        if total < budget {
            lambda_lo = mid;
        } else {
            lambda_hi = mid;
        }
    }
    let shift = 0.5 * (lambda_lo + lambda_hi);
    for (v, (l, h)) in x.iter_mut().zip(lo.iter().zip(hi)) {
        *v = (*v + shift).clamp(*l, *h);
    }

    let mut residual = budget - x.iter().sum::<f64>();
    if residual > 0.0 {
        for (v, h) in x.iter_mut().zip(hi) {
            let room = h - *v;
            if room > 0.0 {
                let add = residual.min(room);
                *v += add;
                residual -= add;
                if residual <= 0.0 {
                    break;
                }
            }
        }
    } else if residual < 0.0 {
        let mut excess = -residual;
        for (v, l) in x.iter_mut().zip(lo) {
            let room = *v - l;
            if room > 0.0 {
                let take = excess.min(room);
                *v -= take;
                excess -= take;
                if excess <= 0.0 {
                    break;
                }
            }
        }
    }
}
