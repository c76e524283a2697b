use crate::domain::ports::TaskModel;
use crate::utils::error::{ProductionError, Result};
use crate::utils::validation::{validate_length, validate_strictly_increasing};

/// Structural checks on a threshold vector: `H - 1` finite, strictly
/// increasing entries.
pub fn check_thresholds<M: TaskModel + ?Sized>(model: &M, thresholds: &[f64]) -> Result<()> {
    validate_length("thresholds", thresholds, model.type_count().saturating_sub(1))?;
    if let Some(x) = thresholds.iter().find(|x| !x.is_finite()) {
        return Err(ProductionError::invalid("thresholds", x, "Thresholds must be finite"));
    }
    validate_strictly_increasing("thresholds", thresholds)
}

/// Interval `[lo, hi]` assigned to type `h`, clipped to the model support.
pub fn type_interval<M: TaskModel + ?Sized>(model: &M, thresholds: &[f64], h: usize) -> (f64, f64) {
    let (support_lo, support_hi) = model.support();
    let lo = if h == 0 { support_lo } else { thresholds[h - 1].max(support_lo) };
    let hi = if h == thresholds.len() {
        support_hi
    } else {
        thresholds[h].min(support_hi)
    };
    (lo, hi)
}

/// Unit labor demand per worker type: labor of each type needed per unit
/// of output, given the task assignment `thresholds`.
///
/// Empty intervals (coinciding thresholds, or an interval outside the
/// support) contribute exactly zero and are never integrated.
pub fn unit_input_demand<M: TaskModel + ?Sized>(model: &M, thresholds: &[f64]) -> Result<Vec<f64>> {
    let types = model.type_count();
    if thresholds.len() + 1 != types {
        return Err(ProductionError::invalid(
            "thresholds",
            format!("{:?}", thresholds),
            format!("Expected {} thresholds for {} worker types", types.saturating_sub(1), types),
        ));
    }

    (0..types)
        .map(|h| {
            let (lo, hi) = type_interval(model, thresholds, h);
            if lo < hi {
                model.interval_demand(h, lo, hi)
            } else {
                tracing::debug!(worker_type = h, lo, hi, "degenerate task interval, demand set to zero");
                Ok(0.0)
            }
        })
        .collect()
}

/// Efficiency of each type relative to type 0, chained across the
/// thresholds: `ρ_0 = 1`, `ρ_{h+1} = ρ_h e_{h+1}(x_h) / e_h(x_h)`.
pub fn relative_wages<M: TaskModel + ?Sized>(model: &M, thresholds: &[f64]) -> Vec<f64> {
    let mut rho = Vec::with_capacity(thresholds.len() + 1);
    rho.push(1.0);
    for (h, &x) in thresholds.iter().enumerate() {
        let next = rho[h] * model.efficiency_ratio(h, x);
        rho.push(next);
    }
    rho
}

/// Marginal product of labor at a solved `(q, thresholds)`:
/// `MPL_h = q ρ_h / Σ_k ρ_k l_k`, so that `Σ_h MPL_h l_h = q`.
pub fn marg_prod_labor_at<M: TaskModel + ?Sized>(
    model: &M,
    labor: &[f64],
    q: f64,
    thresholds: &[f64],
) -> Result<Vec<f64>> {
    let rho = relative_wages(model, thresholds);
    if labor.len() != rho.len() {
        return Err(ProductionError::invalid(
            "labor_input",
            format!("{:?}", labor),
            format!("Expected {} entries", rho.len()),
        ));
    }

    let wage_bill: f64 = rho.iter().zip(labor).map(|(r, l)| r * l).sum();
    if !(wage_bill > 0.0 && wage_bill.is_finite()) {
        return Err(ProductionError::invalid(
            "labor_input",
            format!("{:?}", labor),
            "Efficiency-weighted labor must be positive and finite",
        ));
    }

    Ok(rho.iter().map(|r| q * r / wage_bill).collect())
}
