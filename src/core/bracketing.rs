//! Bracketing restart for the threshold solver.
//!
//! At a fixed output `q` the thresholds follow one type at a time: `x_h`
//! is where `q · d_h(x_{h-1}, x_h)` reaches `l_h`, which is monotone in
//! `x_h`. The demand left for the top type then grows with `q`, so a
//! bisection on `log q` closes the system. Far slower than
//! Levenberg–Marquardt, but a narrow interval or an extreme labor ratio
//! only costs a few more halvings.

use crate::domain::ports::TaskModel;
use crate::utils::error::Result;
use tracing::debug;

/// How far outside the task window, in window widths, a threshold may sit.
pub(crate) const REACH: f64 = 1e3;

const MAX_BISECTIONS: usize = 200;
/// `log q` bracket doublings: steps of 1, 2, 4, ... up to 512.
const MAX_EXPANSIONS: usize = 10;

enum Assignment {
    /// Some type below the top cannot reach its labor input.
    Short,
    /// Thresholds and the top type's excess demand `q · d_H - l_H`.
    Filled { thresholds: Vec<f64>, excess: f64 },
}

/// Range thresholds are searched in: the task window widened by `REACH`
/// widths on each side, clipped to the support.
pub(crate) fn reach<M: TaskModel + ?Sized>(model: &M) -> (f64, f64) {
    let (support_lo, support_hi) = model.support();
    let (window_lo, window_hi) = model.task_window();
    let width = window_width(window_lo, window_hi);
    (
        support_lo.max(window_lo - REACH * width),
        support_hi.min(window_hi + REACH * width),
    )
}

/// Width of the task window, or 1 for a degenerate window.
pub(crate) fn window_width(lo: f64, hi: f64) -> f64 {
    let width = hi - lo;
    if width > 0.0 && width.is_finite() {
        width
    } else {
        1.0
    }
}

fn demand_over<M: TaskModel + ?Sized>(model: &M, h: usize, lo: f64, hi: f64) -> Result<f64> {
    let (support_lo, support_hi) = model.support();
    let (lo, hi) = (lo.max(support_lo), hi.min(support_hi));
    if lo < hi {
        model.interval_demand(h, lo, hi)
    } else {
        Ok(0.0)
    }
}

fn assign<M: TaskModel + ?Sized>(model: &M, labor: &[f64], q: f64, (reach_lo, reach_hi): (f64, f64)) -> Result<Assignment> {
    let types = labor.len();
    let mut thresholds = Vec::with_capacity(types.saturating_sub(1));
    // The bottom type also covers everything below the reachable range.
    let mut prev = model.support().0;

    for (h, &target) in labor.iter().enumerate().take(types.saturating_sub(1)) {
        let floor = prev.max(reach_lo);
        let excess = |x: f64| -> Result<f64> { Ok(q * demand_over(model, h, prev, x)? - target) };

        if target <= 0.0 || excess(floor)? >= 0.0 {
            thresholds.push(floor);
            prev = floor;
            continue;
        }
        if excess(reach_hi)? < 0.0 {
            return Ok(Assignment::Short);
        }

        let (mut lo, mut hi) = (floor, reach_hi);
        for _ in 0..MAX_BISECTIONS {
            let mid = lo + 0.5 * (hi - lo);
            if mid <= lo || mid >= hi {
                break;
            }
            if excess(mid)? < 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        thresholds.push(hi);
        prev = hi;
    }

    let top = types - 1;
    let excess = q * demand_over(model, top, prev, model.support().1)? - labor[top];
    Ok(Assignment::Filled { thresholds, excess })
}

/// `[log q, xT...]` solving `q · d(xT) = l` by nested bisection, starting
/// the `log q` bracket at `log_q_hint`. `None` when no bracket is found.
pub fn bracketed_start<M: TaskModel + ?Sized>(model: &M, labor: &[f64], log_q_hint: f64) -> Result<Option<Vec<f64>>> {
    if labor.len() < 2 || !log_q_hint.is_finite() {
        return Ok(None);
    }
    let range = reach(model);
    let evaluate = |log_q: f64| -> Result<Option<Vec<f64>>> {
        Ok(match assign(model, labor, log_q.exp(), range)? {
            Assignment::Filled { thresholds, excess } if excess >= 0.0 => Some(thresholds),
            _ => None,
        })
    };

    // `hi` always carries a filled assignment with non-negative excess.
    let (mut lo, mut hi, mut filled) = match evaluate(log_q_hint)? {
        Some(thresholds) => {
            let mut hi = log_q_hint;
            let mut step = 1.0;
            let mut found = None;
            for _ in 0..MAX_EXPANSIONS {
                let lo = hi - step;
                match evaluate(lo)? {
                    Some(_) => hi = lo,
                    None => {
                        found = Some(lo);
                        break;
                    }
                }
                step *= 2.0;
            }
            let Some(lo) = found else {
                return Ok(None);
            };
            let thresholds = match evaluate(hi)? {
                Some(t) => t,
                None => thresholds,
            };
            (lo, hi, thresholds)
        }
        None => {
            let mut lo = log_q_hint;
            let mut step = 1.0;
            let mut found = None;
            for _ in 0..MAX_EXPANSIONS {
                let hi = lo + step;
                match evaluate(hi)? {
                    Some(thresholds) => {
                        found = Some((hi, thresholds));
                        break;
                    }
                    None => lo = hi,
                }
                step *= 2.0;
            }
            let Some((hi, thresholds)) = found else {
                return Ok(None);
            };
            (lo, hi, thresholds)
        }
    };

    for _ in 0..MAX_BISECTIONS {
        let mid = lo + 0.5 * (hi - lo);
        if mid <= lo || mid >= hi {
            break;
        }
        match evaluate(mid)? {
            Some(thresholds) => {
                hi = mid;
                filled = thresholds;
            }
            None => lo = mid,
        }
    }

    debug!(log_q = hi, "bracketed start found");
    let mut start = Vec::with_capacity(labor.len());
    start.push(hi);
    start.extend(filled);
    Ok(Some(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::demand::unit_input_demand;
    use crate::core::general::GeneralModel;
    use crate::domain::model::BlueprintParameters;

    fn params() -> BlueprintParameters {
        BlueprintParameters::new(1.0, 0.5, 1.2, vec![0.1, 0.2, 0.3]).unwrap()
    }

    fn implied(model: &dyn TaskModel, q: f64, thresholds: &[f64]) -> Vec<f64> {
        unit_input_demand(model, thresholds).unwrap().iter().map(|d| q * d).collect()
    }

    #[test]
    fn test_recovers_narrow_middle_interval() {
        let p = params();
        let truth = [0.5, 0.5 + 1e-6];
        let labor = implied(&p, 2.0, &truth);

        let start = bracketed_start(&p, &labor, 0.0).unwrap().unwrap();
        assert!((start[0] - 2.0_f64.ln()).abs() < 1e-9, "{:?}", start);
        assert!((start[1] - truth[0]).abs() < 1e-9);
        assert!(((start[2] - start[1]) - 1e-6).abs() < 1e-12);
    }

    #[test]
    fn test_extreme_ratio_matches_labor() {
        let p = params();
        let labor = [1.0, 1e-6, 1.0];
        let start = bracketed_start(&p, &labor, 5.0).unwrap().unwrap();
        let fitted = implied(&p, start[0].exp(), &start[1..]);
        for (f, l) in fitted.iter().zip(&labor) {
            assert!((f - l).abs() < 1e-8 * l, "{} vs {}", f, l);
        }
    }

    #[test]
    fn test_zero_labor_type_gets_empty_interval() {
        let p = params();
        let start = bracketed_start(&p, &[1.0, 0.0, 1.0], 0.0).unwrap().unwrap();
        assert_eq!(start[1], start[2]);
        let fitted = implied(&p, start[0].exp(), &start[1..]);
        assert_eq!(fitted[1], 0.0);
        assert!((fitted[2] - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_bounded_support_general_model() {
        let model = GeneralModel::builder(1.0, |_: f64| 1.0)
            .support(0.0, 1.0)
            .efficiency(|_: f64| 1.0)
            .efficiency(|x: f64| (2.0 * x).exp())
            .build()
            .unwrap();
        let truth = [0.3];
        let labor = implied(&model, 1.5, &truth);
        let start = bracketed_start(&model, &labor, -3.0).unwrap().unwrap();
        assert!((start[0] - 1.5_f64.ln()).abs() < 1e-7);
        assert!((start[1] - 0.3).abs() < 1e-7);
    }

    #[test]
    fn test_single_type_has_nothing_to_bracket() {
        let p = BlueprintParameters::new(1.0, 0.5, 1.0, vec![0.2]).unwrap();
        assert!(bracketed_start(&p, &[1.0], 0.0).unwrap().is_none());
    }
}
