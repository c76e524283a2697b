//! Feasible starting points for the threshold solver.
//!
//! Starts from an even partition of the model's task window and widens the
//! interval of every worker type whose implied labor share is below the
//! configured floor, at the expense of its neighbors, until every type has
//! non-degenerate demand. The result is a starting point, not a solution.

use crate::core::demand::unit_input_demand;
use crate::domain::ports::TaskModel;
use crate::utils::error::{ProductionError, Result};
use crate::utils::validation::validate_range;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuessOptions {
    /// Minimum implied labor share every type must reach.
    pub threshold: f64,
    pub max_iterations: usize,
    /// Fraction of a neighbor's interval taken per widening step; must stay
    /// below 0.5 so boundaries never cross.
    pub step: f64,
    pub verbose: bool,
}

impl Default for GuessOptions {
    fn default() -> Self {
        Self {
            threshold: 1e-2,
            max_iterations: 500,
            step: 0.25,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialGuess {
    pub log_q: f64,
    pub thresholds: Vec<f64>,
    /// Smallest implied labor share across types at this partition.
    pub min_share: f64,
    /// Whether every type reached the share floor.
    pub satisfied: bool,
    pub iterations: usize,
}

impl InitialGuess {
    /// `[log q₀, xT₀...]`
    pub fn to_vec(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(self.thresholds.len() + 1);
        v.push(self.log_q);
        v.extend_from_slice(&self.thresholds);
        v
    }
}

fn shares(demand: &[f64]) -> Vec<f64> {
    let total: f64 = demand.iter().sum();
    if total > 0.0 && total.is_finite() {
        demand.iter().map(|d| d / total).collect()
    } else {
        vec![0.0; demand.len()]
    }
}

pub fn find_initial_guess<M: TaskModel + ?Sized>(
    model: &M,
    labor: &[f64],
    options: &GuessOptions,
) -> Result<InitialGuess> {
    validate_range("guess.step", options.step, f64::MIN_POSITIVE, 0.499)?;
    validate_range("guess.threshold", options.threshold, 0.0, 1.0)?;

    let types = model.type_count();
    let (start, end) = model.task_window();
    let total_labor: f64 = labor.iter().sum();

    // boundaries[0] and boundaries[types] are the fixed window edges.
    let mut boundaries: Vec<f64> = (0..=types)
        .map(|k| start + (end - start) * k as f64 / types as f64)
        .collect();

    let mut best: Option<(f64, Vec<f64>, f64)> = None;
    let mut iterations = 0;
    let mut satisfied = false;

    while iterations <= options.max_iterations {
        let thresholds = boundaries[1..types].to_vec();
        let demand = unit_input_demand(model, &thresholds)?;
        let share = shares(&demand);
        let min_share = share.iter().copied().fold(f64::INFINITY, f64::min);

        if best.as_ref().map_or(true, |(m, _, _)| min_share > *m) {
            best = Some((min_share, thresholds, demand.iter().sum()));
        }
        if min_share >= options.threshold {
            satisfied = true;
            break;
        }
        if iterations == options.max_iterations {
            break;
        }

        let widths: Vec<f64> = boundaries.windows(2).map(|w| w[1] - w[0]).collect();
        let mut shift = vec![0.0; boundaries.len()];
        for (h, s) in share.iter().enumerate() {
            if *s >= options.threshold {
                continue;
            }
            if h > 0 {
                shift[h] -= options.step * widths[h - 1];
            }
            if h + 1 < types {
                shift[h + 1] += options.step * widths[h + 1];
            }
        }
        for (b, s) in boundaries.iter_mut().zip(&shift) {
            *b += s;
        }
        iterations += 1;
    }

    let (min_share, thresholds, total_demand) = best.ok_or_else(|| ProductionError::ProcessingError {
        message: "Initial guess search evaluated no partition".to_string(),
    })?;

    if !satisfied {
        if options.verbose {
            tracing::warn!(
                min_share,
                threshold = options.threshold,
                iterations,
                "initial guess search exhausted; using the best partition found"
            );
        } else {
            tracing::debug!(min_share, iterations, "initial guess search exhausted");
        }
    }

    if !(total_demand > 0.0) {
        return Err(ProductionError::ProcessingError {
            message: "Implied labor demand is zero on the whole task window".to_string(),
        });
    }

    Ok(InitialGuess {
        log_q: (total_labor / total_demand).ln(),
        thresholds,
        min_share,
        satisfied,
        iterations,
    })
}
