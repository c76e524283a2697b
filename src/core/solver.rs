//! Inverts observed labor inputs into output `q` and task thresholds `xT`.
//!
//! The unknowns are reparameterized as `[log q, u_1, ..., u_{H-1}]` with
//! `x_1 = lower + exp(u_1)` (or `x_1 = u_1` on an unbounded support) and
//! `x_k = x_{k-1} + exp(u_k)`, so every candidate the optimizer tries is
//! a valid, strictly increasing threshold vector with positive output.

use crate::core::bracketing::{bracketed_start, window_width};
use crate::core::demand::{check_thresholds, unit_input_demand};
use crate::core::initial_guess::{find_initial_guess, GuessOptions};
use crate::domain::model::ProductionSolution;
use crate::domain::ports::TaskModel;
use crate::numerics::{levenberg_marquardt, LmOptions, LmReport};
use crate::utils::error::{ProductionError, Result};
use crate::utils::validation::validate_labor_input;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Threshold gaps stay within these multiples of the task window width.
const MIN_RELATIVE_GAP: f64 = 1e-12;
const MAX_RELATIVE_GAP: f64 = 1e4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub x_tol: f64,
    pub f_tol: f64,
    pub g_tol: f64,
    pub iterations: usize,
    /// Attempts after the first: a bracketing restart, then jittered
    /// copies of the initial guess.
    pub max_retries: usize,
    /// A solution counts as converged when its objective is at or below this.
    pub fit_tol: f64,
    /// Scale of the uniform jitter applied to the reparameterized start.
    pub jitter: f64,
    pub seed: u64,
    pub skip_param_checks: bool,
    /// `[log q, xT...]`; replaces the heuristic guess when set.
    #[serde(skip)]
    pub initial_guess: Option<Vec<f64>>,
    /// Loaded from its own `[guess]` config section.
    #[serde(skip)]
    pub guess: GuessOptions,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            x_tol: 1e-12,
            f_tol: 1e-12,
            g_tol: 1e-12,
            iterations: 1000,
            max_retries: 5,
            fit_tol: 1e-10,
            jitter: 0.1,
            seed: 0,
            skip_param_checks: false,
            initial_guess: None,
            guess: GuessOptions::default(),
        }
    }
}

impl SolverOptions {
    /// Same options, warm-started from a previous solution.
    pub fn warm_start(&self, solution: &ProductionSolution) -> Self {
        let mut start = Vec::with_capacity(solution.thresholds.len() + 1);
        start.push(solution.log_q());
        start.extend_from_slice(&solution.thresholds);
        Self {
            initial_guess: Some(start),
            ..self.clone()
        }
    }

    fn lm_options(&self) -> LmOptions {
        LmOptions {
            x_tol: self.x_tol,
            f_tol: self.f_tol,
            g_tol: self.g_tol,
            max_iterations: self.iterations,
            ..LmOptions::default()
        }
    }
}

/// Maps between threshold space and the unconstrained solver space.
/// Decoding saturates: gaps stay within `[MIN_RELATIVE_GAP,
/// MAX_RELATIVE_GAP]` window widths, and `x_1` on an unbounded support
/// within `MAX_RELATIVE_GAP` widths of the window.
struct Reparam {
    lower: f64,
    first: (f64, f64),
    log_gap: (f64, f64),
}

impl Reparam {
    fn new<M: TaskModel + ?Sized>(model: &M) -> Self {
        let (window_lo, window_hi) = model.task_window();
        Self::with_window(model.support().0, window_lo, window_hi)
    }

    fn with_window(lower: f64, window_lo: f64, window_hi: f64) -> Self {
        let width = window_width(window_lo, window_hi);
        let mut first = (window_lo - MAX_RELATIVE_GAP * width, window_hi + MAX_RELATIVE_GAP * width);
        if !(first.0 < first.1) {
            first = (-MAX_RELATIVE_GAP, MAX_RELATIVE_GAP);
        }
        Self {
            lower,
            first,
            log_gap: ((MIN_RELATIVE_GAP * width).ln(), (MAX_RELATIVE_GAP * width).ln()),
        }
    }

    fn unbounded_first(&self, k: usize) -> bool {
        k == 0 && !self.lower.is_finite()
    }

    fn step(&self, k: usize, prev: f64, u: f64) -> f64 {
        if self.unbounded_first(k) {
            return u.clamp(self.first.0, self.first.1);
        }
        let next = prev + u.clamp(self.log_gap.0, self.log_gap.1).exp();
        // Gaps below the spacing of `prev` would collapse to it.
        if next > prev {
            next
        } else {
            prev + f64::EPSILON * prev.abs().max(f64::MIN_POSITIVE)
        }
    }

    fn encode(&self, log_q: f64, thresholds: &[f64]) -> Vec<f64> {
        let mut p = Vec::with_capacity(thresholds.len() + 1);
        p.push(log_q);
        let mut prev = self.lower;
        for (k, &x) in thresholds.iter().enumerate() {
            let u = if self.unbounded_first(k) {
                x.clamp(self.first.0, self.first.1)
            } else {
                (x - prev).max(0.0).ln().clamp(self.log_gap.0, self.log_gap.1)
            };
            p.push(u);
            prev = self.step(k, prev, u);
        }
        p
    }

    fn decode(&self, p: &[f64]) -> (f64, Vec<f64>) {
        let mut thresholds = Vec::with_capacity(p.len().saturating_sub(1));
        let mut prev = self.lower;
        for (k, &u) in p.iter().skip(1).enumerate() {
            let x = self.step(k, prev, u);
            thresholds.push(x);
            prev = x;
        }
        (p[0], thresholds)
    }
}

fn jittered(origin: &[f64], scale: f64, rng: &mut StdRng) -> Vec<f64> {
    origin.iter().map(|v| v + scale * rng.gen_range(-1.0..=1.0)).collect()
}

fn validate_start<M: TaskModel + ?Sized>(model: &M, start: &[f64]) -> Result<()> {
    if start.len() != model.type_count() {
        return Err(ProductionError::invalid(
            "initial_guess",
            format!("{:?}", start),
            format!("Expected [log q, xT...] with {} entries", model.type_count()),
        ));
    }
    if !start[0].is_finite() {
        return Err(ProductionError::invalid("initial_guess", start[0], "log q must be finite"));
    }
    check_thresholds(model, &start[1..])
}

/// Solves for `(q, xT)` such that implied labor demand `q · d(xT)` matches
/// `labor`. Non-convergence is reported through `converged` and `fval`
/// rather than an error.
pub fn solve_thresholds<M: TaskModel + ?Sized>(
    model: &M,
    labor: &[f64],
    options: &SolverOptions,
) -> Result<ProductionSolution> {
    let types = model.type_count();
    if !options.skip_param_checks {
        validate_labor_input("labor_input", labor, types)?;
        if let Some(start) = &options.initial_guess {
            validate_start(model, start)?;
        }
    }

    if types == 1 {
        let demand = unit_input_demand(model, &[])?;
        let q = labor[0] / demand[0];
        debug!(q, "single worker type, output solved directly");
        return Ok(ProductionSolution {
            q,
            thresholds: Vec::new(),
            fval: 0.0,
            converged: true,
            attempts: 1,
            iterations: 0,
        });
    }

    let start = match &options.initial_guess {
        Some(start) => start.clone(),
        None => find_initial_guess(model, labor, &options.guess)?.to_vec(),
    };

    // Zero inputs are scaled by the mean input so the residual stays defined.
    let mean_labor = labor.iter().sum::<f64>() / types as f64;
    let scales: Vec<f64> = labor
        .iter()
        .map(|&l| if l > 0.0 { l } else { mean_labor })
        .collect();

    let reparam = Reparam::new(model);
    let residuals = |p: &[f64]| -> Result<Vec<f64>> {
        let (log_q, thresholds) = reparam.decode(p);
        let q = log_q.exp();
        let demand = unit_input_demand(model, &thresholds)?;
        Ok(demand
            .iter()
            .zip(labor)
            .zip(&scales)
            .map(|((d, l), s)| (q * d - l) / s)
            .collect())
    };

    let p0 = reparam.encode(start[0], &start[1..]);
    let lm = options.lm_options();
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut best: Option<LmReport> = None;
    let mut attempts = 0;
    let mut iterations = 0;

    for attempt in 0..=options.max_retries {
        let p_start = match attempt {
            0 => p0.clone(),
            1 => match bracketed_start(model, labor, start[0])? {
                Some(bracketed) => reparam.encode(bracketed[0], &bracketed[1..]),
                None => jittered(&p0, options.jitter, &mut rng),
            },
            _ => jittered(&p0, options.jitter * attempt as f64, &mut rng),
        };

        let report = levenberg_marquardt(&residuals, &p_start, &lm)?;
        attempts += 1;
        iterations += report.iterations;
        debug!(
            attempt,
            fval = report.fval,
            iterations = report.iterations,
            termination = ?report.termination,
            "threshold solve attempt finished"
        );

        if best.as_ref().map_or(true, |b| !(b.fval <= report.fval)) {
            best = Some(report);
        }
        if best.as_ref().is_some_and(|b| b.fval <= options.fit_tol) {
            break;
        }
    }

    let best = best.ok_or_else(|| ProductionError::ProcessingError {
        message: "Threshold solver made no attempts".to_string(),
    })?;
    let (log_q, thresholds) = reparam.decode(&best.params);
    let converged = best.fval <= options.fit_tol;
    if !converged {
        warn!(
            fval = best.fval,
            fit_tol = options.fit_tol,
            attempts,
            "threshold solver did not reach the fit tolerance; returning the best attempt"
        );
    }

    Ok(ProductionSolution {
        q: log_q.exp(),
        thresholds,
        fval: best.fval,
        converged,
        attempts,
        iterations,
    })
}
