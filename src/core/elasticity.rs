//! Allen partial elasticities of substitution and Hicks partial
//! elasticities of complementarity between worker types.
//!
//! Both are built from the Hessian of output with respect to labor,
//! `∂MPL_i/∂l_j`. Two ways of getting it are offered:
//!
//! | Method     | How                                                      |
//! |------------|----------------------------------------------------------|
//! | `Implicit` | Implicit-function theorem on `q · d(xT) = l`, one solve  |
//! | `Resolve`  | Central differences of MPL, re-solving at perturbed `l`  |

use crate::core::demand::{marg_prod_labor_at, unit_input_demand};
use crate::core::solver::{solve_thresholds, SolverOptions};
use crate::domain::model::{ElasticityMatrices, ProductionSolution};
use crate::domain::ports::TaskModel;
use crate::numerics::{invert, max_asymmetry, symmetrize, Matrix};
use crate::utils::error::{ProductionError, Result};
use crate::utils::validation::validate_positive;
use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeMethod {
    #[default]
    Implicit,
    Resolve,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticityOptions {
    pub method: DerivativeMethod,
    /// Relative labor perturbation for `Resolve`.
    pub relative_step: f64,
    /// Threshold perturbation for `Implicit`, relative to `max(|x|, 1)`.
    pub threshold_step: f64,
    /// Run `Resolve` perturbations on the rayon pool.
    pub parallel: bool,
}

impl Default for ElasticityOptions {
    fn default() -> Self {
        Self {
            method: DerivativeMethod::Implicit,
            relative_step: 1e-4,
            threshold_step: 1e-6,
            parallel: true,
        }
    }
}

/// Step for threshold `k`, shrunk so `x_k ± step` never reaches a
/// neighboring threshold.
fn threshold_step(thresholds: &[f64], k: usize, relative: f64) -> f64 {
    let x = thresholds[k];
    let mut step = relative * x.abs().max(1.0);
    if k > 0 {
        step = step.min(0.25 * (x - thresholds[k - 1]));
    }
    if k + 1 < thresholds.len() {
        step = step.min(0.25 * (thresholds[k + 1] - x));
    }
    step
}

fn singular(context: &str) -> ProductionError {
    ProductionError::SingularSystem {
        context: context.to_string(),
    }
}

/// Jacobian of the solved unknowns `y = (log q, xT)` with respect to
/// labor: row `i` is `∂y_i/∂l`, from inverting `∂(q · d)/∂y`.
pub fn threshold_jacobian<M: TaskModel + ?Sized>(
    model: &M,
    solution: &ProductionSolution,
    relative_step: f64,
) -> Result<Matrix> {
    let types = model.type_count();
    let q = solution.q;
    let x = &solution.thresholds;

    let mut implied = Matrix::zeros(types, types);
    let base = unit_input_demand(model, x)?;
    for (i, d) in base.iter().enumerate() {
        implied[(i, 0)] = q * d;
    }

    let mut shifted = x.clone();
    for k in 0..x.len() {
        let step = threshold_step(x, k, relative_step);
        if !(step > 0.0) {
            return Err(singular("coinciding thresholds leave no room for a derivative step"));
        }
        shifted[k] = x[k] + step;
        let up = unit_input_demand(model, &shifted)?;
        shifted[k] = x[k] - step;
        let down = unit_input_demand(model, &shifted)?;
        shifted[k] = x[k];
        for (i, (u, d)) in up.iter().zip(&down).enumerate() {
            implied[(i, k + 1)] = q * (u - d) / (2.0 * step);
        }
    }

    invert(&implied).ok_or_else(|| singular("labor demand Jacobian with respect to (log q, thresholds)"))
}

fn implicit_hessian<M: TaskModel + ?Sized>(
    model: &M,
    labor: &[f64],
    solution: &ProductionSolution,
    mpl: &[f64],
    options: &ElasticityOptions,
) -> Result<Matrix> {
    let types = model.type_count();
    let dy_dl = threshold_jacobian(model, solution, options.threshold_step)?;
    let x = &solution.thresholds;

    // ∂MPL/∂y at fixed labor: log q scales MPL one-for-one.
    let mut dm_dy = Matrix::zeros(types, types);
    dm_dy.set_column(0, &DVector::from_column_slice(mpl));
    let mut shifted = x.clone();
    for k in 0..x.len() {
        let step = threshold_step(x, k, options.threshold_step);
        shifted[k] = x[k] + step;
        let up = marg_prod_labor_at(model, labor, solution.q, &shifted)?;
        shifted[k] = x[k] - step;
        let down = marg_prod_labor_at(model, labor, solution.q, &shifted)?;
        shifted[k] = x[k];
        for (i, (u, d)) in up.iter().zip(&down).enumerate() {
            dm_dy[(i, k + 1)] = (u - d) / (2.0 * step);
        }
    }

    // Direct effect of l_j through the wage bill Σ ρ_k l_k.
    let wage_bill = solution.q / mpl[0];
    let rho: Vec<f64> = mpl.iter().map(|m| m * wage_bill / solution.q).collect();
    let mut hessian = &dm_dy * &dy_dl;
    for i in 0..types {
        for j in 0..types {
            hessian[(i, j)] -= mpl[i] * rho[j] / wage_bill;
        }
    }
    Ok(hessian)
}

fn mpl_column<M: TaskModel + ?Sized>(
    model: &M,
    labor: &[f64],
    warm: &SolverOptions,
    j: usize,
    options: &ElasticityOptions,
) -> Result<Vec<f64>> {
    let mean = labor.iter().sum::<f64>() / labor.len() as f64;
    let step = options.relative_step * if labor[j] > 0.0 { labor[j] } else { mean };

    // Forward difference when the lower point would need negative labor.
    let lower = if labor[j] - step >= 0.0 { labor[j] - step } else { labor[j] };
    let upper = labor[j] + step;

    let mpl_at = |lj: f64| -> Result<Vec<f64>> {
        let mut perturbed = labor.to_vec();
        perturbed[j] = lj;
        let solution = solve_thresholds(model, &perturbed, warm)?;
        if !solution.converged {
            warn!(
                worker_type = j,
                fval = solution.fval,
                "perturbed solve did not converge; elasticities may be inaccurate"
            );
        }
        marg_prod_labor_at(model, &perturbed, solution.q, &solution.thresholds)
    };

    let up = mpl_at(upper)?;
    let down = mpl_at(lower)?;
    Ok(up.iter().zip(&down).map(|(u, d)| (u - d) / (upper - lower)).collect())
}

fn resolve_hessian<M: TaskModel + ?Sized>(
    model: &M,
    labor: &[f64],
    solution: &ProductionSolution,
    solver: &SolverOptions,
    options: &ElasticityOptions,
) -> Result<Matrix> {
    let types = model.type_count();
    let warm = solver.warm_start(solution);

    let columns: Vec<Vec<f64>> = if options.parallel {
        (0..types)
            .into_par_iter()
            .map(|j| mpl_column(model, labor, &warm, j, options))
            .collect::<Result<_>>()?
    } else {
        (0..types)
            .map(|j| mpl_column(model, labor, &warm, j, options))
            .collect::<Result<_>>()?
    };

    Ok(Matrix::from_fn(types, types, |i, j| columns[j][i]))
}

/// Symmetrized `∂²q/∂l∂l` at a solved point.
pub fn labor_hessian<M: TaskModel + ?Sized>(
    model: &M,
    labor: &[f64],
    solution: &ProductionSolution,
    mpl: &[f64],
    solver: &SolverOptions,
    options: &ElasticityOptions,
) -> Result<Matrix> {
    let mut hessian = match options.method {
        DerivativeMethod::Implicit => implicit_hessian(model, labor, solution, mpl, options)?,
        DerivativeMethod::Resolve => resolve_hessian(model, labor, solution, solver, options)?,
    };
    debug!(
        method = ?options.method,
        asymmetry = max_asymmetry(&hessian),
        "labor Hessian computed"
    );
    symmetrize(&mut hessian);
    Ok(hessian)
}

/// Allen and Hicks matrices from a Hessian and MPL. Diagonals, and pairs
/// involving a type with zero labor, are NaN.
pub fn elasticity_matrices(labor: &[f64], q: f64, mpl: &[f64], hessian: &Matrix) -> Result<ElasticityMatrices> {
    let types = mpl.len();
    let border = DVector::from_column_slice(mpl);
    let mut bordered = Matrix::zeros(types + 1, types + 1);
    bordered.view_mut((1, 0), (types, 1)).copy_from(&border);
    bordered.view_mut((0, 1), (1, types)).copy_from(&border.transpose());
    bordered.view_mut((1, 1), (types, types)).copy_from(hessian);
    let inverse = invert(&bordered).ok_or_else(|| singular("bordered Hessian"))?;

    let output: f64 = labor.iter().zip(mpl).map(|(l, m)| l * m).sum();
    let mut allen = Matrix::from_element(types, types, f64::NAN);
    let mut hicks = Matrix::from_element(types, types, f64::NAN);
    for i in 0..types {
        for j in (i + 1)..types {
            let sigma = if labor[i] > 0.0 && labor[j] > 0.0 {
                output / (labor[i] * labor[j]) * inverse[(i + 1, j + 1)]
            } else {
                f64::NAN
            };
            let c = q * hessian[(i, j)] / (mpl[i] * mpl[j]);
            allen[(i, j)] = sigma;
            allen[(j, i)] = sigma;
            hicks[(i, j)] = c;
            hicks[(j, i)] = c;
        }
    }
    Ok(ElasticityMatrices { allen, hicks })
}

/// Elasticities at a solved point. `mpl` must be the marginal products at
/// `solution`.
///
/// A type with zero labor sits on a collapsed task interval. Its Allen
/// entries are NaN, and the remaining entries are computed next to a
/// degenerate threshold pair, so they are logged as suspect.
pub fn elasticities_at<M: TaskModel + ?Sized>(
    model: &M,
    labor: &[f64],
    solution: &ProductionSolution,
    mpl: &[f64],
    solver: &SolverOptions,
    options: &ElasticityOptions,
) -> Result<ElasticityMatrices> {
    validate_positive("elasticity.relative_step", options.relative_step)?;
    validate_positive("elasticity.threshold_step", options.threshold_step)?;
    if mpl.len() != model.type_count() {
        return Err(ProductionError::invalid(
            "mpl",
            format!("{:?}", mpl),
            format!("Expected {} entries", model.type_count()),
        ));
    }
    let idle: Vec<usize> = (0..labor.len()).filter(|&h| labor[h] == 0.0).collect();
    if !idle.is_empty() {
        warn!(
            zero_labor_types = ?idle,
            "zero labor input collapses a task interval; elasticities near it are unreliable"
        );
    }
    let hessian = labor_hessian(model, labor, solution, mpl, solver, options)?;
    elasticity_matrices(labor, solution.q, mpl, &hessian)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::BlueprintParameters;
    use crate::numerics::mul_vec;

    fn solved(labor: &[f64]) -> (BlueprintParameters, ProductionSolution, Vec<f64>) {
        let p = BlueprintParameters::new(1.0, 0.5, 1.2, vec![0.1, 0.2, 0.3]).unwrap();
        let s = solve_thresholds(&p, labor, &SolverOptions::default()).unwrap();
        let mpl = marg_prod_labor_at(&p, labor, s.q, &s.thresholds).unwrap();
        (p, s, mpl)
    }

    #[test]
    fn test_threshold_jacobian_is_homogeneous() {
        // q is degree one in labor and thresholds degree zero.
        let labor = [0.5, 0.04, 0.19];
        let (p, s, _) = solved(&labor);
        let jac = threshold_jacobian(&p, &s, 1e-6).unwrap();
        let directional = mul_vec(&jac, &labor);
        assert!((directional[0] - 1.0).abs() < 1e-5, "{:?}", directional);
        assert!(directional[1].abs() < 1e-5);
        assert!(directional[2].abs() < 1e-5);
    }

    #[test]
    fn test_hessian_annihilates_labor() {
        let labor = [0.5, 0.04, 0.19];
        let (p, s, mpl) = solved(&labor);
        let h = labor_hessian(&p, &labor, &s, &mpl, &SolverOptions::default(), &ElasticityOptions::default())
            .unwrap();
        let scale = mpl.iter().fold(0.0_f64, |a, m| a.max(m.abs()));
        for v in mul_vec(&h, &labor) {
            assert!(v.abs() < 1e-4 * scale, "{}", v);
        }
        assert_eq!(max_asymmetry(&h), 0.0);
    }

    #[test]
    fn test_matrices_are_symmetric_with_nan_diagonal() {
        let labor = [0.5, 0.04, 0.19];
        let (p, s, mpl) = solved(&labor);
        let m = elasticities_at(&p, &labor, &s, &mpl, &SolverOptions::default(), &ElasticityOptions::default())
            .unwrap();
        for i in 0..3 {
            assert!(m.allen[(i, i)].is_nan());
            assert!(m.hicks[(i, i)].is_nan());
            for j in 0..3 {
                if i != j {
                    assert_eq!(m.allen[(i, j)], m.allen[(j, i)]);
                    assert_eq!(m.hicks[(i, j)], m.hicks[(j, i)]);
                    assert!(m.allen[(i, j)].is_finite());
                }
            }
        }
    }

    #[test]
    fn test_singular_bordered_hessian() {
        let zero = Matrix::zeros(2, 2);
        let result = elasticity_matrices(&[1.0, 1.0], 1.0, &[0.0, 0.0], &zero);
        assert!(matches!(result, Err(ProductionError::SingularSystem { .. })));
    }

    #[test]
    fn test_zero_labor_pairs_are_nan() {
        // Rows sum to zero, as Euler's theorem requires of a labor Hessian.
        let hessian = Matrix::from_row_slice(3, 3, &[-1.0, 0.5, 0.5, 0.5, -1.0, 0.5, 0.5, 0.5, -1.0]);
        let m = elasticity_matrices(&[1.0, 0.0, 1.0], 2.0, &[1.0, 1.0, 1.0], &hessian).unwrap();
        assert!(m.allen[(0, 1)].is_nan());
        assert!(m.allen[(1, 2)].is_nan());
        assert!(m.allen[(0, 2)].is_finite());
        assert!(m.hicks[(0, 1)].is_finite());
    }

    #[test]
    fn test_elasticities_with_an_idle_type_still_return() {
        let labor = [0.5, 0.0, 0.19];
        let (p, s, mpl) = solved(&labor);
        let m = elasticities_at(&p, &labor, &s, &mpl, &SolverOptions::default(), &ElasticityOptions::default())
            .unwrap();
        assert!(m.allen[(0, 1)].is_nan());
        assert!(m.allen[(2, 1)].is_nan());
    }

    #[test]
    fn test_step_respects_neighbors() {
        let x = [0.0, 1e-6, 1.0];
        assert!(threshold_step(&x, 1, 1e-6) <= 0.25e-6);
        assert_eq!(threshold_step(&x, 2, 1e-6), 1e-6);
    }
}
