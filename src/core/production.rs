//! Public entry points, in a closed-form (`BlueprintParameters`) and a
//! general (`GeneralModel`) flavor.

use crate::core::demand::{self, check_thresholds};
use crate::core::elasticity::{elasticities_at, ElasticityOptions};
use crate::core::general::GeneralModel;
use crate::core::initial_guess::{self, GuessOptions, InitialGuess};
use crate::core::solver::{solve_thresholds, SolverOptions};
use crate::domain::model::{BlueprintParameters, ElasticityMatrices, ProductionSolution};
use crate::domain::ports::TaskModel;
use crate::utils::error::{ProductionError, Result};
use crate::utils::validation::{validate_labor_input, validate_positive, Validate};
use serde::{Deserialize, Serialize};

/// Solver and elasticity settings together, as loaded from config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub solver: SolverOptions,
    pub elasticity: ElasticityOptions,
}

/// Unit labor demand per type for the blueprint.
pub fn unit_input_demand(thresholds: &[f64], params: &BlueprintParameters) -> Result<Vec<f64>> {
    params.validate()?;
    check_thresholds(params, thresholds)?;
    demand::unit_input_demand(params, thresholds)
}

pub fn unit_input_demand_general(thresholds: &[f64], model: &GeneralModel) -> Result<Vec<f64>> {
    check_thresholds(model, thresholds)?;
    demand::unit_input_demand(model, thresholds)
}

/// Solves for output and thresholds at the given labor inputs.
pub fn prod_fun(labor: &[f64], params: &BlueprintParameters, options: &SolverOptions) -> Result<ProductionSolution> {
    if !options.skip_param_checks {
        params.validate()?;
    }
    solve_thresholds(params, labor, options)
}

pub fn prod_fun_general(labor: &[f64], model: &GeneralModel, options: &SolverOptions) -> Result<ProductionSolution> {
    solve_thresholds(model, labor, options)
}

/// Marginal products of labor. Solves first unless a matching solution is
/// supplied.
pub fn marg_prod_labor(
    labor: &[f64],
    params: &BlueprintParameters,
    solution: Option<&ProductionSolution>,
    options: &SolverOptions,
) -> Result<Vec<f64>> {
    match solution {
        Some(solution) => {
            if !options.skip_param_checks {
                params.validate()?;
                check_solution(params, labor, solution)?;
            }
            demand::marg_prod_labor_at(params, labor, solution.q, &solution.thresholds)
        }
        None => {
            let solution = prod_fun(labor, params, options)?;
            demand::marg_prod_labor_at(params, labor, solution.q, &solution.thresholds)
        }
    }
}

/// Marginal products for a general model at an already solved `(q, xT)`.
pub fn marg_prod_labor_general(labor: &[f64], model: &GeneralModel, q: f64, thresholds: &[f64]) -> Result<Vec<f64>> {
    validate_labor_input("labor_input", labor, model.type_count())?;
    validate_positive("q", q)?;
    check_thresholds(model, thresholds)?;
    demand::marg_prod_labor_at(model, labor, q, thresholds)
}

/// Allen and Hicks elasticity matrices. Missing `solution` or `mpl` are
/// computed here.
pub fn elasticity_sub_comp(
    labor: &[f64],
    params: &BlueprintParameters,
    mpl: Option<&[f64]>,
    solution: Option<&ProductionSolution>,
    options: &EngineOptions,
) -> Result<ElasticityMatrices> {
    if !options.solver.skip_param_checks {
        params.validate()?;
    }
    elasticity_sub_comp_for(params, labor, mpl, solution, options)
}

pub fn elasticity_sub_comp_general(
    labor: &[f64],
    model: &GeneralModel,
    mpl: Option<&[f64]>,
    solution: Option<&ProductionSolution>,
    options: &EngineOptions,
) -> Result<ElasticityMatrices> {
    elasticity_sub_comp_for(model, labor, mpl, solution, options)
}

fn elasticity_sub_comp_for<M: TaskModel + ?Sized>(
    model: &M,
    labor: &[f64],
    mpl: Option<&[f64]>,
    solution: Option<&ProductionSolution>,
    options: &EngineOptions,
) -> Result<ElasticityMatrices> {
    let solved;
    let solution = match solution {
        Some(solution) => {
            if !options.solver.skip_param_checks {
                check_solution(model, labor, solution)?;
            }
            solution
        }
        None => {
            solved = solve_thresholds(model, labor, &options.solver)?;
            &solved
        }
    };

    let computed;
    let mpl = match mpl {
        Some(mpl) => mpl,
        None => {
            computed = demand::marg_prod_labor_at(model, labor, solution.q, &solution.thresholds)?;
            &computed
        }
    };

    elasticities_at(model, labor, solution, mpl, &options.solver, &options.elasticity)
}

fn check_solution<M: TaskModel + ?Sized>(model: &M, labor: &[f64], solution: &ProductionSolution) -> Result<()> {
    validate_labor_input("labor_input", labor, model.type_count())?;
    validate_positive("q", solution.q)?;
    check_thresholds(model, &solution.thresholds).map_err(|e| match e {
        ProductionError::ParameterValidation { value, reason, .. } => ProductionError::ParameterValidation {
            field: "solution.thresholds".to_string(),
            value,
            reason,
        },
        other => other,
    })
}

/// Starting point for the threshold solver.
pub fn find_initial_guess(labor: &[f64], params: &BlueprintParameters, options: &GuessOptions) -> Result<InitialGuess> {
    params.validate()?;
    validate_labor_input("labor_input", labor, params.type_count())?;
    initial_guess::find_initial_guess(params, labor, options)
}

pub fn find_initial_guess_gen(labor: &[f64], model: &GeneralModel, options: &GuessOptions) -> Result<InitialGuess> {
    validate_labor_input("labor_input", labor, model.type_count())?;
    initial_guess::find_initial_guess(model, labor, options)
}
