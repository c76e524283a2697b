pub mod config;
pub mod core;
pub mod domain;
pub mod numerics;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;

pub use crate::config::{cli::LocalStorage, toml_config::TomlConfig};
pub use crate::core::{
    batch::BatchEngine,
    elasticity::{DerivativeMethod, ElasticityOptions},
    general::GeneralModel,
    initial_guess::{GuessOptions, InitialGuess},
    pipeline::CsvBatchPipeline,
    production::{
        elasticity_sub_comp, elasticity_sub_comp_general, find_initial_guess, find_initial_guess_gen,
        marg_prod_labor, marg_prod_labor_general, prod_fun, prod_fun_general, unit_input_demand,
        unit_input_demand_general, EngineOptions,
    },
    solver::SolverOptions,
};
pub use crate::domain::model::{BlueprintParameters, ElasticityMatrices, ProductionSolution};
pub use crate::utils::error::{ProductionError, Result};
