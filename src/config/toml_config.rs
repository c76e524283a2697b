use crate::core::elasticity::ElasticityOptions;
use crate::core::general::GeneralModel;
use crate::core::initial_guess::GuessOptions;
use crate::core::production::EngineOptions;
use crate::core::solver::SolverOptions;
use crate::domain::model::BlueprintParameters;
use crate::domain::ports::TaskModel;
use crate::utils::error::{ProductionError, Result};
use crate::utils::validation::{validate_positive, validate_positive_number, validate_range, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub solver: SolverOptions,
    #[serde(default)]
    pub guess: GuessOptions,
    #[serde(default)]
    pub elasticity: ElasticityOptions,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// How demand integrals are evaluated for the gamma blueprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Incomplete-gamma closed form.
    #[default]
    Blueprint,
    /// Same density and efficiencies, integrated by quadrature.
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub kind: ModelKind,
    pub theta: f64,
    pub kappa: f64,
    pub z: f64,
    pub alpha: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub workers: usize,
    pub elasticities: bool,
    pub results_file: String,
    pub summary_file: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            elasticities: false,
            results_file: "results.csv".to_string(),
            summary_file: "summary.json".to_string(),
        }
    }
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ProductionError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are
    /// left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ProductionError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn blueprint(&self) -> Result<BlueprintParameters> {
        BlueprintParameters::new(
            self.model.theta,
            self.model.kappa,
            self.model.z,
            self.model.alpha.clone(),
        )
    }

    /// The configured model behind the `TaskModel` port.
    pub fn task_model(&self) -> Result<Arc<dyn TaskModel>> {
        let params = self.blueprint()?;
        Ok(match self.model.kind {
            ModelKind::Blueprint => Arc::new(params),
            ModelKind::General => Arc::new(GeneralModel::from_blueprint(&params)?),
        })
    }

    /// Solver options with the `[guess]` section folded in.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            solver: SolverOptions {
                guess: self.guess,
                ..self.solver.clone()
            },
            elasticity: self.elasticity,
        }
    }

    pub fn workers(&self) -> usize {
        self.batch.workers
    }

    pub fn validate_config(&self) -> Result<()> {
        self.blueprint()?;

        validate_positive("solver.fit_tol", self.solver.fit_tol)?;
        validate_positive_number("solver.iterations", self.solver.iterations, 1)?;
        validate_range("solver.jitter", self.solver.jitter, 0.0, 10.0)?;

        validate_range("guess.threshold", self.guess.threshold, 0.0, 1.0)?;
        validate_range("guess.step", self.guess.step, f64::MIN_POSITIVE, 0.499)?;

        validate_positive("elasticity.relative_step", self.elasticity.relative_step)?;
        validate_positive("elasticity.threshold_step", self.elasticity.threshold_step)?;

        validate_positive_number("batch.workers", self.batch.workers, 1)?;
        for (field, name) in [
            ("batch.results_file", &self.batch.results_file),
            ("batch.summary_file", &self.batch.summary_file),
        ] {
            if name.trim().is_empty() {
                return Err(ProductionError::invalid(field, name, "File name cannot be empty"));
            }
        }
        Ok(())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
