use crate::numerics::Matrix;
use serde::{Deserialize, Serialize};

/// Closed-form gamma blueprint: task complexity ~ Gamma(shape `kappa`,
/// scale `theta`), type `h` efficiency `exp(alpha[h] x)`, productivity `z`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintParameters {
    pub theta: f64,
    pub kappa: f64,
    pub z: f64,
    pub alpha: Vec<f64>,
}

/// Result of inverting observed labor demand. `converged == false` is a
/// best-effort fit, not an error; inspect `fval` before relying on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionSolution {
    pub q: f64,
    pub thresholds: Vec<f64>,
    pub fval: f64,
    pub converged: bool,
    pub attempts: usize,
    pub iterations: usize,
}

impl ProductionSolution {
    pub fn log_q(&self) -> f64 {
        self.q.ln()
    }
}

/// Allen substitution and Hicks complementarity matrices. Diagonal
/// entries are NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticityMatrices {
    #[serde(with = "crate::numerics::linalg::rows")]
    pub allen: Matrix,
    #[serde(with = "crate::numerics::linalg::rows")]
    pub hicks: Matrix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub labor: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationResult {
    pub id: String,
    pub labor: Vec<f64>,
    pub solution: Option<ProductionSolution>,
    pub mpl: Vec<f64>,
    pub elasticities: Option<ElasticityMatrices>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub converged: usize,
    pub unconverged: usize,
    pub failed: usize,
    pub worst_fval: f64,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub results: Vec<ObservationResult>,
    pub csv_output: String,
    pub summary: BatchSummary,
}
