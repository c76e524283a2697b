use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProductionError {
    #[error("Invalid parameter {field} = {value}: {reason}")]
    ParameterValidation {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incomplete gamma evaluation did not converge for shape {shape}, x {x}")]
    NumericalInstability { shape: f64, x: f64 },

    #[error("Quadrature over [{lo}, {hi}] did not reach tolerance (error estimate {error:e})")]
    Integration { lo: f64, hi: f64, error: f64 },

    #[error("Singular linear system: {context}")]
    SingularSystem { context: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Processing error: {message}")]
    ProcessingError { message: String },
}

impl ProductionError {
    pub fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        ProductionError::ParameterValidation {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Numerical failures may go away with another starting point or looser
    /// tolerances; structural input errors never do.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProductionError::NumericalInstability { .. }
                | ProductionError::Integration { .. }
                | ProductionError::SingularSystem { .. }
        )
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ProductionError::ParameterValidation { .. } => {
                "Check alpha ordering, threshold ordering and labor input lengths"
            }
            ProductionError::NumericalInstability { .. } => {
                "Rescale theta or move thresholds away from extreme task complexity"
            }
            ProductionError::Integration { .. } => {
                "Loosen the quadrature tolerance or narrow the model support"
            }
            ProductionError::SingularSystem { .. } => {
                "Every worker type needs positive labor input for elasticities"
            }
            ProductionError::IoError(_) | ProductionError::CsvError(_) => {
                "Make sure the input file exists and is a well-formed CSV"
            }
            ProductionError::SerializationError(_) => "Inspect the output directory permissions",
            ProductionError::ConfigError { .. } => "Fix the TOML configuration file",
            ProductionError::ProcessingError { .. } => "Re-run with --verbose for details",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProductionError>;
