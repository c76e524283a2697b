pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::config::toml_config::TomlConfig;
#[cfg(feature = "cli")]
use crate::utils::error::{ProductionError, Result};
#[cfg(feature = "cli")]
use crate::utils::validation::{validate_positive_number, Validate};
#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "task-production")]
#[command(about = "Solve task-based production functions for observed labor inputs")]
pub struct CliConfig {
    #[arg(long, default_value = "task-production.toml")]
    pub config: String,

    #[arg(long, help = "Observations CSV: id, l1, ..., lH")]
    pub input: String,

    #[arg(long, default_value = "./output")]
    pub output: String,

    #[arg(long, help = "Override [batch] workers")]
    pub workers: Option<usize>,

    #[arg(long, help = "Also compute Allen/Hicks elasticities")]
    pub elasticities: bool,

    #[arg(long, help = "Emit JSON log lines")]
    pub json_logs: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Loads the TOML file and applies command-line overrides on top.
    pub fn load(&self) -> Result<TomlConfig> {
        let mut config = TomlConfig::from_file(&self.config)?;
        if let Some(workers) = self.workers {
            config.batch.workers = workers;
        }
        if self.elasticities {
            config.batch.elasticities = true;
        }
        if self.verbose {
            config.guess.verbose = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        if self.input.trim().is_empty() {
            return Err(ProductionError::invalid("input", &self.input, "Input path cannot be empty"));
        }
        if self.output.trim().is_empty() {
            return Err(ProductionError::invalid("output", &self.output, "Output path cannot be empty"));
        }
        if let Some(workers) = self.workers {
            validate_positive_number("workers", workers, 1)?;
        }
        Ok(())
    }
}
