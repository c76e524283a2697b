use anyhow::Context;
use clap::Parser;
use task_production::utils::{logger, validation::Validate};
use task_production::{BatchEngine, CliConfig, CsvBatchPipeline, LocalStorage, ProductionError};

fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ProductionError>() {
        Some(e) if e.is_recoverable() => 2,
        _ => 1,
    }
}

async fn run(cli: CliConfig) -> anyhow::Result<()> {
    cli.validate().context("invalid command-line arguments")?;
    let config = cli
        .load()
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    if cli.verbose {
        tracing::debug!(?config, "configuration loaded");
    }

    let storage = LocalStorage::new(".");
    let pipeline = CsvBatchPipeline::new(storage, &config, cli.input.clone(), cli.output.clone())?;
    let engine = BatchEngine::new(pipeline);

    let run = engine.run().await?;
    println!("Results written to {}", run.output_path);
    if run.summary.failed > 0 || run.summary.unconverged > 0 {
        tracing::warn!(
            failed = run.summary.failed,
            unconverged = run.summary.unconverged,
            "some observations were not solved to tolerance"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::info!("Starting task-production");

    if let Err(e) = run(cli).await {
        tracing::error!("Batch run failed: {:#}", e);
        if let Some(production) = e.downcast_ref::<ProductionError>() {
            tracing::error!("Suggestion: {}", production.recovery_suggestion());
        }
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}
