//! Logging setup for the CLI. Logs go to stderr; stdout is reserved for
//! the path of the written results.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins over the built-in directive.
fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

pub fn init_cli_logger(verbose: bool) {
    let filter = env_filter(if verbose {
        "task_production=debug,warn"
    } else {
        "task_production=info,warn"
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .compact(),
        )
        .init();
}

/// One flat JSON object per event, for batch runs whose logs are collected
/// and queried by field (`id`, `fval`, `attempt`).
pub fn init_json_logger() {
    tracing_subscriber::registry()
        .with(env_filter("task_production=info,warn"))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
