mod cli;
mod config;
mod factor;
mod ingest;
mod mutant;
mod optimizer;
mod options;
mod out;
mod pipeline;
mod plan;
mod report;
mod run_report;
mod scan;
mod scoring;
mod subsumption;
mod ui;

use tracing_subscriber::EnvFilter;

/// Entry point for the `mutant-planner` binary.
fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr; stdout is reserved for plan output and JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    cli::run()
}
