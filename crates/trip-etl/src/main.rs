//! CLI entry point for the trip dataset ETL pipeline.

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};
use trip_etl::{EtlError, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Trip dataset ETL pipeline",
    long_about = "Downloads a trip dataset, removes invalid rows and extracts the rows \
                  above a percentile threshold.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  TRIP_ETL_CONFIG    Path to the TOML configuration (default: config/config.toml)\n  \
                  RUST_LOG           Overrides the configured log level"
)]
struct Args {}

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` wins over the level from the configuration file.
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Final log line for a failed run; keeps the failing stage in the text.
fn failure_message(e: &EtlError) -> String {
    format!("Pipeline failed [{}]: {}", e.error_code(), e)
}

fn main() -> Result<()> {
    let _args = Args::parse();

    // Load environment variables from .env file
    dotenv().ok();

    let config_path = PipelineConfig::default_path();
    let config = PipelineConfig::load(&config_path)?;

    init_logging(config.tracing_directive());
    info!("Loaded configuration from {}", config_path.display());

    let mut pipeline = Pipeline::builder()
        .config(config)
        .on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        })
        .build()?;

    if let Err(e) = pipeline.run() {
        error!("{}", failure_message(&e));
        return Err(e.into());
    }

    let summary = pipeline.summarize()?;
    println!("{}", summary);

    Ok(())
}
