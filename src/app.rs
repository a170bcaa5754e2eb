use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::clients::{GoogleGeocoder, TransitClient};
use crate::config::{Config, ConfigError};
use crate::observability;
use crate::pipeline::{OutcomeRecorder, PipelineDriver, PipelineError, RunReport};

/// Builds the collaborator clients once and wires them into a driver.
///
/// # Errors
/// Fails when either HTTP client cannot be built from the configuration.
pub fn build_driver(config: &Config) -> Result<PipelineDriver> {
    let transit =
        TransitClient::new(config.transit_config()).context("failed to build transit client")?;
    let geocoder =
        GoogleGeocoder::new(config.geocoder_config()).context("failed to build geocoder")?;
    let recorder = OutcomeRecorder::new(config.output_dir.clone());

    Ok(PipelineDriver::new(
        Arc::new(transit),
        Arc::new(geocoder),
        Arc::new(recorder),
        &config.pipeline_settings(),
    ))
}

/// Runs one batch with an already parsed configuration.
///
/// # Errors
/// Fails when the driver cannot be built or the run aborts.
pub async fn run(config: &Config) -> Result<RunReport> {
    let driver = build_driver(config)?;
    let report = driver.run().await?;
    Ok(report)
}

// Entry point for the binary: exit 0 once every stop has an outcome, 1 otherwise.
pub async fn main() -> Result<()> {
    let config = match Config::from_args(std::env::args_os()) {
        Ok(config) => config,
        // Also covers --help and --version, which clap exits with 0.
        Err(ConfigError::Cli(error)) => error.exit(),
        Err(error) => {
            eprintln!("Configuration error: {error}");
            process::exit(1);
        }
    };

    observability::init_tracing(config.log_format).context("failed to initialize tracing")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?config,
        "starting stop-locator"
    );

    match run(&config).await {
        Ok(report) => {
            info!(total = report.total(), "stop-locator finished");
            Ok(())
        }
        Err(error) => {
            if let Some(PipelineError::QuotaExhausted { stop }) =
                error.downcast_ref::<PipelineError>()
            {
                error!(stop = %stop, "geocoding quota exhausted, stopping");
            } else {
                error!(error = %format!("{error:#}"), "stop-locator failed");
            }
            process::exit(1);
        }
    }
}
