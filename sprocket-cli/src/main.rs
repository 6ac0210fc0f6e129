use anyhow::{Context, Result};
use clap::Parser;
use sprocket_config::{ConfigLoader, JobConfig, LogLevel, SprocketConfig};
use sprocket_execution::JobRunner;
use sprocket_logging::{init_logging_from_config, init_simple_tracing};
use sprocket_storage::Storage;
use std::path::PathBuf;
use tracing::{debug, info, warn};

mod cli;

use cli::Cli;

/// Load worker configuration from file or environment
fn load_config(config_path: Option<&PathBuf>) -> Result<SprocketConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                loader
                    .from_file(path)
                    .with_context(|| format!("Failed to load configuration from {:?}", path))
            } else {
                eprintln!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => loader
            .from_env()
            .context("Failed to load configuration from environment"),
    }
}

/// Initialize logging from configuration, falling back to simple tracing
fn init_logging(config: &SprocketConfig, log_level: Option<&String>) -> Result<()> {
    let mut logging_config = config.logging.clone();
    if let Some(level_str) = log_level {
        match level_str.parse::<LogLevel>() {
            Ok(level) => logging_config.level = level,
            Err(e) => eprintln!("{}, keeping '{}'", e, logging_config.level.as_str()),
        }
    }

    if let Err(e) = init_logging_from_config(&logging_config) {
        eprintln!(
            "Failed to initialize structured logging: {}, falling back to simple tracing",
            e
        );
        init_simple_tracing(logging_config.level.as_str())?;
    }

    debug!("Logging initialized");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.sample_config {
        print!("{}", SprocketConfig::generate_sample());
        return Ok(());
    }

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config, cli.log_level.as_ref())?;

    let job_path = cli
        .job_config
        .context("A job document is required")?;
    let job = JobConfig::from_file(&job_path)
        .with_context(|| format!("Failed to load job document {:?}", job_path))?;
    info!(
        "Running job {}/{} -> {}/{}",
        job.func_bucket, job.func_key, job.output_bucket, job.output_key
    );

    let storage = Storage::from_config(&config.storage)
        .await
        .context("Failed to connect to storage backend")?;
    let runner = JobRunner::new(storage, &config.fetch);

    let report = runner.run(&job).await.context("Job runner failed")?;
    if report.encoding_degraded {
        warn!("Outcome was reported in degraded text form");
    }
    info!(
        "Outcome uploaded ({} bytes, success={})",
        report.output_bytes, report.success
    );

    Ok(())
}
