//! CLI argument parsing definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one Sprocket job and report its outcome", long_about = None)]
pub struct Cli {
    /// Job document (JSON, or YAML by extension)
    #[arg(value_name = "JOB_CONFIG", required_unless_present = "sample_config")]
    pub job_config: Option<PathBuf>,

    /// Path to worker configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Print a sample worker configuration and exit
    #[arg(long)]
    pub sample_config: bool,
}
