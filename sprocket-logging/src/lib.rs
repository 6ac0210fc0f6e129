//! Logging setup for Sprocket
//!
//! Library crates log through `tracing` (the resilience crate through the
//! `log` facade, which the subscriber bridges). The binary installs one
//! global subscriber at startup with [`init_logging_from_config`].

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing, LoggingError};
