use sprocket_config::{LogFormat, LoggingConfig};
use thiserror::Error;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::EnvFilter;

/// Logging setup errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{directives}': {source}")]
    InvalidFilter {
        directives: String,
        #[source]
        source: ParseError,
    },
}

/// Filter for `level` plus any extra directives
///
/// Falls back to `RUST_LOG` and then to `info` when `level` itself does not
/// parse. Extra directives must parse.
pub fn build_env_filter(level: &str, extra: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let mut env_filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(directives) = extra {
        for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let parsed =
                directive
                    .parse::<Directive>()
                    .map_err(|source| LoggingError::InvalidFilter {
                        directives: directives.to_string(),
                        source,
                    })?;
            env_filter = env_filter.add_directive(parsed);
        }
    }

    Ok(env_filter)
}

/// Initialize logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = build_env_filter(config.level.as_str(), config.filter.as_deref())?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    // try_init leaves an existing global subscriber in place
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<(), LoggingError> {
    let env_filter = build_env_filter(log_level, None)?;

    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}
