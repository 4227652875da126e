//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout carries protocol traffic only.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LoggingSection};
use crate::error::NodeError;

/// Builds the level filter: `RUST_LOG` if set, otherwise the configured level.
///
/// # Errors
///
/// Returns an error if the configured level is not a valid filter directive.
pub fn build_filter(logging: &LoggingSection) -> Result<EnvFilter, NodeError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&logging.level)
        .map_err(|e| NodeError::Logging(format!("invalid log level '{}': {e}", logging.level)))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already set.
pub fn init(logging: &LoggingSection) -> Result<(), NodeError> {
    let registry = tracing_subscriber::registry().with(build_filter(logging)?);

    let result = match logging.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| NodeError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_from_config_level() {
        let logging = LoggingSection {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        };
        assert!(build_filter(&logging).is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        let logging = LoggingSection::default();
        // The first call may succeed or not; the second never can.
        let _ = init(&logging);
        assert!(matches!(init(&logging), Err(NodeError::Logging(_))));
    }
}
