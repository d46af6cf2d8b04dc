//! Logging setup shared by ETL MCP binaries.

#![warn(missing_docs, clippy::pedantic)]

use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Directive used when `RUST_LOG` is unset.
#[must_use]
pub const fn default_directive(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

/// Builds the filter: `RUST_LOG` when set and valid, otherwise
/// [`default_directive`].
#[must_use]
pub fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(debug)))
}

/// Installs a `fmt` subscriber writing to stdout.
///
/// # Errors
///
/// Returns [`TelemetryError::Install`] if a global subscriber already exists.
pub fn init(debug: bool) -> Result<(), TelemetryError> {
    let filter = env_filter(debug);
    let directive = filter.to_string();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .try_init()
        .map_err(|err| TelemetryError::Install(err.to_string()))?;
    debug!(filter = %directive, "tracing subscriber installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_selects_directive() {
        assert_eq!(default_directive(false), "info");
        assert_eq!(default_directive(true), "debug");
    }

    #[test]
    fn second_init_reports_an_error() {
        let _ = init(false);
        assert!(matches!(init(true), Err(TelemetryError::Install(_))));
    }
}
