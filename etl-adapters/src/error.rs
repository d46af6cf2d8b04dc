//! Outcome and error types shared by adapter implementations.

use std::fmt;
use std::time::Duration;

use etl_tools::ToolError;
use thiserror::Error;

/// Result alias used by adapters. Every adapter call yields exactly one.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Why a strategy in a fallback chain was skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyAttempt {
    /// Strategy name.
    pub strategy: &'static str,
    /// What the probe or execution reported.
    pub reason: String,
    /// What the operator would need to do to make the strategy available.
    pub remediation: &'static str,
}

impl fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.strategy, self.reason, self.remediation)
    }
}

fn describe(attempts: &[StrategyAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error type shared by adapter implementations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A single strategy cannot serve the request. Fallback chains consume
    /// this variant and move to the next strategy.
    #[error("strategy unavailable: {reason}")]
    Unavailable {
        /// Why the strategy could not be used.
        reason: String,
    },

    /// A child process exceeded its time limit and was killed.
    #[error("`{operation}` timed out after {elapsed:?} (limit {limit:?})")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Time spent before the child was killed.
        elapsed: Duration,
        /// Configured limit.
        limit: Duration,
    },

    /// Every strategy of a fallback chain was unavailable.
    #[error("no backend available for `{operation}`: {}", describe(.attempts))]
    BackendUnavailable {
        /// Operation that could not be served.
        operation: &'static str,
        /// One entry per skipped strategy, in chain order.
        attempts: Vec<StrategyAttempt>,
    },

    /// A backend ran but reported failure.
    #[error("`{operation}` failed: {reason}")]
    Execution {
        /// Operation that failed.
        operation: String,
        /// Captured diagnostic output.
        reason: String,
    },

    /// The request was malformed.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be processed.
        reason: String,
    },

    /// Adapter is misconfigured.
    #[error("adapter not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },
}

impl AdapterError {
    /// Convenience constructor for an unavailable strategy.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for backend failures.
    #[must_use]
    pub fn execution(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

impl From<AdapterError> for ToolError {
    fn from(err: AdapterError) -> Self {
        if let AdapterError::BackendUnavailable { operation, .. } = &err {
            return Self::BackendUnavailable {
                operation: (*operation).to_owned(),
                diagnostic: err.to_string(),
            };
        }

        match err {
            AdapterError::Timeout {
                operation,
                elapsed,
                limit,
            } => Self::Timeout {
                operation,
                elapsed,
                limit,
            },
            other => Self::execution(other.to_string()),
        }
    }
}
