//! Error taxonomy shared by tool registration, invocation, and adapters.

use std::time::Duration;

use thiserror::Error;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    NotFound {
        /// Name of the missing tool.
        name: String,
    },

    /// Input could not be decoded into the tool's arguments.
    #[error("invalid input for tool `{tool}`: {reason}")]
    InvalidInput {
        /// Name of the tool that rejected the input.
        tool: String,
        /// Decoder error.
        reason: String,
    },

    /// A backend operation exceeded its time limit and was terminated.
    #[error("`{operation}` timed out after {elapsed:?} (limit {limit:?})")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Wall-clock time spent before the operation was cancelled.
        elapsed: Duration,
        /// Configured limit.
        limit: Duration,
    },

    /// Every backend strategy for an operation was unavailable.
    #[error("{diagnostic}")]
    BackendUnavailable {
        /// Operation that could not be served.
        operation: String,
        /// Diagnostic listing what each missing backend would require.
        diagnostic: String,
    },

    /// Tool execution failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Creates a not-found error for the supplied tool name.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }
}
