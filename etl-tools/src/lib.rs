//! Tool discovery, invocation, and host binding utilities.
//!
//! Tools are plain functions wrapped in a [`ToolRecord`] and stored in a
//! [`ToolRegistry`]. The registry is populated once during startup wiring,
//! either through the explicit builders on [`ToolRecord`] or through the
//! [`tool`] attribute, and is read-only afterwards. Records can be invoked
//! from blocking or async callers (see [`bridge`]) and attached onto an
//! external host (see [`binding`]).

#![warn(missing_docs, clippy::pedantic)]

pub mod binding;
pub mod bridge;
pub mod error;
pub mod registry;

pub use binding::{
    BINDING_OPERATIONS, BindArgs, BindError, BindReport, ToolBinder, ToolHost, ToolTable, bind,
};
pub use error::{ToolError, ToolResult};
pub use registry::{
    ConcurrencyKind, ToolExecutor, ToolFuture, ToolMetadata, ToolRecord, ToolRegistry, parse_args,
};

/// Attribute that turns a function into a registrable tool.
///
/// `#[tool]` and `#[tool(name = "...", description = "...")]` both leave the
/// function untouched and generate a sibling `<fn>_tool()` constructor
/// returning a [`ToolRecord`].
pub use etl_tools_macros::tool;

#[doc(hidden)]
pub mod __private {
    //! Support code for `#[tool]` expansions. Not part of the public API.

    use std::future::Future;

    use serde::Serialize;
    use serde_json::Value;

    pub use serde;
    pub use serde_json;

    use crate::{ToolError, ToolMetadata, ToolRecord, ToolResult};

    fn metadata(name: &'static str, description: Option<&'static str>) -> ToolMetadata {
        let metadata = ToolMetadata::from_static(name);
        match description {
            Some(description) => metadata.with_description(description),
            None => metadata,
        }
    }

    #[must_use]
    pub fn immediate<F>(name: &'static str, description: Option<&'static str>, f: F) -> ToolRecord
    where
        F: Fn(Value) -> ToolResult<Value> + Send + Sync + 'static,
    {
        ToolRecord::immediate(metadata(name, description), f)
    }

    #[must_use]
    pub fn deferred<F, Fut>(
        name: &'static str,
        description: Option<&'static str>,
        f: F,
    ) -> ToolRecord
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        ToolRecord::deferred(metadata(name, description), f)
    }

    /// Serialises the value returned by an infallible tool function.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Execution`] if the value cannot be encoded as JSON.
    pub fn infallible_output<T: Serialize>(output: T) -> ToolResult<Value> {
        serde_json::to_value(output)
            .map_err(|err| ToolError::execution(format!("failed to encode tool output: {err}")))
    }

    /// Serialises the value returned by a fallible tool function.
    ///
    /// # Errors
    ///
    /// Propagates the function's own error, converted into [`ToolError`].
    pub fn fallible_output<T, E>(output: Result<T, E>) -> ToolResult<Value>
    where
        T: Serialize,
        E: Into<ToolError>,
    {
        output.map_err(Into::into).and_then(infallible_output)
    }
}
