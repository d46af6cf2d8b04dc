//! Attaches registered tools onto an external host.
//!
//! Hosts opt into structured registration by exposing a [`ToolBinder`]. The
//! probe offers each tool to the binder under the well-known operation names
//! in [`BINDING_OPERATIONS`], first as a single argument and then as a
//! `(name, tool)` pair. Hosts without a binder, or whose binder accepts none
//! of the operations, receive the tool through [`ToolHost::attach`].

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::registry::{ToolRecord, ToolRegistry};

/// Binding operations offered to a host, in the order they are tried.
pub const BINDING_OPERATIONS: [&str; 6] = [
    "register_tool",
    "register",
    "add_tool",
    "add_tools",
    "register_tools",
    "register_function",
];

/// Arguments passed to a host binding operation.
#[derive(Clone, Debug)]
pub enum BindArgs<'a> {
    /// One-argument form: the tool alone.
    Tool(ToolRecord),
    /// Two-argument form: the tool name followed by the tool.
    Named(&'a str, ToolRecord),
}

impl BindArgs<'_> {
    /// Number of arguments carried by this form.
    #[must_use]
    pub const fn arity(&self) -> usize {
        match self {
            Self::Tool(_) => 1,
            Self::Named(..) => 2,
        }
    }
}

/// Errors a host reports while binding a tool.
#[derive(Debug, Error)]
pub enum BindError {
    /// The host does not expose the requested operation.
    #[error("host does not expose `{operation}`")]
    UnknownOperation {
        /// Operation name that was probed.
        operation: String,
    },

    /// The operation exists but takes a different argument shape.
    #[error("`{operation}` does not accept {arity} argument(s)")]
    ArgumentMismatch {
        /// Operation name that was probed.
        operation: String,
        /// Number of arguments that was offered.
        arity: usize,
    },

    /// The host refused the tool.
    #[error("host rejected tool `{name}`: {reason}")]
    Rejected {
        /// Tool name.
        name: String,
        /// Host-supplied reason.
        reason: String,
    },
}

impl BindError {
    /// Convenience constructor for an unknown operation.
    #[must_use]
    pub fn unknown_operation(operation: &str) -> Self {
        Self::UnknownOperation {
            operation: operation.to_owned(),
        }
    }

    /// Convenience constructor for an argument-shape mismatch.
    #[must_use]
    pub fn argument_mismatch(operation: &str, args: &BindArgs<'_>) -> Self {
        Self::ArgumentMismatch {
            operation: operation.to_owned(),
            arity: args.arity(),
        }
    }
}

/// Optional host capability for structured tool registration.
pub trait ToolBinder {
    /// Invokes the host operation `operation` with the supplied arguments.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnknownOperation`] if the host has no such
    /// operation, [`BindError::ArgumentMismatch`] if it exists with another
    /// shape, or [`BindError::Rejected`] if the host refuses the tool.
    fn bind(&mut self, operation: &str, args: BindArgs<'_>) -> Result<(), BindError>;
}

/// External object that tools can be attached to.
pub trait ToolHost {
    /// Returns the host's structured binder, if it has one.
    fn binder(&mut self) -> Option<&mut dyn ToolBinder> {
        None
    }

    /// Attaches `tool` under `name` directly, bypassing any binder.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Rejected`] if the host cannot hold the tool.
    fn attach(&mut self, name: &str, tool: ToolRecord) -> Result<(), BindError>;
}

/// Outcome of a binding pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BindReport {
    /// Number of tools the pass tried to bind.
    pub attempted: usize,
    /// Number of tools that ended up attached to the host.
    pub succeeded: usize,
}

impl BindReport {
    /// Number of tools that could not be attached.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }
}

/// Binds every tool in `registry` onto `host`, in registry order.
///
/// Failures are logged and counted; they never abort the pass.
pub fn bind<H>(host: &mut H, registry: &ToolRegistry) -> BindReport
where
    H: ToolHost + ?Sized,
{
    let mut report = BindReport::default();
    for record in registry.iter() {
        report.attempted += 1;
        match bind_one(host, record) {
            Ok(via) => {
                report.succeeded += 1;
                debug!(tool = record.name(), via, "tool bound onto host");
            }
            Err(err) => {
                warn!(tool = record.name(), error = %err, "failed to bind tool onto host");
            }
        }
    }
    report
}

fn bind_one<H>(host: &mut H, record: &ToolRecord) -> Result<&'static str, BindError>
where
    H: ToolHost + ?Sized,
{
    if let Some(binder) = host.binder() {
        for operation in BINDING_OPERATIONS {
            match try_operation(binder, operation, record) {
                Ok(()) => return Ok(operation),
                Err(err) => debug!(tool = record.name(), operation, error = %err, "binding probe failed"),
            }
        }
    }

    host.attach(record.name(), record.clone())?;
    Ok("attach")
}

fn try_operation(
    binder: &mut dyn ToolBinder,
    operation: &str,
    record: &ToolRecord,
) -> Result<(), BindError> {
    match binder.bind(operation, BindArgs::Tool(record.clone())) {
        Err(BindError::ArgumentMismatch { .. }) => {
            binder.bind(operation, BindArgs::Named(record.name(), record.clone()))
        }
        outcome => outcome,
    }
}

/// Plain name-to-tool table; the simplest [`ToolHost`].
///
/// It exposes no binder, so every tool arrives through [`ToolHost::attach`].
#[derive(Debug, Default)]
pub struct ToolTable {
    tools: BTreeMap<String, ToolRecord>,
}

impl ToolTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tool attached under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolRecord> {
        self.tools.get(name)
    }

    /// Attached tool names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Number of attached tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolHost for ToolTable {
    fn attach(&mut self, name: &str, tool: ToolRecord) -> Result<(), BindError> {
        self.tools.insert(name.to_owned(), tool);
        Ok(())
    }
}
