//! The host tools are bound onto.

use std::collections::BTreeMap;

use etl_tools::{BindArgs, BindError, ToolBinder, ToolError, ToolHost, ToolRecord, ToolResult};
use serde_json::Value;
use tracing::debug;

/// Named collection of bound tools, callable by name.
///
/// Its binder only understands `register_tool(name, tool)`; every other
/// binding operation is reported as unknown.
#[derive(Debug)]
pub struct ToolServer {
    name: String,
    tools: BTreeMap<String, ToolRecord>,
}

impl ToolServer {
    /// Creates an empty server.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: BTreeMap::new(),
        }
    }

    /// Server name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound tool names, sorted.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Bound tool under `name`.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolRecord> {
        self.tools.get(name)
    }

    /// Number of bound tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invokes a bound tool from blocking code.
    ///
    /// # Errors
    ///
    /// [`ToolError::NotFound`] for unknown names, otherwise whatever the tool
    /// returns.
    pub fn call(&self, name: &str, input: Value) -> ToolResult<Value> {
        self.lookup(name)?.call(input)
    }

    /// Invokes a bound tool from async code.
    ///
    /// # Errors
    ///
    /// [`ToolError::NotFound`] for unknown names, otherwise whatever the tool
    /// returns.
    pub async fn call_async(&self, name: &str, input: Value) -> ToolResult<Value> {
        self.lookup(name)?.call_async(input).await
    }

    fn lookup(&self, name: &str) -> ToolResult<&ToolRecord> {
        self.tools.get(name).ok_or_else(|| ToolError::not_found(name))
    }

    fn insert(&mut self, name: &str, tool: ToolRecord) {
        debug!(server = %self.name, tool = name, "tool attached");
        self.tools.insert(name.to_owned(), tool);
    }
}

impl ToolBinder for ToolServer {
    fn bind(&mut self, operation: &str, args: BindArgs<'_>) -> Result<(), BindError> {
        match (operation, args) {
            ("register_tool", BindArgs::Named(name, tool)) => {
                self.insert(name, tool);
                Ok(())
            }
            ("register_tool", args) => Err(BindError::argument_mismatch(operation, &args)),
            _ => Err(BindError::unknown_operation(operation)),
        }
    }
}

impl ToolHost for ToolServer {
    fn binder(&mut self) -> Option<&mut dyn ToolBinder> {
        Some(self)
    }

    fn attach(&mut self, name: &str, tool: ToolRecord) -> Result<(), BindError> {
        self.insert(name, tool);
        Ok(())
    }
}
