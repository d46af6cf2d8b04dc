//! Runtime registry for tool metadata and executors.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ToolError, ToolResult};

/// Future returned by deferred tool executors.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult<Value>> + Send>>;

type ImmediateFn = dyn Fn(Value) -> ToolResult<Value> + Send + Sync;
type DeferredFn = dyn Fn(Value) -> ToolFuture + Send + Sync;

/// Whether a tool produces its result immediately or through a future.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyKind {
    /// The executor returns its result synchronously.
    Immediate,
    /// The executor returns a future that must be driven to completion.
    Deferred,
}

/// Metadata describing a registered tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolMetadata {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ToolMetadata {
    /// Creates metadata for the supplied tool name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] if the name is empty.
    pub fn new(name: impl Into<String>) -> ToolResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ToolError::InvalidMetadata {
                reason: "tool name cannot be empty".into(),
            });
        }

        Ok(Self {
            name,
            description: None,
        })
    }

    // Names coming from `#[tool]` are checked at expansion time.
    pub(crate) fn from_static(name: &'static str) -> Self {
        Self {
            name: name.to_owned(),
            description: None,
        }
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Callable behind a [`ToolRecord`], tagged with its concurrency kind.
#[derive(Clone)]
pub enum ToolExecutor {
    /// Synchronous executor.
    Immediate(Arc<ImmediateFn>),
    /// Executor returning a boxed future.
    Deferred(Arc<DeferredFn>),
}

impl ToolExecutor {
    /// Wraps a synchronous function.
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(Value) -> ToolResult<Value> + Send + Sync + 'static,
    {
        Self::Immediate(Arc::new(f))
    }

    /// Wraps an asynchronous function.
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        Self::Deferred(Arc::new(move |input| -> ToolFuture { Box::pin(f(input)) }))
    }

    /// Returns the declared concurrency kind.
    #[must_use]
    pub const fn kind(&self) -> ConcurrencyKind {
        match self {
            Self::Immediate(_) => ConcurrencyKind::Immediate,
            Self::Deferred(_) => ConcurrencyKind::Deferred,
        }
    }
}

impl fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ToolExecutor").field(&self.kind()).finish()
    }
}

/// A named tool: metadata plus the executor that implements it.
///
/// Records are immutable once built. Cloning shares the executor, which is how
/// hosts receive their own handle during binding.
#[derive(Clone, Debug)]
pub struct ToolRecord {
    metadata: ToolMetadata,
    executor: ToolExecutor,
}

impl ToolRecord {
    /// Creates a record from metadata and an executor.
    #[must_use]
    pub fn new(metadata: ToolMetadata, executor: ToolExecutor) -> Self {
        Self { metadata, executor }
    }

    /// Creates a record for a synchronous function.
    #[must_use]
    pub fn immediate<F>(metadata: ToolMetadata, f: F) -> Self
    where
        F: Fn(Value) -> ToolResult<Value> + Send + Sync + 'static,
    {
        Self::new(metadata, ToolExecutor::immediate(f))
    }

    /// Creates a record for an asynchronous function.
    #[must_use]
    pub fn deferred<F, Fut>(metadata: ToolMetadata, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        Self::new(metadata, ToolExecutor::deferred(f))
    }

    /// Replaces the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_description(description);
        self
    }

    /// Returns the associated metadata.
    #[must_use]
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.metadata.description()
    }

    /// Returns whether the executor is immediate or deferred.
    #[must_use]
    pub const fn concurrency_kind(&self) -> ConcurrencyKind {
        self.executor.kind()
    }

    pub(crate) fn executor(&self) -> &ToolExecutor {
        &self.executor
    }
}

/// Registry that stores tool records keyed by name.
///
/// Registration takes `&mut self`: the registry is filled during startup and
/// shared read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    records: Vec<ToolRecord>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("registered", &self.list())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any record already stored under its name.
    ///
    /// A replaced record keeps its original position in [`list`](Self::list).
    /// Returns the previous record, if any.
    pub fn register(&mut self, record: ToolRecord) -> Option<ToolRecord> {
        let name = record.name().to_owned();
        if let Some(&slot) = self.index.get(&name) {
            warn!(tool = %name, "tool re-registered; replacing previous record");
            return Some(std::mem::replace(&mut self.records[slot], record));
        }

        debug!(tool = %name, kind = ?record.concurrency_kind(), "tool registered");
        self.index.insert(name, self.records.len());
        self.records.push(record);
        None
    }

    /// Registers a tool, refusing to replace an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present.
    pub fn try_register(&mut self, record: ToolRecord) -> ToolResult<()> {
        if self.contains(record.name()) {
            return Err(ToolError::DuplicateTool {
                name: record.name().to_owned(),
            });
        }
        self.register(record);
        Ok(())
    }

    /// Returns the record registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ToolRecord> {
        self.index.get(name).map(|&slot| &self.records[slot])
    }

    /// Returns the record registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] when the tool is not registered.
    pub fn get(&self, name: &str) -> ToolResult<&ToolRecord> {
        self.lookup(name).ok_or_else(|| ToolError::not_found(name))
    }

    /// Returns `true` if a tool is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Lists registered tool names in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.records.iter().map(ToolRecord::name).collect()
    }

    /// Lists the metadata of all registered tools.
    #[must_use]
    pub fn metadata(&self) -> Vec<ToolMetadata> {
        self.records
            .iter()
            .map(|record| record.metadata().clone())
            .collect()
    }

    /// Iterates over registered records in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolRecord> {
        self.records.iter()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes every registered tool.
    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}

/// Decodes tool input into a typed argument structure.
///
/// Input may be an object keyed by argument name or a positional array;
/// `null` is treated as an empty object.
///
/// # Errors
///
/// Returns [`ToolError::InvalidInput`] if the input does not match `T`.
pub fn parse_args<T: DeserializeOwned>(tool: &str, input: Value) -> ToolResult<T> {
    let input = if input.is_null() {
        Value::Object(Map::new())
    } else {
        input
    };
    serde_json::from_value(input).map_err(|err| ToolError::InvalidInput {
        tool: tool.to_owned(),
        reason: err.to_string(),
    })
}
