//! Blocking and async entry points for invoking registered tools.
//!
//! Immediate tools run inline from either entry point. Deferred tools are
//! awaited by [`ToolRegistry::call_async`] and driven to completion on the
//! caller's thread by [`ToolRegistry::call`]. Neither path retries or rewrites
//! errors returned by the tool.

use std::panic;
use std::thread;

use serde_json::Value;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tracing::debug;

use crate::error::{ToolError, ToolResult};
use crate::registry::{ToolExecutor, ToolFuture, ToolRecord, ToolRegistry};

impl ToolRecord {
    /// Invokes the tool, blocking until it completes.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by the tool unchanged.
    pub fn call(&self, input: Value) -> ToolResult<Value> {
        match self.executor() {
            ToolExecutor::Immediate(f) => f(input),
            ToolExecutor::Deferred(f) => block_on(f(input)),
        }
    }

    /// Invokes the tool from async code.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by the tool unchanged.
    pub async fn call_async(&self, input: Value) -> ToolResult<Value> {
        match self.executor() {
            ToolExecutor::Immediate(f) => f(input),
            ToolExecutor::Deferred(f) => f(input).await,
        }
    }
}

impl ToolRegistry {
    /// Looks up and invokes a tool, blocking until it completes.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] without invoking anything when `name` is
    /// not registered; otherwise propagates the tool's own error.
    pub fn call(&self, name: &str, input: Value) -> ToolResult<Value> {
        let record = self.get(name)?;
        debug!(tool = name, kind = ?record.concurrency_kind(), "invoking tool (blocking)");
        record.call(input)
    }

    /// Looks up and invokes a tool from async code.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] without invoking anything when `name` is
    /// not registered; otherwise propagates the tool's own error.
    pub async fn call_async(&self, name: &str, input: Value) -> ToolResult<Value> {
        let record = self.get(name)?;
        debug!(tool = name, kind = ?record.concurrency_kind(), "invoking tool");
        record.call_async(input).await
    }
}

fn block_on(future: ToolFuture) -> ToolResult<Value> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| handle.block_on(future))
        }
        // A current-thread runtime cannot be blocked from one of its own tasks.
        Ok(_) => thread::scope(|scope| {
            scope
                .spawn(|| run_to_completion(future))
                .join()
                .unwrap_or_else(|payload| panic::resume_unwind(payload))
        }),
        Err(_) => run_to_completion(future),
    }
}

fn run_to_completion(future: ToolFuture) -> ToolResult<Value> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| ToolError::execution(format!("failed to start tool runtime: {err}")))?;
    runtime.block_on(future)
}
