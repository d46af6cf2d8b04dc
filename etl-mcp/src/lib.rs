//! ETL MCP server facade.
//!
//! Re-exports the workspace crates and wires them together: [`App`] turns a
//! [`Config`](config::Config) into a populated tool registry, and
//! [`ToolServer`] is the host those tools are bound onto.

#![warn(missing_docs, clippy::pedantic)]

pub mod app;
pub mod server;

/// Tool registry, invocation bridge, and host binding.
pub use etl_tools as tools;

/// Spark, HDFS, and SQL adapters.
pub use etl_adapters as adapters;

/// Configuration schema and loading.
pub use etl_config as config;

/// Logging setup.
pub use etl_telemetry as telemetry;

pub use app::{App, AppError, run};
pub use server::ToolServer;
