//! Configuration for the ETL MCP server.
//!
//! [`schema`] holds the typed settings, every field defaulted, and [`loader`]
//! reads them from YAML or JSON files.

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigResult};
pub use schema::{AdapterSettings, Config, HdfsSettings, McpSettings, SparkSettings, SqlSettings};
