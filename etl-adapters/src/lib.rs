//! Adapters for the external systems an ETL pipeline talks to.
//!
//! [`spark::JobRunner`], [`hdfs::DistributedFsClient`] and
//! [`sql::QueryRunner`] each hold a [`fallback::FallbackChain`]: an ordered
//! list of strategies (a CLI on `PATH`, a REST endpoint, an embedded engine)
//! that is re-probed on every call. When nothing is usable the caller gets
//! [`AdapterError::BackendUnavailable`] naming every option and how to
//! enable it. [`tools::register_adapters`] exposes the adapters as tools.

#![warn(missing_docs, clippy::pedantic)]

pub mod error;
pub mod fallback;
pub mod hdfs;
pub mod process;
pub mod spark;
pub mod sql;
pub mod tools;

mod http_client;

pub use error::{AdapterError, AdapterResult, StrategyAttempt};
pub use fallback::{Availability, FallbackChain, Strategy};
pub use hdfs::{DistributedFsClient, DistributedFsConfig};
pub use process::SearchPath;
pub use spark::{JobRunner, JobRunnerConfig};
pub use sql::{QueryRunner, QueryRunnerConfig};
pub use tools::{Adapters, register_adapters};
