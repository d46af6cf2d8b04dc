//! Strongly typed configuration schema.
//!
//! Every field has a default, so an empty document (or no file at all)
//! yields a working configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub mcp: McpSettings,
    /// Backend adapter settings.
    pub adapters: AdapterSettings,
}

/// Server identity and verbosity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSettings {
    /// Name the server reports to hosts.
    pub name: String,
    /// Raises the default log level to `debug`.
    pub debug: bool,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            name: "etl-mcp-server".to_owned(),
            debug: false,
        }
    }
}

/// Per-backend settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    /// Batch job submission.
    pub spark: SparkSettings,
    /// Distributed filesystem access.
    pub hdfs: HdfsSettings,
    /// SQL execution.
    pub sql: SqlSettings,
}

/// Settings for the batch job runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparkSettings {
    /// Submission executable looked up on `PATH`.
    pub binary: String,
    /// Spark distribution used instead of the `SPARK_HOME` variable.
    pub spark_home: Option<PathBuf>,
    /// Limit for a job when the caller passes none.
    pub timeout_secs: f64,
}

impl Default for SparkSettings {
    fn default() -> Self {
        Self {
            binary: "spark-submit".to_owned(),
            spark_home: None,
            timeout_secs: 300.0,
        }
    }
}

/// Settings for the distributed filesystem client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdfsSettings {
    /// CLI executable looked up on `PATH`.
    pub binary: String,
    /// NameNode HTTP endpoint for the WebHDFS fallback.
    pub webhdfs_url: String,
    /// `user.name` sent with WebHDFS requests.
    pub user: Option<String>,
    /// Limit for a single command or request.
    pub timeout_secs: f64,
}

impl Default for HdfsSettings {
    fn default() -> Self {
        Self {
            binary: "hdfs".to_owned(),
            webhdfs_url: "http://localhost:50070".to_owned(),
            user: None,
            timeout_secs: 300.0,
        }
    }
}

/// Settings for the SQL runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlSettings {
    /// Rows returned when the caller passes no limit.
    pub fetch_limit: usize,
}

impl Default for SqlSettings {
    fn default() -> Self {
        Self { fetch_limit: 100 }
    }
}
