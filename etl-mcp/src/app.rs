//! Builds the tool registry from configuration and binds it onto a server.

use std::sync::Arc;
use std::time::Duration;

use etl_adapters::{
    AdapterError, Adapters, DistributedFsClient, DistributedFsConfig, JobRunner, JobRunnerConfig,
    QueryRunner, QueryRunnerConfig, register_adapters,
};
use etl_config::{AdapterSettings, Config};
use etl_tools::{BindReport, ToolError, ToolRegistry, bind};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::server::ToolServer;

/// Errors raised while assembling the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// A configured value is out of range.
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// An adapter rejected its configuration.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Tool registration failed.
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Configured application: settings plus the populated registry.
#[derive(Debug)]
pub struct App {
    config: Config,
    registry: Arc<ToolRegistry>,
}

impl App {
    /// Builds the adapters described by `config` and registers their tools.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidSetting`] or [`AppError::Adapter`] when the
    /// configuration cannot be applied.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let adapters = build_adapters(&config.adapters)?;
        let mut registry = ToolRegistry::new();
        register_adapters(&mut registry, &adapters)?;

        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared, read-only registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Creates a server named after the configuration and binds every tool
    /// onto it.
    #[must_use]
    pub fn serve(&self) -> (ToolServer, BindReport) {
        let mut server = ToolServer::new(&self.config.mcp.name);
        let report = bind(&mut server, &self.registry);
        (server, report)
    }
}

/// Assembles the application and returns the bound server.
///
/// # Errors
///
/// See [`App::new`].
pub fn run(config: Config) -> Result<ToolServer, AppError> {
    debug!(config = %config.to_pretty_json(), "effective configuration");

    let app = App::new(config)?;
    let (server, report) = app.serve();
    if report.failed() > 0 {
        warn!(failed = report.failed(), "some tools could not be bound");
    }
    info!(
        server = server.name(),
        tools = ?server.tool_names(),
        bound = report.succeeded,
        "ETL MCP server ready"
    );
    Ok(server)
}

fn build_adapters(settings: &AdapterSettings) -> Result<Adapters, AppError> {
    let spark = &settings.spark;
    let mut jobs = JobRunnerConfig::default()
        .with_binary(&spark.binary)
        .with_default_timeout(seconds("adapters.spark.timeout_secs", spark.timeout_secs)?);
    if let Some(home) = &spark.spark_home {
        jobs = jobs.with_spark_home(home);
    }

    let hdfs = &settings.hdfs;
    let mut files = DistributedFsConfig::default()
        .with_binary(&hdfs.binary)
        .with_webhdfs_url(&hdfs.webhdfs_url)?
        .with_timeout(seconds("adapters.hdfs.timeout_secs", hdfs.timeout_secs)?);
    if let Some(user) = &hdfs.user {
        files = files.with_user(user);
    }

    let queries = QueryRunnerConfig::default().with_fetch_limit(settings.sql.fetch_limit);

    Ok(Adapters::new(
        JobRunner::new(jobs),
        DistributedFsClient::new(files),
        QueryRunner::new(queries),
    ))
}

fn seconds(field: &'static str, secs: f64) -> Result<Duration, AppError> {
    if secs <= 0.0 {
        return Err(AppError::InvalidSetting {
            field,
            reason: "must be positive".to_owned(),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|err| AppError::InvalidSetting {
        field,
        reason: err.to_string(),
    })
}
