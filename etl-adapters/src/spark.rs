//! Batch job submission through `spark-submit`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AdapterError, AdapterResult};
use crate::fallback::{Availability, FallbackChain, Strategy};
use crate::process::{self, SearchPath};

/// Default limit for a submitted job.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(300);

const OPERATION: &str = "run_spark_job";

/// Configuration for [`JobRunner`].
#[derive(Clone, Debug)]
pub struct JobRunnerConfig {
    binary: String,
    search_path: SearchPath,
    spark_home: Option<PathBuf>,
    default_timeout: Duration,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            binary: "spark-submit".to_owned(),
            search_path: SearchPath::Inherit,
            spark_home: None,
            default_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }
}

impl JobRunnerConfig {
    /// Overrides the submission executable name.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Overrides where the executable is looked up.
    #[must_use]
    pub fn with_search_path(mut self, search_path: SearchPath) -> Self {
        self.search_path = search_path;
        self
    }

    /// Uses a fixed Spark distribution instead of reading `SPARK_HOME`.
    #[must_use]
    pub fn with_spark_home(mut self, spark_home: impl Into<PathBuf>) -> Self {
        self.spark_home = Some(spark_home.into());
        self
    }

    /// Sets the limit used when a call does not supply one.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// A single job submission.
#[derive(Clone, Debug)]
pub struct SubmitRequest {
    app_path: String,
    args: Vec<String>,
    timeout: Duration,
}

/// Submits batch jobs, preferring the CLI and falling back to guidance when
/// only the Spark libraries are present.
#[derive(Debug)]
pub struct JobRunner {
    chain: FallbackChain<SubmitRequest, String>,
    default_timeout: Duration,
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new(JobRunnerConfig::default())
    }
}

impl JobRunner {
    /// Builds a runner from the supplied configuration.
    #[must_use]
    pub fn new(config: JobRunnerConfig) -> Self {
        let chain = FallbackChain::new(OPERATION)
            .then(SubmitCli {
                binary: config.binary.clone(),
                search_path: config.search_path,
            })
            .then(SparkDistribution {
                binary: config.binary,
                spark_home: config.spark_home,
            });

        Self {
            chain,
            default_timeout: config.default_timeout,
        }
    }

    /// Submits `app_path` with `args`, waiting at most `timeout` (or the
    /// configured default).
    ///
    /// Returns the job's standard output, or guidance text when only the
    /// Spark libraries are installed.
    ///
    /// # Errors
    ///
    /// [`AdapterError::Timeout`] if the job outlives its limit (the child is
    /// killed), [`AdapterError::Execution`] on a nonzero exit, and
    /// [`AdapterError::BackendUnavailable`] when Spark is not installed.
    pub async fn submit(
        &self,
        app_path: impl Into<String>,
        args: Vec<String>,
        timeout: Option<Duration>,
    ) -> AdapterResult<String> {
        let request = SubmitRequest {
            app_path: app_path.into(),
            args,
            timeout: timeout.unwrap_or(self.default_timeout),
        };
        self.chain.run(&request).await
    }
}

struct SubmitCli {
    binary: String,
    search_path: SearchPath,
}

#[async_trait]
impl Strategy<SubmitRequest, String> for SubmitCli {
    fn name(&self) -> &'static str {
        "spark-submit"
    }

    fn remediation(&self) -> &'static str {
        "install Apache Spark and add `spark-submit` to PATH"
    }

    fn probe(&self, _request: &SubmitRequest) -> Availability {
        match self.search_path.find(&self.binary) {
            Some(_) => Availability::Available,
            None => Availability::Missing(format!("`{}` not found on PATH", self.binary)),
        }
    }

    async fn execute(&self, request: &SubmitRequest) -> AdapterResult<String> {
        let program = self.search_path.find(&self.binary).ok_or_else(|| {
            AdapterError::unavailable(format!("`{}` disappeared from PATH", self.binary))
        })?;

        let args = std::iter::once(&request.app_path).chain(&request.args);
        let output = process::run(&program, args, request.timeout)
            .await?
            .into_success(&self.binary)?;
        Ok(output.stdout)
    }
}

struct SparkDistribution {
    binary: String,
    spark_home: Option<PathBuf>,
}

impl SparkDistribution {
    fn home(&self) -> Option<PathBuf> {
        self.spark_home
            .clone()
            .or_else(|| env::var_os("SPARK_HOME").map(PathBuf::from))
    }
}

#[async_trait]
impl Strategy<SubmitRequest, String> for SparkDistribution {
    fn name(&self) -> &'static str {
        "spark-libraries"
    }

    fn remediation(&self) -> &'static str {
        "install a Spark distribution (or `pip install pyspark`) and point SPARK_HOME at it"
    }

    fn probe(&self, _request: &SubmitRequest) -> Availability {
        match self.home() {
            None => Availability::Missing("SPARK_HOME is not set".to_owned()),
            Some(home) if !home.join("jars").is_dir() => Availability::Missing(format!(
                "{} does not contain a Spark distribution",
                home.display()
            )),
            Some(_) => Availability::Available,
        }
    }

    async fn execute(&self, request: &SubmitRequest) -> AdapterResult<String> {
        let home = self
            .home()
            .ok_or_else(|| AdapterError::unavailable("SPARK_HOME is not set"))?;
        Ok(format!(
            "Spark libraries are available at {home} but `{binary}` is not on PATH.\n\
             Create a SparkSession programmatically, or add {home}/bin to PATH, to run {app}.",
            home = home.display(),
            binary = self.binary,
            app = request.app_path,
        ))
    }
}
