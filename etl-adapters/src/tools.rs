//! Registers the adapters as tools.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use etl_tools::{ToolError, ToolMetadata, ToolRecord, ToolRegistry, ToolResult, parse_args};
use serde::Deserialize;
use serde_json::Value;

use crate::hdfs::DistributedFsClient;
use crate::spark::JobRunner;
use crate::sql::QueryRunner;

/// The adapter instances shared by the registered tools.
#[derive(Clone, Debug, Default)]
pub struct Adapters {
    jobs: Arc<JobRunner>,
    files: Arc<DistributedFsClient>,
    queries: Arc<QueryRunner>,
}

impl Adapters {
    /// Bundles configured adapters.
    #[must_use]
    pub fn new(jobs: JobRunner, files: DistributedFsClient, queries: QueryRunner) -> Self {
        Self {
            jobs: Arc::new(jobs),
            files: Arc::new(files),
            queries: Arc::new(queries),
        }
    }

    /// Batch job runner.
    #[must_use]
    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }

    /// Distributed filesystem client.
    #[must_use]
    pub fn files(&self) -> &DistributedFsClient {
        &self.files
    }

    /// SQL runner.
    #[must_use]
    pub fn queries(&self) -> &QueryRunner {
        &self.queries
    }
}

#[derive(Debug, Deserialize)]
struct SparkJobArgs {
    app_path: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    timeout: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct PutArgs {
    local_path: PathBuf,
    hdfs_path: String,
}

#[derive(Debug, Deserialize)]
struct QueryArgs {
    conn_str: String,
    query: String,
    #[serde(default)]
    fetch: Option<usize>,
}

/// Registers `run_spark_job`, `hdfs_list`, `hdfs_put` and `run_sql_query`.
///
/// All four are deferred tools. Registration follows the registry's
/// overwrite rule, so calling this twice leaves one record per name.
///
/// # Errors
///
/// Returns [`ToolError::InvalidMetadata`] if a tool name is rejected.
pub fn register_adapters(registry: &mut ToolRegistry, adapters: &Adapters) -> ToolResult<()> {
    let jobs = Arc::clone(&adapters.jobs);
    registry.register(ToolRecord::deferred(
        ToolMetadata::new("run_spark_job")?
            .with_description("Submit a batch job with spark-submit and return its output."),
        move |input: Value| {
            let jobs = Arc::clone(&jobs);
            async move {
                let args: SparkJobArgs = parse_args("run_spark_job", input)?;
                let limit = args
                    .timeout
                    .map(|secs| {
                        Duration::try_from_secs_f64(secs).map_err(|err| ToolError::InvalidInput {
                            tool: "run_spark_job".to_owned(),
                            reason: format!("timeout: {err}"),
                        })
                    })
                    .transpose()?;
                let output = jobs.submit(args.app_path, args.args, limit).await?;
                Ok(Value::String(output))
            }
        },
    ));

    let files = Arc::clone(&adapters.files);
    registry.register(ToolRecord::deferred(
        ToolMetadata::new("hdfs_list")?
            .with_description("List the entries under a distributed filesystem path."),
        move |input: Value| {
            let files = Arc::clone(&files);
            async move {
                let args: ListArgs = parse_args("hdfs_list", input)?;
                let entries = files.list(args.path).await?;
                Ok(Value::from(entries))
            }
        },
    ));

    let files = Arc::clone(&adapters.files);
    registry.register(ToolRecord::deferred(
        ToolMetadata::new("hdfs_put")?
            .with_description("Upload a local file to the distributed filesystem."),
        move |input: Value| {
            let files = Arc::clone(&files);
            async move {
                let args: PutArgs = parse_args("hdfs_put", input)?;
                let outcome = files.put(args.local_path, args.hdfs_path).await?;
                Ok(Value::String(outcome))
            }
        },
    ));

    let queries = Arc::clone(&adapters.queries);
    registry.register(ToolRecord::deferred(
        ToolMetadata::new("run_sql_query")?
            .with_description("Run SQL and return the rows as a JSON array string."),
        move |input: Value| {
            let queries = Arc::clone(&queries);
            async move {
                let args: QueryArgs = parse_args("run_sql_query", input)?;
                let rows = queries.run(args.conn_str, args.query, args.fetch).await?;
                Ok(Value::String(rows))
            }
        },
    ));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use etl_tools::ConcurrencyKind;
    use serde_json::json;

    use crate::hdfs::DistributedFsConfig;
    use crate::process::SearchPath;
    use crate::spark::JobRunnerConfig;
    use crate::sql::QueryRunnerConfig;

    fn offline_adapters() -> Adapters {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let nowhere = SearchPath::Fixed(std::ffi::OsString::new());
        Adapters::new(
            JobRunner::new(
                JobRunnerConfig::default()
                    .with_search_path(nowhere.clone())
                    .with_spark_home("/nonexistent/spark"),
            ),
            DistributedFsClient::new(
                DistributedFsConfig::default()
                    .with_search_path(nowhere)
                    .with_webhdfs_url(closed)
                    .unwrap(),
            ),
            QueryRunner::new(QueryRunnerConfig::default()),
        )
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register_adapters(&mut registry, &offline_adapters()).unwrap();
        registry
    }

    #[test]
    fn registers_four_deferred_tools_in_order() {
        let registry = registry();

        assert_eq!(
            registry.list(),
            vec!["run_spark_job", "hdfs_list", "hdfs_put", "run_sql_query"]
        );
        assert!(registry
            .iter()
            .all(|record| record.concurrency_kind() == ConcurrencyKind::Deferred
                && record.description().is_some()));
    }

    #[test]
    fn registering_twice_keeps_one_record_per_name() {
        let mut registry = registry();
        register_adapters(&mut registry, &Adapters::default()).unwrap();
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn sql_tool_returns_json_text() {
        let registry = registry();
        let conn = "embedded:///:memory:";

        registry
            .call_async(
                "run_sql_query",
                json!({ "conn_str": conn, "query": "CREATE TABLE t(x INT); INSERT INTO t VALUES (1),(2);" }),
            )
            .await
            .unwrap();
        let rows = registry
            .call_async("run_sql_query", json!([conn, "SELECT x FROM t", 1]))
            .await
            .unwrap();

        assert_eq!(rows, json!(r#"[{"x":1}]"#));
    }

    #[tokio::test]
    async fn missing_backends_surface_as_backend_unavailable() {
        let registry = registry();

        let err = registry
            .call_async("hdfs_list", json!({ "path": "/data" }))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ToolError::BackendUnavailable { ref operation, ref diagnostic }
                if operation == "hdfs_list" && diagnostic.contains("webhdfs")
        ));
    }

    #[tokio::test]
    async fn negative_timeout_is_invalid_input() {
        let registry = registry();

        let err = registry
            .call_async("run_spark_job", json!({ "app_path": "job.py", "timeout": -1.0 }))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::InvalidInput { ref tool, .. } if tool == "run_spark_job"));
    }

    #[tokio::test]
    async fn missing_arguments_are_invalid_input() {
        let registry = registry();

        let err = registry.call_async("hdfs_put", json!({ "local_path": "x" })).await.unwrap_err();

        assert!(matches!(err, ToolError::InvalidInput { ref tool, .. } if tool == "hdfs_put"));
    }
}
