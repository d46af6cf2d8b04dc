//! SQL execution against PostgreSQL or an embedded SQLite engine.
//!
//! Connection strings select the backend: `postgres://` and `postgresql://`
//! go to the PostgreSQL client, `embedded:///<path>` (or the older
//! `sqlite:///<path>`) opens an embedded database. As with SQLAlchemy URLs,
//! the path after the third slash is taken verbatim, so absolute paths carry
//! a fourth slash. `embedded:///:memory:` is a single in-memory session owned
//! by the [`QueryRunner`]; its tables persist between calls.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};
use crate::fallback::{Availability, FallbackChain, Strategy};

/// Rows returned when the caller does not pass a limit.
pub const DEFAULT_FETCH_LIMIT: usize = 100;

/// Default limit for establishing a PostgreSQL connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const OPERATION: &str = "run_sql_query";

/// Configuration for [`QueryRunner`].
#[derive(Clone, Debug)]
pub struct QueryRunnerConfig {
    fetch_limit: usize,
    connect_timeout: Duration,
}

impl Default for QueryRunnerConfig {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl QueryRunnerConfig {
    /// Sets the row limit used when a call does not supply one.
    #[must_use]
    pub fn with_fetch_limit(mut self, fetch_limit: usize) -> Self {
        self.fetch_limit = fetch_limit;
        self
    }

    /// Sets how long to wait for a PostgreSQL connection.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// A single query.
#[derive(Clone, Debug)]
pub struct QueryRequest {
    conn_str: String,
    query: String,
    fetch_limit: usize,
}

/// Executes SQL and renders the result set as a JSON array of objects.
#[derive(Debug)]
pub struct QueryRunner {
    chain: FallbackChain<QueryRequest, Vec<Value>>,
    fetch_limit: usize,
}

impl Default for QueryRunner {
    fn default() -> Self {
        Self::new(QueryRunnerConfig::default())
    }
}

impl QueryRunner {
    /// Builds a runner with a fresh in-memory session.
    #[must_use]
    pub fn new(config: QueryRunnerConfig) -> Self {
        let chain = FallbackChain::new(OPERATION)
            .then(Postgres {
                connect_timeout: config.connect_timeout,
            })
            .then(Embedded::default());

        Self {
            chain,
            fetch_limit: config.fetch_limit,
        }
    }

    /// Runs `query` against `conn_str`, returning at most `fetch_limit` rows
    /// serialized as a JSON array string.
    ///
    /// # Errors
    ///
    /// [`AdapterError::Execution`] when the database rejects the query and
    /// [`AdapterError::BackendUnavailable`] when no backend accepts the
    /// connection string.
    pub async fn run(
        &self,
        conn_str: impl Into<String>,
        query: impl Into<String>,
        fetch_limit: Option<usize>,
    ) -> AdapterResult<String> {
        let request = QueryRequest {
            conn_str: conn_str.into(),
            query: query.into(),
            fetch_limit: fetch_limit.unwrap_or(self.fetch_limit),
        };
        let rows = self.chain.run(&request).await?;
        serde_json::to_string(&rows)
            .map_err(|err| AdapterError::execution(OPERATION, format!("failed to encode rows: {err}")))
    }
}

struct Postgres {
    #[cfg_attr(not(feature = "postgres"), allow(dead_code))]
    connect_timeout: Duration,
}

fn is_postgres_url(conn_str: &str) -> bool {
    conn_str.starts_with("postgres://") || conn_str.starts_with("postgresql://")
}

#[async_trait]
impl Strategy<QueryRequest, Vec<Value>> for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn remediation(&self) -> &'static str {
        "build with the `postgres` feature and pass a postgres:// connection string for a reachable server"
    }

    fn probe(&self, request: &QueryRequest) -> Availability {
        if !cfg!(feature = "postgres") {
            return Availability::Missing("built without the `postgres` feature".to_owned());
        }
        if is_postgres_url(&request.conn_str) {
            Availability::Available
        } else {
            Availability::Missing("connection string is not a postgres:// URL".to_owned())
        }
    }

    #[cfg(feature = "postgres")]
    async fn execute(&self, request: &QueryRequest) -> AdapterResult<Vec<Value>> {
        use tokio_postgres::error::SqlState;
        use tokio_postgres::{NoTls, SimpleQueryMessage};

        let (client, connection) =
            tokio::time::timeout(self.connect_timeout, tokio_postgres::connect(&request.conn_str, NoTls))
                .await
                .map_err(|_| AdapterError::unavailable("timed out connecting to PostgreSQL"))?
                .map_err(|err| AdapterError::unavailable(format!("cannot connect to PostgreSQL: {err}")))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                debug!(error = %err, "postgres connection closed with error");
            }
        });

        // Multiple statements cannot be prepared; their values stay in text form.
        let types = match client.prepare(&request.query).await {
            Ok(statement) => Some(
                statement
                    .columns()
                    .iter()
                    .map(|column| column.type_().clone())
                    .collect::<Vec<_>>(),
            ),
            Err(err) if err.code() == Some(&SqlState::SYNTAX_ERROR) => None,
            Err(err) => return Err(AdapterError::execution(OPERATION, err.to_string())),
        };

        let messages = client
            .simple_query(&request.query)
            .await
            .map_err(|err| AdapterError::execution(OPERATION, err.to_string()))?;

        // A statement that returns no rows leaves the previous result in place.
        let mut last = Vec::new();
        let mut current = Vec::new();
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    if current.len() < request.fetch_limit {
                        let object: Map<String, Value> = row
                            .columns()
                            .iter()
                            .enumerate()
                            .map(|(idx, column)| {
                                let ty = types.as_ref().and_then(|types| types.get(idx));
                                let value = row.get(idx).map_or(Value::Null, |text| typed_text(ty, text));
                                (column.name().to_owned(), value)
                            })
                            .collect();
                        current.push(Value::Object(object));
                    }
                }
                SimpleQueryMessage::CommandComplete(_) if !current.is_empty() => {
                    last = std::mem::take(&mut current);
                }
                _ => {}
            }
        }
        if !current.is_empty() {
            last = current;
        }
        Ok(last)
    }

    #[cfg(not(feature = "postgres"))]
    async fn execute(&self, _request: &QueryRequest) -> AdapterResult<Vec<Value>> {
        Err(AdapterError::unavailable("built without the `postgres` feature"))
    }
}

/// Converts a text-format PostgreSQL value into JSON using its column type.
///
/// Booleans, integers and finite floats become JSON primitives; every other
/// type keeps the server's text rendering.
#[cfg(feature = "postgres")]
fn typed_text(ty: Option<&tokio_postgres::types::Type>, text: &str) -> Value {
    use tokio_postgres::types::Type;

    let parsed = ty.and_then(|ty| {
        if *ty == Type::BOOL {
            match text {
                "t" => Some(Value::Bool(true)),
                "f" => Some(Value::Bool(false)),
                _ => None,
            }
        } else if [Type::INT2, Type::INT4, Type::INT8, Type::OID].contains(ty) {
            text.parse::<i64>().ok().map(Value::from)
        } else if [Type::FLOAT4, Type::FLOAT8].contains(ty) {
            text.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
        } else {
            None
        }
    });
    parsed.unwrap_or_else(|| Value::String(text.to_owned()))
}

enum Target {
    Memory,
    File(PathBuf),
}

fn embedded_target(conn_str: &str) -> Option<Target> {
    let rest = conn_str
        .strip_prefix("embedded:///")
        .or_else(|| conn_str.strip_prefix("sqlite:///"))?;
    match rest {
        "" => None,
        ":memory:" => Some(Target::Memory),
        path => Some(Target::File(PathBuf::from(path))),
    }
}

#[derive(Default)]
struct Embedded {
    memory: Arc<Mutex<Option<Connection>>>,
}

#[async_trait]
impl Strategy<QueryRequest, Vec<Value>> for Embedded {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn remediation(&self) -> &'static str {
        "use an embedded:///<path> or embedded:///:memory: connection string"
    }

    fn probe(&self, request: &QueryRequest) -> Availability {
        match embedded_target(&request.conn_str) {
            Some(_) => Availability::Available,
            None => Availability::Missing(
                "connection string is not an embedded:/// URL".to_owned(),
            ),
        }
    }

    async fn execute(&self, request: &QueryRequest) -> AdapterResult<Vec<Value>> {
        let target = embedded_target(&request.conn_str)
            .ok_or_else(|| AdapterError::unavailable("connection string is not an embedded:/// URL"))?;
        let query = request.query.clone();
        let limit = request.fetch_limit;
        let memory = Arc::clone(&self.memory);

        tokio::task::spawn_blocking(move || match target {
            Target::Memory => {
                let mut session = memory.lock().unwrap_or_else(PoisonError::into_inner);
                if session.is_none() {
                    *session = Some(open(":memory:")?);
                }
                match session.as_ref() {
                    Some(conn) => run_batch(conn, &query, limit),
                    None => Err(AdapterError::execution(OPERATION, "in-memory session is closed")),
                }
            }
            Target::File(path) => {
                debug!(path = %path.display(), "opening embedded database");
                let conn = open(&path)?;
                run_batch(&conn, &query, limit)
            }
        })
        .await
        .map_err(|err| AdapterError::execution(OPERATION, format!("query task failed: {err}")))?
    }
}

fn open(path: impl AsRef<std::path::Path>) -> AdapterResult<Connection> {
    let path = path.as_ref();
    Connection::open(path).map_err(|err| {
        AdapterError::execution(OPERATION, format!("failed to open {}: {err}", path.display()))
    })
}

/// Runs every statement in `sql`, keeping the rows of the last one that
/// produces a result set.
fn run_batch(conn: &Connection, sql: &str, limit: usize) -> AdapterResult<Vec<Value>> {
    let sql_error = |err: rusqlite::Error| AdapterError::execution(OPERATION, err.to_string());

    let mut last = Vec::new();
    let mut batch = Batch::new(conn, sql);
    while let Some(mut statement) = batch.next().map_err(sql_error)? {
        if statement.column_count() == 0 {
            statement.execute([]).map_err(sql_error)?;
            continue;
        }

        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let mut rows = statement.query([]).map_err(sql_error)?;
        let mut collected = Vec::new();
        let mut stepped = false;
        // The first step runs a row-returning write in full, even when no rows are kept.
        while !stepped || collected.len() < limit {
            let Some(row) = rows.next().map_err(sql_error)? else {
                break;
            };
            stepped = true;
            if collected.len() >= limit {
                break;
            }
            let mut object = Map::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(sql_error)?;
                object.insert(column.clone(), json_value(value));
            }
            collected.push(Value::Object(object));
        }
        last = collected;
    }
    Ok(last)
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => Value::from(int),
        ValueRef::Real(real) => serde_json::Number::from_f64(real)
            .map_or_else(|| Value::String(real.to_string()), Value::Number),
        ValueRef::Text(text) | ValueRef::Blob(text) => {
            Value::String(String::from_utf8_lossy(text).into_owned())
        }
    }
}
