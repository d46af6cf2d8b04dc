//! Reads [`Config`] documents from disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::schema::Config;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The document is not valid YAML for the schema.
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document is not valid JSON for the schema.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl Config {
    /// Parses a YAML document. An empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] when the document does not match the
    /// schema.
    pub fn from_yaml_str(source: &str) -> ConfigResult<Self> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(source)?)
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] when the document does not match the
    /// schema.
    pub fn from_json_str(source: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Loads the file at `path`.
    ///
    /// Files ending in `.json` are parsed as JSON. Anything else is parsed as
    /// YAML, retrying as JSON if that fails.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise the parse
    /// error of the format tried first.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            return Self::from_json_str(&source);
        }

        Self::from_yaml_str(&source).or_else(|yaml_err| {
            debug!(path = %path.display(), error = %yaml_err, "YAML parse failed, trying JSON");
            Self::from_json_str(&source).map_err(|_| yaml_err)
        })
    }

    /// Like [`Config::from_file`], but falls back to the defaults when the
    /// file is missing or unparseable.
    ///
    /// The load error is handed back instead of logged, so callers can report
    /// it once logging is set up from the returned configuration.
    #[must_use]
    pub fn load_or_default(path: impl AsRef<Path>) -> (Self, Option<ConfigError>) {
        match Self::from_file(path) {
            Ok(config) => (config, None),
            Err(err) => (Self::default(), Some(err)),
        }
    }

    /// Pretty JSON rendering used for debug logging.
    #[must_use]
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|err| format!("<unprintable: {err}>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.mcp.name, "etl-mcp-server");
        assert_eq!(config.adapters.sql.fetch_limit, 100);
        assert_eq!(config.adapters.hdfs.webhdfs_url, "http://localhost:50070");
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = Config::from_yaml_str(
            "mcp:\n  debug: true\nadapters:\n  hdfs:\n    user: etl\n  sql:\n    fetch_limit: 5\n",
        )
        .unwrap();

        assert!(config.mcp.debug);
        assert_eq!(config.adapters.hdfs.user.as_deref(), Some("etl"));
        assert_eq!(config.adapters.hdfs.binary, "hdfs");
        assert_eq!(config.adapters.sql.fetch_limit, 5);
        assert!((config.adapters.spark.timeout_secs - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn json_files_are_parsed_as_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"mcp": {{"name": "etl-prod"}}}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.mcp.name, "etl-prod");
    }

    #[test]
    fn json_content_without_json_extension_loads() {
        let mut file = tempfile::Builder::new().suffix(".conf").tempfile().unwrap();
        write!(file, "{{\"mcp\": {{\"debug\": true}}}}").unwrap();

        assert!(Config::from_file(file.path()).unwrap().mcp.debug);
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = Config::from_yaml_str("mcp:\n  debug: [1, 2]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn missing_file_is_an_io_error_and_load_or_default_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");

        assert!(matches!(Config::from_file(&path), Err(ConfigError::Io { .. })));
        let (config, err) = Config::load_or_default(&path);
        assert_eq!(config, Config::default());
        assert!(matches!(err, Some(ConfigError::Io { .. })));
    }

    #[test]
    fn load_or_default_returns_a_readable_file_without_error() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(file, "mcp:\n  debug: true\n").unwrap();

        let (config, err) = Config::load_or_default(file.path());
        assert!(config.mcp.debug);
        assert!(err.is_none());
    }

    #[test]
    fn pretty_json_round_trips() {
        let config = Config::default();
        let rendered = config.to_pretty_json();
        assert!(rendered.contains("\"fetch_limit\": 100"));
        assert_eq!(Config::from_json_str(&rendered).unwrap(), config);
    }
}
