//! Distributed filesystem access through the `hdfs` CLI or WebHDFS.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use hyper::body::{Bytes, to_bytes};
use hyper::header::{CONTENT_TYPE, LOCATION};
use hyper::{Body, HeaderMap, Request, StatusCode, Uri};
use serde::Deserialize;
use tokio::time::timeout;

use crate::error::{AdapterError, AdapterResult};
use crate::fallback::{Availability, FallbackChain, Strategy};
use crate::http_client::{HyperClient, namenode_client};
use crate::process::{self, SearchPath};

/// NameNode HTTP endpoint used when none is configured.
pub const DEFAULT_WEBHDFS_URL: &str = "http://localhost:50070";

/// Default limit for a single filesystem command or request.
pub const DEFAULT_HDFS_TIMEOUT: Duration = Duration::from_secs(300);

const LIST: &str = "hdfs_list";
const PUT: &str = "hdfs_put";

/// Configuration for [`DistributedFsClient`].
#[derive(Clone, Debug)]
pub struct DistributedFsConfig {
    binary: String,
    search_path: SearchPath,
    webhdfs_url: String,
    user: Option<String>,
    timeout: Duration,
}

impl Default for DistributedFsConfig {
    fn default() -> Self {
        Self {
            binary: "hdfs".to_owned(),
            search_path: SearchPath::Inherit,
            webhdfs_url: DEFAULT_WEBHDFS_URL.to_owned(),
            user: None,
            timeout: DEFAULT_HDFS_TIMEOUT,
        }
    }
}

impl DistributedFsConfig {
    /// Overrides the CLI executable name.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Overrides where the CLI is looked up.
    #[must_use]
    pub fn with_search_path(mut self, search_path: SearchPath) -> Self {
        self.search_path = search_path;
        self
    }

    /// Sets the WebHDFS endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the URL is not an absolute
    /// `http://` or `https://` URL.
    pub fn with_webhdfs_url(mut self, url: impl AsRef<str>) -> AdapterResult<Self> {
        let url = url.as_ref().trim().trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AdapterError::configuration(
                "WebHDFS URL must start with http:// or https://",
            ));
        }
        url.parse::<Uri>()
            .map_err(|err| AdapterError::configuration(format!("invalid WebHDFS URL: {err}")))?;
        url.clone_into(&mut self.webhdfs_url);
        Ok(self)
    }

    /// Sends `user.name` with every WebHDFS request.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the limit for CLI commands and HTTP requests.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Listing request.
#[derive(Clone, Debug)]
pub struct ListRequest {
    path: String,
}

/// Upload request.
#[derive(Clone, Debug)]
pub struct PutRequest {
    local_path: PathBuf,
    remote_path: String,
}

/// Lists and uploads files on a distributed filesystem.
#[derive(Debug)]
pub struct DistributedFsClient {
    list: FallbackChain<ListRequest, Vec<String>>,
    put: FallbackChain<PutRequest, String>,
}

impl Default for DistributedFsClient {
    fn default() -> Self {
        Self::new(DistributedFsConfig::default())
    }
}

impl DistributedFsClient {
    /// Builds a client from the supplied configuration.
    #[must_use]
    pub fn new(config: DistributedFsConfig) -> Self {
        let cli = HdfsCli {
            binary: config.binary,
            search_path: config.search_path,
            timeout: config.timeout,
        };
        let web = WebHdfs {
            client: namenode_client(),
            base_url: config.webhdfs_url,
            user: config.user,
            timeout: config.timeout,
        };

        Self {
            list: FallbackChain::new(LIST).then(cli.clone()).then(web.clone()),
            put: FallbackChain::new(PUT).then(cli).then(web),
        }
    }

    /// Lists the entries under `path`, one full path per entry.
    ///
    /// # Errors
    ///
    /// [`AdapterError::Execution`] if the backend rejects the request and
    /// [`AdapterError::BackendUnavailable`] if neither backend is reachable.
    pub async fn list(&self, path: impl Into<String>) -> AdapterResult<Vec<String>> {
        self.list.run(&ListRequest { path: path.into() }).await
    }

    /// Uploads `local_path` to `remote_path`.
    ///
    /// # Errors
    ///
    /// [`AdapterError::Execution`] if the backend rejects the upload and
    /// [`AdapterError::BackendUnavailable`] if neither backend is reachable.
    pub async fn put(
        &self,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
    ) -> AdapterResult<String> {
        let request = PutRequest {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        };
        self.put.run(&request).await
    }
}

#[derive(Clone)]
struct HdfsCli {
    binary: String,
    search_path: SearchPath,
    timeout: Duration,
}

impl HdfsCli {
    const REMEDIATION: &'static str = "install the Hadoop CLI and add `hdfs` to PATH";

    fn availability(&self) -> Availability {
        match self.search_path.find(&self.binary) {
            Some(_) => Availability::Available,
            None => Availability::Missing(format!("`{}` not found on PATH", self.binary)),
        }
    }

    async fn dfs(&self, operation: &str, args: &[&OsStr]) -> AdapterResult<String> {
        let program = self.search_path.find(&self.binary).ok_or_else(|| {
            AdapterError::unavailable(format!("`{}` disappeared from PATH", self.binary))
        })?;
        let output = process::run(&program, args, self.timeout)
            .await?
            .into_success(operation)?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl Strategy<ListRequest, Vec<String>> for HdfsCli {
    fn name(&self) -> &'static str {
        "hdfs-cli"
    }

    fn remediation(&self) -> &'static str {
        Self::REMEDIATION
    }

    fn probe(&self, _request: &ListRequest) -> Availability {
        self.availability()
    }

    async fn execute(&self, request: &ListRequest) -> AdapterResult<Vec<String>> {
        let stdout = self
            .dfs(
                "hdfs dfs -ls",
                &[
                    OsStr::new("dfs"),
                    OsStr::new("-ls"),
                    OsStr::new("-C"),
                    OsStr::new(&request.path),
                ],
            )
            .await?;
        Ok(parse_listing(&stdout))
    }
}

#[async_trait]
impl Strategy<PutRequest, String> for HdfsCli {
    fn name(&self) -> &'static str {
        "hdfs-cli"
    }

    fn remediation(&self) -> &'static str {
        Self::REMEDIATION
    }

    fn probe(&self, _request: &PutRequest) -> Availability {
        self.availability()
    }

    async fn execute(&self, request: &PutRequest) -> AdapterResult<String> {
        let stdout = self
            .dfs(
                "hdfs dfs -put",
                &[
                    OsStr::new("dfs"),
                    OsStr::new("-put"),
                    request.local_path.as_os_str(),
                    OsStr::new(&request.remote_path),
                ],
            )
            .await?;
        let stdout = stdout.trim();
        Ok(if stdout.is_empty() {
            "uploaded".to_owned()
        } else {
            stdout.to_owned()
        })
    }
}

fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Clone)]
struct WebHdfs {
    client: HyperClient,
    base_url: String,
    user: Option<String>,
    timeout: Duration,
}

impl WebHdfs {
    const REMEDIATION: &'static str =
        "enable WebHDFS on the NameNode and configure its URL (default http://localhost:50070)";

    fn availability(&self) -> Availability {
        match self.base_url.parse::<Uri>() {
            Ok(_) => Availability::Available,
            Err(err) => Availability::Missing(format!("invalid WebHDFS URL: {err}")),
        }
    }

    fn uri(&self, path: &str, op: &str, extra: &[(&str, &str)]) -> AdapterResult<Uri> {
        let mut url = format!("{}/webhdfs/v1{}?op={op}", self.base_url, encode_path(path));
        if let Some(user) = &self.user {
            url.push_str("&user.name=");
            url.push_str(&urlencoding::encode(user));
        }
        for (key, value) in extra {
            url.push_str(&format!("&{key}={}", urlencoding::encode(value)));
        }
        url.parse::<Uri>()
            .map_err(|err| AdapterError::invalid_request(format!("invalid path `{path}`: {err}")))
    }

    async fn send(&self, request: Request<Body>) -> AdapterResult<(StatusCode, HeaderMap, Bytes)> {
        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| AdapterError::unavailable("WebHDFS request timed out"))?
            .map_err(|err| AdapterError::unavailable(format!("WebHDFS unreachable: {err}")))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body()).await.map_err(|err| {
            AdapterError::unavailable(format!("failed to read WebHDFS response: {err}"))
        })?;
        Ok((status, headers, body))
    }
}

#[async_trait]
impl Strategy<ListRequest, Vec<String>> for WebHdfs {
    fn name(&self) -> &'static str {
        "webhdfs"
    }

    fn remediation(&self) -> &'static str {
        Self::REMEDIATION
    }

    fn probe(&self, _request: &ListRequest) -> Availability {
        self.availability()
    }

    async fn execute(&self, request: &ListRequest) -> AdapterResult<Vec<String>> {
        let uri = self.uri(&request.path, "LISTSTATUS", &[])?;
        let http = Request::get(uri)
            .body(Body::empty())
            .map_err(|err| AdapterError::invalid_request(format!("failed to build request: {err}")))?;

        let (status, _, body) = self.send(http).await?;
        if !status.is_success() {
            return Err(remote_error(LIST, status, &body));
        }

        let listing: ListStatusResponse = serde_json::from_slice(&body).map_err(|err| {
            AdapterError::execution(LIST, format!("malformed LISTSTATUS response: {err}"))
        })?;
        Ok(listing
            .file_statuses
            .file_status
            .into_iter()
            .map(|entry| child_path(&request.path, &entry.path_suffix))
            .collect())
    }
}

#[async_trait]
impl Strategy<PutRequest, String> for WebHdfs {
    fn name(&self) -> &'static str {
        "webhdfs"
    }

    fn remediation(&self) -> &'static str {
        Self::REMEDIATION
    }

    fn probe(&self, _request: &PutRequest) -> Availability {
        self.availability()
    }

    async fn execute(&self, request: &PutRequest) -> AdapterResult<String> {
        let data = tokio::fs::read(&request.local_path).await.map_err(|err| {
            AdapterError::invalid_request(format!(
                "cannot read {}: {err}",
                request.local_path.display()
            ))
        })?;

        // CREATE answers with a redirect to the DataNode that takes the bytes.
        let uri = self.uri(&request.remote_path, "CREATE", &[("overwrite", "false")])?;
        let http = Request::put(uri)
            .body(Body::empty())
            .map_err(|err| AdapterError::invalid_request(format!("failed to build request: {err}")))?;
        let (status, headers, body) = self.send(http).await?;
        if !status.is_redirection() {
            return Err(remote_error(PUT, status, &body));
        }
        let location = headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Uri>().ok())
            .ok_or_else(|| AdapterError::execution(PUT, "CREATE redirect carried no usable Location"))?;

        let http = Request::put(location)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(data))
            .map_err(|err| AdapterError::invalid_request(format!("failed to build request: {err}")))?;
        let (status, _, body) = self.send(http).await?;
        if !status.is_success() {
            return Err(remote_error(PUT, status, &body));
        }
        Ok("uploaded".to_owned())
    }
}

fn encode_path(path: &str) -> String {
    let segments: Vec<_> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("/{}", segments.join("/"))
}

fn child_path(parent: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return parent.to_owned();
    }
    format!("{}/{suffix}", parent.trim_end_matches('/'))
}

fn remote_error(operation: &str, status: StatusCode, body: &[u8]) -> AdapterError {
    let reason = serde_json::from_slice::<RemoteExceptionResponse>(body).map_or_else(
        |_| String::from_utf8_lossy(body).trim().to_owned(),
        |remote| {
            format!(
                "{}: {}",
                remote.remote_exception.exception, remote.remote_exception.message
            )
        },
    );
    AdapterError::execution(operation, format!("WebHDFS returned {status}: {reason}"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListStatusResponse {
    file_statuses: FileStatuses,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileStatuses {
    #[serde(default)]
    file_status: Vec<FileStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileStatus {
    #[serde(default)]
    path_suffix: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteExceptionResponse {
    remote_exception: RemoteException,
}

#[derive(Debug, Deserialize)]
struct RemoteException {
    exception: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    #[test]
    fn listing_drops_blank_lines_and_trims() {
        let parsed = parse_listing("/data/a\n\n   /data/b  \n\t\n");
        assert_eq!(parsed, vec!["/data/a", "/data/b"]);
    }

    #[test]
    fn paths_are_encoded_per_segment() {
        assert_eq!(encode_path("/data/my file"), "/data/my%20file");
        assert_eq!(encode_path("relative/x"), "/relative/x");
        assert_eq!(encode_path("/"), "/");
    }

    #[test]
    fn child_paths_join_cleanly() {
        assert_eq!(child_path("/data/", "a.csv"), "/data/a.csv");
        assert_eq!(child_path("/", "tmp"), "/tmp");
        assert_eq!(child_path("/data/a.csv", ""), "/data/a.csv");
    }

    #[test]
    fn remote_exceptions_are_summarised() {
        let body = br#"{"RemoteException":{"exception":"FileNotFoundException","javaClassName":"java.io.FileNotFoundException","message":"File /nope does not exist."}}"#;
        let err = remote_error(LIST, StatusCode::NOT_FOUND, body);
        assert!(err.to_string().contains("FileNotFoundException: File /nope does not exist."));
    }

    #[test]
    fn rejects_webhdfs_url_without_scheme() {
        let err = DistributedFsConfig::default()
            .with_webhdfs_url("namenode:50070")
            .expect_err("missing scheme should error");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    /// Serves one canned response per connection and records each request.
    async fn fake_namenode(
        responses: impl FnOnce(&str) -> Vec<String>,
    ) -> (String, JoinHandle<Vec<(String, Vec<u8>)>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let responses = responses(&base);

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let head_end = loop {
                    let mut chunk = [0_u8; 1024];
                    let n = socket.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                    assert!(n > 0, "client closed before sending headers");
                };
                let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
                let length = head
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                let mut body = buf[head_end..].to_vec();
                while body.len() < length {
                    let mut chunk = [0_u8; 1024];
                    let n = socket.read(&mut chunk).await.unwrap();
                    assert!(n > 0, "client closed mid-body");
                    body.extend_from_slice(&chunk[..n]);
                }
                let request_line = head.lines().next().unwrap_or_default().to_owned();
                seen.push((request_line, body));
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            seen
        });

        (base, handle)
    }

    fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {status}\r\nConnection: close\r\nContent-Length: {}\r\n", body.len());
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out.push_str(body);
        out
    }

    fn webhdfs_only(base: &str) -> DistributedFsClient {
        DistributedFsClient::new(
            DistributedFsConfig::default()
                .with_search_path(SearchPath::Fixed(std::ffi::OsString::new()))
                .with_webhdfs_url(base)
                .unwrap()
                .with_user("etl")
                .with_timeout(Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn webhdfs_lists_directory() {
        let listing = r#"{"FileStatuses":{"FileStatus":[{"pathSuffix":"a.csv","type":"FILE"},{"pathSuffix":"raw","type":"DIRECTORY"}]}}"#;
        let (base, server) = fake_namenode(|_| {
            vec![response("200 OK", &[("Content-Type", "application/json")], listing)]
        })
        .await;

        let entries = webhdfs_only(&base).list("/data").await.unwrap();

        assert_eq!(entries, vec!["/data/a.csv", "/data/raw"]);
        let seen = server.await.unwrap();
        assert_eq!(
            seen[0].0,
            "GET /webhdfs/v1/data?op=LISTSTATUS&user.name=etl HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn webhdfs_error_status_is_an_execution_error() {
        let body = r#"{"RemoteException":{"exception":"AccessControlException","message":"Permission denied"}}"#;
        let (base, server) = fake_namenode(|_| vec![response("403 Forbidden", &[], body)]).await;

        let err = webhdfs_only(&base).list("/secret").await.unwrap_err();

        assert!(matches!(err, AdapterError::Execution { ref reason, .. } if reason.contains("Permission denied")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn webhdfs_upload_follows_redirect() {
        let (base, server) = fake_namenode(|base| {
            let datanode = format!("{base}/datanode/put?op=CREATE");
            vec![
                response("307 Temporary Redirect", &[("Location", datanode.as_str())], ""),
                response("201 Created", &[], ""),
            ]
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("rows.csv");
        std::fs::write(&local, "id\n1\n").unwrap();

        let outcome = webhdfs_only(&base).put(&local, "/landing/rows.csv").await.unwrap();

        assert_eq!(outcome, "uploaded");
        let seen = server.await.unwrap();
        assert!(seen[0].0.starts_with("PUT /webhdfs/v1/landing/rows.csv?op=CREATE&user.name=etl"));
        assert!(seen[0].0.contains("overwrite=false"));
        assert!(seen[1].0.starts_with("PUT /datanode/put?op=CREATE"));
        assert_eq!(seen[1].1, b"id\n1\n");
    }

    #[tokio::test]
    async fn webhdfs_upload_of_missing_file_is_rejected() {
        let (base, _server) = fake_namenode(|_| Vec::new()).await;

        let err = webhdfs_only(&base)
            .put("/definitely/not/here.csv", "/landing/x.csv")
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::InvalidRequest { .. }));
    }

    #[cfg(unix)]
    mod cli {
        use super::*;

        use crate::process::testing::script;

        #[tokio::test]
        async fn cli_list_parses_stdout_and_passes_flags() {
            let bin = tempfile::tempdir().unwrap();
            let args = bin.path().join("args");
            script(
                bin.path(),
                "hdfs",
                &format!("echo \"$@\" > {}\nprintf '/data/a\\n\\n  /data/b  \\n'", args.display()),
            );
            let client = DistributedFsClient::new(
                DistributedFsConfig::default().with_search_path(SearchPath::fixed([bin.path()]).unwrap()),
            );

            let entries = client.list("/data").await.unwrap();

            assert_eq!(entries, vec!["/data/a", "/data/b"]);
            assert_eq!(std::fs::read_to_string(&args).unwrap().trim(), "dfs -ls -C /data");
        }

        #[tokio::test]
        async fn cli_put_reports_upload() {
            let bin = tempfile::tempdir().unwrap();
            let args = bin.path().join("args");
            script(bin.path(), "hdfs", &format!("echo \"$@\" > {}", args.display()));
            let client = DistributedFsClient::new(
                DistributedFsConfig::default().with_search_path(SearchPath::fixed([bin.path()]).unwrap()),
            );

            let outcome = client.put("/tmp/local.csv", "/remote/x.csv").await.unwrap();

            assert_eq!(outcome, "uploaded");
            assert_eq!(
                std::fs::read_to_string(&args).unwrap().trim(),
                "dfs -put /tmp/local.csv /remote/x.csv"
            );
        }

        #[tokio::test]
        async fn cli_failure_carries_stderr() {
            let bin = tempfile::tempdir().unwrap();
            script(bin.path(), "hdfs", "echo 'ls: `/nope`: No such file or directory' >&2\nexit 1");
            let client = DistributedFsClient::new(
                DistributedFsConfig::default().with_search_path(SearchPath::fixed([bin.path()]).unwrap()),
            );

            let err = client.list("/nope").await.unwrap_err();

            assert!(matches!(err, AdapterError::Execution { ref reason, .. } if reason.contains("No such file")));
        }
    }

    #[tokio::test]
    async fn no_backend_names_both_options() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = webhdfs_only(&base).list("/data").await.unwrap_err();

        let message = err.to_string();
        assert!(matches!(err, AdapterError::BackendUnavailable { operation: LIST, .. }));
        assert!(message.contains("add `hdfs` to PATH"));
        assert!(message.contains("enable WebHDFS"));
    }
}
