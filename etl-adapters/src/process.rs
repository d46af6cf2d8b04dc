//! Child-process helpers: PATH probing and bounded execution.

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{Instant as TokioInstant, timeout_at};
use tracing::{debug, warn};

use crate::error::{AdapterError, AdapterResult};

/// Where to look for backend executables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SearchPath {
    /// The `PATH` of the current process, read at probe time.
    #[default]
    Inherit,
    /// An explicit, platform-formatted list of directories.
    Fixed(OsString),
}

impl SearchPath {
    /// Search only the given directories.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if a directory contains the
    /// platform's path separator.
    pub fn fixed<I, P>(dirs: I) -> AdapterResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        env::join_paths(dirs.into_iter().map(|dir| dir.as_ref().to_path_buf()))
            .map(Self::Fixed)
            .map_err(|err| AdapterError::configuration(format!("invalid search path: {err}")))
    }

    /// Resolves `program` to an executable file, if one exists.
    #[must_use]
    pub fn find(&self, program: &str) -> Option<PathBuf> {
        let candidate = Path::new(program);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }

        let dirs = match self {
            Self::Inherit => env::var_os("PATH")?,
            Self::Fixed(dirs) => dirs.clone(),
        };
        env::split_paths(&dirs)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(program))
            .find(|path| is_executable(path))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Captured result of a finished child process.
#[derive(Debug)]
pub struct CommandOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Converts a nonzero exit into [`AdapterError::Execution`] carrying stderr.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Execution`] when the process did not exit with 0.
    pub fn into_success(self, operation: &str) -> AdapterResult<Self> {
        if self.status.success() {
            return Ok(self);
        }
        let code = self
            .status
            .code()
            .map_or_else(|| "signal".to_owned(), |code| code.to_string());
        Err(AdapterError::execution(
            operation,
            format!("exit status {code}: {}", self.stderr.trim()),
        ))
    }
}

/// Runs `program` with `args`, waiting at most `limit`.
///
/// On timeout the child is killed and reaped before
/// [`AdapterError::Timeout`] is returned. A program that cannot be spawned is
/// reported as [`AdapterError::Unavailable`].
///
/// # Errors
///
/// See above; waiting on the child may also fail with
/// [`AdapterError::Execution`].
pub async fn run<I, S>(program: &Path, args: I, limit: Duration) -> AdapterResult<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let operation = program
        .file_name()
        .map_or_else(|| program.display().to_string(), |name| name.to_string_lossy().into_owned());

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| AdapterError::unavailable(format!("failed to launch `{operation}`: {err}")))?;

    let mut stdout = child.stdout.take().map(drain);
    let mut stderr = child.stderr.take().map(drain);
    let started = Instant::now();
    let deadline = deadline_after(started, limit);

    let status = match timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            abort(stdout, stderr);
            return Err(AdapterError::execution(
                &operation,
                format!("failed to wait for child: {err}"),
            ));
        }
        Err(_) => {
            if let Err(err) = child.kill().await {
                warn!(operation = %operation, error = %err, "failed to kill timed out child");
            }
            abort(stdout, stderr);
            return Err(timed_out(operation, started, limit));
        }
    };

    // Descendants that inherited the pipes can keep them open after the child exits.
    let drained = timeout_at(deadline, async {
        (collect(stdout.as_mut()).await, collect(stderr.as_mut()).await)
    })
    .await;
    let Ok((stdout_text, stderr_text)) = drained else {
        abort(stdout, stderr);
        return Err(timed_out(operation, started, limit));
    };

    let output = CommandOutput {
        status,
        stdout: stdout_text,
        stderr: stderr_text,
    };
    debug!(operation = %operation, status = %output.status, "child process finished");
    Ok(output)
}

fn deadline_after(started: Instant, limit: Duration) -> TokioInstant {
    let started = TokioInstant::from_std(started);
    started
        .checked_add(limit)
        .unwrap_or_else(|| started + Duration::from_secs(60 * 60 * 24 * 365))
}

fn timed_out(operation: String, started: Instant, limit: Duration) -> AdapterError {
    let elapsed = started.elapsed();
    warn!(operation = %operation, ?elapsed, ?limit, "child process timed out");
    AdapterError::Timeout {
        operation,
        elapsed,
        limit,
    }
}

fn drain<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(err) = pipe.read_to_end(&mut buf).await {
            debug!(error = %err, "failed to read child output");
        }
        buf
    })
}

async fn collect(pipe: Option<&mut JoinHandle<Vec<u8>>>) -> String {
    match pipe {
        Some(handle) => handle
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default(),
        None => String::new(),
    }
}

fn abort(stdout: Option<JoinHandle<Vec<u8>>>, stderr: Option<JoinHandle<Vec<u8>>>) {
    for handle in [stdout, stderr].into_iter().flatten() {
        handle.abort();
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::testing::script;
    use super::*;

    #[test]
    fn search_path_finds_only_executables() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "tool", "exit 0");
        std::fs::write(dir.path().join("plain"), "data").unwrap();

        let search = SearchPath::fixed([dir.path()]).unwrap();
        assert_eq!(search.find("tool"), Some(dir.path().join("tool")));
        assert_eq!(search.find("plain"), None);
        assert_eq!(search.find("absent"), None);
    }

    #[test]
    fn empty_search_path_finds_nothing() {
        assert_eq!(SearchPath::Fixed(OsString::new()).find("sh"), None);
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "say", "echo \"out $1\"\necho err >&2");

        let output = run(&program, ["hi"], Duration::from_secs(10)).await.unwrap();

        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "out hi");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn nonzero_exit_becomes_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "fail", "echo broken >&2\nexit 3");

        let output = run(&program, Vec::<String>::new(), Duration::from_secs(10))
            .await
            .unwrap();
        let err = output.into_success("fail").unwrap_err();

        assert!(matches!(
            err,
            AdapterError::Execution { ref reason, .. } if reason.contains("exit status 3") && reason.contains("broken")
        ));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let program = script(
            dir.path(),
            "slow",
            &format!("sleep 2\ntouch {}", marker.display()),
        );
        let limit = Duration::from_millis(300);

        let started = Instant::now();
        let err = run(&program, Vec::<String>::new(), limit).await.unwrap_err();

        assert!(started.elapsed() < limit + Duration::from_secs(1));
        assert!(matches!(err, AdapterError::Timeout { limit: l, .. } if l == limit));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists(), "child kept running after the timeout");
    }

    #[tokio::test]
    async fn background_descendant_holding_the_pipe_still_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "detach", "sleep 4 &\necho started");
        let limit = Duration::from_millis(500);

        let started = Instant::now();
        let err = run(&program, Vec::<String>::new(), limit).await.unwrap_err();

        assert!(
            started.elapsed() < limit + Duration::from_secs(1),
            "returned after {:?}",
            started.elapsed()
        );
        assert!(matches!(err, AdapterError::Timeout { limit: l, .. } if l == limit));
    }

    #[test]
    fn separator_inside_a_directory_is_rejected() {
        let err = SearchPath::fixed(["/opt/a:b"]).unwrap_err();
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let err = run(
            Path::new("/nonexistent/etl-missing-binary"),
            Vec::<String>::new(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AdapterError::Unavailable { .. }));
    }
}
