//! Running the measurement binary.
//!
//! [`ExecRunner`] spawns one child per call, waits for it up to a timeout
//! and returns stdout followed by stderr. Anything other than a clean exit
//! within the timeout is an [`InvocationError`]; nothing is retried here.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::error::InvocationError;

/// Executes the measurement tool for one target.
///
/// The coordinator is generic over this trait so tests can substitute
/// canned output for a real process.
pub trait Runner: Send + Sync + 'static {
    fn run(
        &self,
        binary: &str,
        args: &[String],
        timeout: Duration,
    ) -> impl Future<Output = Result<String, InvocationError>> + Send;
}

/// Runs the binary as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecRunner;

impl Runner for ExecRunner {
    async fn run(
        &self,
        binary: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, InvocationError> {
        let program =
            resolve_binary(binary).ok_or_else(|| InvocationError::NotFound(binary.to_string()))?;
        log::debug!("COMMAND: {} {}", program.display(), args.join(" "));

        let t0 = Instant::now();
        let child = Command::new(&program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvocationError::Spawn {
                binary: binary.to_string(),
                source,
            })?;

        // On timeout the wait future is dropped with the child in it, and
        // kill_on_drop terminates the process.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(InvocationError::Io {
                    binary: binary.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(InvocationError::TimedOut {
                    binary: binary.to_string(),
                    timeout,
                });
            }
        };
        log::debug!(
            "{} exited with {} after {:.2}s",
            binary,
            output.status,
            t0.elapsed().as_secs_f64()
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(InvocationError::Exited {
                binary: binary.to_string(),
                status: output.status.to_string(),
                detail: tool_error(&stdout).or_else(|| last_line(&output.stderr)),
            });
        }

        let mut combined = stdout.into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }
}

/// Locate `binary` the way a shell would: paths containing a separator are
/// used as-is, bare names are searched for in `PATH`.
pub fn resolve_binary(binary: &str) -> Option<PathBuf> {
    if binary.is_empty() {
        return None;
    }
    let as_path = Path::new(binary);
    if as_path.components().count() > 1 {
        return is_executable(as_path).then(|| as_path.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .flat_map(|dir| candidates(&dir, binary))
        .find(|p| is_executable(p))
}

#[cfg(windows)]
fn candidates(dir: &Path, binary: &str) -> Vec<PathBuf> {
    vec![dir.join(binary), dir.join(format!("{binary}.exe"))]
}

#[cfg(not(windows))]
fn candidates(dir: &Path, binary: &str) -> Vec<PathBuf> {
    vec![dir.join(binary)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// iperf3 in `--json` mode reports its own failures as `{"error": "..."}`.
fn tool_error(stdout: &str) -> Option<String> {
    let doc: serde_json::Value = serde_json::from_str(stdout.trim()).ok()?;
    doc.get("error")?.as_str().map(str::to_string)
}

/// Last non-blank line of the tool's stderr, used when it printed no JSON
/// error (e.g. raw arguments without `--json`).
fn last_line(stderr: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .map(str::to_string)
}
