//! Subprocess-backed runner for the real `terraform` executable.
//!
//! All children are spawned with `kill_on_drop(true)`. When a deadline is
//! configured, an invocation that outlives it is dropped (and therefore
//! killed) and reported as `RunnerError::TimedOut`.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::{CommandRunner, StreamingProcess};
use crate::error::RunnerError;

/// Runs an external tool binary (by default `terraform` from `PATH`).
#[derive(Debug, Clone)]
pub struct TerraformRunner {
    exec_path: PathBuf,
    timeout: Option<Duration>,
}

impl Default for TerraformRunner {
    fn default() -> Self {
        Self::new("terraform")
    }
}

impl TerraformRunner {
    pub fn new(exec_path: impl Into<PathBuf>) -> Self {
        Self {
            exec_path: exec_path.into(),
            timeout: None,
        }
    }

    /// Abort any single invocation that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn describe(&self, args: &[String]) -> String {
        let mut line = self.exec_path.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn command(&self, dir: &Path, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.exec_path);
        cmd.args(args).current_dir(dir).kill_on_drop(true);
        cmd
    }

    /// Await `fut` under the configured deadline, if any.
    async fn within_deadline<T>(
        &self,
        command: &str,
        fut: impl std::future::Future<Output = std::io::Result<T>>,
    ) -> Result<T, RunnerError> {
        let result = match self.timeout {
            Some(after) => tokio::time::timeout(after, fut).await.map_err(|_| {
                RunnerError::TimedOut {
                    command: command.to_string(),
                    after,
                }
            })?,
            None => fut.await,
        };
        result.map_err(|source| RunnerError::Io {
            command: command.to_string(),
            source,
        })
    }

    fn check_output(command: String, output: Output) -> Result<Vec<u8>, RunnerError> {
        if output.status.success() {
            return Ok(output.stdout);
        }
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(RunnerError::NonZeroExit {
            command,
            code: output.status.code(),
            output: combined,
        })
    }
}

#[async_trait]
impl CommandRunner for TerraformRunner {
    async fn run(&self, dir: &Path, args: &[String]) -> Result<Vec<u8>, RunnerError> {
        let command = self.describe(args);
        tracing::debug!(command = %command, dir = %dir.display(), "running command");

        let mut cmd = self.command(dir, args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            command: command.clone(),
            source,
        })?;
        let output = self
            .within_deadline(&command, child.wait_with_output())
            .await?;
        Self::check_output(command, output)
    }

    async fn run_with_input(
        &self,
        dir: &Path,
        args: &[String],
        input: &str,
    ) -> Result<Vec<u8>, RunnerError> {
        let command = self.describe(args);
        tracing::debug!(command = %command, dir = %dir.display(), "running command with stdin");

        let mut cmd = self.command(dir, args);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            command: command.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|source| RunnerError::Io {
                    command: command.clone(),
                    source,
                })?;
            // Dropping stdin closes the pipe so the tool sees EOF.
        }

        let output = self
            .within_deadline(&command, child.wait_with_output())
            .await?;
        Self::check_output(command, output)
    }

    async fn run_streaming(
        &self,
        dir: &Path,
        args: &[String],
    ) -> Result<StreamingProcess, RunnerError> {
        let command = self.describe(args);
        tracing::debug!(command = %command, dir = %dir.display(), "starting streaming command");

        let mut cmd = self.command(dir, args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            command: command.clone(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or_else(|| RunnerError::Io {
            command: command.clone(),
            source: std::io::Error::other("stdout was not captured"),
        })?;

        // Drain stderr eagerly; a full stderr pipe would stall the child
        // before it closes stdout.
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        });

        let wait = async move {
            let status = child.wait().await.map_err(|source| RunnerError::Io {
                command: command.clone(),
                source,
            })?;
            let stderr = stderr_task.await.unwrap_or_default();
            if status.success() {
                Ok(())
            } else {
                Err(RunnerError::NonZeroExit {
                    command,
                    code: status.code(),
                    output: String::from_utf8_lossy(&stderr).into_owned(),
                })
            }
        };

        Ok(StreamingProcess::new(Box::new(stdout), Box::pin(wait)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::args;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn sh() -> TerraformRunner {
        TerraformRunner::new("sh")
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = sh()
            .run(dir.path(), &args(["-c", "echo hello"]))
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out), "hello\n");
    }

    #[tokio::test]
    async fn test_run_success_excludes_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = sh()
            .run(dir.path(), &args(["-c", "echo '{\"version\": 4}'; echo 'Warning: deprecated' >&2"]))
            .await
            .unwrap();
        let state: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(state["version"], 4);
    }

    #[tokio::test]
    async fn test_run_uses_explicit_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let out = sh()
            .run(dir.path(), &args(["-c", "cat marker.txt"]))
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out), "here");
    }

    #[tokio::test]
    async fn test_run_failure_carries_combined_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh()
            .run(dir.path(), &args(["-c", "echo partial; echo boom >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            RunnerError::NonZeroExit { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert!(output.contains("partial"));
                assert!(output.contains("boom"));
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TerraformRunner::new("/nonexistent/terraform-binary");
        let err = runner.run(dir.path(), &args(["version"])).await.unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let runner = sh().with_timeout(Some(Duration::from_millis(100)));
        let err = runner
            .run(dir.path(), &args(["-c", "sleep 5"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_run_with_input_feeds_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = sh()
            .run_with_input(dir.path(), &args(["-c", "cat"]), "var.region")
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out), "var.region");
    }

    #[tokio::test]
    async fn test_run_streaming_yields_lines_then_exit() {
        let dir = tempfile::tempdir().unwrap();
        let process = sh()
            .run_streaming(dir.path(), &args(["-c", "echo one; echo two; echo three"]))
            .await
            .unwrap();
        let (stdout, wait) = process.into_parts();
        let mut lines = BufReader::new(stdout).lines();
        let mut seen = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            seen.push(line);
        }
        assert_eq!(seen, vec!["one", "two", "three"]);
        assert!(wait.await.is_ok());
    }

    #[tokio::test]
    async fn test_run_streaming_reports_stderr_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let process = sh()
            .run_streaming(dir.path(), &args(["-c", "echo out; echo bad >&2; exit 1"]))
            .await
            .unwrap();
        let (stdout, wait) = process.into_parts();
        let mut lines = BufReader::new(stdout).lines();
        while lines.next_line().await.unwrap().is_some() {}
        let err = wait.await.unwrap_err();
        assert_eq!(err.output().map(str::trim), Some("bad"));
    }
}
