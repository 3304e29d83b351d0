//! Command Runner: execution of the external provisioning tool
//!
//! Every invocation names its working directory explicitly. Nothing in the
//! engine changes the process-wide current directory, so measurements can
//! never observe each other's directory switches.
//!
//! Two shapes of execution are offered:
//!
//! - [`CommandRunner::run`] buffers the whole output and fails with the
//!   captured text when the process exits non-zero.
//! - [`CommandRunner::run_streaming`] hands back stdout as a reader plus a
//!   wait future, so a structured log can be consumed line by line without
//!   buffering it.

pub mod process;

use std::path::Path;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::io::AsyncRead;

use crate::error::RunnerError;

pub use process::TerraformRunner;

/// A running process whose stdout is consumed incrementally.
///
/// Read `stdout` to EOF first, then await the wait future from
/// [`StreamingProcess::into_parts`]. It resolves once the process has exited
/// and reports a non-zero exit with whatever the process wrote to stderr.
pub struct StreamingProcess {
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    wait: BoxFuture<'static, Result<(), RunnerError>>,
}

impl StreamingProcess {
    pub fn new(
        stdout: Box<dyn AsyncRead + Send + Unpin>,
        wait: BoxFuture<'static, Result<(), RunnerError>>,
    ) -> Self {
        Self { stdout, wait }
    }

    /// Split into the output reader and the exit future.
    pub fn into_parts(
        self,
    ) -> (
        Box<dyn AsyncRead + Send + Unpin>,
        BoxFuture<'static, Result<(), RunnerError>>,
    ) {
        (self.stdout, self.wait)
    }
}

impl std::fmt::Debug for StreamingProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingProcess").finish_non_exhaustive()
    }
}

/// Executes the external tool. No retries happen at this layer.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion in `dir` and return stdout.
    ///
    /// Stderr is left out on success so warnings cannot corrupt JSON output
    /// such as `state pull`. On a non-zero exit the error carries stdout
    /// followed by stderr.
    async fn run(&self, dir: &Path, args: &[String]) -> Result<Vec<u8>, RunnerError>;

    /// Run to completion in `dir`, writing `input` to stdin and closing it.
    async fn run_with_input(
        &self,
        dir: &Path,
        args: &[String],
        input: &str,
    ) -> Result<Vec<u8>, RunnerError>;

    /// Start the process in `dir` and return its stdout stream.
    async fn run_streaming(
        &self,
        dir: &Path,
        args: &[String],
    ) -> Result<StreamingProcess, RunnerError>;
}

/// Build an owned argument list from string slices.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_streaming_process_parts() {
        let stdout: Box<dyn AsyncRead + Send + Unpin> =
            Box::new(std::io::Cursor::new(b"line one\nline two\n".to_vec()));
        let process = StreamingProcess::new(stdout, Box::pin(async { Ok(()) }));

        let (mut stdout, wait) = process.into_parts();
        let mut text = String::new();
        stdout.read_to_string(&mut text).await.unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(wait.await.is_ok());
    }

    #[test]
    fn test_args_builder() {
        let built = args(["refresh", "-parallelism=10"]);
        assert_eq!(built, vec!["refresh".to_string(), "-parallelism=10".to_string()]);
    }
}
