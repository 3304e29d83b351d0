//! Error types for the measurement engine
//!
//! Errors are split by the layer that produces them. `RunnerError` comes from
//! external process execution, `RewriteError` from building the reduced
//! configuration of an isolated workspace, and `BenchError` is what the
//! benchmark entry points return.
//!
//! | Kind              | Fatal | Notes                                           |
//! |-------------------|-------|-------------------------------------------------|
//! | Environment       | yes   | tool missing, credentials absent                |
//! | State             | yes   | no inventory, nothing can be measured           |
//! | Capability        | yes   | event-stream requested on a tool that is too old|
//! | Measurement       | no    | one resource type is skipped, the run continues |
//! | Enrichment        | no    | logged as a warning, report field left empty    |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for benchmark operations
pub type BenchResult<T> = Result<T, BenchError>;

/// Failure of a single external process invocation.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The executable could not be started at all.
    #[error("could not start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully.
    #[error("`{command}` exited with {status}: {output}", status = exit_label(.code))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        /// Captured stdout followed by stderr.
        output: String,
    },

    /// The invocation deadline elapsed; the child was killed.
    #[error("`{command}` timed out after {after:?}")]
    TimedOut { command: String, after: Duration },

    /// Reading from or writing to the child failed.
    #[error("I/O error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl RunnerError {
    /// Captured process output, when the process got far enough to produce any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Failure while deriving the minimal configuration for one resource type.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("could not read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing configuration file {file}: {message}")]
    Parse { file: String, message: String },

    #[error("could not format expression in {file}: {message}")]
    Format { file: String, message: String },

    /// The console evaluation of an attribute expression failed.
    #[error("evaluating `{expression}`: {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: RunnerError,
    },

    /// The value was still redacted after the unmask retry.
    #[error("`{expression}` evaluates to a sensitive value even when unmasked")]
    Redacted { expression: String },
}

/// Errors returned by the benchmark entry points.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The execution environment is not usable (tool missing, credentials absent).
    #[error("environment check failed: {0}")]
    Environment(String),

    /// The run configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The state document could not be pulled.
    #[error("could not read terraform state: {0}")]
    StatePull(#[source] RunnerError),

    /// The state document could not be parsed.
    #[error("could not parse terraform state: {0}")]
    StateParse(#[source] serde_json::Error),

    /// The selected strategy needs a newer tool.
    #[error(
        "terraform version is too low to use the {strategy} measurement method.\n\
         Your terraform version is {found}, the {strategy} measurement method requires at least v{required}.\n\
         Set --event-log=false flag to use the temporary directory measurement method."
    )]
    Capability {
        strategy: &'static str,
        found: String,
        required: String,
    },

    /// The tool version could not be determined.
    #[error("could not determine terraform version: {0}")]
    Version(String),

    /// A measurement of one resource type (or of the whole workspace) failed.
    #[error("measuring {target}: {message}")]
    Measurement { target: String, message: String },

    /// The reduced configuration could not be built.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// An external command failed.
    #[error("{operation}: {source}")]
    Command {
        operation: &'static str,
        #[source]
        source: RunnerError,
    },

    /// The controller could not be queried.
    #[error("controller version lookup failed: {0}")]
    Controller(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    /// Wrap a runner failure with the name of the operation that issued it.
    pub fn command(operation: &'static str, source: RunnerError) -> Self {
        Self::Command { operation, source }
    }

    pub fn measurement(target: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Measurement {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Whether the benchmark must stop on this error rather than skip a type.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Measurement { .. } | Self::Rewrite(_))
    }
}
