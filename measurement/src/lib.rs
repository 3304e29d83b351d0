//! Measurement engine for Terraform refresh benchmarks
//!
//! Times how long the refresh phase takes per resource type, either by
//! isolating each type in its own reduced workspace or by correlating the
//! per-address events of one combined refresh-only plan.
//!
//! ## Modules
//!
//! - [`runner`]: external process execution (buffered, stdin-fed, streaming)
//! - [`state`]: managed-resource inventory from `terraform state pull`
//! - [`rewriter`]: minimal per-type configuration for isolated workspaces
//! - [`strategy`]: isolation and event-stream timing strategies
//! - [`stats`]: two-level averaging, pooled deviation, cost ranking
//! - [`version`]: tool version probe and capability table
//! - [`controller`]: optional controller version enrichment
//! - [`report`]: report model and text rendering
//! - [`bench`]: orchestration of a full benchmark run

pub mod bench;
pub mod config;
pub mod controller;
pub mod error;
pub mod progress;
pub mod report;
pub mod rewriter;
pub mod runner;
pub mod state;
pub mod stats;
pub mod strategy;
pub mod version;

pub use bench::{apply_benchmark, validate_environment, RefreshBenchmark};
pub use config::{BenchConfig, ControllerCredentials};
pub use controller::{AviatrixClient, ControllerVersion, ControllerVersionSource};
pub use error::{BenchError, BenchResult, RewriteError, RunnerError};
pub use progress::{NoopProgress, ProgressSink};
pub use report::{ApplyReport, BenchmarkReport};
pub use runner::{CommandRunner, StreamingProcess, TerraformRunner};
pub use stats::ResourceStat;
pub use strategy::StrategyKind;
pub use version::VersionInfo;
