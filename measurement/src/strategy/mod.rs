//! Timing Strategies
//!
//! Two mutually exclusive ways to attribute refresh time to resource types:
//!
//! - [`isolation::IsolationStrategy`] builds a reduced workspace per type and
//!   times whole refresh runs there.
//! - [`event_stream::EventStreamStrategy`] runs one combined refresh-only plan
//!   per iteration and correlates the start/complete events of each address.
//!
//! Selection happens once from the run configuration; the event stream is
//! gated on the tool version and fails fast rather than falling back.

pub mod event_stream;
pub mod events;
pub mod isolation;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::BenchConfig;
use crate::error::{BenchError, BenchResult};
use crate::progress::ProgressSink;
use crate::runner::CommandRunner;
use crate::state::StateSnapshot;
use crate::stats::ResourceStat;
use crate::version::{capability, Capabilities, Capability};

pub use event_stream::EventStreamStrategy;
pub use isolation::IsolationStrategy;

/// Progress/log target name for whole-workspace measurements.
pub const WORKSPACE_TARGET: &str = "whole workspace";

/// Which timing algorithm a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Isolation,
    EventStream,
}

impl StrategyKind {
    pub fn from_config(config: &BenchConfig) -> Self {
        if config.event_log {
            Self::EventStream
        } else {
            Self::Isolation
        }
    }

    /// Human-readable name used in messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Isolation => "temporary directory",
            Self::EventStream => "event log",
        }
    }

    /// Capability the tool must have for this strategy, if any.
    pub fn required_capability(self) -> Option<Capability> {
        match self {
            Self::Isolation => None,
            Self::EventStream => Some(Capability::EventStream),
        }
    }

    /// Fail with a capability error when the detected tool is too old.
    pub fn ensure_supported(self, capabilities: &Capabilities) -> BenchResult<()> {
        let Some(required) = self.required_capability() else {
            return Ok(());
        };
        if capabilities.supports(required) {
            return Ok(());
        }
        Err(BenchError::Capability {
            strategy: self.label(),
            found: capabilities
                .version()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown".to_string()),
            required: capability::minimum_version(required).to_string(),
        })
    }

    /// Instantiate the strategy.
    pub fn build(self) -> Box<dyn TimingStrategy> {
        match self {
            Self::Isolation => Box::new(IsolationStrategy),
            Self::EventStream => Box::new(EventStreamStrategy),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a strategy reads while measuring.
pub struct MeasureContext<'a> {
    pub runner: Arc<dyn CommandRunner>,
    pub workspace: &'a Path,
    pub config: &'a BenchConfig,
    pub state: &'a StateSnapshot,
    pub capabilities: &'a Capabilities,
    pub progress: &'a dyn ProgressSink,
}

/// Output of one strategy run, before ranking.
#[derive(Debug, Clone, Default)]
pub struct Measurement {
    /// Mean duration of a refresh of the whole, unmodified workspace.
    pub total_time: Duration,
    pub resources: Vec<ResourceStat>,
}

#[async_trait]
pub trait TimingStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn measure(&self, ctx: &MeasureContext<'_>) -> BenchResult<Measurement>;
}
