//! Benchmark orchestration
//!
//! ```text
//! validate config → pull state (fatal) → probe version (best effort)
//!   → resolve capabilities → gate strategy (fatal) → controller version (best effort)
//!   → measure → rank → BenchmarkReport
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;

use crate::config::{BenchConfig, ControllerCredentials};
use crate::controller::{ControllerVersion, ControllerVersionSource};
use crate::error::{BenchError, BenchResult};
use crate::progress::{NoopProgress, ProgressSink};
use crate::report::{ApplyReport, BenchmarkReport, DEVELOPMENT_BUILD};
use crate::runner::{args, CommandRunner};
use crate::state::StateAccessor;
use crate::stats::rank;
use crate::strategy::{MeasureContext, StrategyKind};
use crate::version::{detect_version, Capabilities, VersionInfo};

/// Check that the tool can be executed and, unless the controller version is
/// skipped, that controller credentials can be loaded.
pub async fn validate_environment(
    runner: &dyn CommandRunner,
    workspace: &Path,
    config: &BenchConfig,
    load_credentials: impl FnOnce() -> BenchResult<ControllerCredentials>,
) -> BenchResult<Option<ControllerCredentials>> {
    runner
        .run(workspace, &args(["-help"]))
        .await
        .map_err(|e| BenchError::Environment(format!("could not execute `terraform` command: {e}")))?;
    if config.skip_controller_version {
        return Ok(None);
    }
    load_credentials().map(Some)
}

/// Measures the refresh performance of one workspace.
pub struct RefreshBenchmark {
    runner: Arc<dyn CommandRunner>,
    workspace: PathBuf,
    config: BenchConfig,
    progress: Arc<dyn ProgressSink>,
    controller: Option<Arc<dyn ControllerVersionSource>>,
    build_version: String,
}

impl RefreshBenchmark {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workspace: impl Into<PathBuf>,
        config: BenchConfig,
    ) -> Self {
        Self {
            runner,
            workspace: workspace.into(),
            config,
            progress: Arc::new(NoopProgress),
            controller: None,
            build_version: DEVELOPMENT_BUILD.to_string(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Source of the controller version; ignored when the config skips it.
    pub fn with_controller(mut self, controller: Arc<dyn ControllerVersionSource>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_build_version(mut self, build_version: impl Into<String>) -> Self {
        self.build_version = build_version.into();
        self
    }

    /// Run the benchmark and return the ranked report.
    pub async fn run(&self) -> BenchResult<BenchmarkReport> {
        self.config.validate()?;
        let timestamp = Local::now().fixed_offset();
        let kind = StrategyKind::from_config(&self.config);
        tracing::info!(strategy = %kind, config = %self.config, "starting refresh benchmark");

        let state = StateAccessor::new(&*self.runner, &self.workspace)
            .fetch()
            .await?;

        let tool_version = self.tool_version().await;
        let capabilities = Capabilities::resolve(tool_version.as_ref());
        kind.ensure_supported(&capabilities)?;

        let controller_version = self.controller_version().await;

        let ctx = MeasureContext {
            runner: self.runner.clone(),
            workspace: &self.workspace,
            config: &self.config,
            state: &state,
            capabilities: &capabilities,
            progress: &*self.progress,
        };
        let mut measurement = kind.build().measure(&ctx).await?;
        rank(&mut measurement.resources);

        tracing::info!(
            resource_types = measurement.resources.len(),
            total_ms = measurement.total_time.as_millis() as u64,
            "finished benchmark"
        );

        Ok(BenchmarkReport {
            timestamp,
            total_time: measurement.total_time,
            tool_version,
            controller_version,
            resources: measurement.resources,
            config: self.config.clone(),
            build_version: self.build_version.clone(),
            strategy: kind,
        })
    }

    async fn tool_version(&self) -> Option<VersionInfo> {
        match detect_version(&*self.runner, &self.workspace).await {
            Ok(info) => Some(info),
            Err(err) => {
                tracing::warn!(error = %err, "could not find terraform version");
                None
            }
        }
    }

    async fn controller_version(&self) -> Option<ControllerVersion> {
        if self.config.skip_controller_version {
            return None;
        }
        let Some(source) = &self.controller else {
            tracing::debug!("no controller version source configured");
            return None;
        };
        match source.controller_version().await {
            Ok(version) => Some(version),
            Err(err) => {
                tracing::warn!(error = %err, "could not find controller version");
                None
            }
        }
    }
}

/// Apply benchmarking entry point. Only the report shell is produced.
pub async fn apply_benchmark(
    config: &BenchConfig,
    build_version: &str,
) -> BenchResult<ApplyReport> {
    config.validate()?;
    tracing::warn!("apply benchmarking is not implemented, producing an empty report");
    Ok(ApplyReport {
        timestamp: Local::now().fixed_offset(),
        config: config.clone(),
        build_version: build_version.to_string(),
    })
}
