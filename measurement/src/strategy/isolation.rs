//! Isolation strategy: one reduced workspace per resource type.
//!
//! Each type is measured in its own temporary directory holding the
//! variable files, a rewritten `main.tf` and a state file filtered to that
//! type. Types are measured strictly one after another. A type whose setup
//! or refresh fails is logged and left out of the report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{MeasureContext, Measurement, StrategyKind, TimingStrategy, WORKSPACE_TARGET};
use crate::error::{BenchError, BenchResult};
use crate::progress::ProgressSink;
use crate::rewriter::{is_file, load_config_files, ConfigRewriter, ConsoleEvaluator};
use crate::runner::{args, CommandRunner};
use crate::state::{filter_to_type, ResourceTypeGroup};
use crate::stats::{mean, summarize_runs, ResourceStat};
use crate::version::Capability;

/// Local state file name the tool picks up without a backend.
pub const STATE_FILE: &str = "terraform.tfstate";

/// Name of the rewritten configuration inside an isolated workspace.
pub const CONFIG_FILE: &str = "main.tf";

/// Prefix of isolated workspace directories.
pub const TEMP_DIR_PREFIX: &str = "tf-bench-";

/// Measures each resource type in an isolated workspace.
#[derive(Debug, Default, Clone, Copy)]
pub struct IsolationStrategy;

/// One target of repeated `terraform refresh` runs.
#[derive(Debug, Clone)]
pub struct RefreshTarget<'a> {
    pub name: &'a str,
    pub dir: &'a Path,
    pub parallelism: u32,
    pub var_file_arg: Option<String>,
}

impl RefreshTarget<'_> {
    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "refresh".to_string(),
            format!("-parallelism={}", self.parallelism),
        ];
        args.extend(self.var_file_arg.clone());
        args
    }
}

/// Time `iterations` refresh runs of `target` after one discarded warm-up.
///
/// The first refresh after initialization does one-time setup work, so its
/// duration is never part of the result. A failing warm-up is not an error;
/// a failing timed run is.
pub async fn measure_refresh(
    runner: &dyn CommandRunner,
    target: &RefreshTarget<'_>,
    iterations: u32,
    progress: &dyn ProgressSink,
) -> BenchResult<Vec<Duration>> {
    let args = target.args();

    if let Err(err) = runner.run(target.dir, &args).await {
        tracing::debug!(measurement = target.name, error = %err, "warm-up refresh failed");
    }

    let mut runs = Vec::with_capacity(iterations as usize);
    for iteration in 0..iterations as usize {
        let start = Instant::now();
        runner
            .run(target.dir, &args)
            .await
            .map_err(|e| BenchError::measurement(target.name, format!("terraform refresh: {e}")))?;
        let elapsed = start.elapsed();
        progress.run_recorded(target.name, iteration + 1, elapsed);
        tracing::debug!(
            measurement = target.name,
            iteration = iteration + 1,
            elapsed_ms = elapsed.as_millis() as u64,
            "timed refresh"
        );
        runs.push(elapsed);
    }
    Ok(runs)
}

/// Copy `*.tfvars` / `*.tfvars.json` files and the configured var-file into
/// `dest`. Returns the `-var-file` argument valid inside `dest`.
pub async fn stage_variable_files(
    workspace: &Path,
    dest: &Path,
    var_file: Option<&Path>,
) -> std::io::Result<Option<String>> {
    let mut entries = tokio::fs::read_dir(workspace).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if (name.ends_with(".tfvars") || name.ends_with(".tfvars.json")) && is_file(&path).await {
            tokio::fs::copy(&path, dest.join(name)).await?;
        }
    }

    let Some(var_file) = var_file else {
        return Ok(None);
    };
    let source: PathBuf = if var_file.is_absolute() {
        var_file.to_path_buf()
    } else {
        workspace.join(var_file)
    };
    let Some(name) = source.file_name() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("var-file {} has no file name", var_file.display()),
        ));
    };
    tokio::fs::copy(&source, dest.join(name)).await?;
    Ok(Some(format!("-var-file={}", name.to_string_lossy())))
}

/// Per-type refresh parallelism: the configured value capped at the
/// instance count, never below one.
pub fn type_parallelism(configured: u32, instances: usize) -> u32 {
    let instances = u32::try_from(instances).unwrap_or(u32::MAX);
    configured.min(instances).max(1)
}

impl IsolationStrategy {
    async fn measure_type(
        &self,
        ctx: &MeasureContext<'_>,
        group: &ResourceTypeGroup,
    ) -> BenchResult<ResourceStat> {
        let name = group.name.as_str();

        let files = load_config_files(ctx.workspace).await?;
        let evaluator =
            ConsoleEvaluator::new(ctx.runner.clone(), ctx.workspace, ctx.config.var_file_arg());
        let rewriter = ConfigRewriter::new(
            &evaluator,
            ctx.capabilities.supports(Capability::ProviderRewrite),
        );
        let config = rewriter.rewrite(name, &files).await?;

        // Removed on drop, whichever way this function returns.
        let dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir()
            .map_err(|e| BenchError::measurement(name, format!("creating temporary directory: {e}")))?;
        tracing::debug!(resource_type = name, dir = %dir.path().display(), "created isolated workspace");

        let var_file_arg =
            stage_variable_files(ctx.workspace, dir.path(), ctx.config.var_file.as_deref())
                .await
                .map_err(|e| BenchError::measurement(name, format!("copying variable files: {e}")))?;

        tokio::fs::write(dir.path().join(CONFIG_FILE), config)
            .await
            .map_err(|e| BenchError::measurement(name, format!("writing {CONFIG_FILE}: {e}")))?;

        let state = filter_to_type(&ctx.state.raw, name)
            .map_err(|e| BenchError::measurement(name, format!("filtering state: {e}")))?;
        tokio::fs::write(dir.path().join(STATE_FILE), state)
            .await
            .map_err(|e| BenchError::measurement(name, format!("writing {STATE_FILE}: {e}")))?;

        ctx.runner
            .run(dir.path(), &args(["init"]))
            .await
            .map_err(|e| BenchError::measurement(name, format!("terraform init: {e}")))?;

        let target = RefreshTarget {
            name,
            dir: dir.path(),
            parallelism: type_parallelism(ctx.config.parallelism, group.count()),
            var_file_arg,
        };
        let runs = measure_refresh(&*ctx.runner, &target, ctx.config.iterations, ctx.progress).await?;
        Ok(summarize_runs(name, group.count(), &runs))
    }
}

#[async_trait]
impl TimingStrategy for IsolationStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Isolation
    }

    async fn measure(&self, ctx: &MeasureContext<'_>) -> BenchResult<Measurement> {
        let groups = ctx.state.groups();
        tracing::info!(
            resources = ctx.state.managed_instance_count(),
            types = groups.len(),
            "found managed resources in the state file"
        );

        ctx.progress.measurement_started(WORKSPACE_TARGET);
        let baseline = RefreshTarget {
            name: WORKSPACE_TARGET,
            dir: ctx.workspace,
            parallelism: ctx.config.parallelism,
            var_file_arg: ctx.config.var_file_arg(),
        };
        let runs = measure_refresh(&*ctx.runner, &baseline, ctx.config.iterations, ctx.progress)
            .await?;
        let total_time = mean(&runs);
        ctx.progress.measurement_finished(WORKSPACE_TARGET, total_time);

        let mut resources = Vec::with_capacity(groups.len());
        for group in &groups {
            ctx.progress.measurement_started(&group.name);
            match self.measure_type(ctx, group).await {
                Ok(stat) => {
                    ctx.progress.measurement_finished(&group.name, stat.mean);
                    tracing::info!(
                        resource_type = %group.name,
                        count = group.count(),
                        mean_ms = stat.mean.as_millis() as u64,
                        "measured resource type"
                    );
                    resources.push(stat);
                }
                Err(err) if !err.is_fatal() => {
                    tracing::warn!(
                        resource_type = %group.name,
                        error = %err,
                        "skipping resource type after a failed measurement"
                    );
                    ctx.progress.measurement_skipped(&group.name, &err.to_string());
                }
                Err(err) => return Err(err),
            }
        }

        Ok(Measurement {
            total_time,
            resources,
        })
    }
}
