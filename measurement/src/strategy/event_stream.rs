//! Event-stream strategy: one combined refresh-only plan per iteration.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

use super::events::{EventParser, RefreshPhase};
use super::{MeasureContext, Measurement, StrategyKind, TimingStrategy, WORKSPACE_TARGET};
use crate::error::{BenchError, BenchResult};
use crate::progress::ProgressSink;
use crate::runner::CommandRunner;
use crate::stats::{EventStreamAggregator, Sample};

/// Attributes refresh time to addresses from the structured event log.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventStreamStrategy;

/// Arguments of the streamed refresh-only plan.
pub fn plan_args(parallelism: u32, var_file_arg: Option<String>) -> Vec<String> {
    let mut args = vec![
        "plan".to_string(),
        "-refresh-only".to_string(),
        "-json".to_string(),
        format!("-parallelism={parallelism}"),
    ];
    args.extend(var_file_arg);
    args
}

#[async_trait]
impl TimingStrategy for EventStreamStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EventStream
    }

    async fn measure(&self, ctx: &MeasureContext<'_>) -> BenchResult<Measurement> {
        let config = ctx.config;
        let expected = ctx.state.managed_instance_count() as u64;
        let args = plan_args(config.parallelism, config.var_file_arg());
        let mut aggregator = EventStreamAggregator::new(config.iterations);
        let mut wall_clock = Duration::ZERO;

        tracing::info!(
            iterations = config.iterations,
            resources = expected,
            "measuring refresh with the event log"
        );

        for iteration in 0..config.iterations as usize {
            ctx.progress.iteration_started(iteration + 1, expected);
            let begin = Instant::now();

            let stream = stream_iteration(&*ctx.runner, ctx.workspace, &args, iteration, ctx.progress);
            let samples = match config.command_timeout {
                Some(limit) => tokio::time::timeout(limit, stream).await.map_err(|_| {
                    BenchError::measurement(
                        WORKSPACE_TARGET,
                        format!("terraform plan -refresh-only -json did not finish within {limit:?}"),
                    )
                })??,
                None => stream.await?,
            };

            let elapsed = begin.elapsed();
            wall_clock += elapsed;
            ctx.progress.iteration_finished(iteration + 1, elapsed);
            tracing::debug!(
                iteration = iteration + 1,
                samples = samples.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "finished event log iteration"
            );
            aggregator.record_iteration(&samples);
        }

        Ok(Measurement {
            total_time: wall_clock / config.iterations.max(1),
            resources: aggregator.finish(),
        })
    }
}

/// Run one plan, consuming its event log line by line.
async fn stream_iteration(
    runner: &dyn CommandRunner,
    workspace: &Path,
    args: &[String],
    iteration: usize,
    progress: &dyn ProgressSink,
) -> BenchResult<Vec<Sample>> {
    let process = runner
        .run_streaming(workspace, args)
        .await
        .map_err(|e| BenchError::command("starting terraform plan -refresh-only -json", e))?;
    let (stdout, wait) = process.into_parts();

    let mut parser = EventParser::new(iteration);
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| BenchError::measurement(WORKSPACE_TARGET, format!("reading event log: {e}")))?
    {
        if let Some(event) = parser.feed_line(&line) {
            if event.phase == RefreshPhase::Complete {
                progress.resource_refreshed(&event.address);
            }
        }
    }

    if let Err(err) = wait.await {
        tracing::warn!(error = %err, "terraform plan -refresh-only -json did not finish cleanly");
    }
    Ok(parser.finish())
}
