//! tf-bench: Terraform refresh performance reports for the current workspace.

mod cli;
mod progress;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use measurement::report::DEVELOPMENT_BUILD;
use measurement::{
    apply_benchmark, validate_environment, AviatrixClient, BenchConfig, ControllerCredentials,
    RefreshBenchmark, TerraformRunner,
};

use crate::cli::{Cli, Command};
use crate::progress::ConsoleProgress;

/// Set at release build time; local builds report a development build.
fn build_version() -> &'static str {
    option_env!("TF_BENCH_BUILD_VERSION").unwrap_or(DEVELOPMENT_BUILD)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.flags.verbose);

    match cli.command.unwrap_or(Command::Refresh) {
        Command::Version => {
            println!("tf-bench version: {}", build_version());
            Ok(())
        }
        Command::Refresh => refresh(cli.flags.to_config()).await,
        Command::Apply => apply(cli.flags.to_config()).await,
    }
}

async fn refresh(config: BenchConfig) -> Result<()> {
    let runner = Arc::new(TerraformRunner::default().with_timeout(config.command_timeout));
    let cwd = std::env::current_dir().context("could not determine working directory")?;

    let credentials =
        validate_environment(&*runner, &cwd, &config, ControllerCredentials::from_env).await?;
    tracing::debug!(workspace = %cwd.display(), "environment validated");
    println!("Starting benchmark with configuration={config}");

    let mut benchmark = RefreshBenchmark::new(runner, &cwd, config)
        .with_progress(Arc::new(ConsoleProgress::new()))
        .with_build_version(build_version());
    if let Some(credentials) = credentials {
        benchmark = benchmark.with_controller(Arc::new(AviatrixClient::new(credentials)?));
    }

    let report = benchmark.run().await?;
    let text = report.render();
    println!("{text}");
    write_report(&report.file_name(), &text)
}

async fn apply(config: BenchConfig) -> Result<()> {
    let runner = TerraformRunner::default().with_timeout(config.command_timeout);
    let cwd = std::env::current_dir().context("could not determine working directory")?;

    validate_environment(&runner, &cwd, &config, ControllerCredentials::from_env).await?;
    println!("Starting benchmark with configuration={config}");

    let report = apply_benchmark(&config, build_version()).await?;
    let text = report.render();
    println!("{text}");
    write_report(&report.file_name(), &text)
}

fn write_report(file_name: &str, text: &str) -> Result<()> {
    std::fs::write(Path::new(file_name), text).context(
        "could not write report to file. The report has also been output to the console \
         please recover the report from there",
    )?;
    println!("Wrote report to file {file_name}");
    Ok(())
}
