//! Command-line surface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use measurement::config::{DEFAULT_ITERATIONS, DEFAULT_PARALLELISM};
use measurement::BenchConfig;

#[derive(Parser, Debug)]
#[command(
    name = "tf-bench",
    version,
    about = "tf-bench measures Terraform refresh performance",
    long_about = "tf-bench creates a report that details the Terraform refresh\n\
                  performance of the current terraform workspace."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub flags: Flags,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Measure refresh performance (the default)
    Refresh,
    /// Measure apply performance
    Apply,
    /// Print the tf-bench build version
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct Flags {
    /// Skip adding controller version to generated report
    #[arg(long, global = true, default_value_t = false)]
    pub skip_controller_version: bool,

    /// How many times to run each refresh test. Higher number will be more accurate but slower
    #[arg(long, global = true, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: u32,

    /// var-file to pass to terraform commands
    #[arg(long, global = true)]
    pub var_file: Option<PathBuf>,

    /// Use event log method of measuring refresh
    #[arg(
        long,
        global = true,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub event_log: bool,

    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Refresh parallelism for whole-workspace runs (upper bound for per-type runs)
    #[arg(long, global = true, default_value_t = DEFAULT_PARALLELISM)]
    pub parallelism: u32,

    /// Abort any single terraform invocation after this many seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
}

impl Flags {
    pub fn to_config(&self) -> BenchConfig {
        BenchConfig {
            skip_controller_version: self.skip_controller_version,
            iterations: self.iterations,
            var_file: self.var_file.clone(),
            event_log: self.event_log,
            parallelism: self.parallelism,
            command_timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_map_to_default_config() {
        let cli = Cli::try_parse_from(["tf-bench"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.flags.to_config(), BenchConfig::default());
    }

    #[test]
    fn test_event_log_can_be_disabled() {
        let cli = Cli::try_parse_from(["tf-bench", "--event-log=false"]).unwrap();
        assert!(!cli.flags.event_log);
        let cli = Cli::try_parse_from(["tf-bench", "--event-log"]).unwrap();
        assert!(cli.flags.event_log);
    }

    #[test]
    fn test_flags_are_global() {
        let cli = Cli::try_parse_from([
            "tf-bench",
            "refresh",
            "--iterations",
            "5",
            "--var-file",
            "prod.tfvars",
            "--skip-controller-version",
            "-v",
            "--timeout-secs",
            "900",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Command::Refresh));
        let config = cli.flags.to_config();
        assert_eq!(config.iterations, 5);
        assert_eq!(config.var_file, Some(PathBuf::from("prod.tfvars")));
        assert!(config.skip_controller_version);
        assert_eq!(config.command_timeout, Some(Duration::from_secs(900)));
        assert!(cli.flags.verbose);
    }

    #[test]
    fn test_subcommands() {
        for (arg, command) in [
            ("refresh", Command::Refresh),
            ("apply", Command::Apply),
            ("version", Command::Version),
        ] {
            let cli = Cli::try_parse_from(["tf-bench", arg]).unwrap();
            assert_eq!(cli.command, Some(command));
        }
    }
}
