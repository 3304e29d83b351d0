//! Console progress rendering with indicatif.
//!
//! Bars draw to stderr so stdout only carries the report.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use measurement::report::format_duration;
use measurement::ProgressSink;

const ITERATION_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
const MEASUREMENT_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {msg}";

/// Progress sink that renders one bar (or spinner) at a time.
#[derive(Default)]
pub struct ConsoleProgress {
    current: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn replace(&self, bar: ProgressBar) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn with_current(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(current) = self.current.lock() {
            if let Some(bar) = current.as_ref() {
                f(bar);
            }
        }
    }

    fn take(&self) -> Option<ProgressBar> {
        self.current.lock().ok().and_then(|mut current| current.take())
    }
}

impl ProgressSink for ConsoleProgress {
    fn measurement_started(&self, target: &str) {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template(MEASUREMENT_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(format!("{target} measurement"));
        self.replace(bar);
    }

    fn run_recorded(&self, target: &str, iteration: usize, elapsed: Duration) {
        self.with_current(|bar| {
            bar.set_message(format!(
                "{target} measurement, iteration {iteration}: {}",
                format_duration(elapsed)
            ));
        });
    }

    fn measurement_finished(&self, target: &str, mean: Duration) {
        if let Some(bar) = self.take() {
            bar.finish_with_message(format!("{target} average: {}", format_duration(mean)));
        }
    }

    fn measurement_skipped(&self, target: &str, reason: &str) {
        if let Some(bar) = self.take() {
            bar.abandon_with_message(format!("{target} skipped: {reason}"));
        }
    }

    fn iteration_started(&self, iteration: usize, expected: u64) {
        let bar = ProgressBar::new(expected);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(ITERATION_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(format!("Iteration {iteration}"));
        self.replace(bar);
    }

    fn resource_refreshed(&self, _address: &str) {
        self.with_current(|bar| bar.inc(1));
    }

    fn iteration_finished(&self, iteration: usize, elapsed: Duration) {
        if let Some(bar) = self.take() {
            bar.finish_with_message(format!(
                "Iteration {iteration} finished in {}",
                format_duration(elapsed)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_lifecycle() {
        let progress = ConsoleProgress::new();
        progress.iteration_started(1, 3);
        progress.resource_refreshed("random_id.a");
        progress.resource_refreshed("random_id.b");
        progress.with_current(|bar| assert_eq!(bar.position(), 2));
        progress.iteration_finished(1, Duration::from_secs(2));
        assert!(progress.take().is_none());
    }

    #[test]
    fn test_skip_clears_current_bar() {
        let progress = ConsoleProgress::new();
        progress.measurement_started("aws_vpc");
        progress.run_recorded("aws_vpc", 1, Duration::from_millis(800));
        progress.measurement_skipped("aws_vpc", "terraform init failed");
        assert!(progress.take().is_none());
        // Events without an active bar are ignored.
        progress.resource_refreshed("aws_vpc.main");
    }
}
