//! Progress side channel
//!
//! Strategies report progress through [`ProgressSink`] and never write to
//! the console themselves. The binary plugs in a progress bar; library
//! callers and tests use [`NoopProgress`].

use std::time::Duration;

/// Receives progress notifications from a running benchmark.
///
/// All methods default to no-ops so sinks only implement what they render.
pub trait ProgressSink: Send + Sync {
    /// A measurement target (a resource type or the whole workspace) begins.
    fn measurement_started(&self, _target: &str) {}

    /// One timed run of a target finished.
    fn run_recorded(&self, _target: &str, _iteration: usize, _elapsed: Duration) {}

    /// A target finished with the given mean.
    fn measurement_finished(&self, _target: &str, _mean: Duration) {}

    /// A target was skipped because its measurement failed.
    fn measurement_skipped(&self, _target: &str, _reason: &str) {}

    /// A streamed iteration begins; `expected` is the number of refreshes to wait for.
    fn iteration_started(&self, _iteration: usize, _expected: u64) {}

    /// One resource finished refreshing in the current streamed iteration.
    fn resource_refreshed(&self, _address: &str) {}

    /// The current streamed iteration is over.
    fn iteration_finished(&self, _iteration: usize, _elapsed: Duration) {}
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Test sink that records every notification as a line of text.
    #[derive(Debug, Default)]
    pub struct RecordingProgress {
        pub events: Mutex<Vec<String>>,
    }

    impl RecordingProgress {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl ProgressSink for RecordingProgress {
        fn measurement_started(&self, target: &str) {
            self.push(format!("start {target}"));
        }

        fn run_recorded(&self, target: &str, iteration: usize, elapsed: Duration) {
            self.push(format!("run {target} {iteration} {}ms", elapsed.as_millis()));
        }

        fn measurement_skipped(&self, target: &str, _reason: &str) {
            self.push(format!("skip {target}"));
        }

        fn iteration_started(&self, iteration: usize, expected: u64) {
            self.push(format!("iteration {iteration} expecting {expected}"));
        }

        fn resource_refreshed(&self, address: &str) {
            self.push(format!("refreshed {address}"));
        }
    }
}
