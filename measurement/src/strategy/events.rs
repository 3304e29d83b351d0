//! Structured event log parsing
//!
//! `plan -refresh-only -json` prints one JSON object per line. Only
//! `refresh_start` and `refresh_complete` matter here; every address moves
//! through a small state machine:
//!
//! ```text
//! Awaiting ──start──▶ Started ──complete──▶ Completed
//!     ▲                  │                     │
//!     └──────────────────┴────── start ────────┘ (restarts the measurement)
//! ```
//!
//! A `complete` for an address that never started is ignored; a repeated
//! `complete` moves the end time. Addresses that are not `Completed` when
//! the stream closes produce no sample.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use crate::stats::Sample;

pub const REFRESH_START: &str = "refresh_start";
pub const REFRESH_COMPLETE: &str = "refresh_complete";

/// One line of the event log. Fields outside the refresh hooks are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TfEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    pub hook: Hook,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hook {
    #[serde(default)]
    pub resource: HookResource,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookResource {
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub resource_type: String,
}

/// Refresh hook phase of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Start,
    Complete,
}

/// A refresh hook event that reached the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshEvent {
    pub phase: RefreshPhase,
    pub address: String,
}

#[derive(Debug, Clone)]
enum AddressState {
    Started {
        at: DateTime<FixedOffset>,
        resource_type: String,
    },
    Completed {
        started: DateTime<FixedOffset>,
        ended: DateTime<FixedOffset>,
        resource_type: String,
    },
}

/// Correlates start/complete events of one iteration.
#[derive(Debug, Default)]
pub struct EventParser {
    iteration: usize,
    addresses: BTreeMap<String, AddressState>,
    skipped_data: usize,
}

impl EventParser {
    pub fn new(iteration: usize) -> Self {
        Self {
            iteration,
            ..Default::default()
        }
    }

    /// Parse one log line. Undecodable lines and unrelated events yield `None`.
    pub fn feed_line(&mut self, line: &str) -> Option<RefreshEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<TfEvent>(line) {
            Ok(event) => self.apply(event),
            Err(err) => {
                tracing::debug!(line, error = %err, "could not decode event log line");
                None
            }
        }
    }

    /// Advance the state machine with a decoded event.
    pub fn apply(&mut self, event: TfEvent) -> Option<RefreshEvent> {
        let phase = match event.kind.as_str() {
            REFRESH_START => RefreshPhase::Start,
            REFRESH_COMPLETE => RefreshPhase::Complete,
            _ => return None,
        };
        let HookResource {
            addr,
            resource_type,
        } = event.hook.resource;
        if addr.is_empty() {
            return None;
        }
        if is_data_address(&addr) {
            if phase == RefreshPhase::Start {
                self.skipped_data += 1;
            }
            return None;
        }

        match phase {
            RefreshPhase::Start => {
                let resource_type = if resource_type.is_empty() {
                    type_from_address(&addr).unwrap_or_default()
                } else {
                    resource_type
                };
                self.addresses.insert(
                    addr.clone(),
                    AddressState::Started {
                        at: event.timestamp,
                        resource_type,
                    },
                );
            }
            RefreshPhase::Complete => match self.addresses.remove(&addr) {
                Some(AddressState::Started { at, resource_type })
                | Some(AddressState::Completed {
                    started: at,
                    resource_type,
                    ..
                }) => {
                    self.addresses.insert(
                        addr.clone(),
                        AddressState::Completed {
                            started: at,
                            ended: event.timestamp,
                            resource_type,
                        },
                    );
                }
                None => {
                    tracing::debug!(address = %addr, "refresh_complete without refresh_start");
                }
            },
        }

        Some(RefreshEvent {
            phase,
            address: addr,
        })
    }

    /// Samples of every completed address, ordered by address.
    pub fn finish(self) -> Vec<Sample> {
        if self.skipped_data > 0 {
            tracing::debug!(count = self.skipped_data, "ignored data source refresh events");
        }
        let iteration = self.iteration;
        self.addresses
            .into_iter()
            .filter_map(|(address, state)| match state {
                AddressState::Completed {
                    started,
                    ended,
                    resource_type,
                } => Some(Sample {
                    duration: (ended - started).to_std().unwrap_or(Duration::ZERO),
                    address,
                    resource_type,
                    iteration,
                }),
                AddressState::Started { .. } => {
                    tracing::debug!(%address, "refresh never completed, dropping");
                    None
                }
            })
            .collect()
    }
}

/// Split an address on `.` outside of index brackets.
fn address_segments(addr: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0usize;
    for (i, ch) in addr.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => depth += 1,
            ']' if !in_quotes => depth = depth.saturating_sub(1),
            '.' if !in_quotes && depth == 0 => {
                segments.push(&addr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&addr[start..]);
    segments
}

/// Segments after any `module.<name>` prefixes.
fn resource_segments(addr: &str) -> Vec<&str> {
    let segments = address_segments(addr);
    let mut i = 0;
    while i + 1 < segments.len() && segments[i] == "module" {
        i += 2;
    }
    segments[i..].to_vec()
}

/// Whether `addr` names a data source, including ones inside modules.
pub fn is_data_address(addr: &str) -> bool {
    resource_segments(addr).first() == Some(&"data")
}

/// Resource type named by a managed resource address.
pub fn type_from_address(addr: &str) -> Option<String> {
    resource_segments(addr).first().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(kind: &str, addr: &str, resource_type: &str, ts: &str) -> String {
        serde_json::json!({
            "@level": "info",
            "@message": format!("{addr}: event"),
            "@timestamp": ts,
            "type": kind,
            "hook": {"resource": {"addr": addr, "resource_type": resource_type}}
        })
        .to_string()
    }

    #[test]
    fn test_start_complete_pair_yields_sample() {
        let mut parser = EventParser::new(2);
        parser.feed_line(&line(
            REFRESH_START,
            "aws_vpc.main",
            "aws_vpc",
            "2021-05-25T13:32:41.000000-04:00",
        ));
        let event = parser.feed_line(&line(
            REFRESH_COMPLETE,
            "aws_vpc.main",
            "aws_vpc",
            "2021-05-25T13:32:42.250000-04:00",
        ));
        assert_eq!(
            event,
            Some(RefreshEvent {
                phase: RefreshPhase::Complete,
                address: "aws_vpc.main".to_string()
            })
        );

        let samples = parser.finish();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].resource_type, "aws_vpc");
        assert_eq!(samples[0].iteration, 2);
        assert_eq!(samples[0].duration, Duration::from_millis(1250));
    }

    #[test]
    fn test_start_without_complete_is_dropped() {
        let mut parser = EventParser::new(0);
        parser.feed_line(&line(REFRESH_START, "random_id.a", "random_id", "2021-01-01T00:00:00Z"));
        parser.feed_line(&line(REFRESH_START, "random_id.b", "random_id", "2021-01-01T00:00:00Z"));
        parser.feed_line(&line(
            REFRESH_COMPLETE,
            "random_id.b",
            "random_id",
            "2021-01-01T00:00:01Z",
        ));
        let samples = parser.finish();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].address, "random_id.b");
    }

    #[test]
    fn test_complete_without_start_is_ignored_but_reported() {
        let mut parser = EventParser::new(0);
        let event = parser.feed_line(&line(
            REFRESH_COMPLETE,
            "random_id.a",
            "random_id",
            "2021-01-01T00:00:01Z",
        ));
        assert_eq!(event.map(|e| e.phase), Some(RefreshPhase::Complete));
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_repeated_complete_moves_end_time() {
        let mut parser = EventParser::new(0);
        parser.feed_line(&line(REFRESH_START, "random_id.a", "random_id", "2021-01-01T00:00:00Z"));
        parser.feed_line(&line(REFRESH_COMPLETE, "random_id.a", "random_id", "2021-01-01T00:00:01Z"));
        parser.feed_line(&line(REFRESH_COMPLETE, "random_id.a", "random_id", "2021-01-01T00:00:03Z"));
        assert_eq!(parser.finish()[0].duration, Duration::from_secs(3));
    }

    #[test]
    fn test_restart_replaces_start_time() {
        let mut parser = EventParser::new(0);
        parser.feed_line(&line(REFRESH_START, "random_id.a", "random_id", "2021-01-01T00:00:00Z"));
        parser.feed_line(&line(REFRESH_COMPLETE, "random_id.a", "random_id", "2021-01-01T00:00:01Z"));
        parser.feed_line(&line(REFRESH_START, "random_id.a", "random_id", "2021-01-01T00:00:05Z"));
        // Started again but never completed
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_data_sources_ignored() {
        let mut parser = EventParser::new(0);
        for addr in ["data.aws_ami.ubuntu", "module.net.data.aws_region.current"] {
            assert!(parser
                .feed_line(&line(REFRESH_START, addr, "aws_ami", "2021-01-01T00:00:00Z"))
                .is_none());
            parser.feed_line(&line(REFRESH_COMPLETE, addr, "aws_ami", "2021-01-01T00:00:01Z"));
        }
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_garbage_and_unrelated_lines_skipped() {
        let mut parser = EventParser::new(0);
        assert!(parser.feed_line("not json").is_none());
        assert!(parser.feed_line("").is_none());
        assert!(parser
            .feed_line(r#"{"@timestamp":"2021-01-01T00:00:00Z","type":"version","terraform":"1.0.0"}"#)
            .is_none());
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_clock_skew_clamps_to_zero() {
        let mut parser = EventParser::new(0);
        parser.feed_line(&line(REFRESH_START, "random_id.a", "random_id", "2021-01-01T00:00:02Z"));
        parser.feed_line(&line(REFRESH_COMPLETE, "random_id.a", "random_id", "2021-01-01T00:00:01Z"));
        assert_eq!(parser.finish()[0].duration, Duration::ZERO);
    }

    #[test]
    fn test_missing_resource_type_derived_from_address() {
        let mut parser = EventParser::new(0);
        parser.feed_line(&line(REFRESH_START, r#"module.a.module.b.aws_subnet.s["x.y"]"#, "", "2021-01-01T00:00:00Z"));
        parser.feed_line(&line(REFRESH_COMPLETE, r#"module.a.module.b.aws_subnet.s["x.y"]"#, "", "2021-01-01T00:00:01Z"));
        assert_eq!(parser.finish()[0].resource_type, "aws_subnet");
    }

    #[test]
    fn test_address_helpers() {
        assert!(is_data_address("data.aws_ami.ubuntu"));
        assert!(is_data_address("module.vpc[0].data.aws_region.current"));
        assert!(!is_data_address("aws_vpc.data"));
        assert!(!is_data_address("module.data.aws_vpc.main"));
        assert_eq!(type_from_address("aws_vpc.main[1]").as_deref(), Some("aws_vpc"));
        assert_eq!(
            address_segments(r#"aws_s3_bucket.b["a.b"]"#),
            vec!["aws_s3_bucket", r#"b["a.b"]"#]
        );
    }
}
