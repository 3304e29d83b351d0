//! Report model and plain-text rendering
//!
//! A [`BenchmarkReport`] is immutable once the orchestrator returns it.
//! [`BenchmarkReport::render`] produces the console/file text; the same
//! string is printed and persisted.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::Serialize;

use crate::config::BenchConfig;
use crate::controller::ControllerVersion;
use crate::stats::ResourceStat;
use crate::strategy::StrategyKind;
use crate::version::VersionInfo;

/// Build version used when none was stamped in at compile time.
pub const DEVELOPMENT_BUILD: &str = "development-build";

pub const REPORT_FILE_PREFIX: &str = "tf-bench-report-";
pub const APPLY_REPORT_FILE_PREFIX: &str = "tf-bench-apply-report-";

/// `<prefix><RFC3339 timestamp>`
pub fn report_filename(prefix: &str, timestamp: &DateTime<FixedOffset>) -> String {
    format!(
        "{prefix}{}",
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Result of a refresh benchmark.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    /// Start of the benchmark
    pub timestamp: DateTime<FixedOffset>,
    /// Mean refresh duration of the whole, unmodified workspace
    pub total_time: Duration,
    pub tool_version: Option<VersionInfo>,
    pub controller_version: Option<ControllerVersion>,
    /// Sorted by descending `mean * count`
    pub resources: Vec<ResourceStat>,
    pub config: BenchConfig,
    pub build_version: String,
    pub strategy: StrategyKind,
}

impl BenchmarkReport {
    pub fn file_name(&self) -> String {
        report_filename(REPORT_FILE_PREFIX, &self.timestamp)
    }

    /// Render the text report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "tf-bench ({}) Refresh Report {}",
            self.build_label(),
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        );
        if let Some(controller) = &self.controller_version {
            let _ = writeln!(out, "controller version: {controller}");
        }
        let _ = writeln!(out, "iterations per measurement: {}", self.config.iterations);
        if let Some(info) = &self.tool_version {
            let _ = writeln!(out, "terraform version: v{}", info.terraform_version);
            out.push_str("\nprovider versions:\n");
            for (name, version) in &info.provider_selections {
                let _ = writeln!(out, "{name}={version}");
            }
        }
        let _ = writeln!(
            out,
            "Refresh Time for Whole Workspace: {}",
            format_duration(self.total_time)
        );

        match self.strategy {
            StrategyKind::EventStream => {
                let mut stats = Table::new(&[
                    "Resource Type",
                    "Count",
                    "Average Time Per Resource",
                    "Average*Count",
                    "Minimum",
                    "Maximum",
                    "StdDev",
                ]);
                let mut extremes = Table::new(&["Resource Type", "Fastest", "Slowest"]);
                for r in &self.resources {
                    stats.row(vec![
                        r.name.clone(),
                        r.count.to_string(),
                        format_duration(r.mean),
                        format_duration(r.weighted_mean()),
                        format_duration(r.min),
                        format_duration(r.max),
                        format_duration(r.std_dev),
                    ]);
                    extremes.row(vec![
                        r.name.clone(),
                        r.min_address.clone(),
                        r.max_address.clone(),
                    ]);
                }
                out.push_str(&stats.render());
                out.push_str(&extremes.render());
            }
            StrategyKind::Isolation => {
                let header = format!(
                    "Average Refresh Time of {} Measurements",
                    self.config.iterations
                );
                let mut stats = Table::new(&["Resource Type", "Count", header.as_str()]);
                for r in &self.resources {
                    stats.row(vec![
                        r.name.clone(),
                        r.count.to_string(),
                        format_duration(r.mean),
                    ]);
                }
                out.push_str(&stats.render());
            }
        }
        out
    }

    fn build_label(&self) -> &str {
        if self.build_version.is_empty() {
            DEVELOPMENT_BUILD
        } else {
            &self.build_version
        }
    }
}

/// Result of an apply benchmark. Apply timing is not measured yet; the report
/// only records when and how it was requested.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub timestamp: DateTime<FixedOffset>,
    pub config: BenchConfig,
    pub build_version: String,
}

impl ApplyReport {
    pub fn file_name(&self) -> String {
        report_filename(APPLY_REPORT_FILE_PREFIX, &self.timestamp)
    }

    pub fn render(&self) -> String {
        let build = if self.build_version.is_empty() {
            DEVELOPMENT_BUILD
        } else {
            &self.build_version
        };
        format!(
            "tf-bench ({build}) Apply Report {}\napply measurements are not available in this release\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }
}

/// Format a duration rounded to milliseconds: `0s`, `250ms`, `1.5s`, `2m3.25s`, `1h0m5s`.
pub fn format_duration(d: Duration) -> String {
    let millis = (d.as_nanos() + 500_000) / 1_000_000;
    if millis == 0 {
        return "0s".to_string();
    }
    if millis < 1000 {
        return format!("{millis}ms");
    }
    let hours = millis / 3_600_000;
    let minutes = (millis / 60_000) % 60;
    let secs_millis = millis % 60_000;
    let mut secs = format!("{}.{:03}", secs_millis / 1000, secs_millis % 1000);
    while secs.ends_with('0') {
        secs.pop();
    }
    if secs.ends_with('.') {
        secs.pop();
    }

    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    let _ = write!(out, "{secs}s");
    out
}

/// Boxed text table: `+---+` rules around the header and the body.
struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn render(&self) -> String {
        let mut widths: Vec<usize> = self.header.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }

        let rule: String = widths.iter().fold(String::from("+"), |mut acc, w| {
            acc.push_str(&"-".repeat(w + 2));
            acc.push('+');
            acc
        });
        let line = |cells: &[String]| -> String {
            let mut s = String::from("|");
            for (i, &w) in widths.iter().enumerate() {
                let cell = cells.get(i).map(String::as_str).unwrap_or("");
                let _ = write!(s, " {cell:<w$} |");
            }
            s
        };

        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{}", line(&self.header));
        let _ = writeln!(out, "{rule}");
        for row in &self.rows {
            let _ = writeln!(out, "{}", line(row));
        }
        if !self.rows.is_empty() {
            let _ = writeln!(out, "{rule}");
        }
        out
    }
}
