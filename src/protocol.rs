//! # Line Protocol Module
//!
//! Line-oriented text contract between the engine (stdout writer) and any
//! consumer that drives it as a subprocess.
//!
//! ```text
//! Progress: 40.0% (2/5) | Saved: 0.12MB
//! Progress: 80.0% (4/5) | Saved: 0.31MB
//! Progress: 100.0% (5/5) | Saved: 0.40MB
//!
//! Conversion completed:
//!   Total files: 5
//!   Processed: 5
//!   Skipped: 0
//!   Failed: 0
//!   Duration: 1s
//!   Total size: 1.10 MB
//!   Saved: 412.00 KB
//!   Compression: 36.58%
//! ```
//!
//! Progress lines are written with a leading carriage return so a terminal
//! keeps redrawing one line. Anything else on stdout is opaque log text unless
//! it belongs to a summary block.

use std::fmt;

use crate::progress::{ConversionResult, FailedFile};

/// First line of every summary block
pub const SUMMARY_HEADER: &str = "Conversion completed:";

const PROGRESS_LABEL: &str = "Progress:";
const FAILED_FILES_HEADER: &str = "Failed files:";

/// Cumulative progress after a scheduler window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub done: usize,
    pub total: usize,
    pub saved_bytes: i64,
}

impl ProgressUpdate {
    pub fn new(done: usize, total: usize, saved_bytes: i64) -> Self {
        Self {
            done,
            total,
            saved_bytes,
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.done as f64 / self.total as f64 * 100.0
        }
    }

    pub fn saved_mb(&self) -> f64 {
        self.saved_bytes as f64 / 1024.0 / 1024.0
    }
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.1}% ({}/{}) | Saved: {:.2}MB",
            PROGRESS_LABEL,
            self.percent(),
            self.done,
            self.total,
            self.saved_mb()
        )
    }
}

/// A progress line as seen by a consumer of the text stream
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLine {
    pub percent: f64,
    pub done: usize,
    pub total: usize,
    pub saved_mb: f64,
}

impl ProgressLine {
    /// Parse `Progress: 40.0% (2/5) | Saved: 0.12MB`, tolerating surrounding text
    pub fn parse(line: &str) -> Option<Self> {
        let start = line.find(PROGRESS_LABEL)? + PROGRESS_LABEL.len();
        let rest = line[start..].trim_start();

        let (percent, rest) = rest.split_once('%')?;
        let percent = percent.trim().parse().ok()?;

        let open = rest.find('(')?;
        let close = rest.find(')')?;
        let (done, total) = rest.get(open + 1..close)?.split_once('/')?;
        let done = done.trim().parse().ok()?;
        let total = total.trim().parse().ok()?;

        let saved = rest[close..].split_once("Saved:")?.1.trim();
        let saved_mb = saved.strip_suffix("MB").unwrap_or(saved).trim().parse().ok()?;

        Some(Self {
            percent,
            done,
            total,
            saved_mb,
        })
    }

    /// Completion as a fraction in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        (self.percent / 100.0).clamp(0.0, 1.0)
    }
}

/// Classification of one complete stdout line
#[derive(Debug, Clone, PartialEq)]
pub enum StdoutLine {
    Progress(ProgressLine),
    Log(String),
}

impl StdoutLine {
    pub fn classify(line: &str) -> Self {
        if line.contains(PROGRESS_LABEL) {
            if let Some(progress) = ProgressLine::parse(line) {
                return StdoutLine::Progress(progress);
            }
        }
        StdoutLine::Log(line.to_string())
    }
}

/// Render the summary block printed at the end of a completed run
pub fn render_summary(result: &ConversionResult) -> String {
    let mut out = String::new();
    out.push_str(SUMMARY_HEADER);
    out.push('\n');

    let rows: [(&str, String); 8] = [
        ("Total files", result.total_files.to_string()),
        ("Processed", result.processed.to_string()),
        ("Skipped", result.skipped.to_string()),
        ("Failed", result.failed.len().to_string()),
        ("Duration", result.duration.clone()),
        ("Total size", result.total_size.clone()),
        ("Saved", result.saved_size.clone()),
        ("Compression", result.compression_ratio.clone()),
    ];
    for (label, value) in rows {
        out.push_str(&format!("  {}: {}\n", label, value));
    }

    if !result.failed.is_empty() {
        out.push('\n');
        out.push_str(FAILED_FILES_HEADER);
        out.push('\n');
        for failed in &result.failed {
            out.push_str(&format!("  - {}: {}\n", failed.file, failed.error));
        }
    }

    out
}

/// A summary block as recovered from captured stdout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryReport {
    pub total_files: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration: String,
    pub total_size: String,
    pub saved_size: String,
    pub compression_ratio: String,
    pub failed_files: Vec<FailedFile>,
}

impl SummaryReport {
    fn apply(&mut self, label: &str, value: &str) {
        match label {
            "Total files" => self.total_files = value.parse().unwrap_or(0),
            "Processed" => self.processed = value.parse().unwrap_or(0),
            "Skipped" => self.skipped = value.parse().unwrap_or(0),
            "Failed" => self.failed = value.parse().unwrap_or(0),
            "Duration" => self.duration = value.to_string(),
            "Total size" => self.total_size = value.to_string(),
            "Saved" => self.saved_size = value.to_string(),
            "Compression" => self.compression_ratio = value.to_string(),
            _ => {}
        }
    }
}

/// Extract every summary block from the full captured stdout, in order
pub fn parse_summaries(stdout: &str) -> Vec<SummaryReport> {
    let mut reports = Vec::new();
    let mut current: Option<SummaryReport> = None;
    let mut in_failed_list = false;

    for line in stdout.split(['\r', '\n']).map(str::trim) {
        if line.contains(SUMMARY_HEADER) {
            reports.extend(current.take());
            current = Some(SummaryReport::default());
            in_failed_list = false;
            continue;
        }

        let Some(report) = current.as_mut() else {
            continue;
        };
        if line.is_empty() {
            continue;
        }
        if line == FAILED_FILES_HEADER {
            in_failed_list = true;
            continue;
        }
        if in_failed_list {
            if let Some(item) = line.strip_prefix("- ") {
                let (file, error) = item.split_once(": ").unwrap_or((item, ""));
                report.failed_files.push(FailedFile {
                    file: file.to_string(),
                    error: error.to_string(),
                });
                continue;
            }
            in_failed_list = false;
        }
        if let Some((label, value)) = line.split_once(':') {
            report.apply(label.trim(), value.trim());
        }
    }

    reports.extend(current);
    reports
}
