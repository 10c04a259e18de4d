//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce le statistiche di conversione e il reporting del progresso.
//!
//! ## Componenti principali:
//! - `RunStats`: accumulatore mutabile, uno per run
//! - `ConversionResult`: snapshot immutabile costruito a fine run
//! - `ProgressReporter`: destinazione delle righe di progresso e del riepilogo
//! - `StdoutReporter`: implementazione che scrive il protocollo su stdout
//!
//! ## Statistiche tracciate:
//! - **processed**: file convertiti con successo
//! - **skipped**: file saltati (destinazione aggiornata o stesso path)
//! - **failed**: file falliti, con nome e messaggio di errore
//! - **total_bytes_in**: byte in ingresso dei soli file convertiti
//! - **saved_bytes**: differenza input - output, negativa se il WebP è più grande
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut stats = RunStats::new(3);
//! stats.start();
//! stats.record(TaskOutcome::Converted { input_size: 300, output_size: 100 });
//! stats.finish();
//! let result = stats.to_result();
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::file_manager::FileManager;
use crate::protocol::{self, ProgressUpdate};

/// What happened to a single conversion task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Converted { input_size: u64, output_size: u64 },
    Skipped,
    Failed(FailedFile),
}

/// A file that could not be converted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub file: String,
    pub error: String,
}

/// Mutable accumulator for one run
#[derive(Debug, Default)]
pub struct RunStats {
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<FailedFile>,
    pub total_files: usize,
    pub total_bytes_in: u64,
    pub saved_bytes: i64,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
}

impl RunStats {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            ..Default::default()
        }
    }

    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Instant::now());
    }

    pub fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Converted {
                input_size,
                output_size,
            } => {
                self.processed += 1;
                self.total_bytes_in += input_size;
                self.saved_bytes += input_size as i64 - output_size as i64;
            }
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Failed(failed) => self.failed.push(failed),
        }
    }

    pub fn duration(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    pub fn compression_ratio(&self) -> String {
        if self.total_bytes_in == 0 {
            return "0%".to_string();
        }
        format!(
            "{:.2}%",
            self.saved_bytes as f64 / self.total_bytes_in as f64 * 100.0
        )
    }

    pub fn to_result(&self) -> ConversionResult {
        ConversionResult {
            total_files: self.total_files,
            processed: self.processed,
            skipped: self.skipped,
            failed: self.failed.clone(),
            duration: format_duration(self.duration()),
            total_size: FileManager::format_size(self.total_bytes_in as i64),
            saved_size: FileManager::format_size(self.saved_bytes),
            compression_ratio: self.compression_ratio(),
            total_bytes_in: self.total_bytes_in,
            saved_bytes: self.saved_bytes,
        }
    }
}

/// Immutable snapshot returned at the end of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub total_files: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<FailedFile>,
    pub duration: String,
    pub total_size: String,
    pub saved_size: String,
    pub compression_ratio: String,
    pub total_bytes_in: u64,
    pub saved_bytes: i64,
}

impl std::fmt::Display for ConversionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&protocol::render_summary(self))
    }
}

/// `"{m}m {s}s"` from one minute up, `"{s}s"` below
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Destination for per-window progress
pub trait ProgressReporter: Send + Sync {
    /// Called once after every scheduler window
    fn progress(&self, update: &ProgressUpdate);

    /// Called once after the last window when at least one task ran
    fn finish(&self);
}

/// Writes the progress protocol to stdout, overwriting the same terminal line
#[derive(Debug, Default)]
pub struct StdoutReporter;

impl ProgressReporter for StdoutReporter {
    fn progress(&self, update: &ProgressUpdate) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\r{}", update);
        let _ = stdout.flush();
    }

    fn finish(&self) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout);
        let _ = stdout.flush();
    }
}

/// Keeps every update in memory; used by library callers that render progress themselves
#[derive(Debug, Default)]
pub struct CollectingReporter {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for CollectingReporter {
    fn progress(&self, update: &ProgressUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update.clone());
        }
    }

    fn finish(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(name: &str) -> TaskOutcome {
        TaskOutcome::Failed(FailedFile {
            file: name.to_string(),
            error: "boom".to_string(),
        })
    }

    #[test]
    fn test_saved_bytes_only_counts_processed() {
        let mut stats = RunStats::new(3);
        stats.record(TaskOutcome::Converted {
            input_size: 1000,
            output_size: 900,
        });
        stats.record(TaskOutcome::Converted {
            input_size: 500,
            output_size: 300,
        });
        stats.record(failed("c.jpg"));

        assert_eq!(stats.saved_bytes, 300);
        assert_eq!(stats.total_bytes_in, 1500);
        assert_eq!(
            stats.processed + stats.skipped + stats.failed.len(),
            stats.total_files
        );
    }

    #[test]
    fn test_saved_bytes_can_go_negative() {
        let mut stats = RunStats::new(1);
        stats.record(TaskOutcome::Converted {
            input_size: 100,
            output_size: 250,
        });
        assert_eq!(stats.saved_bytes, -150);
        assert_eq!(stats.compression_ratio(), "-150.00%");
    }

    #[test]
    fn test_compression_ratio() {
        let mut stats = RunStats::new(1);
        assert_eq!(stats.compression_ratio(), "0%");

        stats.record(TaskOutcome::Converted {
            input_size: 3,
            output_size: 1,
        });
        assert_eq!(stats.compression_ratio(), "66.67%");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(0)), "0s");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "59s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m 0s");
        assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
    }

    #[test]
    fn test_duration_unset_is_zero() {
        let mut stats = RunStats::new(0);
        assert_eq!(stats.duration(), Duration::ZERO);
        stats.start();
        assert_eq!(stats.duration(), Duration::ZERO);
        stats.finish();
        assert_eq!(stats.to_result().duration, "0s");
    }

    #[test]
    fn test_to_result_snapshot() {
        let mut stats = RunStats::new(4);
        stats.record(TaskOutcome::Converted {
            input_size: 2048,
            output_size: 1024,
        });
        stats.record(TaskOutcome::Skipped);
        stats.record(TaskOutcome::Skipped);
        stats.record(failed("bad.png"));

        let result = stats.to_result();
        assert_eq!(result.total_files, 4);
        assert_eq!(result.processed, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.total_size, "2.00 KB");
        assert_eq!(result.saved_size, "1.00 KB");
        assert_eq!(result.compression_ratio, "50.00%");
    }

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::new();
        reporter.progress(&ProgressUpdate::new(1, 2, 0));
        reporter.progress(&ProgressUpdate::new(2, 2, 1024));
        let updates = reporter.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].done, 2);
    }
}
