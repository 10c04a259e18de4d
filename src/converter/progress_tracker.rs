//! # Progress Tracking Module
//!
//! Tracker thread-safe condiviso tra i task di una finestra.
//! Accumula le statistiche del run e inoltra il progresso al reporter.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    progress::{ConversionResult, ProgressReporter, RunStats, TaskOutcome},
    protocol::ProgressUpdate,
};

/// Shared run statistics plus the progress sink
#[derive(Clone)]
pub struct ProgressTracker {
    stats: Arc<Mutex<RunStats>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl ProgressTracker {
    /// Crea un nuovo tracker e avvia il timer del run
    pub fn new(total_files: usize, reporter: Arc<dyn ProgressReporter>) -> Self {
        let mut stats = RunStats::new(total_files);
        stats.start();
        Self {
            stats: Arc::new(Mutex::new(stats)),
            reporter,
        }
    }

    /// Registra l'esito di un task
    pub async fn record(&self, outcome: TaskOutcome) {
        self.stats.lock().await.record(outcome);
    }

    /// Files skipped before scheduling (source equal to destination)
    pub async fn add_skipped(&self, count: usize) {
        self.stats.lock().await.skipped += count;
    }

    /// Report cumulative progress once a window has fully settled
    pub async fn emit_window(&self, done: usize, total: usize) {
        let saved_bytes = self.stats.lock().await.saved_bytes;
        self.reporter
            .progress(&ProgressUpdate::new(done, total, saved_bytes));
    }

    /// Chiude la riga di progresso, solo se almeno un task è stato schedulato
    pub fn finish_progress(&self, had_tasks: bool) {
        if had_tasks {
            self.reporter.finish();
        }
    }

    /// Ferma il timer e restituisce il riepilogo finale
    pub async fn finish(&self) -> ConversionResult {
        let mut stats = self.stats.lock().await;
        stats.finish();
        stats.to_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CollectingReporter, FailedFile};

    #[tokio::test]
    async fn test_window_reports_cumulative_savings() {
        let reporter = Arc::new(CollectingReporter::new());
        let tracker = ProgressTracker::new(3, reporter.clone());

        tracker
            .record(TaskOutcome::Converted {
                input_size: 1000,
                output_size: 400,
            })
            .await;
        tracker.emit_window(1, 3).await;
        tracker.record(TaskOutcome::Skipped).await;
        tracker
            .record(TaskOutcome::Failed(FailedFile {
                file: "x.png".to_string(),
                error: "bad".to_string(),
            }))
            .await;
        tracker.emit_window(3, 3).await;

        let updates = reporter.updates();
        assert_eq!(
            updates,
            vec![ProgressUpdate::new(1, 3, 600), ProgressUpdate::new(3, 3, 600)]
        );
        let result = tracker.finish().await;
        assert_eq!(
            (result.processed, result.skipped, result.failed.len()),
            (1, 1, 1)
        );
    }

    #[tokio::test]
    async fn test_finish_builds_result() {
        let tracker = ProgressTracker::new(4, Arc::new(CollectingReporter::new()));
        tracker.add_skipped(1).await;
        tracker
            .record(TaskOutcome::Converted {
                input_size: 2048,
                output_size: 1024,
            })
            .await;

        let result = tracker.finish().await;
        assert_eq!(result.total_files, 4);
        assert_eq!(result.processed, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.saved_bytes, 1024);
        assert_eq!(result.compression_ratio, "50.00%");
    }
}
