//! # Batch Converter Main Orchestrator
//!
//! Orchestratore principale che delega responsabilità ai moduli specializzati:
//! `PathResolver` per il piano dei task, `TaskConverter` per la scrittura
//! atomica di ogni file, `ProgressTracker` per statistiche e progresso.
//!
//! ## Scheduling:
//! I task vengono eseguiti a finestre di dimensione pari alla concorrenza
//! effettiva. Ogni finestra termina completamente prima che parta la
//! successiva; dopo ogni finestra viene emessa una riga di progresso.

use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    codec::{Codec, WebpCodec},
    config::Config,
    converter::{
        path_resolver::PathResolver, progress_tracker::ProgressTracker,
        task_converter::TaskConverter,
    },
    error::ConvertError,
    progress::{ConversionResult, ProgressReporter, StdoutReporter},
};

/// Prefix of the per-run scratch subdirectories
const RUN_DIR_PREFIX: &str = "run-";

/// Run directories untouched for longer than this are left over from a crash
const STALE_RUN_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Converts every image under one input path to WebP
pub struct BatchConverter {
    config: Config,
    codec: Arc<dyn Codec>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: Option<watch::Receiver<bool>>,
}

impl BatchConverter {
    /// Crea il converter con il codec WebP e il reporter su stdout
    pub fn new(config: Config) -> Result<Self, ConvertError> {
        config.validate()?;
        let codec = Arc::new(WebpCodec::new(&config));
        Ok(Self {
            config,
            codec,
            reporter: Arc::new(StdoutReporter),
            cancel: None,
        })
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Stop scheduling new windows once the receiver reads `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run one batch over a file or directory.
    ///
    /// Fatal errors abort before any statistics are produced; per-file
    /// failures end up in [`ConversionResult::failed`].
    pub async fn run(
        &self,
        input: &Path,
        output_dir: Option<&Path>,
        recursive: bool,
    ) -> Result<ConversionResult, ConvertError> {
        let plan = PathResolver::resolve(input, output_dir, recursive, &self.config)?;
        self.log_configuration(input, output_dir, recursive, plan.total_files());

        let run_dir = self.create_run_scratch()?;
        let tracker = ProgressTracker::new(plan.total_files(), Arc::clone(&self.reporter));
        tracker.add_skipped(plan.same_path.len()).await;

        let converter = TaskConverter::new(
            Arc::clone(&self.codec),
            self.config.quality,
            run_dir.path().to_path_buf(),
        );
        let window_size = self.config.effective_concurrency();
        let total = plan.tasks.len();
        let mut done = 0;

        for window in plan.tasks.chunks(window_size) {
            if self.is_cancelled() {
                info!("Conversion cancelled after {}/{} tasks", done, total);
                tracker.finish_progress(done > 0);
                Self::cleanup(run_dir);
                return Err(ConvertError::Cancelled);
            }

            join_all(window.iter().map(|task| {
                let converter = &converter;
                let tracker = &tracker;
                async move {
                    let outcome = converter.convert(task).await;
                    tracker.record(outcome).await;
                }
            }))
            .await;

            done += window.len();
            tracker.emit_window(done, total).await;
        }

        tracker.finish_progress(total > 0);
        Self::cleanup(run_dir);

        let result = tracker.finish().await;
        debug!(
            "Run finished: {} processed, {} skipped, {} failed",
            result.processed,
            result.skipped,
            result.failed.len()
        );
        Ok(result)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Create the scratch root, then a private subdirectory for this run
    fn create_run_scratch(&self) -> Result<TempDir, ConvertError> {
        let root = &self.config.scratch_dir;
        let unavailable = |source: std::io::Error| ConvertError::ScratchUnavailable {
            path: root.clone(),
            source,
        };

        std::fs::create_dir_all(root).map_err(unavailable)?;
        if let Some(cutoff) = SystemTime::now().checked_sub(STALE_RUN_AGE) {
            sweep_stale_runs(root, cutoff);
        }
        let run_dir = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir_in(root)
            .map_err(unavailable)?;
        debug!("Scratch directory: {}", run_dir.path().display());
        Ok(run_dir)
    }

    fn cleanup(run_dir: TempDir) {
        let path = run_dir.path().to_path_buf();
        if let Err(e) = run_dir.close() {
            debug!("Scratch cleanup failed for {}: {}", path.display(), e);
        }
    }

    fn log_configuration(
        &self,
        input: &Path,
        output_dir: Option<&Path>,
        recursive: bool,
        total_files: usize,
    ) {
        info!("Starting WebP conversion in: {}", input.display());
        info!("Quality: {}", self.config.quality);
        match output_dir {
            Some(dir) => info!("Output directory: {}", dir.display()),
            None => info!("Mode: write next to the source files"),
        }
        if recursive {
            info!("Recursive: descending into subdirectories");
        }
        info!(
            "Concurrency: {} tasks per window",
            self.config.effective_concurrency()
        );
        info!("Found {} image files", total_files);
    }
}

/// Best-effort removal of run directories last modified before `cutoff`.
///
/// Returns how many were removed. Anything that cannot be read or deleted is
/// left alone.
fn sweep_stale_runs(root: &Path, cutoff: SystemTime) -> usize {
    let Ok(entries) = std::fs::read_dir(root) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(RUN_DIR_PREFIX) {
            continue;
        }
        let stale = entry
            .metadata()
            .ok()
            .filter(|metadata| metadata.is_dir())
            .and_then(|metadata| metadata.modified().ok())
            .is_some_and(|modified| modified < cutoff);
        if !stale {
            continue;
        }
        match std::fs::remove_dir_all(entry.path()) {
            Ok(()) => {
                debug!("Removed stale scratch directory: {}", entry.path().display());
                removed += 1;
            }
            Err(e) => debug!(
                "Could not remove stale scratch directory {}: {}",
                entry.path().display(),
                e
            ),
        }
    }
    removed
}
