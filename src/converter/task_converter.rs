//! # Task Converter Module
//!
//! Worker per la conversione di singoli file.
//! Separato dall'orchestratore per maggiore modularità.
//!
//! ## Atomicità:
//! Il codec scrive sempre su un file temporaneo nella scratch directory del run.
//! La destinazione diventa visibile solo con un rename finale: un errore o un
//! crash in qualunque passo precedente lascia la destinazione intatta.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{Builder, NamedTempFile, TempPath};
use tracing::debug;

use crate::{
    codec::Codec,
    converter::{freshness::Freshness, path_resolver::PathResolver, ConversionTask},
    error::{CodecError, FileError},
    progress::{FailedFile, TaskOutcome},
};

/// Converte un singolo task in modo atomico
#[derive(Clone)]
pub struct TaskConverter {
    codec: Arc<dyn Codec>,
    quality: u8,
    scratch_dir: PathBuf,
}

impl TaskConverter {
    pub fn new(codec: Arc<dyn Codec>, quality: u8, scratch_dir: PathBuf) -> Self {
        Self {
            codec,
            quality,
            scratch_dir,
        }
    }

    /// Convert one task; never fails, failures are part of the outcome
    pub async fn convert(&self, task: &ConversionTask) -> TaskOutcome {
        match self.try_convert(task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("[ERROR] {}: {}", task.source.display(), e);
                TaskOutcome::Failed(FailedFile {
                    file: task
                        .source
                        .file_name()
                        .unwrap_or_default()
                        .to_string_lossy()
                        .to_string(),
                    error: e.to_string(),
                })
            }
        }
    }

    async fn try_convert(&self, task: &ConversionTask) -> Result<TaskOutcome, FileError> {
        let freshness = Freshness::check(&task.source, &task.destination).await;
        if !freshness.needs_conversion() {
            debug!("[SKIP] {}: destination up to date", task.source.display());
            return Ok(TaskOutcome::Skipped);
        }
        debug!("[PROCESS] {} ({:?})", task.source.display(), freshness);

        let input_size = tokio::fs::metadata(&task.source)
            .await
            .map_err(FileError::SourceUnreadable)?
            .len();

        // Dropping the TempPath removes the file, so every early return cleans up
        let temp_output = Builder::new()
            .suffix(".webp")
            .rand_bytes(16)
            .tempfile_in(&self.scratch_dir)
            .map_err(FileError::DestinationWrite)?
            .into_temp_path();

        self.run_codec(&task.source, &temp_output).await?;

        let output_size = tokio::fs::metadata(&temp_output)
            .await
            .map_err(FileError::DestinationWrite)?
            .len();
        if output_size == 0 {
            return Err(FileError::EmptyOutput);
        }

        PathResolver::ensure_parent_dirs(&task.destination)
            .await
            .map_err(FileError::DestinationWrite)?;

        let destination = task.destination.clone();
        tokio::task::spawn_blocking(move || publish(temp_output, &destination))
            .await
            .map_err(|e| FileError::DestinationWrite(io::Error::other(e)))?
            .map_err(FileError::DestinationWrite)?;

        debug!(
            "[OK] {} -> {} ({} -> {} bytes)",
            task.source.display(),
            task.destination.display(),
            input_size,
            output_size
        );
        Ok(TaskOutcome::Converted {
            input_size,
            output_size,
        })
    }

    async fn run_codec(&self, source: &Path, temp_output: &Path) -> Result<(), FileError> {
        let codec = Arc::clone(&self.codec);
        let source = source.to_path_buf();
        let temp_output = temp_output.to_path_buf();
        let quality = self.quality;

        tokio::task::spawn_blocking(move || codec.encode(&source, &temp_output, quality))
            .await
            .map_err(|e| CodecError::Encode(format!("codec task failed: {}", e)))??;
        Ok(())
    }
}

/// Move the finished temp file onto `destination` with a single rename.
///
/// When the scratch directory sits on another filesystem the content is first
/// copied next to the destination, then renamed from there.
fn publish(temp_output: TempPath, destination: &Path) -> io::Result<()> {
    match temp_output.persist(destination) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("Direct rename failed ({}), staging next to destination", e.error);
            // the scratch copy goes away when e.path drops
            copy_then_rename(&e.path, destination)
        }
    }
}

/// Copy `source` into a temp file beside `destination`, then rename it over.
///
/// On error the staged copy is removed and `destination` is left as it was.
fn copy_then_rename(source: &Path, destination: &Path) -> io::Result<()> {
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut staged = NamedTempFile::new_in(parent)?;
    let mut reader = std::fs::File::open(source)?;
    io::copy(&mut reader, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged.persist(destination).map_err(|e| e.error)?;
    Ok(())
}
