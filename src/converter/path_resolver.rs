//! # Path Resolution Module
//!
//! Centralizza la discovery dei file e il calcolo dei path di output.
//! Produce il piano dei task prima che parta lo scheduling.

use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::{config::Config, error::ConvertError, file_manager::FileManager};

/// Space required at the destination, relative to the input size
const SPACE_SAFETY_FACTOR: f64 = 1.2;

/// One source image and where its WebP goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTask {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Result of path resolution for one input
#[derive(Debug, Default)]
pub struct TaskPlan {
    /// Tasks to schedule, in enumeration order
    pub tasks: Vec<ConversionTask>,
    /// Sources whose destination is the source itself
    pub same_path: Vec<PathBuf>,
}

impl TaskPlan {
    /// Every discovered image, scheduled or not
    pub fn total_files(&self) -> usize {
        self.tasks.len() + self.same_path.len()
    }
}

/// Utility per calcolare i task e i path di output in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Build the task plan for a file or directory input
    pub fn resolve(
        input: &Path,
        output_dir: Option<&Path>,
        recursive: bool,
        config: &Config,
    ) -> Result<TaskPlan, ConvertError> {
        let metadata = std::fs::metadata(input)
            .map_err(|_| ConvertError::InputNotFound(input.to_path_buf()))?;

        let tasks = if metadata.is_file() {
            vec![Self::resolve_file(input, output_dir, config)?]
        } else if metadata.is_dir() {
            Self::resolve_directory(input, output_dir, recursive, config)?
        } else {
            return Err(ConvertError::InvalidInput(input.to_path_buf()));
        };

        Ok(Self::split_same_path(tasks))
    }

    fn resolve_file(
        input: &Path,
        output_dir: Option<&Path>,
        config: &Config,
    ) -> Result<ConversionTask, ConvertError> {
        if !config.is_recognized(input) {
            return Err(ConvertError::NotAnImage(input.to_path_buf()));
        }

        let file_name = Self::webp_file_name(input)?;
        let destination = match output_dir {
            Some(dir) => dir.join(file_name),
            None => input.with_file_name(file_name),
        };

        Ok(ConversionTask {
            source: input.to_path_buf(),
            destination,
        })
    }

    fn resolve_directory(
        input: &Path,
        output_dir: Option<&Path>,
        recursive: bool,
        config: &Config,
    ) -> Result<Vec<ConversionTask>, ConvertError> {
        if let Some(output_dir) = output_dir {
            Self::check_output_capacity(input, output_dir)?;
        }

        let files = FileManager::find_images(input, recursive, config)?;
        if files.is_empty() {
            return Err(ConvertError::NoImagesFound(input.to_path_buf()));
        }

        files
            .into_iter()
            .map(|source| {
                let destination = Self::destination_for(&source, input, output_dir)?;
                Ok(ConversionTask {
                    source,
                    destination,
                })
            })
            .collect()
    }

    /// Destination of a file discovered under `input_root`
    pub fn destination_for(
        source: &Path,
        input_root: &Path,
        output_dir: Option<&Path>,
    ) -> Result<PathBuf, ConvertError> {
        let file_name = Self::webp_file_name(source)?;

        let Some(output_dir) = output_dir else {
            return Ok(source.with_file_name(file_name));
        };

        let relative_dir = source
            .strip_prefix(input_root)
            .ok()
            .and_then(Path::parent)
            .unwrap_or(Path::new(""));
        let result = output_dir.join(relative_dir).join(file_name);
        debug!("Resolved output path: {} -> {}", source.display(), result.display());
        Ok(result)
    }

    fn webp_file_name(source: &Path) -> Result<String, ConvertError> {
        let stem = source
            .file_stem()
            .ok_or_else(|| ConvertError::InvalidInput(source.to_path_buf()))?;
        Ok(format!("{}.webp", stem.to_string_lossy()))
    }

    /// Move tasks that would convert a file onto itself into the skip list
    fn split_same_path(tasks: Vec<ConversionTask>) -> TaskPlan {
        let mut plan = TaskPlan::default();
        for task in tasks {
            if Self::resolved(&task.source) == Self::resolved(&task.destination) {
                warn!(
                    "Skipping: source and output are the same file: {}",
                    task.source.display()
                );
                plan.same_path.push(task.source);
            } else {
                plan.tasks.push(task);
            }
        }
        plan
    }

    /// Absolute, normalized form of a path that may not exist yet
    fn resolved(path: &Path) -> PathBuf {
        if let Ok(canonical) = path.canonicalize() {
            return canonical;
        }
        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            if let Ok(parent) = parent.canonicalize() {
                return parent.join(name);
            }
        }

        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other),
            }
        }
        normalized
    }

    /// Pre-flight: create the output root and require 1.2x the input size in free space.
    ///
    /// Only the regular files directly inside `input_dir` are counted, also for
    /// recursive runs, so this is a conservative hint rather than a guarantee.
    fn check_output_capacity(input_dir: &Path, output_dir: &Path) -> Result<(), ConvertError> {
        std::fs::create_dir_all(output_dir).map_err(|source| ConvertError::OutputUnavailable {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let input_bytes = FileManager::shallow_directory_size(input_dir)?;
        let available = FileManager::available_space(output_dir);
        if available.is_none() {
            debug!("Free space unknown for {}, skipping check", output_dir.display());
        }
        Self::ensure_capacity(input_bytes, available)
    }

    /// Compare free space against the input size plus the safety margin.
    ///
    /// Unknown free space (`None`) always passes.
    pub fn ensure_capacity(input_bytes: u64, available: Option<u64>) -> Result<(), ConvertError> {
        let Some(available) = available else {
            return Ok(());
        };

        let required = (input_bytes as f64 * SPACE_SAFETY_FACTOR).ceil() as u64;
        if available < required {
            return Err(ConvertError::InsufficientSpace {
                available,
                required,
            });
        }
        Ok(())
    }

    /// Crea le directory parent se necessario
    pub async fn ensure_parent_dirs(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}
