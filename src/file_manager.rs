//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file e la discovery delle immagini.
//!
//! ## Responsabilità:
//! - Discovery (ricorsiva o meno) delle immagini in una directory
//! - Somma delle dimensioni dei file di una directory per il pre-flight
//! - Spazio libero disponibile sul disco di destinazione
//! - Formattazione human-readable delle dimensioni
//!
//! ## Ordine di enumerazione:
//! Le entry di ogni directory sono ordinate per nome e visitate depth-first,
//! quindi l'ordine dei task è deterministico tra un run e l'altro.
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_images(Path::new("/photos"), true, &config)?;
//! println!("{}", FileManager::format_size(1536)); // "1.50 KB"
//! ```

use std::io;
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::Config;

/// Manages file discovery and size bookkeeping
pub struct FileManager;

impl FileManager {
    /// Find all recognized images in a directory
    pub fn find_images(dir: &Path, recursive: bool, config: &Config) -> io::Result<Vec<PathBuf>> {
        let mut walker = WalkDir::new(dir).min_depth(1).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("cannot read input directory")));
                }
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if path.is_file() && config.is_recognized(path) {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }

    /// Total size of the regular files directly inside `dir` (subdirectories are not visited)
    pub fn shallow_directory_size(dir: &Path) -> io::Result<u64> {
        let mut total = 0;
        for entry in std::fs::read_dir(dir)? {
            let Ok(entry) = entry else { continue };
            match entry.metadata() {
                Ok(metadata) if metadata.is_file() => total += metadata.len(),
                _ => {}
            }
        }
        Ok(total)
    }

    /// Free space on the disk holding `path`, `None` when it cannot be determined
    pub fn available_space(path: &Path) -> Option<u64> {
        let target = path.canonicalize().ok()?;
        let disks = Disks::new_with_refreshed_list();

        disks
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }

    /// Get human-readable size in binary units, keeping the sign of negative values
    pub fn format_size(bytes: i64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
        let sign = if bytes < 0 { "-" } else { "" };
        let mut size = bytes.unsigned_abs() as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{}{:.2} {}", sign, size, UNITS[unit_index])
    }
}
