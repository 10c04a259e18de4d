//! # Freshness Module
//!
//! Decide se una destinazione esistente è ancora valida o va rigenerata.
//! Ogni errore di lettura dei metadata porta alla conversione (fail open).

use std::path::Path;
use tokio::fs;

/// Why a task does or does not need conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No destination yet
    Missing,
    /// Destination exists but has no content (leftover of a failed write)
    Empty,
    /// Source modified after the destination
    Stale,
    /// Metadata could not be read; convert anyway
    Unknown,
    /// Destination is newer than or as new as the source
    UpToDate,
}

impl Freshness {
    pub fn needs_conversion(self) -> bool {
        !matches!(self, Freshness::UpToDate)
    }

    /// Inspect source and destination metadata
    pub async fn check(source: &Path, destination: &Path) -> Self {
        let destination_meta = match fs::metadata(destination).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Freshness::Missing,
            Err(_) => return Freshness::Unknown,
        };

        if destination_meta.len() == 0 {
            return Freshness::Empty;
        }

        let Ok(source_meta) = fs::metadata(source).await else {
            return Freshness::Unknown;
        };

        match (source_meta.modified(), destination_meta.modified()) {
            (Ok(source_time), Ok(destination_time)) if source_time > destination_time => {
                Freshness::Stale
            }
            (Ok(_), Ok(_)) => Freshness::UpToDate,
            _ => Freshness::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write_with_mtime(path: &Path, content: &[u8], mtime: SystemTime) {
        std::fs::write(path, content).unwrap();
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    #[tokio::test]
    async fn test_missing_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.jpg");
        File::create(&source).unwrap();

        let freshness = Freshness::check(&source, &dir.path().join("a.webp")).await;
        assert_eq!(freshness, Freshness::Missing);
        assert!(freshness.needs_conversion());
    }

    #[tokio::test]
    async fn test_empty_destination() {
        let dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        let source = dir.path().join("a.jpg");
        let destination = dir.path().join("a.webp");
        write_with_mtime(&source, b"src", now - Duration::from_secs(100));
        write_with_mtime(&destination, b"", now);

        assert_eq!(Freshness::check(&source, &destination).await, Freshness::Empty);
    }

    #[tokio::test]
    async fn test_stale_destination() {
        let dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        let source = dir.path().join("a.jpg");
        let destination = dir.path().join("a.webp");
        write_with_mtime(&destination, b"old", now - Duration::from_secs(100));
        write_with_mtime(&source, b"src", now);

        assert_eq!(Freshness::check(&source, &destination).await, Freshness::Stale);
    }

    #[tokio::test]
    async fn test_up_to_date_destination() {
        let dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        let source = dir.path().join("a.jpg");
        let destination = dir.path().join("a.webp");
        write_with_mtime(&source, b"src", now - Duration::from_secs(100));
        write_with_mtime(&destination, b"webp", now);

        let freshness = Freshness::check(&source, &destination).await;
        assert_eq!(freshness, Freshness::UpToDate);
        assert!(!freshness.needs_conversion());
    }

    #[tokio::test]
    async fn test_equal_mtimes_skip() {
        let dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        let source = dir.path().join("a.jpg");
        let destination = dir.path().join("a.webp");
        write_with_mtime(&source, b"src", now);
        write_with_mtime(&destination, b"webp", now);

        assert_eq!(Freshness::check(&source, &destination).await, Freshness::UpToDate);
    }

    #[tokio::test]
    async fn test_unreadable_source_fails_open() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("a.webp");
        std::fs::write(&destination, b"webp").unwrap();

        let freshness = Freshness::check(&dir.path().join("gone.jpg"), &destination).await;
        assert_eq!(freshness, Freshness::Unknown);
        assert!(freshness.needs_conversion());
    }
}
