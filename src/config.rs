//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'engine di conversione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di conversione
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Calcola il parallelismo effettivo in base alla macchina host
//!
//! ## Parametri di configurazione:
//! - `quality`: Qualità WebP (1-100, default: 90)
//! - `max_concurrent`: Conversioni parallele per finestra (default: None = automatico)
//! - `extensions`: Estensioni riconosciute come immagini
//! - `scratch_dir`: Directory per i file temporanei (default: `<tmp>/towebp`)
//! - `decode_memory_limit_mb`: Limite di memoria per la decodifica (default: 512)
//! - `max_input_pixels`: Numero massimo di pixel per immagine (default: 16383²)
//!
//! ## Parallelismo automatico:
//! Senza `max_concurrent` esplicito vale `min(max(1, cpu - 1), 4)`: lascia un
//! core libero e non supera mai quattro encode contemporanei.
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     quality: 80,
//!     max_concurrent: Some(2),
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConvertError;

/// Quality used when nothing else is configured.
pub const DEFAULT_QUALITY: u8 = 90;

/// Upper bound of the automatic parallelism.
const MAX_AUTO_CONCURRENCY: usize = 4;

/// Configuration for a conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebP quality (1-100)
    pub quality: u8,
    /// Files converted concurrently per window (None = derived from host cpus)
    pub max_concurrent: Option<usize>,
    /// Lowercase file extensions treated as convertible images
    pub extensions: Vec<String>,
    /// Root directory for temporary encoder output
    pub scratch_dir: PathBuf,
    /// Allocation limit handed to the decoder, in MiB
    pub decode_memory_limit_mb: u64,
    /// Largest accepted image, in pixels
    pub max_input_pixels: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            max_concurrent: None,
            extensions: ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            scratch_dir: std::env::temp_dir().join("towebp"),
            decode_memory_limit_mb: 512,
            max_input_pixels: 268_402_689,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.quality == 0 || self.quality > 100 {
            return Err(ConvertError::InvalidConfig(
                "WebP quality must be between 1 and 100".to_string(),
            ));
        }

        if self.max_concurrent == Some(0) {
            return Err(ConvertError::InvalidConfig(
                "Number of concurrent conversions must be greater than 0".to_string(),
            ));
        }

        if self.extensions.is_empty() {
            return Err(ConvertError::InvalidConfig(
                "At least one image extension must be recognized".to_string(),
            ));
        }

        if self.decode_memory_limit_mb == 0 || self.max_input_pixels == 0 {
            return Err(ConvertError::InvalidConfig(
                "Decoder limits must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of files converted concurrently in each window
    pub fn effective_concurrency(&self) -> usize {
        match self.max_concurrent {
            Some(explicit) => explicit.max(1),
            None => Self::auto_concurrency(num_cpus::get()),
        }
    }

    fn auto_concurrency(host_cpus: usize) -> usize {
        host_cpus.saturating_sub(1).max(1).min(MAX_AUTO_CONCURRENCY)
    }

    /// Check whether a path carries one of the recognized extensions
    pub fn is_recognized(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| self.extensions.iter().any(|known| *known == ext))
            .unwrap_or(false)
    }

    /// Default location of the user configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("towebp").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.extensions = config
            .extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.quality = 0;
        assert!(config.validate().is_err());

        config.quality = 101;
        assert!(config.validate().is_err());

        config.quality = 75;
        config.max_concurrent = Some(0);
        assert!(config.validate().is_err());

        config.max_concurrent = Some(3);
        config.extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.quality, 90);
        assert_eq!(config.max_concurrent, None);
        assert_eq!(config.extensions.len(), 7);
        assert!(config.scratch_dir.ends_with("towebp"));
    }

    #[test]
    fn test_auto_concurrency_bounds() {
        assert_eq!(Config::auto_concurrency(1), 1);
        assert_eq!(Config::auto_concurrency(2), 1);
        assert_eq!(Config::auto_concurrency(4), 3);
        assert_eq!(Config::auto_concurrency(16), 4);
    }

    #[test]
    fn test_explicit_concurrency_wins() {
        let config = Config {
            max_concurrent: Some(7),
            ..Default::default()
        };
        assert_eq!(config.effective_concurrency(), 7);
    }

    #[test]
    fn test_recognized_extensions_ignore_case() {
        let config = Config::default();
        assert!(config.is_recognized(Path::new("/a/photo.JPG")));
        assert!(config.is_recognized(Path::new("scan.tiff")));
        assert!(!config.is_recognized(Path::new("notes.txt")));
        assert!(!config.is_recognized(Path::new("README")));
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let original_config = Config {
            quality: 70,
            max_concurrent: Some(2),
            extensions: vec!["png".to_string()],
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.quality, 70);
        assert_eq!(loaded_config.max_concurrent, Some(2));
        assert_eq!(loaded_config.extensions, vec!["png".to_string()]);
    }

    #[tokio::test]
    async fn test_partial_config_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "quality": 60, "extensions": [".PNG"] }"#)
            .await
            .unwrap();

        let config = Config::from_file(&config_path).await.unwrap();
        assert_eq!(config.quality, 60);
        assert_eq!(config.extensions, vec!["png".to_string()]);
        assert_eq!(config.decode_memory_limit_mb, 512);
    }

    #[tokio::test]
    async fn test_missing_config_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(config.quality, DEFAULT_QUALITY);
    }

    #[tokio::test]
    async fn test_invalid_config_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "quality": 0 }"#).await.unwrap();

        assert!(Config::from_file(&config_path).await.is_err());
    }
}
