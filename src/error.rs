//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Separa gli errori fatali di un run (`ConvertError`) dagli errori per singolo
//!   file (`FileError`), che vengono solo registrati nelle statistiche
//! - Definisce `CodecError` per il confine con il codec WebP
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - **Fatali**: path di input invalido, nessuna immagine trovata, spazio
//!   insufficiente, scratch directory non disponibile. Interrompono il run
//!   prima dello scheduling, senza statistiche parziali.
//! - **Per file**: sorgente illeggibile, errore codec, output vuoto, errore di
//!   scrittura della destinazione. Il batch continua col file successivo.
//!
//! ## Esempio:
//! ```rust,ignore
//! if files.is_empty() {
//!     return Err(ConvertError::NoImagesFound(input_dir.to_path_buf()));
//! }
//! ```

use std::path::PathBuf;

/// Run-level errors: nothing useful can be done when one of these occurs.
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("Input path does not exist: {0}")]
    InputNotFound(PathBuf),

    #[error("Input is neither a file nor a directory: {0}")]
    InvalidInput(PathBuf),

    #[error("Not a supported image file: {0}")]
    NotAnImage(PathBuf),

    #[error("No valid image files found in input directory: {0}")]
    NoImagesFound(PathBuf),

    #[error("Output directory is not usable: {path}: {source}")]
    OutputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Insufficient disk space: {available} bytes available, {required} bytes required")]
    InsufficientSpace { available: u64, required: u64 },

    #[error("Scratch directory unavailable: {path}: {source}")]
    ScratchUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-file failures, recorded in the run stats and never fatal to the batch.
#[derive(thiserror::Error, Debug)]
pub enum FileError {
    #[error("Cannot read source: {0}")]
    SourceUnreadable(#[source] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Generated file is empty")]
    EmptyOutput,

    #[error("Cannot write destination: {0}")]
    DestinationWrite(#[source] std::io::Error),
}

/// Errors raised by a [`Codec`](crate::codec::Codec) implementation.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Image too large: {width}x{height} exceeds {limit} pixels")]
    TooLarge { width: u32, height: u32, limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for CodecError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => CodecError::Io(e),
            other => CodecError::Decode(other.to_string()),
        }
    }
}
