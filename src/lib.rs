//! # towebp Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per i front-end che
//!   pilotano il binario come sottoprocesso
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore fatali, per file e del codec
//! - `file_manager`: Discovery delle immagini, dimensioni e spazio libero
//! - `codec`: Decodifica, orientamento, colore e encoding WebP
//! - `converter`: Motore batch (path, freshness, scrittura atomica, finestre)
//! - `progress`: Statistiche del run e reporting del progresso
//! - `protocol`: Formato testuale di progresso e riepilogo su stdout
//! - `driver`: Esecuzione dell'engine come processo figlio con eventi tipizzati
//!
//! ## Utilizzo:
//! ```rust,no_run
//! # async fn demo() -> Result<(), towebp::ConvertError> {
//! use std::path::Path;
//! use towebp::{BatchConverter, Config};
//!
//! let converter = BatchConverter::new(Config::default())?;
//! let result = converter.run(Path::new("/photos"), None, true).await?;
//! println!("{}", result);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod converter;
pub mod driver;
pub mod error;
pub mod file_manager;
pub mod progress;
pub mod protocol;
pub mod utils;

pub use codec::{Codec, WebpCodec};
pub use config::Config;
pub use converter::BatchConverter;
pub use driver::{Driver, DriverEvent, DriverOutcome, DriverRequest};
pub use error::{CodecError, ConvertError, FileError};
pub use progress::{ConversionResult, FailedFile, ProgressReporter};
