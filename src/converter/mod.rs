//! # Converter Module
//!
//! Motore di conversione batch, separato in sottomoduli:
//! - `batch_converter`: Orchestratore principale e scheduling a finestre
//! - `task_converter`: Worker per singoli file con scrittura atomica
//! - `progress_tracker`: Statistiche del run e righe di progresso
//! - `path_resolver`: Discovery dei file e calcolo dei path di output
//! - `freshness`: Politica di skip per destinazioni già aggiornate

pub mod batch_converter;
pub mod freshness;
pub mod path_resolver;
pub mod progress_tracker;
pub mod task_converter;

pub use batch_converter::BatchConverter;
pub use freshness::Freshness;
pub use path_resolver::{ConversionTask, PathResolver, TaskPlan};
pub use progress_tracker::ProgressTracker;
pub use task_converter::TaskConverter;
