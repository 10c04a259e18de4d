//! # towebp - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging con `tracing`, su stderr
//! - Caricamento della configurazione e applicazione dei flag
//! - Un run del `BatchConverter` per ogni path, con un riepilogo per run
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (WARN, o DEBUG con `--verbose`; `RUST_LOG` rispettato)
//! 3. Carica il file di configurazione (o i default) e applica i flag
//! 4. Collega Ctrl-C al segnale di cancellazione
//! 5. Converte ogni path; un errore fatale su un path non ferma i successivi
//!
//! ## Esempio di utilizzo:
//! ```bash
//! towebp ~/Pictures/trip -r -q 80 -o ~/Pictures/trip-webp
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use towebp::{BatchConverter, Config, ConvertError};

/// Exit code of an interrupted run
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(name = "towebp")]
#[command(about = "Convert images to WebP, skipping files that are already up to date")]
struct Args {
    /// Image files or directories to convert
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// WebP quality (1-100) [default: 90]
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Output directory (default: next to each source file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Files converted concurrently (default: cpus - 1, at most 4)
    #[arg(short = 'j', long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    concurrency: Option<usize>,

    /// Directory for temporary encoder output
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Configuration file (default: <config dir>/towebp/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the progress protocol, so every log line goes to stderr
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // a driving process reads stderr as the error message: no colours, no timestamps
    let interactive = std::io::stderr().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(interactive)
        .without_time()
        .init();

    let config = load_config(&args).await?;
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, finishing the files in progress (press Ctrl-C again to abort)");
        let _ = cancel_tx.send(true);
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(EXIT_CANCELLED);
        }
    });

    let converter = BatchConverter::new(config)?.with_cancellation(cancel_rx);

    let mut any_fatal = false;
    for path in &args.paths {
        match converter
            .run(path, args.output.as_deref(), args.recursive)
            .await
        {
            Ok(result) => {
                println!();
                print!("{}", result);
            }
            Err(ConvertError::Cancelled) => {
                error!("Conversion cancelled");
                std::process::exit(EXIT_CANCELLED);
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                any_fatal = true;
            }
        }
    }

    if any_fatal {
        std::process::exit(1);
    }
    Ok(())
}

/// Config file first, then command line flags on top
async fn load_config(args: &Args) -> Result<Config> {
    let path = args.config.clone().or_else(Config::default_path);
    let mut config = match &path {
        Some(path) => Config::from_file(path)
            .await
            .with_context(|| format!("Invalid configuration file: {}", path.display()))?,
        None => Config::default(),
    };
    debug!("Configuration source: {:?}", path);

    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    if let Some(concurrency) = args.concurrency {
        config.max_concurrent = Some(concurrency);
    }
    if let Some(scratch_dir) = &args.scratch_dir {
        config.scratch_dir = scratch_dir.clone();
    }
    Ok(config)
}
