//! # Driver Module
//!
//! Lancia l'engine `towebp` come processo figlio e traduce il suo output
//! testuale in eventi tipizzati, per i front-end che mostrano progresso e
//! risultati.
//!
//! ## Flusso:
//! 1. `DriverRequest` → argomenti `[-q N] [-r] -- paths…` (path passati come
//!    `OsString`, anche se non UTF-8 o con un `-` iniziale)
//! 2. stdout e stderr letti a chunk, ricomposti in righe da `LineAssembler`
//! 3. ogni riga diventa un `DriverEvent` su un canale mpsc
//! 4. a processo terminato, un solo `DriverEvent::Finished` con i riepiloghi
//!    estratti dallo stdout completo oppure un messaggio di errore (lo stderr
//!    dell'engine, senza il livello di log a inizio riga)
//!
//! ## Esempio:
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use towebp::driver::{Driver, DriverEvent, DriverRequest};
//!
//! let request = DriverRequest::new(vec!["/photos".into()]).recursive(true);
//! let (_handle, mut events) = Driver::spawn("/usr/local/bin/towebp", &request)?;
//! while let Some(event) = events.recv().await {
//!     if let DriverEvent::Finished(outcome) = event {
//!         println!("{:?}", outcome.result);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod line_assembler;

pub use line_assembler::{assemble, LineAssembler};

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::{
    args,
    config::DEFAULT_QUALITY,
    protocol::{parse_summaries, ProgressLine, StdoutLine, SummaryReport},
};

const READ_CHUNK: usize = 8 * 1024;

/// Level names the engine's log lines start with
const LOG_LEVELS: [&str; 5] = ["ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

/// What the engine should convert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverRequest {
    pub paths: Vec<PathBuf>,
    pub quality: u8,
    pub recursive: bool,
}

impl DriverRequest {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            quality: DEFAULT_QUALITY,
            recursive: false,
        }
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Option flags only; `-q` is left out at the default quality
    pub fn flag_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.quality != DEFAULT_QUALITY {
            args.extend(args!["-q", self.quality]);
        }
        if self.recursive {
            args.push("-r".to_string());
        }
        args
    }

    /// Full engine command line: flags, `--`, then the paths unchanged
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.flag_args().into_iter().map(OsString::from).collect();
        args.push(OsString::from("--"));
        args.extend(self.paths.iter().map(|p| p.as_os_str().to_owned()));
        args
    }
}

/// Something observed while the engine runs
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Progress(ProgressLine),
    Log { text: String, is_error: bool },
    /// Always the last event
    Finished(DriverOutcome),
}

/// Final state of one engine process
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOutcome {
    /// Exit code, `None` when killed by a signal or never reaped
    pub status: Option<i32>,
    /// Every summary block printed, or the reason there is none
    pub result: Result<Vec<SummaryReport>, String>,
}

impl DriverOutcome {
    /// Summaries win over the exit code; without any, report stderr or the code
    pub fn from_output(status: Option<i32>, stdout: &str, stderr: &str) -> Self {
        let summaries = parse_summaries(stdout);
        let result = if !summaries.is_empty() {
            Ok(summaries)
        } else {
            let stderr = stderr
                .lines()
                .map(|line| strip_log_level(line).trim())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            Err(match status {
                _ if !stderr.is_empty() => stderr,
                Some(code) => format!("towebp exited with code {}", code),
                None => "towebp was terminated".to_string(),
            })
        };
        Self { status, result }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// `" WARN message"` → `"message"`; lines without a level are returned as is
fn strip_log_level(line: &str) -> &str {
    let trimmed = line.trim_start();
    LOG_LEVELS
        .iter()
        .find_map(|level| trimmed.strip_prefix(level)?.strip_prefix(' '))
        .unwrap_or(line)
}

/// Control over a running engine
#[derive(Debug)]
pub struct DriverHandle {
    cancel: watch::Sender<bool>,
    pid: Option<u32>,
}

impl DriverHandle {
    /// Kill the engine; a `Finished` event still follows
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

pub struct Driver;

impl Driver {
    /// Launch the engine binary for `request`
    pub fn spawn(
        binary: impl AsRef<Path>,
        request: &DriverRequest,
    ) -> Result<(DriverHandle, mpsc::UnboundedReceiver<DriverEvent>)> {
        Self::spawn_with(Command::new(binary.as_ref()), request)
    }

    /// Same as [`Driver::spawn`] with a pre-configured command (interpreter,
    /// environment); the request arguments are appended to it.
    pub fn spawn_with(
        mut command: Command,
        request: &DriverRequest,
    ) -> Result<(DriverHandle, mpsc::UnboundedReceiver<DriverEvent>)> {
        let args = request.to_args();
        debug!("Launching engine with arguments: {:?}", args);

        let mut child = command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to launch towebp")?;

        let stdout = child.stdout.take().context("engine stdout not captured")?;
        let stderr = child.stderr.take().context("engine stderr not captured")?;
        let pid = child.id();

        let (events, receiver) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);

        tokio::spawn(supervise(child, stdout, stderr, events, cancel_rx));

        Ok((DriverHandle { cancel, pid }, receiver))
    }
}

async fn supervise(
    mut child: Child,
    stdout: impl AsyncRead + Unpin + Send + 'static,
    stderr: impl AsyncRead + Unpin + Send + 'static,
    events: mpsc::UnboundedSender<DriverEvent>,
    cancel: watch::Receiver<bool>,
) {
    let stdout_task = tokio::spawn(pump(stdout, events.clone(), false));
    let stderr_task = tokio::spawn(pump(stderr, events.clone(), true));

    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancelled(cancel) => {
            debug!("Cancelling engine process");
            let _ = child.start_kill();
            child.wait().await
        }
    };
    let status = match status {
        Ok(status) => status.code(),
        Err(e) => {
            debug!("Could not reap engine process: {}", e);
            None
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    let _ = events.send(DriverEvent::Finished(DriverOutcome::from_output(
        status, &stdout, &stderr,
    )));
}

async fn cancelled(mut cancel: watch::Receiver<bool>) {
    while !*cancel.borrow_and_update() {
        if cancel.changed().await.is_err() {
            // Handle dropped without cancelling: let the engine finish
            std::future::pending::<()>().await;
        }
    }
}

/// Forward every complete line of `stream` and return everything it carried
async fn pump(
    mut stream: impl AsyncRead + Unpin,
    events: mpsc::UnboundedSender<DriverEvent>,
    is_error: bool,
) -> String {
    let mut captured = Vec::new();
    let mut assembler = LineAssembler::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) => {
                debug!("Engine pipe read failed: {}", e);
                break;
            }
        };
        captured.extend_from_slice(&chunk[..read]);
        for line in assembler.push(&chunk[..read]) {
            forward(&events, line, is_error);
        }
    }
    if let Some(tail) = assembler.finish() {
        forward(&events, tail, is_error);
    }

    String::from_utf8_lossy(&captured).into_owned()
}

fn forward(events: &mpsc::UnboundedSender<DriverEvent>, line: String, is_error: bool) {
    let event = if is_error {
        let text = line.trim();
        if text.is_empty() {
            return;
        }
        DriverEvent::Log {
            text: text.to_string(),
            is_error: true,
        }
    } else {
        match StdoutLine::classify(&line) {
            StdoutLine::Progress(progress) => DriverEvent::Progress(progress),
            StdoutLine::Log(text) => DriverEvent::Log {
                text,
                is_error: false,
            },
        }
    };
    let _ = events.send(event);
}
