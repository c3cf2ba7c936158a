//! Transcoder process control.
//!
//! A [`Transcoder`] turns a [`TranscodeRequest`] into a running
//! [`InvocationHandle`]. [`ProcessInvoker`] is the production implementation:
//! one ffmpeg subprocess per request, never pooled or reused.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use splice_common::error::{SpliceError, SpliceResult};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::diagnostics::{
    parse_diagnostic_line, DiagnosticLine, DiagnosticSplitter, DiagnosticTail, ProgressSnapshot,
};

/// Capacity of the per-invocation event channel.
const EVENT_BUFFER: usize = 256;

/// How long to wait for stderr to close after the process exited.
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// One transcoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    /// Human-readable name used in logs and errors ("segment 2/5").
    pub label: String,

    /// Complete argument list, output path last.
    pub args: Vec<String>,

    /// File the invocation writes.
    pub output: PathBuf,

    /// Duration of media the invocation produces; denominator for progress.
    pub expected_duration_secs: f64,

    /// Budget after which the process is cancelled.
    pub timeout: Duration,
}

/// Signals surfaced while a transcoder runs.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokerEvent {
    Progress(ProgressSnapshot),
    /// A diagnostic line matching a failure signature.
    Error(String),
}

/// How the process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    Success,
    Failed { status: String, diagnostics: String },
    Cancelled { diagnostics: String },
}

/// Seam between orchestration and process spawning.
pub trait Transcoder: Send + Sync {
    /// Start the request. Must be called from within a tokio runtime.
    fn invoke(&self, request: &TranscodeRequest) -> SpliceResult<InvocationHandle>;

    /// Check if the transcoder can be started on this system.
    fn is_available(&self) -> bool;

    /// Transcoder name.
    fn name(&self) -> &str;
}

/// Cancels one invocation. Cheap to clone; `cancel()` after exit is a no-op.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Receiving side of a [`CancelHandle`].
#[derive(Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected cancel handle / signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    /// Resolves once cancellation is requested or every handle was dropped.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// A running invocation.
///
/// Dropping the handle without waiting cancels the process.
pub struct InvocationHandle {
    label: String,
    timeout: Duration,
    events: mpsc::Receiver<InvokerEvent>,
    cancel: CancelHandle,
    completion: JoinHandle<SpliceResult<ProcessExit>>,
}

enum WaitStep {
    Event(Option<InvokerEvent>),
    Exited(Result<SpliceResult<ProcessExit>, tokio::task::JoinError>),
    TimedOut,
}

impl InvocationHandle {
    pub fn new(
        label: impl Into<String>,
        timeout: Duration,
        events: mpsc::Receiver<InvokerEvent>,
        cancel: CancelHandle,
        completion: JoinHandle<SpliceResult<ProcessExit>>,
    ) -> Self {
        Self {
            label: label.into(),
            timeout,
            events,
            cancel,
            completion,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Deliver events to `on_event` until the process exits or the timeout
    /// fires.
    ///
    /// On timeout the process is cancelled and reaped before this returns
    /// `Timeout`. A non-zero exit returns `Transcode` with the diagnostic
    /// tail attached.
    pub async fn wait<F>(mut self, mut on_event: F) -> SpliceResult<()>
    where
        F: FnMut(InvokerEvent),
    {
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut events_open = true;

        let joined = loop {
            let step = tokio::select! {
                biased;
                event = self.events.recv(), if events_open => WaitStep::Event(event),
                joined = &mut self.completion => WaitStep::Exited(joined),
                _ = &mut deadline => WaitStep::TimedOut,
            };

            match step {
                WaitStep::Event(Some(event)) => on_event(event),
                WaitStep::Event(None) => events_open = false,
                WaitStep::Exited(joined) => break joined,
                WaitStep::TimedOut => {
                    tracing::warn!(
                        label = %self.label,
                        timeout_secs = self.timeout.as_secs_f64(),
                        "Transcoder exceeded its time budget, cancelling"
                    );
                    self.cancel.cancel();
                    self.events.close();
                    match (&mut self.completion).await {
                        Ok(Ok(exit)) => tracing::debug!(
                            label = %self.label,
                            ?exit,
                            "Cancelled transcoder reaped"
                        ),
                        Ok(Err(err)) => tracing::warn!(
                            label = %self.label,
                            error = %err,
                            "Cancelled transcoder failed to exit cleanly"
                        ),
                        Err(err) => tracing::warn!(
                            label = %self.label,
                            error = %err,
                            "Transcoder supervisor task failed"
                        ),
                    }
                    return Err(SpliceError::timeout(&self.label, self.timeout));
                }
            }
        };

        while let Ok(event) = self.events.try_recv() {
            on_event(event);
        }

        let exit = joined.map_err(|e| {
            SpliceError::Other(anyhow::anyhow!(
                "Transcoder supervisor for {} failed: {e}",
                self.label
            ))
        })??;

        match exit {
            ProcessExit::Success => Ok(()),
            ProcessExit::Failed {
                status,
                diagnostics,
            } => Err(SpliceError::transcode(
                format!("{} failed ({status})", self.label),
                diagnostics,
            )),
            ProcessExit::Cancelled { .. } => Err(SpliceError::unclassified(format!(
                "{} was cancelled",
                self.label
            ))),
        }
    }
}

/// Spawns the transcoder binary as a subprocess.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    binary: PathBuf,
}

impl ProcessInvoker {
    /// `binary` is resolved once at startup and never looked up again.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Shell-style rendering of the command a request would run.
    pub fn command_line(&self, request: &TranscodeRequest) -> String {
        std::iter::once(self.binary.display().to_string())
            .chain(request.args.iter().cloned())
            .map(|arg| shell_quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Transcoder for ProcessInvoker {
    fn invoke(&self, request: &TranscodeRequest) -> SpliceResult<InvocationHandle> {
        tracing::debug!(label = %request.label, args = ?request.args, "Running transcoder");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SpliceError::config(format!(
                    "Transcoder binary not found at {}",
                    self.binary.display()
                ))
            } else {
                SpliceError::transcode(format!("Failed to start {}: {e}", request.label), "")
            }
        })?;

        tracing::info!(
            pid = child.id(),
            label = %request.label,
            args_len = request.args.len(),
            timeout_secs = request.timeout.as_secs_f64(),
            "Transcoder process started"
        );

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SpliceError::transcode("Failed to capture transcoder stderr", ""))?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (cancel, signal) = cancel_pair();
        let completion = tokio::spawn(supervise(
            child,
            stderr,
            events_tx,
            signal,
            request.expected_duration_secs,
            request.label.clone(),
        ));

        Ok(InvocationHandle::new(
            request.label.clone(),
            request.timeout,
            events_rx,
            cancel,
            completion,
        ))
    }

    fn is_available(&self) -> bool {
        self.binary.is_file()
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

async fn supervise(
    mut child: Child,
    stderr: ChildStderr,
    events: mpsc::Sender<InvokerEvent>,
    mut signal: CancelSignal,
    expected_duration_secs: f64,
    label: String,
) -> SpliceResult<ProcessExit> {
    // Drain stderr concurrently so the child never blocks on a full pipe.
    let reader = tokio::spawn(read_diagnostics(stderr, events, expected_duration_secs));
    let reader_abort = reader.abort_handle();

    let status = tokio::select! {
        status = child.wait() => Some(status?),
        _ = signal.cancelled() => None,
    };

    if status.is_none() {
        if let Err(err) = child.start_kill() {
            tracing::debug!(
                label = %label,
                error = %err,
                "Kill after cancel failed (already exited?)"
            );
        }
        let reaped = child.wait().await?;
        tracing::info!(label = %label, status = %reaped, "Transcoder process cancelled");
    }

    let diagnostics = match tokio::time::timeout(STDERR_GRACE, reader).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(err)) => format!("<failed to read transcoder stderr: {err}>"),
        Err(_) => {
            reader_abort.abort();
            "<transcoder stderr did not close>".to_string()
        }
    };

    Ok(match status {
        None => ProcessExit::Cancelled { diagnostics },
        Some(status) if status.success() => {
            tracing::info!(label = %label, "Transcoder process finished");
            ProcessExit::Success
        }
        Some(status) => {
            tracing::warn!(label = %label, status = %status, "Transcoder process failed");
            ProcessExit::Failed {
                status: status.to_string(),
                diagnostics,
            }
        }
    })
}

async fn read_diagnostics(
    mut stderr: ChildStderr,
    events: mpsc::Sender<InvokerEvent>,
    expected_duration_secs: f64,
) -> String {
    let mut splitter = DiagnosticSplitter::new();
    let mut tail = DiagnosticTail::default();
    let mut buf = [0u8; 4096];

    loop {
        let n = match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                tail.push(format!("<stderr read error: {err}>"));
                break;
            }
        };
        for line in splitter.push(&buf[..n]) {
            dispatch_line(&line, expected_duration_secs, &events, &mut tail).await;
        }
    }
    if let Some(line) = splitter.finish() {
        dispatch_line(&line, expected_duration_secs, &events, &mut tail).await;
    }

    tail.into_string()
}

async fn dispatch_line(
    line: &str,
    expected_duration_secs: f64,
    events: &mpsc::Sender<InvokerEvent>,
    tail: &mut DiagnosticTail,
) {
    // A closed receiver only means nobody listens any more; keep draining.
    match parse_diagnostic_line(line, expected_duration_secs) {
        DiagnosticLine::Progress(snapshot) => {
            let _ = events.send(InvokerEvent::Progress(snapshot)).await;
        }
        DiagnosticLine::Failure(message) => {
            tail.push(message.clone());
            let _ = events.send(InvokerEvent::Error(message)).await;
        }
        DiagnosticLine::Info(message) => tail.push(message),
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
