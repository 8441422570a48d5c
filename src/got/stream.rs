//! Long-running remote operations (`got fetch`, `got send`).
//!
//! These run on the Tokio runtime. Output is decoded incrementally and
//! handed to an [`OutputSink`] as it arrives; the sink is told when the
//! process finishes.

use crate::error::{Diagnostic, GotError, GotResult};
use crate::got::executor::{GotCommand, GotExecutor};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;

/// A piece of streamed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// A finished line, without its terminator
    Line(String),
    /// The current unfinished line as it should now be displayed
    Progress(String),
}

/// Receives output of a remote operation as it arrives
#[async_trait]
pub trait OutputSink: Send {
    async fn on_update(&mut self, update: StreamUpdate);

    /// Called once, after the process has exited or was killed
    async fn on_complete(&mut self, outcome: &GotResult<()>);
}

/// Incremental line buffer with terminal carriage-return semantics
///
/// A lone `\r` erases back to the start of the current line. `\r\n` is an
/// ordinary line break, also when split across two chunks.
#[derive(Debug, Default)]
pub struct ProgressBuffer {
    lines: Vec<String>,
    current: String,
    pending_cr: bool,
    partial_utf8: Vec<u8>,
}

impl ProgressBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and collect the resulting updates
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamUpdate> {
        let mut data = std::mem::take(&mut self.partial_utf8);
        data.extend_from_slice(bytes);

        let valid_up_to = match std::str::from_utf8(&data) {
            Ok(_) => data.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                return self.feed_str(&text);
            }
        };

        self.partial_utf8 = data.split_off(valid_up_to);
        let text = String::from_utf8_lossy(&data).into_owned();
        self.feed_str(&text)
    }

    /// Feed already-decoded text
    pub fn feed_str(&mut self, text: &str) -> Vec<StreamUpdate> {
        let mut updates = Vec::new();
        let mut dirty = false;

        for c in text.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                if c == '\n' {
                    updates.push(self.finish_line());
                    dirty = false;
                    continue;
                }
                self.current.clear();
                dirty = true;
            }

            match c {
                '\r' => self.pending_cr = true,
                '\n' => {
                    updates.push(self.finish_line());
                    dirty = false;
                }
                c => {
                    self.current.push(c);
                    dirty = true;
                }
            }
        }

        if dirty {
            updates.push(StreamUpdate::Progress(self.current.clone()));
        }

        updates
    }

    /// Flush whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<StreamUpdate> {
        if !self.partial_utf8.is_empty() {
            let tail = std::mem::take(&mut self.partial_utf8);
            self.current.push_str(&String::from_utf8_lossy(&tail));
        }
        if self.pending_cr {
            self.pending_cr = false;
            self.current.clear();
        }
        (!self.current.is_empty()).then(|| self.finish_line())
    }

    fn finish_line(&mut self) -> StreamUpdate {
        let line = std::mem::take(&mut self.current);
        self.lines.push(line.clone());
        StreamUpdate::Line(line)
    }

    /// Finished lines so far
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Everything as it would currently appear on a terminal
    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !self.lines.is_empty() {
            text.push('\n');
        }
        text.push_str(&self.current);
        text
    }
}

/// Handle to a running remote operation
#[derive(Debug)]
pub struct RemoteTask {
    operation: String,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<GotResult<()>>,
}

impl RemoteTask {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Kill the subprocess. Output already delivered stays delivered.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the operation to finish. Call at most once to completion.
    pub async fn wait(&mut self) -> GotResult<()> {
        match (&mut self.handle).await {
            Ok(outcome) => outcome,
            Err(e) => Err(GotError::IoError(std::io::Error::other(e))),
        }
    }
}

/// Start a command in the background, streaming its output into `sink`
///
/// Must be called from within a Tokio runtime. The work-tree root is
/// resolved before anything is spawned.
pub fn spawn_remote<S>(executor: &GotExecutor, command: GotCommand, mut sink: S) -> GotResult<RemoteTask>
where
    S: OutputSink + 'static,
{
    let root = executor.resolve_root(&command)?;
    let argv = command.argv()?;
    let operation = command.operation().to_string();

    debug!(
        program = %executor.program(),
        args = ?argv,
        cwd = %root.display(),
        "starting remote operation"
    );

    let mut child = Command::new(executor.program())
        .args(&argv)
        .current_dir(&root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
    let task_operation = operation.clone();

    let handle = tokio::spawn(async move {
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out = StreamState::default();
        let mut err = StreamState::default();
        let mut cancel_open = true;
        let mut cancelled = false;

        info!(operation = %task_operation, "remote operation started");

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                chunk = read_chunk(&mut stdout), if stdout.is_some() => {
                    if !out.absorb(chunk, &mut sink).await {
                        stdout = None;
                    }
                }
                chunk = read_chunk(&mut stderr), if stderr.is_some() => {
                    if !err.absorb(chunk, &mut sink).await {
                        stderr = None;
                    }
                }
                signal = &mut cancel_rx, if cancel_open => {
                    cancel_open = false;
                    if signal.is_ok() {
                        let _ = child.start_kill();
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        let outcome = match child.wait().await {
            _ if cancelled => Err(GotError::Cancelled(task_operation.clone())),
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                warn!(operation = %task_operation, code = ?status.code(), "remote operation failed");
                let diagnostic = if err.raw.is_empty() { out.raw } else { err.raw };
                Err(GotError::CommandFailed {
                    operation: task_operation.clone(),
                    diagnostic: Diagnostic::from(diagnostic),
                })
            }
            Err(e) => Err(GotError::IoError(e)),
        };

        info!(operation = %task_operation, ok = outcome.is_ok(), "remote operation finished");
        sink.on_complete(&outcome).await;
        outcome
    });

    Ok(RemoteTask {
        operation,
        cancel: Some(cancel_tx),
        handle,
    })
}

async fn read_chunk<R>(reader: &mut Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader.as_mut() else {
        return Ok(Vec::new());
    };
    let mut buf = vec![0u8; READ_CHUNK];
    let n = reader.read(&mut buf).await?;
    buf.truncate(n);
    Ok(buf)
}

/// Per-pipe decoding state plus the raw bytes for diagnostics
#[derive(Default)]
struct StreamState {
    buffer: ProgressBuffer,
    raw: Vec<u8>,
}

impl StreamState {
    /// Pass a chunk on to the sink. Returns false once the pipe is done.
    async fn absorb<S: OutputSink>(&mut self, chunk: std::io::Result<Vec<u8>>, sink: &mut S) -> bool {
        match chunk {
            Ok(bytes) if !bytes.is_empty() => {
                self.raw.extend_from_slice(&bytes);
                for update in self.buffer.feed(&bytes) {
                    sink.on_update(update).await;
                }
                true
            }
            result => {
                if let Err(e) = result {
                    warn!(error = %e, "failed reading remote operation output");
                }
                if let Some(update) = self.buffer.finish() {
                    sink.on_update(update).await;
                }
                false
            }
        }
    }
}
