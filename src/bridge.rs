//! Subprocess Bridge
//!
//! Runs the catalog tool for one request and copies its stdout into an
//! in-process pipe. The copy happens on its own task so the request task only
//! ever sees an `AsyncRead`. The pipe has a fixed capacity: when the reader
//! falls behind, the copy stalls and so does the tool.
//!
//! Cancelling the token kills the tool and drops the writing end, so a reader
//! blocked on the pipe observes end of input instead of hanging. Spawn and
//! exit failures come back through the task's result.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::DuplexStream;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;

/// Argument asking the tool for its XML tag catalog
pub const LIST_XML_FLAG: &str = "-listx";

/// Bytes buffered between the tool and the scanner
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// How the tool's run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    /// All output was copied and the tool exited successfully
    Finished,
    /// The reading end went away first; the tool was killed
    Abandoned,
    /// The request was cancelled; the tool was killed
    Cancelled,
}

/// A running tool: its output pipe plus the task driving it
pub struct ToolStream {
    pub output: DuplexStream,
    task: JoinHandle<Result<ToolOutcome, BridgeError>>,
}

impl ToolStream {
    /// Wait for the driving task. Drop `output` first unless the tool is
    /// known to have written everything.
    pub async fn outcome(self) -> Result<ToolOutcome, BridgeError> {
        self.task.await?
    }

    pub fn into_parts(self) -> (DuplexStream, JoinHandle<Result<ToolOutcome, BridgeError>>) {
        (self.output, self.task)
    }
}

/// Start `<tool> -listx` in the background
pub fn launch(tool: &Path, cancel: CancellationToken) -> ToolStream {
    let (output, input) = tokio::io::duplex(PIPE_CAPACITY);
    let task = tokio::spawn(drive(tool.to_path_buf(), input, cancel));
    ToolStream { output, task }
}

async fn drive(
    tool: PathBuf,
    mut pipe: DuplexStream,
    cancel: CancellationToken,
) -> Result<ToolOutcome, BridgeError> {
    let mut child = Command::new(&tool)
        .arg(LIST_XML_FLAG)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| BridgeError::Spawn {
            tool: tool.clone(),
            source,
        })?;

    let Some(mut stdout) = child.stdout.take() else {
        terminate(&mut child).await;
        return Err(BridgeError::MissingStdout { tool });
    };
    tracing::debug!(tool = %tool.display(), pid = ?child.id(), "tool started");

    let copied = tokio::select! {
        copied = tokio::io::copy(&mut stdout, &mut pipe) => copied,
        _ = cancel.cancelled() => {
            terminate(&mut child).await;
            return Ok(ToolOutcome::Cancelled);
        }
    };
    drop(pipe);
    drop(stdout);

    match copied {
        Ok(bytes) => tracing::debug!(bytes, "tool output fully copied"),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
            terminate(&mut child).await;
            return Ok(ToolOutcome::Abandoned);
        }
        Err(err) => {
            terminate(&mut child).await;
            return Err(err.into());
        }
    }

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancel.cancelled() => {
            terminate(&mut child).await;
            return Ok(ToolOutcome::Cancelled);
        }
    };

    if status.success() {
        Ok(ToolOutcome::Finished)
    } else {
        Err(BridgeError::Exited { tool, status })
    }
}

async fn terminate(child: &mut Child) {
    if let Err(err) = child.kill().await {
        tracing::debug!(error = %err, "failed to kill tool");
    }
}
