//! Per-request catalog transcoding
//!
//! Ties the bridge, scanner, projector and emitter together for one response
//! and classifies how it ended.

use std::path::Path;

use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;

use crate::bridge::{self, ToolOutcome};
use crate::emitter::JsonArrayEmitter;
use crate::error::{BridgeError, EmitError};
use crate::projector::project_table;
use crate::scanner::{CatalogScanner, Termination};

/// What one fully written array contained
#[derive(Debug)]
pub struct CatalogSummary {
    pub tables: usize,
    pub records: usize,
    pub termination: Termination,
}

/// Terminal state of one streamed response
#[derive(Debug)]
pub enum StreamOutcome {
    /// The whole catalog was streamed and the tool succeeded
    Completed { tables: usize, records: usize },
    /// Input stopped early or was malformed; the array holds what was read
    Truncated {
        tables: usize,
        records: usize,
        reason: Termination,
    },
    /// The tool could not be started or exited unsuccessfully
    ToolFailed {
        tables: usize,
        records: usize,
        error: BridgeError,
    },
    /// The client went away before the array was closed
    Disconnected,
}

impl StreamOutcome {
    pub fn records(&self) -> Option<usize> {
        match self {
            StreamOutcome::Completed { records, .. }
            | StreamOutcome::Truncated { records, .. }
            | StreamOutcome::ToolFailed { records, .. } => Some(*records),
            StreamOutcome::Disconnected => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }

    /// Log the outcome at a level matching its severity
    pub fn report(&self) {
        match self {
            StreamOutcome::Completed { tables, records } => {
                tracing::info!(tables, records, "tag catalog streamed")
            }
            StreamOutcome::Truncated {
                tables,
                records,
                reason,
            } => tracing::warn!(tables, records, ?reason, "tag catalog truncated"),
            StreamOutcome::ToolFailed {
                tables,
                records,
                error,
            } => tracing::error!(tables, records, %error, "tag catalog tool failed"),
            StreamOutcome::Disconnected => tracing::info!("client disconnected, tool stopped"),
        }
    }
}

/// Write `[`, one flushed chunk per table, then `]`.
///
/// The array is closed however scanning ends. Only a vanished client stops
/// the array from being closed. The scanner, and with it the input, is
/// released on return.
pub async fn stream_catalog<R: AsyncBufRead + Unpin>(
    mut scanner: CatalogScanner<R>,
    mut emitter: JsonArrayEmitter,
) -> Result<CatalogSummary, EmitError> {
    emitter.open().await?;

    loop {
        let next = tokio::select! {
            biased;
            _ = emitter.client_gone() => return Err(EmitError::ClientGone),
            table = scanner.next_table() => table,
        };
        let Some(table) = next else { break };

        for record in project_table(&table) {
            emitter.write_record(&record);
        }
        emitter.flush().await?;
    }

    let tables = scanner.tables_scanned();
    let records = emitter.close().await?;
    Ok(CatalogSummary {
        tables,
        records,
        termination: scanner
            .into_termination()
            .unwrap_or(Termination::EndOfInput),
    })
}

/// Run the tool and stream its catalog into `emitter`.
///
/// `cancel` stops the tool early; it is also cancelled here when the client
/// disconnects.
pub async fn transcode(
    tool: &Path,
    emitter: JsonArrayEmitter,
    cancel: CancellationToken,
) -> StreamOutcome {
    let (output, task) = bridge::launch(tool, cancel.clone()).into_parts();
    let streamed = stream_catalog(CatalogScanner::new(BufReader::new(output)), emitter).await;

    if streamed.is_err() {
        cancel.cancel();
    }
    let tool_result = match task.await {
        Ok(result) => result,
        Err(err) => Err(err.into()),
    };

    classify(streamed, tool_result)
}

fn classify(
    streamed: Result<CatalogSummary, EmitError>,
    tool_result: Result<ToolOutcome, BridgeError>,
) -> StreamOutcome {
    let summary = match streamed {
        Ok(summary) => summary,
        Err(EmitError::ClientGone) => return StreamOutcome::Disconnected,
    };
    let CatalogSummary {
        tables,
        records,
        termination,
    } = summary;

    match tool_result {
        Err(error) => StreamOutcome::ToolFailed {
            tables,
            records,
            error,
        },
        Ok(_) if termination.is_clean() => StreamOutcome::Completed { tables, records },
        Ok(_) => StreamOutcome::Truncated {
            tables,
            records,
            reason: termination,
        },
    }
}
