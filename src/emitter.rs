//! Streaming JSON Array Emitter
//!
//! Records are appended to a pending buffer and handed to the response body
//! as one chunk per [`JsonArrayEmitter::flush`]. The body channel is bounded,
//! so a slow client blocks `flush`, which in turn stops the scanner from
//! reading and lets the tool's pipe fill up.

use std::convert::Infallible;

use axum::body::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::EmitError;

/// Sending half of a streamed response body
pub type ChunkSender = mpsc::Sender<Result<Bytes, Infallible>>;

/// Receiving half, wrapped into the response body
pub type ChunkReceiver = mpsc::Receiver<Result<Bytes, Infallible>>;

/// Chunks that may sit between the emitter and the HTTP connection
pub const BODY_CHANNEL_CAPACITY: usize = 4;

pub fn body_channel() -> (ChunkSender, ChunkReceiver) {
    mpsc::channel(BODY_CHANNEL_CAPACITY)
}

pub struct JsonArrayEmitter {
    sink: ChunkSender,
    pending: Vec<u8>,
    records: usize,
    skipped: usize,
}

impl JsonArrayEmitter {
    pub fn new(sink: ChunkSender) -> Self {
        Self {
            sink,
            pending: Vec::new(),
            records: 0,
            skipped: 0,
        }
    }

    /// Write and flush the opening bracket
    pub async fn open(&mut self) -> Result<(), EmitError> {
        self.pending.push(b'[');
        self.flush().await
    }

    /// Buffer one record as the next array element.
    ///
    /// A record that fails to serialize is dropped and counted as skipped;
    /// the array stays well formed. Returns whether the record was written.
    pub fn write_record<T: Serialize>(&mut self, record: &T) -> bool {
        let json = match serde_json::to_vec(record) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "skipping record that failed to serialize");
                self.skipped += 1;
                return false;
            }
        };

        if self.records > 0 {
            self.pending.push(b',');
        }
        self.pending.extend_from_slice(&json);
        self.records += 1;
        true
    }

    /// Hand everything buffered so far to the client as one chunk
    pub async fn flush(&mut self) -> Result<(), EmitError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::take(&mut self.pending));
        self.sink
            .send(Ok(chunk))
            .await
            .map_err(|_| EmitError::ClientGone)
    }

    /// Write the closing bracket and flush; consumes the emitter so the body
    /// ends once the chunk is delivered.
    pub async fn close(mut self) -> Result<usize, EmitError> {
        self.pending.push(b']');
        self.flush().await?;
        Ok(self.records)
    }

    /// Resolves when the response body has been dropped
    pub async fn client_gone(&self) {
        self.sink.closed().await
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
