//! Incremental JSON-lines decoding over unaligned fragments
//!
//! Long-running CLIs that emit one JSON document per line do not promise that
//! a line arrives in one piece, and a document occasionally spans more than
//! one pipe read. The decoder accumulates fragments and only consumes a line
//! once it parses. A line that does not parse is left in the buffer and
//! retried when the next fragment arrives.

use super::error::StreamError;
use crate::subprocess::runner::ChunkStream;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;

/// Stateful JSON-lines accumulator
#[derive(Debug, Default)]
pub struct IncrementalLineJsonDecoder {
    buffer: String,
    decoded: u64,
    deferrals: u64,
}

impl IncrementalLineJsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every message it completes, in order.
    pub fn feed(&mut self, fragment: &str) -> Vec<Value> {
        self.buffer.push_str(fragment);
        let mut messages = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let candidate = self.buffer[..newline].trim();
            if candidate.is_empty() {
                self.buffer.drain(..=newline);
                continue;
            }

            match serde_json::from_str::<Value>(candidate) {
                Ok(value) => {
                    messages.push(value);
                    self.buffer.drain(..=newline);
                }
                Err(e) => {
                    // Leave the line in place; it is retried with more data
                    self.deferrals += 1;
                    tracing::trace!(
                        "Deferring {} byte line until more output arrives: {}",
                        newline,
                        e
                    );
                    break;
                }
            }
        }

        self.decoded += messages.len() as u64;
        messages
    }

    /// Flush the trailing buffer once the source has closed.
    ///
    /// Leftover text that never looked like JSON is dropped; leftover text
    /// that opens an object or array but does not parse is an error.
    pub fn finish(&mut self) -> Result<Option<Value>, StreamError> {
        let raw = std::mem::take(&mut self.buffer);
        let remainder = raw.trim();
        if remainder.is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<Value>(remainder) {
            Ok(value) => {
                self.decoded += 1;
                Ok(Some(value))
            }
            Err(source) if remainder.starts_with('{') || remainder.starts_with('[') => {
                Err(StreamError::MessageDecode { raw, source })
            }
            Err(_) => {
                tracing::debug!(
                    "Discarding {} bytes of trailing non-JSON output",
                    remainder.len()
                );
                Ok(None)
            }
        }
    }

    /// Bytes currently waiting for a complete line
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Messages decoded so far
    pub fn decoded_count(&self) -> u64 {
        self.decoded
    }

    /// How often a line was put back because it did not parse yet
    pub fn deferral_count(&self) -> u64 {
        self.deferrals
    }
}

struct DecodeSession {
    chunks: ChunkStream,
    decoder: IncrementalLineJsonDecoder,
    pending: VecDeque<Value>,
    finished: bool,
}

impl DecodeSession {
    async fn next_message(&mut self) -> Option<Result<Value, StreamError>> {
        loop {
            if let Some(value) = self.pending.pop_front() {
                return Some(Ok(value));
            }
            if self.finished {
                return None;
            }

            match self.chunks.next().await {
                Some(Ok(fragment)) => self.pending.extend(self.decoder.feed(&fragment)),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(StreamError::Read(e)));
                }
                None => {
                    self.finished = true;
                    tracing::debug!(
                        "Output closed after {} messages ({} deferred lines)",
                        self.decoder.decoded_count(),
                        self.decoder.deferral_count()
                    );
                    match self.decoder.finish() {
                        Ok(Some(value)) => self.pending.push_back(value),
                        Ok(None) => {}
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
        }
    }
}

/// Decode a fragment stream lazily, flushing the trailing buffer at the end.
///
/// The stream ends after the first error.
pub fn decode_stream(chunks: ChunkStream) -> BoxStream<'static, Result<Value, StreamError>> {
    let session = DecodeSession {
        chunks,
        decoder: IncrementalLineJsonDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(session, |mut session| async move {
        let item = session.next_message().await?;
        Some((item, session))
    })
    .boxed()
}
