//! Decoding session over a running process
//!
//! [`DecoderController`] turns a [`ProcessHandle`] into a [`MessageStream`]:
//! stdout fragments are decoded in the consumer's task while stderr is drained
//! on a separate one. Once stdout closes the trailing buffer is flushed, the
//! drain is joined and the exit status is correlated with what stderr said.
//! A fatal outcome is delivered as the last item of the stream.
//!
//! Dropping the stream (or calling [`MessageStream::terminate`]) cancels the
//! session: the drain task is aborted and the stdout stream and exit future
//! are dropped, releasing the process handle.

use super::decoder::decode_stream;
use super::drain::StderrDrain;
use super::error::StreamError;
use super::exit::ExitCorrelator;
use super::types::{DecoderState, StreamSource, StreamingConfig};
use crate::subprocess::runner::{ProcessHandle, StatusFuture};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::watch;

pub struct DecoderController {
    handle: ProcessHandle,
    config: StreamingConfig,
}

impl DecoderController {
    pub fn new(handle: ProcessHandle, config: StreamingConfig) -> Self {
        Self { handle, config }
    }

    /// Start the session.
    ///
    /// Fails immediately if either pipe is missing. Spawns the stderr drain,
    /// so it must be called within a Tokio runtime.
    pub fn messages(self) -> Result<MessageStream, StreamError> {
        let ProcessHandle {
            stdout,
            stderr,
            status,
        } = self.handle;

        let stdout = stdout.ok_or(StreamError::ConnectionNotEstablished {
            stream: StreamSource::Stdout,
        })?;
        let stderr = stderr.ok_or(StreamError::ConnectionNotEstablished {
            stream: StreamSource::Stderr,
        })?;

        let drain = StderrDrain::spawn(stderr, self.config.max_diagnostic_lines);
        let (state_tx, state_rx) = watch::channel(DecoderState::Reading);

        let session = Session {
            decoded: decode_stream(stdout),
            drain: Some(drain),
            status: Some(status),
            correlator: ExitCorrelator::new(self.config.failure_marker),
            state: state_tx,
        };

        tracing::debug!("Decoding session started");

        let inner = futures::stream::unfold(session, |mut session| async move {
            let item = session.next_item().await?;
            Some((item, session))
        })
        .boxed();

        Ok(MessageStream {
            inner: Some(inner),
            state: state_rx,
            cancelled: false,
        })
    }
}

struct Session {
    decoded: BoxStream<'static, Result<Value, StreamError>>,
    drain: Option<StderrDrain>,
    status: Option<StatusFuture>,
    correlator: ExitCorrelator,
    state: watch::Sender<DecoderState>,
}

impl Session {
    fn current(&self) -> DecoderState {
        *self.state.borrow()
    }

    fn transition(&self, next: DecoderState) {
        let previous = self.state.send_replace(next);
        tracing::trace!("Decoder state {:?} -> {:?}", previous, next);
    }

    /// Stop the drain and let go of the process
    fn release(&mut self) {
        self.drain.take();
        self.status.take();
    }

    async fn next_item(&mut self) -> Option<Result<Value, StreamError>> {
        loop {
            match self.current() {
                DecoderState::Reading => match self.decoded.next().await {
                    Some(Ok(message)) => return Some(Ok(message)),
                    Some(Err(e)) => {
                        tracing::debug!("Decoding session failed: {}", e);
                        self.release();
                        self.transition(DecoderState::Terminated);
                        return Some(Err(e));
                    }
                    None => self.transition(DecoderState::Drained),
                },
                DecoderState::Drained => {
                    let outcome = self.correlate_exit().await;
                    self.transition(DecoderState::Exited);
                    if let Err(e) = outcome {
                        return Some(Err(e));
                    }
                }
                DecoderState::Exited | DecoderState::Terminated => return None,
            }
        }
    }

    async fn correlate_exit(&mut self) -> Result<(), StreamError> {
        let (Some(drain), Some(status)) = (self.drain.take(), self.status.take()) else {
            return Ok(());
        };
        let status = self.correlator.await_exit(drain, status).await?;
        tracing::debug!("Decoding session finished, process exited with {:?}", status);
        Ok(())
    }
}

/// Lazy sequence of decoded messages from one process.
///
/// Yields `Ok(message)` in the order the messages completed; a fatal
/// condition is yielded as a single trailing `Err`, after which the stream
/// ends.
pub struct MessageStream {
    inner: Option<BoxStream<'static, Result<Value, StreamError>>>,
    state: watch::Receiver<DecoderState>,
    cancelled: bool,
}

impl MessageStream {
    pub fn state(&self) -> DecoderState {
        if self.cancelled {
            DecoderState::Terminated
        } else {
            *self.state.borrow()
        }
    }

    /// Cancel the session without raising.
    ///
    /// Has no effect once the session has already exited.
    pub fn terminate(&mut self) {
        if self.inner.take().is_none() {
            return;
        }
        if *self.state.borrow() != DecoderState::Exited {
            tracing::debug!("Decoding session terminated by consumer");
            self.cancelled = true;
        }
    }

    /// Collect every remaining message, stopping at the first error
    pub async fn collect_all(mut self) -> Result<Vec<Value>, StreamError> {
        let mut messages = Vec::new();
        while let Some(item) = self.next().await {
            messages.push(item?);
        }
        Ok(messages)
    }
}

impl Stream for MessageStream {
    type Item = Result<Value, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        let item = inner.poll_next_unpin(cx);
        if let Poll::Ready(None) = item {
            // Finished sessions stay finished
            self.inner = None;
        }
        item
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
