//! Concurrent stderr draining
//!
//! A child that fills its stderr pipe blocks on the next write, and if the
//! parent is only reading stdout both sides wait forever. The drain reads
//! stderr from its own task for as long as the pipe is open, whatever the
//! decoder is doing.

use crate::subprocess::runner::LineStream;
use futures::StreamExt;
use std::collections::VecDeque;
use tokio::task::JoinHandle;

/// Ordered, trimmed diagnostic lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticLog {
    lines: VecDeque<String>,
    max_lines: Option<usize>,
    dropped: usize,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the most recent `max_lines` lines
    pub fn bounded(max_lines: usize) -> Self {
        Self {
            max_lines: Some(max_lines),
            ..Self::default()
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.max_lines == Some(0) {
            self.dropped += 1;
            return;
        }
        if let Some(max) = self.max_lines {
            if self.lines.len() >= max {
                self.lines.pop_front();
                self.dropped += 1;
            }
        }
        self.lines.push_back(line.trim().to_string());
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines discarded because of the line cap
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// All lines joined with newlines
    pub fn text(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }

    /// Case-insensitive search of the joined text
    pub fn contains_marker(&self, marker: &str) -> bool {
        let text = self.text();
        !text.is_empty() && text.to_lowercase().contains(&marker.to_lowercase())
    }
}

impl<S: AsRef<str>> FromIterator<S> for DiagnosticLog {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut log = DiagnosticLog::new();
        for line in iter {
            log.push(line.as_ref());
        }
        log
    }
}

/// Handle to the task draining a process's stderr.
///
/// Dropping the handle aborts the task.
pub struct StderrDrain {
    handle: Option<JoinHandle<DiagnosticLog>>,
}

impl StderrDrain {
    /// Start draining on a new task. Must be called within a Tokio runtime.
    pub fn spawn(mut lines: LineStream, max_lines: Option<usize>) -> Self {
        let handle = tokio::spawn(async move {
            let mut log = match max_lines {
                Some(max) => DiagnosticLog::bounded(max),
                None => DiagnosticLog::new(),
            };

            while let Some(item) = lines.next().await {
                match item {
                    Ok(line) => {
                        tracing::trace!("stderr: {}", line);
                        log.push(&line);
                    }
                    Err(e) => {
                        tracing::warn!("Stopped reading stderr: {}", e);
                        break;
                    }
                }
            }

            tracing::debug!("stderr closed after {} lines", log.len() + log.dropped());
            log
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Wait until stderr has closed and return everything it carried
    pub async fn finish(mut self) -> DiagnosticLog {
        let Some(handle) = self.handle.take() else {
            return DiagnosticLog::new();
        };

        match handle.await {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!("stderr drain task did not complete: {}", e);
                DiagnosticLog::new()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for StderrDrain {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                tracing::trace!("Aborting stderr drain");
            }
            handle.abort();
        }
    }
}
