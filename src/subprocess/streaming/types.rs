//! Core types for streaming infrastructure

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stream source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::Stdout => write!(f, "stdout"),
            StreamSource::Stderr => write!(f, "stderr"),
        }
    }
}

/// Lifecycle of a decoding session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Fragments are being read and decoded
    Reading,
    /// Stdout closed and the trailing buffer was flushed
    Drained,
    /// Process exit was observed and correlated with diagnostics
    Exited,
    /// Cancelled by the consumer or stopped by a fatal error
    Terminated,
}

impl DecoderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DecoderState::Exited | DecoderState::Terminated)
    }
}

/// Streaming configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Bytes requested per stdout read
    pub read_buffer_size: usize,
    /// Diagnostic text that turns an abnormal exit into a failure
    pub failure_marker: String,
    /// Keep at most this many diagnostic lines, dropping the oldest
    pub max_diagnostic_lines: Option<usize>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 8192,
            failure_marker: "error".to_string(),
            max_diagnostic_lines: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!DecoderState::Reading.is_terminal());
        assert!(!DecoderState::Drained.is_terminal());
        assert!(DecoderState::Exited.is_terminal());
        assert!(DecoderState::Terminated.is_terminal());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StreamingConfig = toml::from_str("failure_marker = \"fatal\"").unwrap();
        assert_eq!(config.failure_marker, "fatal");
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.max_diagnostic_lines, None);
    }
}
