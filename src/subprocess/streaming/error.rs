use super::types::StreamSource;
use crate::error::ErrorCode;
use crate::subprocess::ProcessError;

/// Errors that end a decoding session.
///
/// Mid-stream parse failures never show up here: an unparsable line is
/// deferred until more output arrives.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Not connected: process {stream} is not available")]
    ConnectionNotEstablished { stream: StreamSource },

    #[error("Failed to decode trailing output as JSON: {source}")]
    MessageDecode {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Process failed with exit code {exit_code}: {stderr}")]
    ProcessFailure { exit_code: i32, stderr: String },

    #[error("Failed to read process output: {0}")]
    Read(#[source] ProcessError),

    #[error("Failed to wait for process exit: {0}")]
    Wait(#[source] ProcessError),
}

impl StreamError {
    pub fn code(&self) -> u16 {
        match self {
            StreamError::ConnectionNotEstablished { .. } => ErrorCode::STREAM_NOT_CONNECTED,
            StreamError::MessageDecode { .. } => ErrorCode::STREAM_DECODE_FAILED,
            StreamError::ProcessFailure { .. } => ErrorCode::EXEC_SUBPROCESS_FAILED,
            StreamError::Read(_) => ErrorCode::STREAM_READ_FAILED,
            StreamError::Wait(_) => ErrorCode::EXEC_WAIT_FAILED,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StreamError::ProcessFailure { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
