pub mod builder;
pub mod error;
pub mod mock;
pub mod runner;
pub mod streaming;

#[cfg(test)]
mod tests;

pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use mock::{ChannelProcess, MockProcessRunner, ScriptedProcess};
pub use runner::ProcessCommand;
pub use runner::{ExitStatus, ProcessHandle, ProcessRunner};

use std::sync::Arc;
use streaming::{DecoderController, MessageStream, StreamError, StreamingConfig};

#[derive(Debug, thiserror::Error)]
pub enum SpawnMessagesError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl SpawnMessagesError {
    pub fn code(&self) -> u16 {
        match self {
            SpawnMessagesError::Process(e) => e.code(),
            SpawnMessagesError::Stream(e) => e.code(),
        }
    }
}

#[derive(Clone)]
pub struct SubprocessManager {
    runner: Arc<dyn ProcessRunner>,
}

impl SubprocessManager {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    pub fn production() -> Self {
        Self::new(Arc::new(runner::TokioProcessRunner))
    }

    pub fn mock() -> (Self, MockProcessRunner) {
        let mock = MockProcessRunner::new();
        let runner = Arc::new(mock.clone()) as Arc<dyn ProcessRunner>;
        (Self::new(runner), mock)
    }

    /// Spawn `command` and decode its stdout as JSON lines
    pub async fn spawn_messages(
        &self,
        command: ProcessCommand,
        config: &StreamingConfig,
    ) -> Result<MessageStream, SpawnMessagesError> {
        let handle = self.runner.spawn(command).await?;
        Ok(DecoderController::new(handle, config.clone()).messages()?)
    }
}
