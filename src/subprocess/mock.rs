//! Test doubles for process handles and runners

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use super::error::ProcessError;
use super::runner::{
    ChunkStream, ExitStatus, ProcessCommand, ProcessHandle, ProcessRunner, StatusFuture,
};

/// A process whose output is fixed up front
#[derive(Debug, Clone)]
pub struct ScriptedProcess {
    stdout: Option<Vec<String>>,
    stderr: Option<Vec<String>>,
    status: ExitStatus,
}

impl Default for ScriptedProcess {
    fn default() -> Self {
        Self {
            stdout: Some(Vec::new()),
            stderr: Some(Vec::new()),
            status: ExitStatus::Success,
        }
    }
}

impl ScriptedProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stdout fragments, delivered exactly as given
    pub fn chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stdout = Some(chunks.into_iter().map(Into::into).collect());
        self
    }

    pub fn stderr_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stderr = Some(lines.into_iter().map(Into::into).collect());
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.status = if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        };
        self
    }

    pub fn status(mut self, status: ExitStatus) -> Self {
        self.status = status;
        self
    }

    pub fn without_stdout(mut self) -> Self {
        self.stdout = None;
        self
    }

    pub fn without_stderr(mut self) -> Self {
        self.stderr = None;
        self
    }

    pub fn into_handle(self) -> ProcessHandle {
        let status = self.status;
        ProcessHandle {
            stdout: self.stdout.map(fixed_stream),
            stderr: self.stderr.map(fixed_stream),
            status: Box::pin(async move { Ok(status) }),
        }
    }
}

fn fixed_stream(items: Vec<String>) -> ChunkStream {
    Box::pin(futures::stream::iter(
        items.into_iter().map(Ok::<String, ProcessError>),
    ))
}

/// Feeds a [`ProcessHandle`] from the test body.
///
/// `close_*` ends the matching pipe. `is_stdout_closed`, `stderr_released`
/// and `is_status_released` report whether the consumer has let go.
pub struct ChannelProcess {
    stdout: Option<mpsc::Sender<Result<String, ProcessError>>>,
    stderr: Option<mpsc::Sender<Result<String, ProcessError>>>,
    exit: Option<oneshot::Sender<ExitStatus>>,
}

impl ChannelProcess {
    pub fn connect() -> (Self, ProcessHandle) {
        let (stdout_tx, stdout_rx) = mpsc::channel(64);
        let (stderr_tx, stderr_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();

        let status: StatusFuture = Box::pin(async move {
            exit_rx.await.map_err(|_| {
                ProcessError::Io(std::io::Error::other("process handle dropped before exit"))
            })
        });

        let handle = ProcessHandle {
            stdout: Some(Box::pin(ReceiverStream::new(stdout_rx))),
            stderr: Some(Box::pin(ReceiverStream::new(stderr_rx))),
            status,
        };

        (
            Self {
                stdout: Some(stdout_tx),
                stderr: Some(stderr_tx),
                exit: Some(exit_tx),
            },
            handle,
        )
    }

    /// Write a stdout fragment. Returns false once stdout is gone.
    pub async fn send_stdout(&self, fragment: &str) -> bool {
        Self::send(&self.stdout, Ok(fragment.to_string())).await
    }

    pub async fn send_stderr(&self, line: &str) -> bool {
        Self::send(&self.stderr, Ok(line.to_string())).await
    }

    /// Make the next stdout read fail
    pub async fn fail_stdout(&self, error: ProcessError) -> bool {
        Self::send(&self.stdout, Err(error)).await
    }

    async fn send(
        pipe: &Option<mpsc::Sender<Result<String, ProcessError>>>,
        item: Result<String, ProcessError>,
    ) -> bool {
        match pipe {
            Some(tx) => tx.send(item).await.is_ok(),
            None => false,
        }
    }

    pub fn close_stdout(&mut self) {
        self.stdout.take();
    }

    pub fn close_stderr(&mut self) {
        self.stderr.take();
    }

    /// Report the process as exited. Returns false if nobody is waiting.
    pub fn exit(&mut self, status: ExitStatus) -> bool {
        match self.exit.take() {
            Some(tx) => tx.send(status).is_ok(),
            None => false,
        }
    }

    pub fn is_stdout_closed(&self) -> bool {
        self.stdout.as_ref().map_or(true, mpsc::Sender::is_closed)
    }

    /// Resolves once the consumer has dropped the stderr stream
    pub async fn stderr_released(&self) {
        if let Some(tx) = &self.stderr {
            tx.closed().await;
        }
    }

    /// Whether the exit status future has been dropped
    pub fn is_status_released(&self) -> bool {
        self.exit.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

/// Runner that hands out scripted processes per program name
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    scripts: Arc<Mutex<HashMap<String, VecDeque<ScriptedProcess>>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a process for the next spawn of `program`
    pub fn expect_spawn(&self, program: &str, process: ScriptedProcess) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(program.to_string())
            .or_default()
            .push_back(process);
    }

    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        let history = self
            .call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        history.iter().filter(|cmd| cmd.program == program).count() == times
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn spawn(&self, command: ProcessCommand) -> Result<ProcessHandle, ProcessError> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&command.program)
            .and_then(VecDeque::pop_front);

        match script {
            Some(process) => Ok(process.into_handle()),
            None => Err(ProcessError::MockExpectationNotMet(format!(
                "no scripted process for '{}'",
                command.display()
            ))),
        }
    }
}
