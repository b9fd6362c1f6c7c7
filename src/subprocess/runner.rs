use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;

use super::error::ProcessError;
use super::streaming::chunks;

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub stdin: Option<String>,
    pub suppress_stderr: bool,
    pub kill_on_drop: bool,
    pub read_buffer_size: usize,
}

impl ProcessCommand {
    /// Human readable command line, used in logs and error messages
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    /// Return code in the POSIX convention: signals are reported as `-signo`
    pub fn return_code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Error(code) => *code,
            ExitStatus::Signal(sig) => -sig,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return ExitStatus::Success;
        }
        if let Some(code) = status.code() {
            return ExitStatus::Error(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitStatus::Signal(sig);
            }
        }
        ExitStatus::Error(-1)
    }
}

pub type ProcessStreamItem = Result<String, ProcessError>;
/// Arbitrarily sized stdout fragments, no line alignment
pub type ChunkStream = Pin<Box<dyn Stream<Item = ProcessStreamItem> + Send>>;
/// Diagnostic lines without their trailing newline
pub type LineStream = Pin<Box<dyn Stream<Item = ProcessStreamItem> + Send>>;
pub type StatusFuture =
    Pin<Box<dyn futures::Future<Output = Result<ExitStatus, ProcessError>> + Send>>;

/// The running process as seen by the decoder.
///
/// A missing `stdout` or `stderr` means the pipe was never connected.
/// Dropping the handle drops `status`, which owns the child.
pub struct ProcessHandle {
    pub stdout: Option<ChunkStream>,
    pub stderr: Option<LineStream>,
    pub status: StatusFuture,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(&self, command: ProcessCommand) -> Result<ProcessHandle, ProcessError>;
}

pub struct TokioProcessRunner;

impl TokioProcessRunner {
    /// Normalize a line by removing trailing newlines
    fn normalize_line(mut line: String) -> String {
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        line
    }

    /// Create a line stream from a buffered reader.
    ///
    /// Lines are decoded lossily so a stray invalid byte on stderr cannot end
    /// the drain early.
    pub fn create_line_stream<R>(reader: tokio::io::BufReader<R>, command: String) -> LineStream
    where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
    {
        use tokio::io::AsyncBufReadExt;

        Box::pin(futures::stream::unfold(
            Some((reader, command)),
            |state| async move {
                let (mut reader, command) = state?;
                let mut line = Vec::new();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => None, // EOF
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line).into_owned();
                        Some((Ok(Self::normalize_line(text)), Some((reader, command))))
                    }
                    Err(e) => Some((
                        Err(ProcessError::IoError {
                            command,
                            source: e,
                        }),
                        None,
                    )),
                }
            },
        )) as LineStream
    }

    /// Create a status future that owns the child
    fn create_status_future(mut child: tokio::process::Child, command: String) -> StatusFuture {
        Box::pin(async move {
            match child.wait().await {
                Ok(status) => {
                    let status = ExitStatus::from(status);
                    tracing::debug!("Process '{}' exited with {:?}", command, status);
                    Ok(status)
                }
                Err(e) => Err(ProcessError::IoError { command, source: e }),
            }
        })
    }

    /// Log command execution details
    fn log_command_start(command: &ProcessCommand) {
        tracing::debug!("Spawning streaming subprocess: {}", command.display());

        if !command.env.is_empty() {
            tracing::debug!("Environment variables count: {}", command.env.len());
            tracing::trace!("Environment variables: {:?}", command.env);
        }

        if let Some(ref dir) = command.working_dir {
            tracing::trace!("Working directory: {:?}", dir);
        }

        if let Some(ref stdin) = command.stdin {
            tracing::trace!("Stdin provided: {} bytes", stdin.len());
        }
    }

    /// Configure the command with environment, working directory and pipes
    fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);

        // Own process group so a terminal Ctrl-C is delivered to us first
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        cmd.args(&command.args);

        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        if command.stdin.is_some() {
            cmd.stdin(std::process::Stdio::piped());
        } else {
            cmd.stdin(std::process::Stdio::null());
        }

        cmd.stdout(std::process::Stdio::piped());

        if command.suppress_stderr {
            cmd.stderr(std::process::Stdio::null());
        } else {
            cmd.stderr(std::process::Stdio::piped());
        }

        cmd.kill_on_drop(command.kill_on_drop);
        cmd
    }

    /// Feed stdin from its own task.
    ///
    /// Writing inline would block on a full stdin pipe while nobody reads
    /// the child's stdout yet.
    fn spawn_stdin_writer(child: &mut tokio::process::Child, data: String, command: String) {
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                use tokio::io::AsyncWriteExt;
                let result = async {
                    stdin.write_all(data.as_bytes()).await?;
                    stdin.shutdown().await
                }
                .await;
                match result {
                    Ok(()) => tracing::trace!("Wrote {} bytes to stdin of '{}'", data.len(), command),
                    Err(e) => tracing::warn!("Failed to write stdin of '{}': {}", command, e),
                }
            });
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, command: ProcessCommand) -> Result<ProcessHandle, ProcessError> {
        Self::log_command_start(&command);

        let display = command.display();
        let mut cmd = Self::configure_command(&command);
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::CommandNotFound(command.program.clone())
            } else {
                ProcessError::SpawnFailed {
                    command: display.clone(),
                    source: e,
                }
            }
        })?;

        if let Some(data) = command.stdin.clone() {
            Self::spawn_stdin_writer(&mut child, data, display.clone());
        }

        let stdout = child.stdout.take().map(|out| {
            chunks::chunk_stream(out, command.read_buffer_size, display.clone())
        });
        let stderr = child.stderr.take().map(|err| {
            Self::create_line_stream(tokio::io::BufReader::new(err), display.clone())
        });

        Ok(ProcessHandle {
            stdout,
            stderr,
            status: Self::create_status_future(child, display),
        })
    }
}
