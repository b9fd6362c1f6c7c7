//! Exit status correlation

use super::drain::{DiagnosticLog, StderrDrain};
use super::error::StreamError;
use crate::subprocess::runner::{ExitStatus, StatusFuture};

/// Decides whether a finished process failed.
///
/// A non-zero exit only counts as a failure when stderr mentions the failure
/// marker. Plenty of CLIs exit non-zero as their shutdown signal without
/// printing anything, and those runs still produced valid output.
#[derive(Debug, Clone)]
pub struct ExitCorrelator {
    marker: String,
}

impl ExitCorrelator {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn correlate(&self, status: ExitStatus, log: &DiagnosticLog) -> Result<(), StreamError> {
        if status.success() {
            return Ok(());
        }

        if log.contains_marker(&self.marker) {
            return Err(StreamError::ProcessFailure {
                exit_code: status.return_code(),
                stderr: log.text(),
            });
        }

        tracing::debug!(
            "Process exited with {:?} but stderr has no '{}' marker, treating as clean shutdown",
            status,
            self.marker
        );
        Ok(())
    }

    /// Wait for the drain to see stderr close, then for the exit status,
    /// and correlate the two.
    pub async fn await_exit(
        &self,
        drain: StderrDrain,
        status: StatusFuture,
    ) -> Result<ExitStatus, StreamError> {
        let log = drain.finish().await;
        let status = status.await.map_err(StreamError::Wait)?;
        self.correlate(status, &log)?;
        Ok(status)
    }
}

impl Default for ExitCorrelator {
    fn default() -> Self {
        Self::new("error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::ProcessError;

    fn log(lines: &[&str]) -> DiagnosticLog {
        lines.iter().collect()
    }

    #[test]
    fn test_success_is_never_a_failure() {
        let correlator = ExitCorrelator::default();
        assert!(correlator
            .correlate(ExitStatus::Success, &log(&["error everywhere"]))
            .is_ok());
    }

    #[test]
    fn test_nonzero_with_marker_fails() {
        let err = ExitCorrelator::default()
            .correlate(ExitStatus::Error(1), &log(&["Fatal error: bad flag"]))
            .unwrap_err();
        match err {
            StreamError::ProcessFailure { exit_code, stderr } => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "Fatal error: bad flag");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_nonzero_without_diagnostics_is_benign() {
        assert!(ExitCorrelator::default()
            .correlate(ExitStatus::Error(1), &log(&[]))
            .is_ok());
        assert!(ExitCorrelator::default()
            .correlate(ExitStatus::Error(143), &log(&["shutting down"]))
            .is_ok());
    }

    #[test]
    fn test_signal_reports_negative_code() {
        let err = ExitCorrelator::default()
            .correlate(ExitStatus::Signal(9), &log(&["ERROR: killed"]))
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(-9));
    }

    #[test]
    fn test_custom_marker() {
        let correlator = ExitCorrelator::new("panicked");
        assert_eq!(correlator.marker(), "panicked");
        assert!(correlator
            .correlate(ExitStatus::Error(101), &log(&["error: ignored"]))
            .is_ok());
        assert!(correlator
            .correlate(ExitStatus::Error(101), &log(&["thread 'main' PANICKED at src/main.rs"]))
            .is_err());
    }

    #[tokio::test]
    async fn test_await_exit_joins_drain_first() {
        let lines: Vec<Result<String, ProcessError>> = vec![Ok("Error: boom".to_string())];
        let drain = StderrDrain::spawn(Box::pin(futures::stream::iter(lines)), None);
        let status: StatusFuture = Box::pin(async { Ok(ExitStatus::Error(2)) });

        let err = ExitCorrelator::default()
            .await_exit(drain, status)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
    }

    #[tokio::test]
    async fn test_await_exit_wait_failure() {
        let drain = StderrDrain::spawn(Box::pin(futures::stream::empty()), None);
        let status: StatusFuture =
            Box::pin(async { Err(ProcessError::Io(std::io::Error::other("wait failed"))) });

        let err = ExitCorrelator::default()
            .await_exit(drain, status)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Wait(_)));
    }
}
