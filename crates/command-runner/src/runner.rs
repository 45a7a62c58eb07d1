//! Executes commands, streaming their output into a task logger

use crate::cancel::CancelToken;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::logger::TaskLogger;
use crate::process::ExitStatus;
use async_process::Stdio;
use futures_lite::io::{AsyncBufReadExt, BufReader};
use futures_lite::stream::StreamExt;

/// Runs external commands for the job execution core
///
/// Output is forwarded to the [`TaskLogger`] line by line as it arrives, so
/// long-running containers stream into the build console instead of buffering.
/// A non-zero exit is a normal return value from [`CommandRunner::run`]; the
/// caller decides what it means.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner;

impl CommandRunner {
    /// Run a command to completion, streaming stdout/stderr into the logger
    ///
    /// When a [`CancelToken`] is supplied and already cancelled, the process
    /// is not started and `Err(Cancelled)` is returned.
    pub async fn run(
        command: &Command,
        logger: &dyn TaskLogger,
        cancel: Option<&CancelToken>,
    ) -> Result<ExitStatus> {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
        }

        let mut async_cmd = command.prepare();
        async_cmd.stdout(Stdio::piped());
        async_cmd.stderr(Stdio::piped());

        let mut child = async_cmd.spawn().map_err(|e| {
            Error::spawn_failed(format!("failed to spawn '{}': {e}", command.display()))
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let pump_stdout = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next().await {
                    match line {
                        Ok(line) => logger.log(&line),
                        Err(_) => break,
                    }
                }
            }
        };
        let pump_stderr = async {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Some(line) = lines.next().await {
                    match line {
                        Ok(line) => logger.error(&line),
                        Err(_) => break,
                    }
                }
            }
        };

        // Both pipes drain before we reap the child, otherwise a chatty
        // process could block on a full pipe and never exit.
        futures::join!(pump_stdout, pump_stderr);

        let status = child.status().await?;
        Ok(status.into())
    }

    /// Run a command that must succeed, turning non-zero exit into an error
    pub async fn run_ok(
        command: &Command,
        logger: &dyn TaskLogger,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        let status = Self::run(command, logger, cancel).await?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::NonZeroExit {
                command: command.display(),
                code: status.report_code(),
            })
        }
    }

    /// Run a command and capture its stdout instead of streaming it
    ///
    /// Used for queries whose output is consumed programmatically (`docker
    /// inspect`, host path resolution). Stderr is captured alongside so a
    /// failure can be reported with the diagnostic the tool printed.
    pub async fn run_captured(command: &Command) -> Result<(ExitStatus, String, String)> {
        let output = command.prepare().output().await.map_err(|e| {
            Error::spawn_failed(format!("failed to spawn '{}': {e}", command.display()))
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Ok((output.status.into(), stdout, stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{BufferLogger, LogSeverity};

    #[smol_potat::test]
    async fn streams_stdout_lines_to_logger() {
        let logger = BufferLogger::new();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo one; echo two"]);

        let status = CommandRunner::run(&cmd, &logger, None).await.unwrap();
        assert!(status.success());
        assert_eq!(logger.lines_of(LogSeverity::Log), vec!["one", "two"]);
    }

    #[smol_potat::test]
    async fn streams_stderr_as_error_lines() {
        let logger = BufferLogger::new();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo oops >&2; exit 3"]);

        let status = CommandRunner::run(&cmd, &logger, None).await.unwrap();
        assert_eq!(status.report_code(), 3);
        assert_eq!(logger.lines_of(LogSeverity::Error), vec!["oops"]);
    }

    #[smol_potat::test]
    async fn cancelled_token_prevents_start() {
        let logger = BufferLogger::new();
        let token = CancelToken::new();
        token.cancel().await;

        let cmd = Command::new("true");
        let result = CommandRunner::run(&cmd, &logger, Some(&token)).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[smol_potat::test]
    async fn run_ok_rejects_failing_command() {
        let logger = BufferLogger::new();
        let cmd = Command::new("false");
        let result = CommandRunner::run_ok(&cmd, &logger, None).await;
        assert!(matches!(result, Err(Error::NonZeroExit { code: 1, .. })));
    }

    #[smol_potat::test]
    async fn run_captured_returns_stdout() {
        let mut cmd = Command::new("echo");
        cmd.arg("captured");
        let (status, stdout, _) = CommandRunner::run_captured(&cmd).await.unwrap();
        assert!(status.success());
        assert_eq!(stdout, "captured");
    }
}
