//! Error types for command execution

use thiserror::Error;

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// A command that must succeed returned a non-zero exit code
    #[error("command '{command}' exited with code {code}")]
    NonZeroExit {
        /// The invocation that failed
        command: String,
        /// The exit code it returned
        code: i32,
    },

    /// Execution was cancelled before the process started
    #[error("execution cancelled")]
    Cancelled,

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
