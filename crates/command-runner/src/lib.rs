//! Runtime-agnostic external process execution
//!
//! This crate wraps the invocation of external executables (primarily the
//! docker and git command lines) behind a cloneable [`Command`] builder, a
//! line-oriented [`TaskLogger`] sink for stdout/stderr, and a [`CancelToken`]
//! that can force-stop whatever the command left running (for instance a
//! hanging container) when a job is cancelled from outside.

#![warn(missing_docs)]

pub mod cancel;
pub mod command;
pub mod error;
pub mod logger;
pub mod process;
pub mod runner;

pub use cancel::CancelToken;
pub use command::Command;
pub use error::{Error, Result};
pub use logger::{BufferLogger, LogSeverity, TaskLogger, TracingLogger};
pub use process::ExitStatus;
pub use runner::CommandRunner;
