//! Line-oriented job log sink

use std::sync::Mutex;

/// Severity of a job log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LogSeverity {
    /// Ordinary output
    Log,
    /// Highlighted informational line (step skipped, resource wait, ...)
    Notice,
    /// Failure output
    Error,
}

/// A line-oriented sink for job console output
///
/// Everything an external process prints is streamed here line by line, and
/// the engine writes its own progress lines through the same interface, so a
/// build's console log is a single ordered sequence.
pub trait TaskLogger: Send + Sync {
    /// Write an ordinary log line
    fn log(&self, line: &str);
    /// Write a highlighted notice line
    fn notice(&self, line: &str);
    /// Write an error line
    fn error(&self, line: &str);
}

/// Logger forwarding job output to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TaskLogger for TracingLogger {
    fn log(&self, line: &str) {
        tracing::info!(target: "job", "{line}");
    }

    fn notice(&self, line: &str) {
        tracing::info!(target: "job", notice = true, "{line}");
    }

    fn error(&self, line: &str) {
        tracing::warn!(target: "job", "{line}");
    }
}

/// In-memory logger capturing lines, used by tests and the executor self-test
#[derive(Debug, Default)]
pub struct BufferLogger {
    lines: Mutex<Vec<(LogSeverity, String)>>,
}

impl BufferLogger {
    /// Create an empty buffer logger
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured lines with their severities, in arrival order
    pub fn lines(&self) -> Vec<(LogSeverity, String)> {
        self.lines.lock().unwrap().clone()
    }

    /// Captured line text of the given severity
    pub fn lines_of(&self, severity: LogSeverity) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, l)| l.clone())
            .collect()
    }

    /// Whether any captured line contains the given fragment
    pub fn contains(&self, fragment: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(_, l)| l.contains(fragment))
    }
}

impl TaskLogger for BufferLogger {
    fn log(&self, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((LogSeverity::Log, line.to_string()));
    }

    fn notice(&self, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((LogSeverity::Notice, line.to_string()));
    }

    fn error(&self, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((LogSeverity::Error, line.to_string()));
    }
}
