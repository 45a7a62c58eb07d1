//! Process exit status

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The exit code to report to the step walk
    ///
    /// A signal-terminated process (for instance a container force-stopped on
    /// cancellation) reports 128 plus the signal number, matching shell
    /// conventions, so the caller sees an ordinary failing code.
    pub fn report_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => -1,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_code_zero() {
        assert!(ExitStatus { code: Some(0), signal: None }.success());
        assert!(!ExitStatus { code: Some(1), signal: None }.success());
        assert!(!ExitStatus { code: None, signal: Some(9) }.success());
    }

    #[test]
    fn killed_process_reports_shell_style_code() {
        let killed = ExitStatus { code: None, signal: Some(9) };
        assert_eq!(killed.report_code(), 137);
    }
}
