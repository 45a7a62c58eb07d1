//! Command type for building executable invocations

use async_process::Command as AsyncCommand;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// A command to be executed
///
/// Builder for an external invocation that can be converted to
/// `async_process::Command` when needed. Unlike `AsyncCommand` this type is
/// `Clone`, so the same invocation can be prepared and spawned several times
/// (retries, kill commands bound to a [`crate::CancelToken`]).
#[derive(Debug, Clone)]
pub struct Command {
    /// The program to execute
    program: OsString,
    /// The arguments to pass to the program
    args: Vec<OsString>,
    /// Environment variables to set, in deterministic order
    env: BTreeMap<OsString, OsString>,
    /// Working directory for the command
    current_dir: Option<PathBuf>,
    /// Whether to clear the inherited environment first
    env_clear: bool,
}

impl Command {
    /// Create a new command for the given program
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
            env_clear: false,
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Set an environment variable
    pub fn env<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Set multiple environment variables
    pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (key, val) in vars {
            self.env(key, val);
        }
        self
    }

    /// Clear all inherited environment variables (except those explicitly set)
    pub fn env_clear(&mut self) -> &mut Self {
        self.env_clear = true;
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Get the program name
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Get the arguments
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Get the environment variables
    pub fn get_envs(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    /// Get the working directory, if one was set
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Render the invocation for log lines, program plus arguments
    pub fn display(&self) -> String {
        let mut rendered = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }

    /// Prepare this command for execution as an `async_process::Command`
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args);
        if self.env_clear {
            cmd.env_clear();
        }
        for (key, val) in &self.env {
            cmd.env(key, val);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_accumulates_args() {
        let mut cmd = Command::new("docker");
        cmd.arg("network").args(["create", "ci-1-2-0"]);

        assert_eq!(cmd.get_program(), "docker");
        assert_eq!(cmd.get_args().len(), 3);
        assert_eq!(cmd.get_args()[2], "ci-1-2-0");
    }

    #[test]
    fn command_env_and_dir() {
        let mut cmd = Command::new("git");
        cmd.env("HOME", "/tmp/user").current_dir("/tmp/workspace");

        assert_eq!(
            cmd.get_envs().get(OsStr::new("HOME")),
            Some(&OsString::from("/tmp/user"))
        );
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/tmp/workspace")));
    }

    #[test]
    fn command_is_reusable() {
        let mut cmd = Command::new("echo");
        cmd.arg("hi");
        let copy = cmd.clone();

        // Both the original and the clone can still be prepared.
        let _ = cmd.prepare();
        let _ = copy.prepare();
        assert_eq!(copy.display(), "echo hi");
    }
}
