//! Container OS variance
//!
//! Linux and Windows containers differ in path conventions, default shells,
//! docker sock locations and isolation requirements. All of that variance is
//! resolved through one [`OsInfo`] value so the call sites stay flat.

use serde::{Deserialize, Serialize};

/// The container operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OsKind {
    /// Linux containers
    Linux,
    /// Windows containers
    Windows,
}

/// Resolved OS facts for the docker host this executor runs against
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OsInfo {
    /// OS family of the containers this host runs
    pub kind: OsKind,
    /// Whether `--isolation=process` must be requested (Windows containers on
    /// a Windows host whose kernel version matches the image)
    pub process_isolation: bool,
}

impl OsInfo {
    /// OS info for the current host
    pub fn host() -> Self {
        if cfg!(windows) {
            Self {
                kind: OsKind::Windows,
                process_isolation: true,
            }
        } else {
            Self {
                kind: OsKind::Linux,
                process_isolation: false,
            }
        }
    }

    /// Linux container defaults, handy for tests
    pub fn linux() -> Self {
        Self {
            kind: OsKind::Linux,
            process_isolation: false,
        }
    }

    /// Whether this host runs Windows containers
    pub fn is_windows(&self) -> bool {
        self.kind == OsKind::Windows
    }

    /// Fixed in-container mount point of the host build home
    pub fn container_build_home(&self) -> &'static str {
        match self.kind {
            OsKind::Linux => "/ci-build",
            OsKind::Windows => "C:\\ci-build",
        }
    }

    /// In-container workspace path
    pub fn container_workspace(&self) -> String {
        self.container_path("workspace")
    }

    /// Join a relative path onto the container build home
    pub fn container_path(&self, relative: &str) -> String {
        match self.kind {
            OsKind::Linux => format!("{}/{}", self.container_build_home(), relative),
            OsKind::Windows => format!(
                "{}\\{}",
                self.container_build_home(),
                relative.replace('/', "\\")
            ),
        }
    }

    /// Default shell interpreter for command steps and attached shells
    pub fn default_shell(&self) -> Vec<String> {
        match self.kind {
            OsKind::Linux => vec!["sh".to_string()],
            OsKind::Windows => vec!["cmd".to_string()],
        }
    }

    /// Script file extension for command steps
    pub fn script_extension(&self) -> &'static str {
        match self.kind {
            OsKind::Linux => "sh",
            OsKind::Windows => "bat",
        }
    }

    /// Default docker sock / named pipe path
    pub fn default_docker_sock(&self) -> &'static str {
        match self.kind {
            OsKind::Linux => "/var/run/docker.sock",
            OsKind::Windows => "//./pipe/docker_engine",
        }
    }

    /// Default `--user` for step containers when no runAs is requested
    ///
    /// Linux steps run as root so they can write the mounted build home;
    /// Windows containers keep the image's configured user.
    pub fn default_user(&self) -> Option<&'static str> {
        match self.kind {
            OsKind::Linux => Some("0:0"),
            OsKind::Windows => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_paths() {
        let os = OsInfo::linux();
        assert_eq!(os.container_build_home(), "/ci-build");
        assert_eq!(os.container_workspace(), "/ci-build/workspace");
        assert_eq!(os.container_path("step-0.sh"), "/ci-build/step-0.sh");
        assert_eq!(os.default_shell(), vec!["sh"]);
        assert_eq!(os.default_user(), Some("0:0"));
    }

    #[test]
    fn windows_paths() {
        let os = OsInfo {
            kind: OsKind::Windows,
            process_isolation: true,
        };
        assert_eq!(os.container_workspace(), "C:\\ci-build\\workspace");
        assert_eq!(os.container_path("a/b"), "C:\\ci-build\\a\\b");
        assert_eq!(os.default_shell(), vec!["cmd"]);
        assert_eq!(os.default_user(), None);
    }
}
