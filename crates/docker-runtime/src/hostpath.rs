//! Host path mapping for server-in-container deployments
//!
//! When the CI server itself runs inside a container, paths it sees (the
//! build home under its data directory) differ from the paths the docker
//! daemon on the host must mount. The mapping between the two roots is
//! computed once at startup and injected here; there is no lazily-populated
//! process-wide cache.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Maps server-local paths to the host paths the docker daemon understands
#[derive(Debug, Clone)]
pub struct HostPathMapper {
    local_root: PathBuf,
    host_root: PathBuf,
    in_docker: bool,
}

impl HostPathMapper {
    /// Mapper for a server running directly on the host: identity
    pub fn identity(local_root: impl Into<PathBuf>) -> Self {
        let local_root = local_root.into();
        Self {
            host_root: local_root.clone(),
            local_root,
            in_docker: false,
        }
    }

    /// Mapper for a containerized server whose `local_root` is a bind mount
    /// of `host_root` on the docker host
    pub fn containerized(
        local_root: impl Into<PathBuf>,
        host_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            local_root: local_root.into(),
            host_root: host_root.into(),
            in_docker: true,
        }
    }

    /// Whether the server itself runs inside a container
    pub fn in_docker(&self) -> bool {
        self.in_docker
    }

    /// Translate a server-local path into the host path for a `-v` mount
    pub fn host_path(&self, path: &Path) -> Result<String> {
        if !self.in_docker {
            return Ok(path.to_string_lossy().into_owned());
        }
        let suffix = path.strip_prefix(&self.local_root).map_err(|_| {
            Error::Config(format!(
                "path '{}' is outside the mapped root '{}'",
                path.display(),
                self.local_root.display()
            ))
        })?;
        Ok(self.host_root.join(suffix).to_string_lossy().into_owned())
    }
}
