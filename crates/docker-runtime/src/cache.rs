//! Job cache directories
//!
//! Caches live on the executor host under a common root, keyed by a
//! user-chosen cache key. A setup-cache step registers one host directory per
//! cached path; every subsequent step container in the job gets those
//! directories bind-mounted. When the job finishes, each used key's
//! `.last-used` marker is refreshed so an external sweeper can evict stale
//! caches.

use crate::{Error, OsInfo, OsKind, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Marker file refreshed after every job that used the cache key
const LAST_USED_MARKER: &str = ".last-used";

#[derive(Debug, Default)]
struct State {
    mounts: Vec<(PathBuf, String)>,
    keys: BTreeSet<String>,
}

/// Accumulates cache mounts for one job
#[derive(Debug)]
pub struct CacheHelper {
    root: PathBuf,
    state: Mutex<State>,
}

impl CacheHelper {
    /// Cache helper rooted at the executor's shared cache directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Register cache mounts for the given key and container paths
    ///
    /// Creates the backing host directories if missing. Relative paths are
    /// resolved against the container workspace; absolute paths are mounted
    /// where they point.
    pub fn setup_cache(&self, key: &str, paths: &[String], os: &OsInfo) -> Result<()> {
        validate_cache_key(key)?;

        // The key directory holds the `.last-used` marker, so it must exist
        // even when the step registers no paths.
        let key_dir = self.root.join(key);
        std::fs::create_dir_all(&key_dir)?;

        let mut new_mounts = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            let host_dir = key_dir.join(index.to_string());
            std::fs::create_dir_all(&host_dir)?;
            let target = if is_absolute_container_path(os, path) {
                path.clone()
            } else {
                os.container_path(&format!("workspace/{path}"))
            };
            new_mounts.push((host_dir, target));
        }

        debug!(key, count = new_mounts.len(), "cache mounts registered");
        let mut state = self.state.lock().unwrap();
        state.mounts.extend(new_mounts);
        state.keys.insert(key.to_string());
        Ok(())
    }

    /// All mounts registered so far, host dir to container target
    pub fn mounts(&self) -> Vec<(PathBuf, String)> {
        self.state.lock().unwrap().mounts.clone()
    }

    /// Refresh the `.last-used` marker of every cache key this job touched
    pub fn build_finished(&self) -> Result<()> {
        let keys = self.state.lock().unwrap().keys.clone();
        let stamp = chrono::Utc::now().to_rfc3339();
        for key in keys {
            std::fs::write(self.root.join(&key).join(LAST_USED_MARKER), &stamp)?;
        }
        Ok(())
    }
}

/// A cache key names a directory under the shared cache root, so separators
/// and traversal sequences are rejected outright.
fn validate_cache_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Config("cache key must not be empty".to_string()));
    }
    if key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(Error::Config(format!(
            "invalid cache key '{key}': must not contain '/', '\\' or '..'"
        )));
    }
    Ok(())
}

fn is_absolute_container_path(os: &OsInfo, path: &str) -> bool {
    match os.kind {
        OsKind::Linux => path.starts_with('/'),
        OsKind::Windows => {
            path.starts_with('\\')
                || path
                    .as_bytes()
                    .get(1)
                    .is_some_and(|b| *b == b':')
        }
    }
}
