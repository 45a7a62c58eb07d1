//! External collaborator contract
//!
//! The job execution core never touches the server's entity model directly.
//! Dependency staging, workspace reporting and server-side step handlers all
//! come in through [`JobManager`].

use crate::context::JobContext;
use crate::{Position, Result};
use async_trait::async_trait;
use command_runner::TaskLogger;
use std::collections::BTreeMap;
use std::path::Path;

/// Outcome of a server-side step
#[derive(Debug, Clone)]
pub struct ServerStepResult {
    /// Whether the handler considered the step successful
    pub success: bool,
    /// Files to place into the build home, keyed by relative path
    pub output_files: BTreeMap<String, Vec<u8>>,
}

/// Server-side collaborator driving entity state around one job
#[async_trait]
pub trait JobManager: Send + Sync {
    /// Stage the job's declared dependencies into the workspace
    async fn copy_dependencies(&self, context: &JobContext, workspace: &Path) -> Result<()>;

    /// Report the resolved in-container workspace path for UI display
    async fn report_job_workspace(&self, context: &JobContext, workspace_path: &str);

    /// Execute a server-side step against the build home
    async fn run_server_step(
        &self,
        context: &JobContext,
        position: &Position,
        input_dir: &Path,
        placeholders: &[String],
        logger: &dyn TaskLogger,
    ) -> Result<ServerStepResult>;
}
