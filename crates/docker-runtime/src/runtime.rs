//! The container runtime seam
//!
//! The step execution engine talks to containers exclusively through
//! [`ContainerRuntime`], so the whole job lifecycle can be exercised against
//! recording stubs without a docker daemon.

use crate::registry::BuiltInRegistryLogin;
use crate::{OsInfo, Result};
use async_trait::async_trait;
use command_runner::{CancelToken, TaskLogger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A long-running auxiliary container declared by the job (e.g. a database)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name, also the container's network alias
    pub name: String,
    /// Image to run
    pub image: String,
    /// Optional command arguments, quote-tokenized
    pub arguments: Option<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Access token for the built-in registry, if the image lives there
    pub registry_access_token: Option<String>,
}

/// Everything needed to run one step container to completion
#[derive(Debug, Clone)]
pub struct RunStepSpec {
    /// Deterministic container name (`{network}-step-{position}`)
    pub container_name: String,
    /// The job's isolated network
    pub network: String,
    /// Image reference, before mapping
    pub image: String,
    /// Optional `--user` override
    pub run_as: Option<String>,
    /// Optional entrypoint (command steps run their script interpreter here)
    pub entrypoint: Option<String>,
    /// Container arguments
    pub arguments: Vec<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Working dir for non-entrypoint containers; entrypoint containers
    /// always run in the workspace
    pub working_dir: Option<String>,
    /// Volume mounts: workspace-relative source -> container target
    pub volume_mounts: Vec<(String, String)>,
    /// Cache mounts: host dir -> container target, from the cache helper
    pub cache_mounts: Vec<(PathBuf, String)>,
    /// The host build home backing this job
    pub host_build_home: PathBuf,
    /// Whether to allocate a TTY
    pub use_tty: bool,
}

/// Image build request, executed through the configured buildx builder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildImageSpec {
    /// Build context path, relative to the workspace; workspace root if unset
    pub build_path: Option<String>,
    /// Dockerfile path, relative to the workspace
    pub dockerfile: Option<String>,
    /// Tags to apply
    pub tags: Vec<String>,
    /// Push after build instead of loading into the local daemon
    pub push: bool,
    /// Target platforms (`linux/amd64`, ...)
    pub platforms: Vec<String>,
    /// Extra buildx options, quote-tokenized
    pub more_options: Option<String>,
}

/// `docker buildx imagetools` invocation (e.g. to assemble a manifest list)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunImagetoolsSpec {
    /// Arguments after `imagetools`, quote-tokenized
    pub arguments: String,
}

/// Builder cache prune request
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PruneBuilderCacheSpec {
    /// Extra prune options, quote-tokenized
    pub options: Option<String>,
}

/// Container operations the job execution core needs
///
/// Every operation is a discrete, caller-retryable unit. Failures of setup
/// operations surface as errors; a step container's non-zero exit is a normal
/// return value interpreted by the engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// OS facts for this runtime's containers
    fn os_info(&self) -> &OsInfo;

    /// Apply the configured image mappings to an image reference
    fn map_image(&self, image: &str) -> String;

    /// Create the job's isolated bridge network; failure is fatal to the job
    async fn create_network(&self, name: &str, logger: &dyn TaskLogger) -> Result<()>;

    /// Best-effort removal of the job network; failures are logged
    async fn delete_network(&self, name: &str, logger: &dyn TaskLogger);

    /// Start one detached service container and wait until it is running
    async fn start_service(
        &self,
        network: &str,
        service: &ServiceSpec,
        auth: Option<&BuiltInRegistryLogin>,
        logger: &dyn TaskLogger,
    ) -> Result<()>;

    /// Best-effort stop and removal of a service container
    async fn stop_service(&self, network: &str, service_name: &str, logger: &dyn TaskLogger);

    /// Command attaching an interactive shell to a running step container
    fn attach_shell(&self, container_name: &str, shell: &[String]) -> command_runner::Command;

    /// Run a step container to completion, returning its exit code
    ///
    /// Binds the cancel token to a forced stop of the container, so external
    /// cancellation surfaces as a killed exit code rather than an error.
    async fn run_step(
        &self,
        spec: &RunStepSpec,
        auth: Option<&BuiltInRegistryLogin>,
        cancel: &CancelToken,
        logger: &dyn TaskLogger,
    ) -> Result<i32>;

    /// Build an image via the configured buildx builder
    async fn build_image(
        &self,
        spec: &BuildImageSpec,
        workspace: &Path,
        auth: Option<&BuiltInRegistryLogin>,
        logger: &dyn TaskLogger,
    ) -> Result<()>;

    /// Run `docker buildx imagetools` with the given arguments
    async fn run_imagetools(
        &self,
        spec: &RunImagetoolsSpec,
        auth: Option<&BuiltInRegistryLogin>,
        logger: &dyn TaskLogger,
    ) -> Result<()>;

    /// Prune the buildx builder cache
    async fn prune_builder_cache(
        &self,
        spec: &PruneBuilderCacheSpec,
        logger: &dyn TaskLogger,
    ) -> Result<()>;

    /// Recursively change ownership of a host directory
    ///
    /// Used before/after steps that run as a different user than the server,
    /// so subsequent host-side operations can still write the build home.
    async fn change_owner(&self, dir: &Path, user: &str, logger: &dyn TaskLogger) -> Result<()>;

    /// Delete a host directory
    ///
    /// With `use_container` the contents are removed from inside a helper
    /// container, which is required when another container's user wrote files
    /// the server-side process cannot delete.
    async fn delete_dir(&self, dir: &Path, use_container: bool, logger: &dyn TaskLogger)
    -> Result<()>;
}
