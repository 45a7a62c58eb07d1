//! The docker job executor facade
//!
//! Owns one job end to end: admission, the build home directory, the
//! isolated network, service containers, the step walk, and teardown in
//! reverse order of setup. Teardown runs on every path out; cleanup failures
//! are logged and never mask the job's own result.

use crate::allocator::ResourceAllocator;
use crate::context::{ExecutionControl, JobContext};
use crate::engine::StepEngine;
use crate::manager::JobManager;
use crate::{Error, Result};
use command_runner::{Command, TaskLogger};
use docker_runtime::{BuiltInRegistryLogin, CacheHelper, ContainerRuntime, ServiceSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Sentinel file a paused step container polls for
const RESUME_SENTINEL: &str = "continue";

/// Executor-level settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Executor name, part of every network and container name
    pub name: String,
    /// Concurrent job capacity; `0` means the host's logical CPU count
    pub concurrency: usize,
    /// Identity of the server running this executor, shown in the job log
    pub server_name: String,
    /// Server base URL, used to construct built-in registry logins
    pub server_url: String,
    /// Directory under which per-build homes are created
    pub build_root: PathBuf,
    /// Shared cache root
    pub cache_root: PathBuf,
}

/// Runs jobs against a container runtime on this server
pub struct DockerJobExecutor {
    config: ExecutorConfig,
    runtime: Arc<dyn ContainerRuntime>,
    manager: Arc<dyn JobManager>,
    allocator: Arc<ResourceAllocator>,
}

impl DockerJobExecutor {
    /// Assemble the executor from its collaborators
    pub fn new(
        config: ExecutorConfig,
        runtime: Arc<dyn ContainerRuntime>,
        manager: Arc<dyn JobManager>,
        allocator: Arc<ResourceAllocator>,
    ) -> Self {
        Self {
            config,
            runtime,
            manager,
            allocator,
        }
    }

    /// The job's isolated network, unique per concurrently running build
    pub fn network_name(&self, context: &JobContext) -> String {
        format!(
            "{}-{}-{}-{}",
            self.config.name, context.project_id, context.build_number, context.retry_count
        )
    }

    /// Execute one job, suspending until the executor has capacity
    ///
    /// The `control` handle is the caller's lever for cancel, resume and
    /// shell attach while this future runs.
    pub async fn execute(
        &self,
        context: &JobContext,
        control: &ExecutionControl,
        logger: &dyn TaskLogger,
    ) -> Result<bool> {
        // Inside a cluster the pod-based executor owns job isolation; running
        // docker-on-host jobs from a pod would escape it.
        if std::env::var_os("KUBERNETES_SERVICE_HOST").is_some() {
            return Err(Error::Config(
                "this server runs inside Kubernetes; use the Kubernetes executor instead"
                    .to_string(),
            ));
        }

        logger.log("Pending resource allocation...");
        let required_slots = 1 + context.services.len();
        self.allocator
            .run_server_job(
                &self.config.name,
                self.config.concurrency,
                required_slots,
                || self.run_job(context, control, logger),
            )
            .await
    }

    async fn run_job(
        &self,
        context: &JobContext,
        control: &ExecutionControl,
        logger: &dyn TaskLogger,
    ) -> Result<bool> {
        info!(
            project = context.project_id,
            build = context.build_number,
            executor = %self.config.name,
            "executing job"
        );
        let build_home = self.config.build_root.join(format!(
            "ci-build-{}-{}",
            context.project_id, context.build_number
        ));
        std::fs::create_dir_all(build_home.join("workspace"))?;
        std::fs::create_dir_all(build_home.join("user-home"))?;
        control.set_build_home(build_home.clone());

        let cache = CacheHelper::new(&self.config.cache_root);
        let result = self
            .run_with_network(context, control, &cache, &build_home, logger)
            .await;

        // The build home is taken under its lock so a late resume signal
        // observes it as gone instead of racing the deletion.
        let taken = control.take_build_home();
        if let Some(dir) = taken {
            let use_container = control.teardown_needs_container();
            if let Err(err) = self.runtime.delete_dir(&dir, use_container, logger).await {
                logger.error(&format!("Failed to delete build home: {err}"));
            }
        }
        result
    }

    async fn run_with_network(
        &self,
        context: &JobContext,
        control: &ExecutionControl,
        cache: &CacheHelper,
        build_home: &Path,
        logger: &dyn TaskLogger,
    ) -> Result<bool> {
        let network = self.network_name(context);
        logger.log(&format!(
            "Executing job (executor: {}, server: {}, network: {network})",
            self.config.name, self.config.server_name
        ));
        self.runtime.create_network(&network, logger).await?;

        let result = self
            .run_with_services(context, control, cache, build_home, &network, logger)
            .await;

        self.runtime.delete_network(&network, logger).await;
        result
    }

    async fn run_with_services(
        &self,
        context: &JobContext,
        control: &ExecutionControl,
        cache: &CacheHelper,
        build_home: &Path,
        network: &str,
        logger: &dyn TaskLogger,
    ) -> Result<bool> {
        let mut started: Vec<&ServiceSpec> = Vec::new();
        for service in &context.services {
            let auth = self.service_auth(context, service);
            if let Err(err) = self
                .runtime
                .start_service(network, service, auth.as_ref(), logger)
                .await
            {
                // Partial service startup is fatal: roll back whatever came
                // up before re-raising.
                for service in started.iter().rev() {
                    self.runtime.stop_service(network, &service.name, logger).await;
                }
                return Err(err.into());
            }
            started.push(service);
        }

        let result = self
            .run_steps(context, control, cache, build_home, network, logger)
            .await;

        for service in started.iter().rev() {
            self.runtime.stop_service(network, &service.name, logger).await;
        }
        result
    }

    async fn run_steps(
        &self,
        context: &JobContext,
        control: &ExecutionControl,
        cache: &CacheHelper,
        build_home: &Path,
        network: &str,
        logger: &dyn TaskLogger,
    ) -> Result<bool> {
        let workspace = build_home.join("workspace");
        self.manager.copy_dependencies(context, &workspace).await?;
        self.manager
            .report_job_workspace(context, &self.runtime.os_info().container_workspace())
            .await;

        let engine = StepEngine::new(
            self.runtime.as_ref(),
            self.manager.as_ref(),
            cache,
            control,
            self.config.server_url.clone(),
            network,
            build_home,
        );
        let success = engine.run(context, logger).await;

        if let Err(err) = cache.build_finished() {
            logger.error(&format!("Failed to record cache usage: {err}"));
        }
        success
    }

    /// Signal a paused job to continue
    ///
    /// Writes the sentinel file the running step container polls for. A
    /// resume arriving after the job completed finds no build home and is a
    /// no-op.
    pub fn resume(&self, control: &ExecutionControl) -> Result<()> {
        let guard = control.lock_build_home();
        if let Some(dir) = guard.as_ref() {
            if dir.exists() {
                std::fs::write(dir.join(RESUME_SENTINEL), [])?;
            }
        }
        Ok(())
    }

    /// The command to attach an interactive shell to this job
    ///
    /// Prefers the currently running step container; falls back to a host
    /// shell in the workspace while the build home still exists.
    pub fn open_shell(&self, control: &ExecutionControl) -> Result<Command> {
        if let Some(step) = control.running_step() {
            return Ok(self.runtime.attach_shell(&step.container_name, &step.shell));
        }
        let guard = control.lock_build_home();
        if let Some(dir) = guard.as_ref() {
            if dir.exists() {
                let shell = self.runtime.os_info().default_shell();
                let mut command = Command::new(&shell[0]);
                command.args(&shell[1..]);
                command.current_dir(dir.join("workspace"));
                return Ok(command);
            }
        }
        Err(Error::Config(
            "shell is not ready: no step container running and no workspace present".to_string(),
        ))
    }

    fn service_auth(
        &self,
        context: &JobContext,
        service: &ServiceSpec,
    ) -> Option<BuiltInRegistryLogin> {
        service
            .registry_access_token
            .as_ref()
            .map(|token| BuiltInRegistryLogin {
                server_url: self.config.server_url.clone(),
                job_token: context.job_token.clone(),
                access_token: token.clone(),
            })
    }
}
