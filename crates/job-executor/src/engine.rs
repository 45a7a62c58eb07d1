//! The step execution engine
//!
//! A single task walks the flattened step tree in order. Each leaf dispatches
//! to the container runtime (or host git, or the server-side collaborator)
//! and yields a boolean: `false` marks the job failed and every remaining
//! step is skipped with a notice. Services keep running concurrently; the
//! walk itself is strictly sequential.

use crate::checkout;
use crate::context::{ExecutionControl, JobContext, OwnerState, RunningStep};
use crate::manager::JobManager;
use crate::step::{CommandStep, RunContainerStep, Step, position_label};
use crate::{Error, Result};
use command_runner::TaskLogger;
use docker_runtime::{
    BuiltInRegistryLogin, CacheHelper, ContainerRuntime, RunStepSpec, parse_quote_tokens,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

/// Walks one job's step tree
pub struct StepEngine<'a> {
    runtime: &'a dyn ContainerRuntime,
    manager: &'a dyn JobManager,
    cache: &'a CacheHelper,
    control: &'a ExecutionControl,
    server_url: String,
    network: String,
    build_home: PathBuf,
}

impl<'a> StepEngine<'a> {
    /// Engine for one execution attempt
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        manager: &'a dyn JobManager,
        cache: &'a CacheHelper,
        control: &'a ExecutionControl,
        server_url: impl Into<String>,
        network: impl Into<String>,
        build_home: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            manager,
            cache,
            control,
            server_url: server_url.into(),
            network: network.into(),
            build_home: build_home.into(),
        }
    }

    /// Execute the job's step tree, returning overall success
    pub async fn run(&self, context: &JobContext, logger: &dyn TaskLogger) -> Result<bool> {
        let leaves = context.steps.flatten();
        let mut owner = OwnerState::default();
        let mut failed = false;

        for (position, step) in leaves {
            let label = position_label(&position);
            if failed {
                logger.notice(&format!("Step {label} ({}) is skipped", step.kind()));
                continue;
            }

            logger.notice(&format!("Running step {label} ({})...", step.kind()));
            let started = Instant::now();
            let ok = self
                .execute(step, &position, context, &mut owner, logger)
                .await?;
            let elapsed = started.elapsed();
            if ok {
                logger.notice(&format!(
                    "Step {label} finished in {:.1}s",
                    elapsed.as_secs_f64()
                ));
            } else {
                logger.error(&format!(
                    "Step {label} failed after {:.1}s",
                    elapsed.as_secs_f64()
                ));
                failed = true;
            }
        }
        Ok(!failed)
    }

    async fn execute(
        &self,
        step: &Step,
        position: &[usize],
        context: &JobContext,
        owner: &mut OwnerState,
        logger: &dyn TaskLogger,
    ) -> Result<bool> {
        match step {
            Step::Command(command) => {
                self.run_command(command, position, context, owner, logger)
                    .await
            }
            Step::RunContainer(container) => {
                self.run_container(container, position, context, owner, logger)
                    .await
            }
            Step::BuildImage(build) => {
                let auth = self.builtin_auth(context, build.registry_access_token.as_deref());
                let workspace = self.build_home.join("workspace");
                as_step_outcome(
                    self.runtime
                        .build_image(&build.spec, &workspace, auth.as_ref(), logger)
                        .await,
                    logger,
                )
            }
            Step::RunImagetools(imagetools) => {
                let auth =
                    self.builtin_auth(context, imagetools.registry_access_token.as_deref());
                as_step_outcome(
                    self.runtime
                        .run_imagetools(&imagetools.spec, auth.as_ref(), logger)
                        .await,
                    logger,
                )
            }
            Step::PruneBuilderCache(prune) => as_step_outcome(
                self.runtime.prune_builder_cache(prune, logger).await,
                logger,
            ),
            Step::Checkout(step) => {
                let workspace = self.build_home.join("workspace");
                let user_home = self.build_home.join("user-home");
                checkout::checkout(step, context, &workspace, &user_home, logger).await
            }
            Step::SetupCache(step) => {
                self.cache
                    .setup_cache(&step.key, &step.paths, self.runtime.os_info())?;
                logger.log(&format!("Cache '{}' is set up", step.key));
                Ok(true)
            }
            Step::ServerSide(step) => {
                let result = self
                    .manager
                    .run_server_step(
                        context,
                        &position.to_vec(),
                        &self.build_home,
                        &step.placeholders,
                        logger,
                    )
                    .await?;
                for (relative, content) in &result.output_files {
                    let path = self.build_home.join(relative);
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, content)?;
                }
                Ok(result.success)
            }
        }
    }

    async fn run_command(
        &self,
        step: &CommandStep,
        position: &[usize],
        context: &JobContext,
        owner: &mut OwnerState,
        logger: &dyn TaskLogger,
    ) -> Result<bool> {
        let Some(image) = &step.image else {
            return Err(Error::Config(
                "this executor runs command steps in containers; specify an image".to_string(),
            ));
        };
        let os = *self.runtime.os_info();
        let label = position_label(position);

        let script_name = format!("step-{label}.{}", os.script_extension());
        std::fs::write(self.build_home.join(&script_name), &step.commands)?;

        let interpreter = match &step.interpreter {
            Some(custom) if !custom.is_empty() => custom.clone(),
            _ => os.default_shell(),
        };
        let mut arguments: Vec<String> = interpreter[1..].to_vec();
        arguments.push(os.container_path(&script_name));

        let spec = RunStepSpec {
            container_name: self.container_name(&label),
            network: self.network.clone(),
            image: image.clone(),
            run_as: step.run_as.clone(),
            entrypoint: Some(interpreter[0].clone()),
            arguments,
            env: step.env.clone(),
            working_dir: None,
            volume_mounts: vec![],
            cache_mounts: self.cache.mounts(),
            host_build_home: self.build_home.clone(),
            use_tty: step.use_tty,
        };
        let auth = self.builtin_auth(context, step.registry_access_token.as_deref());
        self.run_step_container(spec, auth, interpreter, owner, logger)
            .await
    }

    async fn run_container(
        &self,
        step: &RunContainerStep,
        position: &[usize],
        context: &JobContext,
        owner: &mut OwnerState,
        logger: &dyn TaskLogger,
    ) -> Result<bool> {
        let os = *self.runtime.os_info();
        let spec = RunStepSpec {
            container_name: self.container_name(&position_label(position)),
            network: self.network.clone(),
            image: step.image.clone(),
            run_as: step.run_as.clone(),
            entrypoint: None,
            arguments: step
                .arguments
                .as_deref()
                .map(parse_quote_tokens)
                .unwrap_or_default(),
            env: step.env.clone(),
            working_dir: step.working_dir.clone(),
            volume_mounts: step.volume_mounts.clone(),
            cache_mounts: self.cache.mounts(),
            host_build_home: self.build_home.clone(),
            use_tty: step.use_tty,
        };
        let auth = self.builtin_auth(context, step.registry_access_token.as_deref());
        self.run_step_container(spec, auth, os.default_shell(), owner, logger)
            .await
    }

    async fn run_step_container(
        &self,
        spec: RunStepSpec,
        auth: Option<BuiltInRegistryLogin>,
        shell: Vec<String>,
        owner: &mut OwnerState,
        logger: &dyn TaskLogger,
    ) -> Result<bool> {
        // Containers share the build home as a bind mount, so its ownership
        // must follow the step user: chown to a custom user before it runs,
        // and back to the default user before the next default-user step.
        match &spec.run_as {
            Some(user) => {
                if owner.custom_user.as_deref() != Some(user.as_str()) {
                    self.runtime
                        .change_owner(&self.build_home, user, logger)
                        .await?;
                    owner.custom_user = Some(user.clone());
                    // Files now belong to a container user; the host may be
                    // unable to delete them at teardown.
                    self.control.require_container_teardown();
                }
            }
            None => {
                if owner.custom_user.take().is_some() {
                    if let Some(user) = self.runtime.os_info().default_user() {
                        self.runtime
                            .change_owner(&self.build_home, user, logger)
                            .await?;
                    }
                }
            }
        }

        self.control.set_running_step(RunningStep {
            container_name: spec.container_name.clone(),
            shell,
        });
        let result = self
            .runtime
            .run_step(&spec, auth.as_ref(), self.control.cancel_token(), logger)
            .await;
        self.control.clear_running_step();
        let exit_code = result?;

        debug!(container = %spec.container_name, exit_code, "step container exited");
        Ok(exit_code == 0)
    }

    fn container_name(&self, label: &str) -> String {
        format!("{}-step-{label}", self.network)
    }

    fn builtin_auth(
        &self,
        context: &JobContext,
        access_token: Option<&str>,
    ) -> Option<BuiltInRegistryLogin> {
        access_token.map(|token| BuiltInRegistryLogin {
            server_url: self.server_url.clone(),
            job_token: context.job_token.clone(),
            access_token: token.to_string(),
        })
    }
}

/// Interpret a runtime call's outcome as a step result
///
/// A non-zero exit from the underlying tool is a step failure; anything else
/// (daemon unreachable, IO) is an infrastructure error and propagates.
fn as_step_outcome(result: docker_runtime::Result<()>, logger: &dyn TaskLogger) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(docker_runtime::Error::Runner(command_runner::Error::NonZeroExit {
            command,
            code,
        })) => {
            logger.error(&format!("'{command}' exited with code {code}"));
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}
