//! Docker CLI implementation of the container runtime

use crate::hostpath::HostPathMapper;
use crate::image::{ImageMapping, map_image};
use crate::options::{
    RESERVED_NETWORK_OPTIONS, RESERVED_RUN_OPTIONS, parse_quote_tokens, validate_options,
};
use crate::registry::{AuthScope, BuiltInRegistryLogin, RegistryLogin, validate_registry_logins};
use crate::runtime::{
    BuildImageSpec, ContainerRuntime, PruneBuilderCacheSpec, RunImagetoolsSpec, RunStepSpec,
    ServiceSpec,
};
use crate::{Error, OsInfo, Result};
use async_io::Timer;
use async_trait::async_trait;
use command_runner::{CancelToken, Command, CommandRunner, TaskLogger};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Image used for chown / delete helper containers on Linux
const HELPER_IMAGE: &str = "busybox";

/// How long to wait for a service container to reach the running state
const SERVICE_START_TIMEOUT: Duration = Duration::from_secs(120);

/// Executor-level docker configuration
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Docker executable; `docker` from PATH when unset
    pub executable: Option<PathBuf>,
    /// Docker sock / named pipe to use; the OS default when unset
    pub docker_sock_path: Option<String>,
    /// Pass `--pull=always` to step and service containers
    pub always_pull_image: bool,
    /// Mount the docker sock into step containers
    ///
    /// Security sensitive: a job that can reach the sock controls the host.
    pub mount_docker_sock: bool,
    /// Buildx builder name; created on demand if missing
    pub builder: String,
    /// Extra `docker run` options, quote-tokenized, reserved options rejected
    pub run_options: Option<String>,
    /// Extra `docker network create` options
    pub network_options: Option<String>,
    /// `--cpus` limit for step and service containers
    pub cpu_limit: Option<String>,
    /// `--memory` limit for step and service containers
    pub memory_limit: Option<String>,
    /// Ordered image substitution rules
    pub image_mappings: Vec<ImageMapping>,
    /// Registry logins, at most one per registry URL
    pub registry_logins: Vec<RegistryLogin>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            executable: None,
            docker_sock_path: None,
            always_pull_image: true,
            mount_docker_sock: false,
            builder: "derrick".to_string(),
            run_options: None,
            network_options: None,
            cpu_limit: None,
            memory_limit: None,
            image_mappings: Vec::new(),
            registry_logins: Vec::new(),
        }
    }
}

/// Container runtime backed by the docker command line
pub struct DockerCli {
    config: DockerConfig,
    run_options: Vec<String>,
    network_options: Vec<String>,
    os: OsInfo,
    paths: HostPathMapper,
}

impl DockerCli {
    /// Validate the configuration and build the runtime
    pub fn new(config: DockerConfig, os: OsInfo, paths: HostPathMapper) -> Result<Self> {
        validate_registry_logins(&config.registry_logins)?;

        let run_options = match &config.run_options {
            Some(raw) => {
                let tokens = parse_quote_tokens(raw);
                validate_options(&tokens, RESERVED_RUN_OPTIONS)?;
                tokens
            }
            None => Vec::new(),
        };
        let network_options = match &config.network_options {
            Some(raw) => {
                let tokens = parse_quote_tokens(raw);
                validate_options(&tokens, RESERVED_NETWORK_OPTIONS)?;
                tokens
            }
            None => Vec::new(),
        };

        Ok(Self {
            config,
            run_options,
            network_options,
            os,
            paths,
        })
    }

    /// Base docker command, honoring the configured executable and sock
    fn docker(&self) -> Command {
        let mut cmd = match &self.config.executable {
            Some(path) => Command::new(path),
            None => Command::new("docker"),
        };
        if let Some(sock) = &self.config.docker_sock_path {
            let host = if self.os.is_windows() {
                format!("npipe://{sock}")
            } else {
                format!("unix://{sock}")
            };
            cmd.env("DOCKER_HOST", host);
        }
        cmd
    }

    /// Base docker command carrying a scoped registry auth config
    fn docker_authed(&self, scope: &AuthScope) -> Command {
        let mut cmd = self.docker();
        cmd.env("DOCKER_CONFIG", scope.config_dir());
        cmd
    }

    fn auth_scope(&self, builtin: Option<&BuiltInRegistryLogin>) -> Result<AuthScope> {
        AuthScope::new(&self.config.registry_logins, builtin)
    }

    /// The sock mount argument for step containers, when enabled
    fn sock_mount(&self) -> Option<String> {
        if !self.config.mount_docker_sock {
            return None;
        }
        let target = self.os.default_docker_sock();
        let source = self
            .config
            .docker_sock_path
            .as_deref()
            .unwrap_or(target);
        Some(format!("{source}:{target}"))
    }

    /// Assemble the `docker run` arguments for one step container
    ///
    /// Pure argument construction, separated from execution so the CLI
    /// surface can be asserted in tests without a docker daemon.
    fn run_step_args(&self, spec: &RunStepSpec) -> Result<Vec<String>> {
        // Path traversal in a mount source would escape the workspace; refuse
        // before anything is started.
        for (source, _) in &spec.volume_mounts {
            if source.contains("..") {
                return Err(Error::Config(
                    "volume mount source path must not contain '..'".to_string(),
                ));
            }
        }

        let mut args = vec![
            "run".to_string(),
            format!("--name={}", spec.container_name),
            format!("--network={}", spec.network),
        ];
        if self.config.always_pull_image {
            args.push("--pull=always".to_string());
        }
        match (&spec.run_as, self.os.default_user()) {
            (Some(user), _) => {
                args.push("--user".to_string());
                args.push(user.clone());
            }
            (None, Some(user)) => {
                args.push("--user".to_string());
                args.push(user.to_string());
            }
            (None, None) => {}
        }
        if let Some(cpus) = &self.config.cpu_limit {
            args.push("--cpus".to_string());
            args.push(cpus.clone());
        }
        if let Some(memory) = &self.config.memory_limit {
            args.push("--memory".to_string());
            args.push(memory.clone());
        }
        args.extend(self.run_options.iter().cloned());

        let host_build_home = self.paths.host_path(&spec.host_build_home)?;
        args.push("-v".to_string());
        args.push(format!(
            "{host_build_home}:{}",
            self.os.container_build_home()
        ));

        let host_workspace = spec.host_build_home.join("workspace");
        for (source, target) in &spec.volume_mounts {
            let host_source = self.paths.host_path(&host_workspace.join(source))?;
            args.push("-v".to_string());
            args.push(format!("{host_source}:{target}"));
        }
        for (host_dir, target) in &spec.cache_mounts {
            let host_source = self.paths.host_path(host_dir)?;
            args.push("-v".to_string());
            args.push(format!("{host_source}:{target}"));
        }
        if let Some(sock) = self.sock_mount() {
            args.push("-v".to_string());
            args.push(sock);
        }

        if spec.entrypoint.is_some() {
            args.push("-w".to_string());
            args.push(self.os.container_workspace());
        } else if let Some(dir) = &spec.working_dir {
            args.push("-w".to_string());
            args.push(dir.clone());
        }

        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push("-e".to_string());
        args.push(format!("CI_WORKSPACE={}", self.os.container_workspace()));

        if spec.use_tty {
            args.push("-t".to_string());
        }
        if let Some(entrypoint) = &spec.entrypoint {
            args.push(format!("--entrypoint={entrypoint}"));
        }
        if self.os.is_windows() && self.os.process_isolation {
            args.push("--isolation=process".to_string());
        }

        args.push(self.map_image(&spec.image));
        args.extend(spec.arguments.iter().cloned());
        Ok(args)
    }

    /// Assemble the `docker run` arguments for one service container
    fn service_args(&self, network: &str, service: &ServiceSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            format!("--name={}", service_container_name(network, &service.name)),
            format!("--network={network}"),
            format!("--network-alias={}", service.name),
        ];
        if self.config.always_pull_image {
            args.push("--pull=always".to_string());
        }
        if let Some(cpus) = &self.config.cpu_limit {
            args.push("--cpus".to_string());
            args.push(cpus.clone());
        }
        if let Some(memory) = &self.config.memory_limit {
            args.push("--memory".to_string());
            args.push(memory.clone());
        }
        for (key, value) in &service.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.map_image(&service.image));
        if let Some(arguments) = &service.arguments {
            args.extend(parse_quote_tokens(arguments));
        }
        args
    }

    /// Make sure the configured buildx builder exists
    async fn ensure_builder(&self, scope: &AuthScope, logger: &dyn TaskLogger) -> Result<()> {
        let mut inspect = self.docker_authed(scope);
        inspect.args(["buildx", "inspect", &self.config.builder]);
        let (status, _, _) = CommandRunner::run_captured(&inspect).await?;
        if status.success() {
            return Ok(());
        }
        logger.log(&format!("Creating buildx builder '{}'...", self.config.builder));
        let mut create = self.docker_authed(scope);
        create.args(["buildx", "create", "--name", &self.config.builder]);
        CommandRunner::run_ok(&create, logger, None).await?;
        Ok(())
    }

    /// Self-test used by the admin UI: run a user-specified image and check
    /// the helper image is available
    pub async fn test_image(&self, image: &str, logger: &dyn TaskLogger) -> Result<()> {
        let scope = self.auth_scope(None)?;
        let workspace = tempfile::TempDir::with_prefix("test-workspace-")?;

        logger.log("Testing specified docker image...");
        let mut docker = self.docker_authed(&scope);
        docker.arg("run").arg("--rm");
        if let Some(cpus) = &self.config.cpu_limit {
            docker.args(["--cpus", cpus]);
        }
        if let Some(memory) = &self.config.memory_limit {
            docker.args(["--memory", memory]);
        }
        docker.args(&self.run_options);
        let container_workspace = self.os.container_workspace();
        docker.arg("-v").arg(format!(
            "{}:{container_workspace}",
            self.paths.host_path(workspace.path())?
        ));
        docker.args(["-w", &container_workspace]);
        docker.arg(self.map_image(image));
        if self.os.is_windows() {
            docker.args(["cmd", "/c", "echo hello from container"]);
        } else {
            docker.args(["sh", "-c", "echo hello from container"]);
        }
        CommandRunner::run_ok(&docker, logger, None).await?;

        if !self.os.is_windows() {
            logger.log("Checking helper image availability...");
            let mut docker = self.docker_authed(&scope);
            docker.args(["run", "--rm", HELPER_IMAGE, "sh", "-c", "echo hello from helper"]);
            CommandRunner::run_ok(&docker, logger, None).await?;
        }
        Ok(())
    }

    async fn inspect_format(&self, target: &str, format: &str) -> Result<Option<String>> {
        let mut inspect = self.docker();
        inspect.args(["inspect", "--format", format, target]);
        let (status, stdout, _) = CommandRunner::run_captured(&inspect).await?;
        if status.success() {
            Ok(Some(stdout))
        } else {
            Ok(None)
        }
    }

    async fn container_log_tail(&self, container: &str) -> String {
        let mut logs = self.docker();
        logs.args(["logs", "--tail", "50", container]);
        match CommandRunner::run_captured(&logs).await {
            Ok((_, stdout, stderr)) if !stderr.is_empty() => format!("{stdout}\n{stderr}"),
            Ok((_, stdout, _)) => stdout,
            Err(err) => format!("(failed to fetch container logs: {err})"),
        }
    }
}

/// Container name for a job service
pub(crate) fn service_container_name(network: &str, service: &str) -> String {
    format!("{network}-{service}")
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn os_info(&self) -> &OsInfo {
        &self.os
    }

    fn map_image(&self, image: &str) -> String {
        map_image(&self.config.image_mappings, image)
    }

    async fn create_network(&self, name: &str, logger: &dyn TaskLogger) -> Result<()> {
        let mut docker = self.docker();
        docker.args(["network", "create"]);
        if self.os.is_windows() {
            docker.args(["--driver", "nat"]);
        }
        docker.args(&self.network_options);
        docker.arg(name);
        CommandRunner::run_ok(&docker, logger, None).await?;
        debug!(network = name, "created job network");
        Ok(())
    }

    async fn delete_network(&self, name: &str, logger: &dyn TaskLogger) {
        // Containers still attached (crashed steps, services) block network
        // removal; force-remove them first.
        let mut ps = self.docker();
        ps.args(["ps", "-aq", "--filter", &format!("network={name}")]);
        match CommandRunner::run_captured(&ps).await {
            Ok((status, stdout, _)) if status.success() => {
                for container in stdout.lines().filter(|l| !l.is_empty()) {
                    let mut rm = self.docker();
                    rm.args(["rm", "-f", container]);
                    if let Err(err) = CommandRunner::run_ok(&rm, logger, None).await {
                        logger.error(&format!("Failed to remove container {container}: {err}"));
                    }
                }
            }
            Ok(_) | Err(_) => {
                warn!(network = name, "could not list containers on network");
            }
        }

        let mut rm = self.docker();
        rm.args(["network", "rm", name]);
        if let Err(err) = CommandRunner::run_ok(&rm, logger, None).await {
            logger.error(&format!("Failed to delete network {name}: {err}"));
        }
    }

    async fn start_service(
        &self,
        network: &str,
        service: &ServiceSpec,
        auth: Option<&BuiltInRegistryLogin>,
        logger: &dyn TaskLogger,
    ) -> Result<()> {
        logger.log(&format!("Starting service '{}'...", service.name));
        let scope = self.auth_scope(auth)?;
        let mut docker = self.docker_authed(&scope);
        docker.args(self.service_args(network, service));
        CommandRunner::run_ok(&docker, logger, None).await?;

        let container = service_container_name(network, &service.name);
        let deadline = std::time::Instant::now() + SERVICE_START_TIMEOUT;
        loop {
            match self
                .inspect_format(&container, "{{.State.Status}}")
                .await?
                .as_deref()
            {
                Some("running") => {
                    logger.log(&format!("Service '{}' is running", service.name));
                    return Ok(());
                }
                Some("exited") | Some("dead") | Some("removing") => {
                    return Err(Error::Service {
                        name: service.name.clone(),
                        details: self.container_log_tail(&container).await,
                    });
                }
                _ if std::time::Instant::now() >= deadline => {
                    return Err(Error::Service {
                        name: service.name.clone(),
                        details: "timed out waiting for the container to start".to_string(),
                    });
                }
                _ => Timer::after(Duration::from_secs(1)).await,
            };
        }
    }

    async fn stop_service(&self, network: &str, service_name: &str, logger: &dyn TaskLogger) {
        let container = service_container_name(network, service_name);
        let mut rm = self.docker();
        rm.args(["rm", "-f", &container]);
        if let Err(err) = CommandRunner::run_ok(&rm, logger, None).await {
            logger.error(&format!("Failed to stop service '{service_name}': {err}"));
        }
    }

    fn attach_shell(&self, container_name: &str, shell: &[String]) -> Command {
        let mut docker = self.docker();
        docker.args(["exec", "-it", container_name]);
        docker.args(shell);
        docker
    }

    async fn run_step(
        &self,
        spec: &RunStepSpec,
        auth: Option<&BuiltInRegistryLogin>,
        cancel: &CancelToken,
        logger: &dyn TaskLogger,
    ) -> Result<i32> {
        let args = self.run_step_args(spec)?;
        let scope = self.auth_scope(auth)?;
        let mut docker = self.docker_authed(&scope);
        docker.args(&args);

        // External cancellation must be able to take this container down
        // while `docker run` is blocked on it.
        let mut killer = self.docker();
        killer.args(["stop", "-t", "0", &spec.container_name]);
        cancel.bind(killer)?;

        let result = CommandRunner::run(&docker, logger, Some(cancel)).await;
        cancel.unbind();
        Ok(result?.report_code())
    }

    async fn build_image(
        &self,
        spec: &BuildImageSpec,
        workspace: &Path,
        auth: Option<&BuiltInRegistryLogin>,
        logger: &dyn TaskLogger,
    ) -> Result<()> {
        let scope = self.auth_scope(auth)?;
        self.ensure_builder(&scope, logger).await?;

        let mut docker = self.docker_authed(&scope);
        docker.current_dir(workspace);
        docker.args(["buildx", "build", "--builder", &self.config.builder]);
        if self.config.always_pull_image {
            docker.arg("--pull");
        }
        if let Some(dockerfile) = &spec.dockerfile {
            docker.args(["-f", dockerfile]);
        }
        for tag in &spec.tags {
            docker.args(["-t", tag]);
        }
        for platform in &spec.platforms {
            docker.args(["--platform", platform]);
        }
        docker.arg(if spec.push { "--push" } else { "--load" });
        if let Some(more) = &spec.more_options {
            docker.args(parse_quote_tokens(more));
        }
        docker.arg(spec.build_path.as_deref().unwrap_or("."));
        CommandRunner::run_ok(&docker, logger, None).await?;
        Ok(())
    }

    async fn run_imagetools(
        &self,
        spec: &RunImagetoolsSpec,
        auth: Option<&BuiltInRegistryLogin>,
        logger: &dyn TaskLogger,
    ) -> Result<()> {
        let scope = self.auth_scope(auth)?;
        let mut docker = self.docker_authed(&scope);
        docker.args(["buildx", "imagetools"]);
        docker.args(parse_quote_tokens(&spec.arguments));
        CommandRunner::run_ok(&docker, logger, None).await?;
        Ok(())
    }

    async fn prune_builder_cache(
        &self,
        spec: &PruneBuilderCacheSpec,
        logger: &dyn TaskLogger,
    ) -> Result<()> {
        logger.log("Pruning builder cache...");
        let mut docker = self.docker();
        docker.args(["builder", "prune", "-f", "--builder", &self.config.builder]);
        if let Some(options) = &spec.options {
            docker.args(parse_quote_tokens(options));
        }
        CommandRunner::run_ok(&docker, logger, None).await?;
        Ok(())
    }

    async fn change_owner(&self, dir: &Path, user: &str, logger: &dyn TaskLogger) -> Result<()> {
        if self.os.is_windows() {
            return Ok(());
        }
        if self.paths.in_docker() {
            let mut docker = self.docker();
            docker.args([
                "run",
                "--rm",
                "-v",
                &format!("{}:/mnt-dir", self.paths.host_path(dir)?),
                HELPER_IMAGE,
                "chown",
                "-R",
                user,
                "/mnt-dir",
            ]);
            CommandRunner::run_ok(&docker, logger, None).await?;
        } else {
            let mut chown = Command::new("chown");
            chown.arg("-R").arg(user).arg(dir);
            CommandRunner::run_ok(&chown, logger, None).await?;
        }
        Ok(())
    }

    async fn delete_dir(
        &self,
        dir: &Path,
        use_container: bool,
        logger: &dyn TaskLogger,
    ) -> Result<()> {
        if use_container && !self.os.is_windows() {
            // Files written by a container user may not be deletable by the
            // server process; empty the directory from inside a container.
            let mut docker = self.docker();
            docker.args([
                "run",
                "--rm",
                "-v",
                &format!("{}:/mnt-dir", self.paths.host_path(dir)?),
                HELPER_IMAGE,
                "sh",
                "-c",
                "rm -rf /mnt-dir/* /mnt-dir/.[!.]* /mnt-dir/..?*",
            ]);
            CommandRunner::run_ok(&docker, logger, None).await?;
        }
        std::fs::remove_dir_all(dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn cli(config: DockerConfig) -> DockerCli {
        DockerCli::new(config, OsInfo::linux(), HostPathMapper::identity("/srv")).unwrap()
    }

    fn step_spec() -> RunStepSpec {
        RunStepSpec {
            container_name: "ci-1-2-0-step-0".to_string(),
            network: "ci-1-2-0".to_string(),
            image: "alpine:3.19".to_string(),
            run_as: None,
            entrypoint: None,
            arguments: vec![],
            env: BTreeMap::new(),
            working_dir: None,
            volume_mounts: vec![],
            cache_mounts: vec![],
            host_build_home: PathBuf::from("/srv/ci-build-1-2"),
            use_tty: false,
        }
    }

    #[test]
    fn reserved_run_option_rejected_at_construction() {
        let config = DockerConfig {
            run_options: Some("--name sneaky".to_string()),
            ..DockerConfig::default()
        };
        let result = DockerCli::new(config, OsInfo::linux(), HostPathMapper::identity("/srv"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn duplicate_registry_login_rejected_at_construction() {
        let login = RegistryLogin {
            registry_url: Some("ghcr.io".to_string()),
            username: "u".to_string(),
            password: "p".to_string(),
        };
        let config = DockerConfig {
            registry_logins: vec![login.clone(), login],
            ..DockerConfig::default()
        };
        let result = DockerCli::new(config, OsInfo::linux(), HostPathMapper::identity("/srv"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn step_args_mount_build_home_and_default_user() {
        let cli = cli(DockerConfig::default());
        let args = cli.run_step_args(&step_spec()).unwrap();

        assert_eq!(args[0], "run");
        assert!(args.contains(&"--name=ci-1-2-0-step-0".to_string()));
        assert!(args.contains(&"--network=ci-1-2-0".to_string()));
        assert!(args.contains(&"--pull=always".to_string()));
        let user_pos = args.iter().position(|a| a == "--user").unwrap();
        assert_eq!(args[user_pos + 1], "0:0");
        assert!(args.contains(&"/srv/ci-build-1-2:/ci-build".to_string()));
        assert!(args.contains(&"CI_WORKSPACE=/ci-build/workspace".to_string()));
        assert_eq!(args.last().unwrap(), "alpine:3.19");
    }

    #[test]
    fn step_args_apply_image_mapping() {
        let config = DockerConfig {
            image_mappings: vec![ImageMapping::new("alpine*", "mirror/alpine:3.19")],
            ..DockerConfig::default()
        };
        let args = cli(config).run_step_args(&step_spec()).unwrap();
        assert_eq!(args.last().unwrap(), "mirror/alpine:3.19");
    }

    #[test]
    fn traversal_in_volume_mount_is_config_error() {
        let cli = cli(DockerConfig::default());
        let mut spec = step_spec();
        spec.volume_mounts = vec![("../escape".to_string(), "/data".to_string())];
        assert!(matches!(cli.run_step_args(&spec), Err(Error::Config(_))));
    }

    #[test]
    fn entrypoint_forces_workspace_workdir() {
        let cli = cli(DockerConfig::default());
        let mut spec = step_spec();
        spec.entrypoint = Some("sh".to_string());
        spec.working_dir = Some("/ignored".to_string());
        let args = cli.run_step_args(&spec).unwrap();
        let w = args.iter().position(|a| a == "-w").unwrap();
        assert_eq!(args[w + 1], "/ci-build/workspace");
        assert!(args.contains(&"--entrypoint=sh".to_string()));
    }

    #[test]
    fn sock_mount_only_when_enabled() {
        let plain = cli(DockerConfig::default());
        let args = plain.run_step_args(&step_spec()).unwrap();
        assert!(!args.iter().any(|a| a.contains("docker.sock")));

        let sock = cli(DockerConfig {
            mount_docker_sock: true,
            ..DockerConfig::default()
        });
        let args = sock.run_step_args(&step_spec()).unwrap();
        assert!(
            args.contains(&"/var/run/docker.sock:/var/run/docker.sock".to_string())
        );
    }

    #[test]
    fn run_as_overrides_default_user() {
        let cli = cli(DockerConfig::default());
        let mut spec = step_spec();
        spec.run_as = Some("1000:1000".to_string());
        let args = cli.run_step_args(&spec).unwrap();
        let user_pos = args.iter().position(|a| a == "--user").unwrap();
        assert_eq!(args[user_pos + 1], "1000:1000");
    }

    #[test]
    fn service_args_alias_and_mapped_image() {
        let config = DockerConfig {
            image_mappings: vec![ImageMapping::new("postgres*", "mirror/postgres:16")],
            cpu_limit: Some("2".to_string()),
            ..DockerConfig::default()
        };
        let cli = cli(config);
        let service = ServiceSpec {
            name: "db".to_string(),
            image: "postgres:16".to_string(),
            arguments: Some("-c shared_buffers='256 MB'".to_string()),
            env: BTreeMap::from([("POSTGRES_PASSWORD".to_string(), "x".to_string())]),
            registry_access_token: None,
        };
        let args = cli.service_args("ci-1-2-0", &service);

        assert_eq!(args[1], "-d");
        assert!(args.contains(&"--name=ci-1-2-0-db".to_string()));
        assert!(args.contains(&"--network-alias=db".to_string()));
        assert!(args.contains(&"mirror/postgres:16".to_string()));
        assert!(args.contains(&"shared_buffers=256 MB".to_string()));
        let cpu_pos = args.iter().position(|a| a == "--cpus").unwrap();
        assert_eq!(args[cpu_pos + 1], "2");
    }

    #[test]
    fn cache_mounts_are_included() {
        let cli = cli(DockerConfig::default());
        let mut spec = step_spec();
        spec.cache_mounts = vec![(PathBuf::from("/srv/cache/m2/0"), "/root/.m2".to_string())];
        let args = cli.run_step_args(&spec).unwrap();
        assert!(args.contains(&"/srv/cache/m2/0:/root/.m2".to_string()));
    }
}
