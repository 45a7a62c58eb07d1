//! Source checkout through the host git
//!
//! Checkout runs on the host rather than in a container: the workspace is a
//! bind mount either way, and host git can fetch straight from the project's
//! local git directory without credentials. `HOME` points at the job's
//! user-home directory so nothing leaks into or out of the server user's
//! global git state.

use crate::context::JobContext;
use crate::step::CheckoutStep;
use crate::{Error, Result};
use command_runner::{Command, CommandRunner, TaskLogger};
use std::path::Path;

pub(crate) async fn checkout(
    step: &CheckoutStep,
    context: &JobContext,
    workspace: &Path,
    user_home: &Path,
    logger: &dyn TaskLogger,
) -> Result<bool> {
    let source = match (&step.clone_url, &context.project_git_dir) {
        (Some(url), _) => url.clone(),
        (None, Some(dir)) => dir.to_string_lossy().into_owned(),
        (None, None) => {
            return Err(Error::Config(
                "checkout step has no clone URL and the project has no git directory".to_string(),
            ));
        }
    };

    let git = |args: &[&str]| {
        let mut cmd = Command::new("git");
        cmd.current_dir(workspace);
        cmd.env("HOME", user_home);
        cmd.args(args);
        cmd
    };

    logger.log(&format!("Checking out {}...", context.commit_id));
    if !run(&git(&["init", "."]), logger).await? {
        return Ok(false);
    }

    let mut fetch = git(&["fetch"]);
    if let Some(depth) = step.depth {
        fetch.arg(format!("--depth={depth}"));
    }
    fetch.arg(&source);
    // Servers commonly refuse fetching a raw commit id, so without a ref we
    // fetch every head and rely on the commit being reachable from one.
    match &context.ref_name {
        Some(ref_name) => {
            fetch.arg(ref_name);
        }
        None => {
            fetch.arg("+refs/heads/*:refs/remotes/origin/*");
        }
    }
    if !run(&fetch, logger).await? {
        return Ok(false);
    }

    let detach = git(&[
        "-c",
        "advice.detachedHead=false",
        "checkout",
        "--force",
        &context.commit_id,
    ]);
    if !run(&detach, logger).await? {
        return Ok(false);
    }

    if step.lfs {
        if !run(&git(&["lfs", "install"]), logger).await? {
            return Ok(false);
        }
        if !run(&git(&["lfs", "pull"]), logger).await? {
            return Ok(false);
        }
    }

    if step.submodules {
        let mut update = git(&["submodule", "update", "--init", "--recursive"]);
        if let Some(depth) = step.depth {
            update.arg(format!("--depth={depth}"));
        }
        if !run(&update, logger).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Run one git command; a non-zero exit is a step failure, not an error
async fn run(command: &Command, logger: &dyn TaskLogger) -> Result<bool> {
    let status = CommandRunner::run(command, logger, None).await?;
    if !status.success() {
        logger.error(&format!(
            "git command failed with exit code {}",
            status.report_code()
        ));
    }
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepNode;
    use command_runner::BufferLogger;

    fn sh(dir: &Path, script: &str) -> String {
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(script)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "{}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    #[smol_potat::test]
    async fn checks_out_a_commit_from_a_local_repository() {
        let source = tempfile::TempDir::with_prefix("source-").unwrap();
        sh(
            source.path(),
            "git init -q . && echo hello > file.txt && git add . && \
             git -c user.email=ci@test -c user.name=ci commit -qm initial",
        );
        let commit = sh(source.path(), "git rev-parse HEAD");

        let build_home = tempfile::TempDir::with_prefix("build-").unwrap();
        let workspace = build_home.path().join("workspace");
        let user_home = build_home.path().join("user-home");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::create_dir_all(&user_home).unwrap();

        let context = JobContext {
            project_id: 1,
            build_number: 1,
            build_id: "b1".to_string(),
            job_token: "t".to_string(),
            commit_id: commit,
            ref_name: Some("HEAD".to_string()),
            retry_count: 0,
            services: vec![],
            project_git_dir: Some(source.path().to_path_buf()),
            steps: StepNode::Composite(vec![]),
        };
        let step = CheckoutStep {
            clone_url: None,
            depth: None,
            lfs: false,
            submodules: false,
        };

        let logger = BufferLogger::new();
        let ok = checkout(&step, &context, &workspace, &user_home, &logger)
            .await
            .unwrap();
        assert!(ok, "{:?}", logger.lines());
        assert_eq!(
            std::fs::read_to_string(workspace.join("file.txt")).unwrap(),
            "hello\n"
        );
    }

    #[smol_potat::test]
    async fn checks_out_a_commit_without_a_ref() {
        let source = tempfile::TempDir::with_prefix("source-").unwrap();
        sh(
            source.path(),
            "git init -q . && echo one > file.txt && git add . && \
             git -c user.email=ci@test -c user.name=ci commit -qm first && \
             echo two > file.txt && git add . && \
             git -c user.email=ci@test -c user.name=ci commit -qm second",
        );
        // An ancestor commit, only reachable through the branch head.
        let commit = sh(source.path(), "git rev-parse HEAD~1");

        let build_home = tempfile::TempDir::with_prefix("build-").unwrap();
        let workspace = build_home.path().join("workspace");
        let user_home = build_home.path().join("user-home");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::create_dir_all(&user_home).unwrap();

        let context = JobContext {
            project_id: 1,
            build_number: 2,
            build_id: "b2".to_string(),
            job_token: "t".to_string(),
            commit_id: commit,
            ref_name: None,
            retry_count: 0,
            services: vec![],
            project_git_dir: Some(source.path().to_path_buf()),
            steps: StepNode::Composite(vec![]),
        };
        let step = CheckoutStep {
            clone_url: None,
            depth: None,
            lfs: false,
            submodules: false,
        };

        let logger = BufferLogger::new();
        let ok = checkout(&step, &context, &workspace, &user_home, &logger)
            .await
            .unwrap();
        assert!(ok, "{:?}", logger.lines());
        assert_eq!(
            std::fs::read_to_string(workspace.join("file.txt")).unwrap(),
            "one\n"
        );
    }

    #[smol_potat::test]
    async fn missing_source_is_a_config_error() {
        let build_home = tempfile::TempDir::with_prefix("build-").unwrap();
        let context = JobContext {
            project_id: 1,
            build_number: 1,
            build_id: "b1".to_string(),
            job_token: "t".to_string(),
            commit_id: "deadbeef".to_string(),
            ref_name: None,
            retry_count: 0,
            services: vec![],
            project_git_dir: None,
            steps: StepNode::Composite(vec![]),
        };
        let step = CheckoutStep {
            clone_url: None,
            depth: None,
            lfs: false,
            submodules: false,
        };

        let logger = BufferLogger::new();
        let result = checkout(&step, &context, build_home.path(), build_home.path(), &logger).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
