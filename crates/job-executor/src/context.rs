//! Per-execution state
//!
//! [`JobContext`] is the immutable job descriptor. [`ExecutionControl`] is
//! the small mutable surface shared between the execution task and external
//! control paths (shell attach, resume, cancel); it is created per execution
//! and handed to whoever needs to steer the job, so the executor itself
//! carries no cross-job mutable state.

use crate::step::StepNode;
use command_runner::CancelToken;
use docker_runtime::ServiceSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Immutable descriptor of one build execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    /// Owning project id
    pub project_id: u64,
    /// Build number within the project
    pub build_number: u64,
    /// Globally unique build id
    pub build_id: String,
    /// Token identifying this job to the server (registry login user)
    pub job_token: String,
    /// Commit being built
    pub commit_id: String,
    /// Ref that triggered the build, if any
    pub ref_name: Option<String>,
    /// Zero-based retry counter, part of the network name
    pub retry_count: u32,
    /// Services to start before the step walk
    pub services: Vec<ServiceSpec>,
    /// The project's local git directory, checkout source when no clone URL
    /// is configured
    pub project_git_dir: Option<PathBuf>,
    /// The resolved pipeline
    pub steps: StepNode,
}

/// The step container currently running, for shell attach
#[derive(Debug, Clone)]
pub struct RunningStep {
    /// The container to attach to
    pub container_name: String,
    /// The step's shell interpreter
    pub shell: Vec<String>,
}

#[derive(Debug, Default)]
struct ControlState {
    build_home: Mutex<Option<PathBuf>>,
    running_step: Mutex<Option<RunningStep>>,
    cancel: CancelToken,
    teardown_needs_container: AtomicBool,
}

/// Handle steering one job execution from the outside
///
/// Cheap to clone; all clones observe the same execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionControl {
    state: Arc<ControlState>,
}

impl ExecutionControl {
    /// Fresh control handle for one execution attempt
    pub fn new() -> Self {
        Self::default()
    }

    /// The cancel token the running step container is bound to
    pub fn cancel_token(&self) -> &CancelToken {
        &self.state.cancel
    }

    /// Record the build home once created
    pub(crate) fn set_build_home(&self, dir: PathBuf) {
        *self.state.build_home.lock().unwrap() = Some(dir);
    }

    /// Take the build home for teardown; later control calls see it as gone
    pub(crate) fn take_build_home(&self) -> Option<PathBuf> {
        self.state.build_home.lock().unwrap().take()
    }

    /// Lock the build home for a directory mutation (resume sentinel,
    /// teardown), serializing control paths against each other
    pub(crate) fn lock_build_home(&self) -> MutexGuard<'_, Option<PathBuf>> {
        self.state.build_home.lock().unwrap()
    }

    /// The step container currently running, if any
    pub fn running_step(&self) -> Option<RunningStep> {
        self.state.running_step.lock().unwrap().clone()
    }

    pub(crate) fn set_running_step(&self, step: RunningStep) {
        *self.state.running_step.lock().unwrap() = Some(step);
    }

    pub(crate) fn clear_running_step(&self) {
        *self.state.running_step.lock().unwrap() = None;
    }

    /// Flag that the build home holds files owned by a container user, so
    /// teardown must delete it from inside a helper container
    pub(crate) fn require_container_teardown(&self) {
        self.state
            .teardown_needs_container
            .store(true, Ordering::Relaxed);
    }

    pub(crate) fn teardown_needs_container(&self) -> bool {
        self.state.teardown_needs_container.load(Ordering::Relaxed)
    }
}

/// Tracks which custom user currently owns the build home
///
/// Threaded explicitly through the step walk. Before a step running as a
/// custom user the build home is chowned to that user so its first write
/// succeeds; before the next default-user step ownership is chowned back.
/// `None` means the default user owns it and no chown is pending.
#[derive(Debug, Clone, Default)]
pub struct OwnerState {
    pub(crate) custom_user: Option<String>,
}
