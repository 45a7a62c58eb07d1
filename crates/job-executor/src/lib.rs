//! # Job execution core
//!
//! Takes a resolved build pipeline (a tree of steps) and executes it against
//! a containerized backend: admission control per executor, an isolated
//! network per job, service containers, sequential step execution with
//! fail-fast semantics, and guaranteed teardown.
//!
//! The pieces, leaves first:
//!
//! - [`ResourceAllocator`] gates how many jobs run concurrently per executor.
//! - [`StepEngine`] walks the step tree and dispatches each leaf.
//! - [`DockerJobExecutor`] owns the job lifecycle: directories, network,
//!   services, the step walk, and teardown in reverse order of setup.
//!
//! External collaborators (dependency staging, status reporting, server-side
//! steps) come in through the [`JobManager`] trait; containers are reached
//! through `docker-runtime`'s `ContainerRuntime` seam.

#![warn(missing_docs)]

mod allocator;
mod checkout;
mod context;
mod engine;
mod executor;
mod manager;
mod step;

pub use allocator::ResourceAllocator;
pub use context::{ExecutionControl, JobContext, RunningStep};
pub use engine::StepEngine;
pub use executor::{DockerJobExecutor, ExecutorConfig};
pub use manager::{JobManager, ServerStepResult};
pub use step::{
    BuildImageStep, CheckoutStep, CommandStep, Position, RunContainerStep, RunImagetoolsStep,
    ServerSideStep, SetupCacheStep, Step, StepNode, position_label,
};

/// Error type for job execution
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// User-facing configuration error, non-retryable
    #[error("{0}")]
    Config(String),

    /// Container runtime failure
    #[error(transparent)]
    Runtime(#[from] docker_runtime::Error),

    /// Command execution failure
    #[error(transparent)]
    Runner(#[from] command_runner::Error),

    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
