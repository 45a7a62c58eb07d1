//! # Docker container runtime adapter
//!
//! This crate turns the abstract container operations the job execution core
//! needs (create a per-build network, start service containers, run one step
//! container to completion, build images, clean up) into Docker CLI
//! invocations issued through `command-runner`.
//!
//! The [`ContainerRuntime`] trait is the seam: [`DockerCli`] is the
//! production implementation, and tests drive the engine against recording
//! stubs instead of a docker daemon.

#![warn(missing_docs)]

mod cache;
mod cli;
mod hostpath;
mod image;
mod options;
mod os;
mod registry;
mod runtime;

pub use cache::CacheHelper;
pub use cli::{DockerCli, DockerConfig};
pub use hostpath::HostPathMapper;
pub use image::{ImageMapping, map_image};
pub use options::{
    RESERVED_NETWORK_OPTIONS, RESERVED_RUN_OPTIONS, parse_quote_tokens, validate_options,
};
pub use registry::{AuthScope, BuiltInRegistryLogin, RegistryLogin, validate_registry_logins};
pub use runtime::{
    BuildImageSpec, ContainerRuntime, PruneBuilderCacheSpec, RunImagetoolsSpec, RunStepSpec,
    ServiceSpec,
};
pub use os::{OsInfo, OsKind};

/// Error type for container runtime operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// User-facing configuration error, non-retryable
    #[error("{0}")]
    Config(String),

    /// A service container failed to come up
    #[error("service '{name}' is unable to start: {details}")]
    Service {
        /// The service name
        name: String,
        /// Whatever diagnostics the container left behind
        details: String,
    },

    /// Command execution error
    #[error(transparent)]
    Runner(#[from] command_runner::Error),

    /// JSON error (registry auth config)
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
