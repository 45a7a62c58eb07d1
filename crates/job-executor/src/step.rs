//! The step tree
//!
//! A pipeline is a tree of composites whose leaves are [`Step`] values. A
//! step's position (its index path from the root) names it everywhere:
//! container names, log labels, script file names and skip decisions.

use docker_runtime::{BuildImageSpec, PruneBuilderCacheSpec, RunImagetoolsSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A containerized shell/batch command step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStep {
    /// Image to run the commands in; required, validated at execution
    pub image: Option<String>,
    /// Optional `--user` override
    pub run_as: Option<String>,
    /// Interpreter invocation; the OS default shell when unset
    pub interpreter: Option<Vec<String>>,
    /// Script body written to the build home and executed in the container
    pub commands: String,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Access token for the built-in registry, if the image lives there
    pub registry_access_token: Option<String>,
    /// Whether to allocate a TTY
    pub use_tty: bool,
}

/// Run an arbitrary container to completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContainerStep {
    /// Image to run
    pub image: String,
    /// Container arguments, quote-tokenized
    pub arguments: Option<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Working directory inside the container
    pub working_dir: Option<String>,
    /// Volume mounts: workspace-relative source -> container target
    pub volume_mounts: Vec<(String, String)>,
    /// Optional `--user` override
    pub run_as: Option<String>,
    /// Access token for the built-in registry
    pub registry_access_token: Option<String>,
    /// Whether to allocate a TTY
    pub use_tty: bool,
}

/// Image build step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildImageStep {
    /// The buildx build request
    pub spec: BuildImageSpec,
    /// Access token for the built-in registry
    pub registry_access_token: Option<String>,
}

/// Manifest-list assembly via `docker buildx imagetools`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunImagetoolsStep {
    /// The imagetools invocation
    pub spec: RunImagetoolsSpec,
    /// Access token for the built-in registry
    pub registry_access_token: Option<String>,
}

/// Check the project's source out into the workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutStep {
    /// Clone URL; the project's local git directory when unset
    pub clone_url: Option<String>,
    /// Shallow clone depth
    pub depth: Option<u32>,
    /// Fetch LFS objects after checkout
    pub lfs: bool,
    /// Initialize submodules recursively
    pub submodules: bool,
}

/// Register cache mounts for subsequent step containers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupCacheStep {
    /// Cache key, names a directory under the shared cache root
    pub key: String,
    /// Container paths to cache; relative paths resolve against the workspace
    pub paths: Vec<String>,
}

/// A step executed on the server rather than in a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSideStep {
    /// Placeholder names resolved by the server-side handler
    pub placeholders: Vec<String>,
}

/// One unit of work in the pipeline
///
/// A closed set: the engine dispatches exhaustively, so an unhandled step
/// kind is a compile error, not a runtime surprise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Step {
    /// Run shell/batch commands in a container
    Command(CommandStep),
    /// Build an image via buildx
    BuildImage(BuildImageStep),
    /// Run `docker buildx imagetools`
    RunImagetools(RunImagetoolsStep),
    /// Prune the buildx builder cache
    PruneBuilderCache(PruneBuilderCacheSpec),
    /// Run an arbitrary container
    RunContainer(RunContainerStep),
    /// Check out the project source
    Checkout(CheckoutStep),
    /// Register cache mounts
    SetupCache(SetupCacheStep),
    /// Run a server-side handler
    ServerSide(ServerSideStep),
}

impl Step {
    /// Human-readable step kind for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Command(_) => "command",
            Step::BuildImage(_) => "build image",
            Step::RunImagetools(_) => "run imagetools",
            Step::PruneBuilderCache(_) => "prune builder cache",
            Step::RunContainer(_) => "run container",
            Step::Checkout(_) => "checkout",
            Step::SetupCache(_) => "setup cache",
            Step::ServerSide(_) => "server side",
        }
    }
}

/// A node in the pipeline tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepNode {
    /// A leaf step
    Leaf(Step),
    /// An ordered group of child nodes, executed sequentially
    Composite(Vec<StepNode>),
}

/// Index path from the root uniquely identifying a node
pub type Position = Vec<usize>;

/// Render a position for container names and log labels (`0-2-1`)
pub fn position_label(position: &[usize]) -> String {
    position
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join("-")
}

impl StepNode {
    /// Flatten the tree into its leaves in execution order
    ///
    /// The walk itself is sequential, so executing the flattened list is
    /// equivalent to recursing over the tree.
    pub fn flatten(&self) -> Vec<(Position, &Step)> {
        let mut leaves = Vec::new();
        collect(self, &mut Vec::new(), &mut leaves);
        leaves
    }
}

fn collect<'a>(
    node: &'a StepNode,
    position: &mut Position,
    leaves: &mut Vec<(Position, &'a Step)>,
) {
    match node {
        StepNode::Leaf(step) => leaves.push((position.clone(), step)),
        StepNode::Composite(children) => {
            for (index, child) in children.iter().enumerate() {
                position.push(index);
                collect(child, position, leaves);
                position.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str) -> StepNode {
        StepNode::Leaf(Step::Command(CommandStep {
            image: Some("alpine".to_string()),
            run_as: None,
            interpreter: None,
            commands: format!("echo {name}"),
            env: BTreeMap::new(),
            registry_access_token: None,
            use_tty: false,
        }))
    }

    #[test]
    fn flatten_preserves_order_and_positions() {
        let tree = StepNode::Composite(vec![
            command("a"),
            StepNode::Composite(vec![command("b"), command("c")]),
            command("d"),
        ]);

        let leaves = tree.flatten();
        let positions: Vec<_> = leaves.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(
            positions,
            vec![vec![0], vec![1, 0], vec![1, 1], vec![2]]
        );
    }

    #[test]
    fn position_labels_join_with_dashes() {
        assert_eq!(position_label(&[1, 0, 2]), "1-0-2");
        assert_eq!(position_label(&[0]), "0");
        assert_eq!(position_label(&[]), "");
    }

    #[test]
    fn empty_composite_has_no_leaves() {
        let tree = StepNode::Composite(vec![]);
        assert!(tree.flatten().is_empty());
    }
}
