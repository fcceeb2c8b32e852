//! The execution tree: node identity, lifecycle, prepare pipeline and launch.
//!
//! Split into focused submodules:
//! - `flags`: scoped prepare-flag accumulator
//! - `iter`: postorder traversal
//! - `print`: compact and detailed tree dumps
//! - `structure`: parent/child edits used by builders and passes
//! - `prepare`: the pre-action / optimize / post-action / legacy-walk driver
//! - `launch`: operator and worker task launch

mod flags;
mod iter;
mod launch;
mod prepare;
mod print;
mod structure;
#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use treeflow_core::{EngineConfig, OperatorId, PrepareFlags, TreeError, TreeResult, TreeState};

use crate::node::{OpNode, INVALID_OPERATOR_ID};
use crate::pass::{Pass, RemovalPass};
use crate::perf::ProfilingManager;
use crate::sampler::Sampler;
use crate::task::{TaskGroup, ThreadTaskGroup};

pub use self::flags::ScopedFlags;
pub use self::iter::PostOrderIter;
pub use self::launch::{op_task_label, MONITOR_TASK_LABEL};

/// Identity of an execution tree, stored in each node as its back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(Uuid);

impl TreeId {
    fn new() -> Self {
        TreeId(Uuid::new_v4())
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A tree of dataset operators and the machinery to prepare and launch it.
///
/// Build and prepare happen on the caller's thread through `&mut self`;
/// after [`launch`](Self::launch) each non-inlined operator runs in its own
/// task. Dropping the tree stops its task group.
pub struct ExecutionTree {
    id: TreeId,
    root: Option<Arc<OpNode>>,
    /// Next operator id to hand out.
    node_count: OperatorId,
    state: TreeState,
    prepare_flags: ScopedFlags,
    eoe_stack: Vec<Arc<OpNode>>,
    sampler_stack: Vec<Arc<Sampler>>,
    pre_passes: Vec<Box<dyn Pass>>,
    optimization_passes: Vec<Box<dyn Pass>>,
    task_group: Arc<dyn TaskGroup>,
    profiling: Arc<ProfilingManager>,
    config: EngineConfig,
}

impl ExecutionTree {
    /// Tree with default config and a thread-backed task group.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let group: Arc<dyn TaskGroup> = Arc::new(ThreadTaskGroup::new("execution-tree"));
        Self::with_task_group(config, group)
    }

    /// Tree that launches its tasks into `task_group`.
    pub fn with_task_group(config: EngineConfig, task_group: Arc<dyn TaskGroup>) -> Self {
        let profiling = Arc::new(ProfilingManager::new(config.profiling.clone()));
        Self {
            id: TreeId::new(),
            root: None,
            node_count: 0,
            state: TreeState::Init,
            prepare_flags: ScopedFlags::default(),
            eoe_stack: Vec::new(),
            sampler_stack: Vec::new(),
            pre_passes: vec![Box::new(RemovalPass)],
            optimization_passes: Vec::new(),
            task_group,
            profiling,
            config,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn state(&self) -> TreeState {
        self.state
    }

    pub fn root(&self) -> Option<&Arc<OpNode>> {
        self.root.as_ref()
    }

    /// Number of ids handed out so far (the next id to assign).
    pub fn node_count(&self) -> OperatorId {
        self.node_count
    }

    /// Flags active on the current prepare path.
    pub fn prepare_flags(&self) -> PrepareFlags {
        self.prepare_flags.current()
    }

    /// How many nodes on the current prepare path declared `flag`.
    pub fn prepare_flag_depth(&self, flag: PrepareFlags) -> u32 {
        self.prepare_flags.depth(flag)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn task_group(&self) -> &Arc<dyn TaskGroup> {
        &self.task_group
    }

    pub fn profiling(&self) -> &Arc<ProfilingManager> {
        &self.profiling
    }

    /// True if `node` was associated with this tree.
    pub fn owns(&self, node: &OpNode) -> bool {
        node.tree_id() == Some(self.id)
    }

    // ── Pass registration ────────────────────────────────────────

    /// Replace the compulsory pre-action passes (default: [`RemovalPass`]).
    pub fn set_pre_passes(&mut self, passes: Vec<Box<dyn Pass>>) {
        self.pre_passes = passes;
    }

    /// Register an optional optimization pass. Passes run in registration order.
    pub fn add_optimization_pass(&mut self, pass: Box<dyn Pass>) {
        self.optimization_passes.push(pass);
    }

    // ── Association ──────────────────────────────────────────────

    /// Associate `op` with this tree, assigning it the next operator id.
    ///
    /// A node already owned by this tree is left untouched.
    pub fn associate_node(&mut self, op: &Arc<OpNode>) -> TreeResult<()> {
        if self.owns(op) {
            return Ok(());
        }
        self.expect_state("adding a node", &[TreeState::Init, TreeState::Building])?;
        if let Some(other) = op.tree_id() {
            return Err(TreeError::Association(format!(
                "operator {} ({}) already belongs to tree {}",
                op.id(),
                op.name(),
                other
            )));
        }

        self.state = TreeState::Building;

        let id = self.node_count;
        if !op.set_id(id) || !op.set_tree(self.id) {
            return Err(TreeError::Association(format!(
                "operator {} was assigned an id outside of a tree",
                op.name()
            )));
        }
        self.node_count += 1;

        debug!(op_id = id, op = %op.name(), "associated operator");
        Ok(())
    }

    /// Make `op` the root, associating it first if needed. A node owned by
    /// another tree is rejected.
    ///
    /// Does not check whether `op` already has a parent.
    pub fn assign_root(&mut self, op: &Arc<OpNode>) -> TreeResult<()> {
        self.expect_state("assigning a root node", &[TreeState::Building])?;

        if op.id() == INVALID_OPERATOR_ID {
            self.associate_node(op)?;
        }
        self.require_owned(op)?;

        self.root = Some(Arc::clone(op));
        Ok(())
    }

    // ── EOE / sampler stacks ─────────────────────────────────────

    pub fn add_to_eoe_op_stack(&mut self, op: Arc<OpNode>) {
        self.eoe_stack.push(op);
    }

    /// Empty stack gives `None`.
    pub fn pop_from_eoe_op_stack(&mut self) -> Option<Arc<OpNode>> {
        self.eoe_stack.pop()
    }

    pub fn add_to_sampler_stack(&mut self, sampler: Arc<Sampler>) {
        self.sampler_stack.push(sampler);
    }

    /// Empty stack gives `None`.
    pub fn pop_from_sampler_stack(&mut self) -> Option<Arc<Sampler>> {
        self.sampler_stack.pop()
    }

    // ── State machine ────────────────────────────────────────────

    pub(crate) fn expect_state(&self, operation: &'static str, expected: &[TreeState]) -> TreeResult<()> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(TreeError::InvalidState {
                operation,
                current: self.state,
                expected: expected.to_vec(),
            })
        }
    }

    pub(crate) fn set_state(&mut self, state: TreeState) {
        debug!(tree = %self.id, from = %self.state, to = %state, "tree state change");
        self.state = state;
    }

    pub(crate) fn require_owned(&self, node: &OpNode) -> TreeResult<()> {
        if self.owns(node) {
            Ok(())
        } else {
            Err(TreeError::Association(format!(
                "operator {} ({}) is not part of this tree",
                node.id(),
                node.name()
            )))
        }
    }
}

impl Default for ExecutionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExecutionTree {
    fn drop(&mut self) {
        if let Err(e) = self.task_group.service_stop() {
            debug!(tree = %self.id, error = %e, "task group stopped with error");
        }
    }
}
