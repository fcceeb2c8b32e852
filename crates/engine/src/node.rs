//! Operator nodes and the operator contract.
//!
//! An [`OpNode`] is the tree-facing half of an operator: identity, run state,
//! tree back-reference and child links. The operator-specific half is a
//! [`DatasetOp`] trait object. Nodes are shared (`Arc<OpNode>`) between the
//! tree and whoever built them, but only the owning [`ExecutionTree`] mutates
//! the id, state and tree back-reference.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use treeflow_core::{OpState, OperatorId, PrepareFlags, TreeResult};

use crate::task::TaskContext;
use crate::tree::{ExecutionTree, TreeId};

/// Id of an operator that has not joined a tree yet.
pub const INVALID_OPERATOR_ID: OperatorId = -1;

/// Operator variant tag, used by node passes to dispatch on operator type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Source,
    Map,
    Shuffle,
    Repeat,
    Cache,
    Other,
}

/// Behavior of a single processing stage.
///
/// Hooks run on the caller's thread during [`ExecutionTree::prepare`] and may
/// use the tree's EOE/sampler stacks. `run` is the task body executed after
/// [`ExecutionTree::launch`]; inlined operators never get their own task.
pub trait DatasetOp: Send + Sync + 'static {
    /// Human-readable name for logging and tree dumps.
    fn name(&self) -> &str;

    fn kind(&self) -> OpKind;

    /// Inlined operators consume no dedicated task.
    fn inlined(&self) -> bool {
        false
    }

    /// Flags this operator makes active for its subtree during the prepare walk.
    fn prepare_flags(&self) -> PrepareFlags {
        PrepareFlags::NONE
    }

    /// Compulsory setup, called before the children are prepared.
    fn prepare_node_pre_action(&self, _node: &Arc<OpNode>, _tree: &mut ExecutionTree) -> TreeResult<()> {
        Ok(())
    }

    /// Compulsory teardown, called after the children are prepared.
    fn prepare_node_post_action(&self, _node: &Arc<OpNode>, _tree: &mut ExecutionTree) -> TreeResult<()> {
        Ok(())
    }

    /// Task body. Long-running implementations should poll
    /// [`TaskContext::is_interrupted`].
    fn run(&self, node: &Arc<OpNode>, ctx: &TaskContext) -> TreeResult<()>;

    fn num_workers(&self) -> u32 {
        1
    }

    /// Monotonic progress counter sampled by the monitor (rows, batches, ...).
    fn progress(&self) -> Option<u64> {
        None
    }

    /// Extra lines for the detailed tree dump.
    fn detail(&self) -> String {
        String::new()
    }

    fn as_any(&self) -> &dyn Any;
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A node of an execution tree.
pub struct OpNode {
    op: Box<dyn DatasetOp>,
    id: OnceLock<OperatorId>,
    tree: OnceLock<TreeId>,
    state: RwLock<OpState>,
    children: RwLock<Vec<Arc<OpNode>>>,
    parent: RwLock<Weak<OpNode>>,
}

impl OpNode {
    pub fn new(op: impl DatasetOp) -> Arc<Self> {
        Self::from_boxed(Box::new(op))
    }

    pub fn from_boxed(op: Box<dyn DatasetOp>) -> Arc<Self> {
        Arc::new(Self {
            op,
            id: OnceLock::new(),
            tree: OnceLock::new(),
            state: RwLock::new(OpState::Idle),
            children: RwLock::new(Vec::new()),
            parent: RwLock::new(Weak::new()),
        })
    }

    pub fn op(&self) -> &dyn DatasetOp {
        self.op.as_ref()
    }

    /// Downcast the operator to a concrete type.
    pub fn op_as<T: DatasetOp>(&self) -> Option<&T> {
        self.op.as_any().downcast_ref::<T>()
    }

    pub fn name(&self) -> &str {
        self.op.name()
    }

    pub fn inlined(&self) -> bool {
        self.op.inlined()
    }

    /// The operator id, or [`INVALID_OPERATOR_ID`] before association.
    pub fn id(&self) -> OperatorId {
        self.id.get().copied().unwrap_or(INVALID_OPERATOR_ID)
    }

    pub fn state(&self) -> OpState {
        *read(&self.state)
    }

    /// The tree this node belongs to, if any.
    pub fn tree_id(&self) -> Option<TreeId> {
        self.tree.get().copied()
    }

    /// Snapshot of the children, in order.
    pub fn children(&self) -> Vec<Arc<OpNode>> {
        read(&self.children).clone()
    }

    pub fn child_count(&self) -> usize {
        read(&self.children).len()
    }

    pub fn child(&self, index: usize) -> Option<Arc<OpNode>> {
        read(&self.children).get(index).cloned()
    }

    pub fn parent(&self) -> Option<Arc<OpNode>> {
        read(&self.parent).upgrade()
    }

    // ── Tree-only mutators ─────────────────────────────────────

    /// Returns false if an id was already assigned.
    pub(crate) fn set_id(&self, id: OperatorId) -> bool {
        self.id.set(id).is_ok()
    }

    /// Returns false if the node already belongs to a tree.
    pub(crate) fn set_tree(&self, tree: TreeId) -> bool {
        self.tree.set(tree).is_ok()
    }

    pub(crate) fn set_state(&self, state: OpState) {
        *write(&self.state) = state;
    }

    pub(crate) fn push_child(&self, child: Arc<OpNode>) {
        write(&self.children).push(child);
    }

    pub(crate) fn set_parent(&self, parent: Option<&Arc<OpNode>>) {
        *write(&self.parent) = parent.map(Arc::downgrade).unwrap_or_default();
    }

    /// Replace `old` in the child list with `new`, or drop it when `new` is None.
    /// Returns false if `old` is not a child of this node.
    pub(crate) fn replace_child(&self, old: &Arc<OpNode>, new: Option<Arc<OpNode>>) -> bool {
        let mut children = write(&self.children);
        let Some(pos) = children.iter().position(|c| Arc::ptr_eq(c, old)) else {
            return false;
        };
        match new {
            Some(node) => children[pos] = node,
            None => {
                children.remove(pos);
            }
        }
        true
    }

    pub(crate) fn take_children(&self) -> Vec<Arc<OpNode>> {
        std::mem::take(&mut *write(&self.children))
    }

    /// Verbose multi-line dump used by the detailed tree printer.
    pub fn detailed(&self) -> String {
        let mut out = String::new();
        out.push_str("\n-------------------------\n");
        out.push_str(&format!("Operator: ({}) <{}>\n", self.id(), self.name()));
        let children = self.children();
        out.push_str(&format!("Number of children     : {}\n", children.len()));
        for (i, child) in children.iter().enumerate() {
            out.push_str(&format!("    Child[{}] id: {}\n", i, child.id()));
        }
        let parent = self.parent().map(|p| p.id().to_string());
        out.push_str(&format!(
            "Parent id              : {}\n",
            parent.as_deref().unwrap_or("(none)")
        ));
        out.push_str(&format!("Number of workers      : {}\n", self.op.num_workers()));
        out.push_str(&format!("Inlined                : {}\n", self.inlined()));
        out.push_str(&format!("Operator state         : {}\n", self.state()));
        out.push_str(&format!("Prepare flags          : {}\n", self.op.prepare_flags()));
        let detail = self.op.detail();
        if !detail.is_empty() {
            out.push_str(&detail);
            if !detail.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

/// One-line summary used by the compact tree printer.
impl fmt::Display for OpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) <{}>: [workers: {}]", self.id(), self.name(), self.op.num_workers())?;
        if self.inlined() {
            write!(f, " [inlined]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for OpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpNode")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .field("inlined", &self.inlined())
            .field("children", &self.child_count())
            .finish()
    }
}
