use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use treeflow_core::{OperatorId, PrepareFlags, TreeResult};

use crate::node::{DatasetOp, OpKind, OpNode};
use crate::task::TaskContext;
use crate::tree::ExecutionTree;

use super::{hook_failure, PRE_ACTION};

/// Repeat count meaning "repeat forever".
pub const REPEAT_FOREVER: i32 = -1;

/// Replays its subtree `count` times. Inlined: epochs are counted from the
/// task of the operator above it.
pub struct RepeatOp {
    count: i32,
    /// Operators that need an end-of-epoch reset, collected while preparing.
    eoe_ops: Mutex<Vec<Arc<OpNode>>>,
}

impl RepeatOp {
    pub fn new(count: i32) -> Self {
        Self {
            count,
            eoe_ops: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    fn eoe_list(&self) -> MutexGuard<'_, Vec<Arc<OpNode>>> {
        self.eoe_ops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids of the operators this repeat resets at each end of epoch.
    pub fn eoe_op_ids(&self) -> Vec<OperatorId> {
        self.eoe_list().iter().map(|op| op.id()).collect()
    }
}

impl DatasetOp for RepeatOp {
    fn name(&self) -> &str {
        "RepeatOp"
    }

    fn kind(&self) -> OpKind {
        OpKind::Repeat
    }

    fn inlined(&self) -> bool {
        true
    }

    fn prepare_flags(&self) -> PrepareFlags {
        PrepareFlags::REPEAT
    }

    fn prepare_node_pre_action(&self, node: &Arc<OpNode>, _tree: &mut ExecutionTree) -> TreeResult<()> {
        if self.count == 0 || self.count < REPEAT_FOREVER {
            return Err(hook_failure(
                node,
                PRE_ACTION,
                format!("repeat count must be positive or {}, got {}", REPEAT_FOREVER, self.count),
            ));
        }
        Ok(())
    }

    fn prepare_node_post_action(&self, node: &Arc<OpNode>, tree: &mut ExecutionTree) -> TreeResult<()> {
        {
            let mut eoe = self.eoe_list();
            while let Some(op) = tree.pop_from_eoe_op_stack() {
                eoe.push(op);
            }
            debug!(op_id = node.id(), eoe_ops = eoe.len(), "collected end-of-epoch operators");
        }

        // Nested under another repeat: the outer one must reset us too.
        if tree.prepare_flag_depth(PrepareFlags::REPEAT) > 1 {
            tree.add_to_eoe_op_stack(Arc::clone(node));
        }
        Ok(())
    }

    fn run(&self, _node: &Arc<OpNode>, _ctx: &TaskContext) -> TreeResult<()> {
        Ok(())
    }

    fn detail(&self) -> String {
        let count = if self.count == REPEAT_FOREVER {
            "forever".to_string()
        } else {
            self.count.to_string()
        };
        format!("Repeat count           : {}\nEOE operators          : {:?}\n", count, self.eoe_op_ids())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
