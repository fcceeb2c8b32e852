use std::sync::Arc;

use tracing::info;

use treeflow_core::TreeResult;

use crate::node::{OpKind, OpNode};
use crate::tree::ExecutionTree;

use super::{walk_node_pass, NodePass, Pass, Traversal};

/// Removes operators made redundant by their surroundings: a shuffle below a
/// cache is dropped since the cache already serves rows in sampler order.
pub struct RemovalPass;

/// Finds the nodes to remove.
#[derive(Default)]
struct RemovalNodes {
    is_caching: bool,
    removals: Vec<Arc<OpNode>>,
}

impl NodePass for RemovalNodes {
    fn traversal(&self) -> Traversal {
        Traversal::PostOrder
    }

    fn pre_run_on_node(&mut self, node: &Arc<OpNode>, _modified: &mut bool) -> TreeResult<()> {
        if node.op().kind() == OpKind::Cache {
            self.is_caching = true;
        }
        Ok(())
    }

    fn run_on_node(&mut self, node: &Arc<OpNode>, _modified: &mut bool) -> TreeResult<()> {
        match node.op().kind() {
            OpKind::Cache => self.is_caching = false,
            OpKind::Shuffle if self.is_caching => self.removals.push(Arc::clone(node)),
            _ => {}
        }
        Ok(())
    }
}

impl Pass for RemovalPass {
    fn name(&self) -> &str {
        "RemovalPass"
    }

    fn run(&self, tree: &mut ExecutionTree, modified: &mut bool) -> TreeResult<()> {
        let mut visitor = RemovalNodes::default();
        walk_node_pass(&mut visitor, tree, modified)?;

        for node in visitor.removals {
            info!(op_id = node.id(), op = %node.name(), "removing redundant operator");
            tree.remove_node(&node)?;
            *modified = true;
        }
        Ok(())
    }
}
