use std::sync::Arc;

use tracing::debug;

use treeflow_core::TreeResult;

use crate::node::OpNode;
use crate::tree::ExecutionTree;

use super::{walk_node_pass, NodePass, Pass};

/// Logs every operator in pre-order. Never modifies the tree.
pub struct PrinterPass;

struct PrintNodes;

impl NodePass for PrintNodes {
    fn run_on_node(&mut self, node: &Arc<OpNode>, _modified: &mut bool) -> TreeResult<()> {
        debug!(
            op_id = node.id(),
            op = %node.name(),
            children = node.child_count(),
            inlined = node.inlined(),
            "visiting operator"
        );
        Ok(())
    }
}

impl Pass for PrinterPass {
    fn name(&self) -> &str {
        "PrinterPass"
    }

    fn run(&self, tree: &mut ExecutionTree, modified: &mut bool) -> TreeResult<()> {
        walk_node_pass(&mut PrintNodes, tree, modified)
    }
}
