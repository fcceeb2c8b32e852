//! Tree rewrite passes.
//!
//! A [`Pass`] transforms the whole tree and reports through `modified`
//! whether it changed anything. A [`NodePass`] is a visitor driven over every
//! node by [`walk_node_pass`]; most passes are written as one.

mod printer;
mod removal;

use std::sync::Arc;

use treeflow_core::TreeResult;

use crate::node::OpNode;
use crate::tree::ExecutionTree;

pub use printer::PrinterPass;
pub use removal::RemovalPass;

/// A transform applied to the whole tree.
///
/// Implementations may insert, remove or relink nodes but must leave the tree
/// structurally valid.
pub trait Pass: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, tree: &mut ExecutionTree, modified: &mut bool) -> TreeResult<()>;
}

/// Order in which a [`NodePass`] visits nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// `run_on_node` on the way down.
    PreOrder,
    /// `pre_run_on_node` on the way down, `run_on_node` on the way up.
    PostOrder,
}

/// A per-node visitor.
pub trait NodePass {
    fn traversal(&self) -> Traversal {
        Traversal::PreOrder
    }

    /// Only called for [`Traversal::PostOrder`] passes, before the children.
    fn pre_run_on_node(&mut self, _node: &Arc<OpNode>, _modified: &mut bool) -> TreeResult<()> {
        Ok(())
    }

    fn run_on_node(&mut self, node: &Arc<OpNode>, modified: &mut bool) -> TreeResult<()>;
}

/// Drive `pass` over every node reachable from the tree root.
pub fn walk_node_pass(
    pass: &mut dyn NodePass,
    tree: &ExecutionTree,
    modified: &mut bool,
) -> TreeResult<()> {
    match tree.root() {
        Some(root) => walk(pass, root, modified),
        None => Ok(()),
    }
}

fn walk(pass: &mut dyn NodePass, node: &Arc<OpNode>, modified: &mut bool) -> TreeResult<()> {
    match pass.traversal() {
        Traversal::PreOrder => {
            pass.run_on_node(node, modified)?;
            for child in node.children() {
                walk(pass, &child, modified)?;
            }
        }
        Traversal::PostOrder => {
            pass.pre_run_on_node(node, modified)?;
            for child in node.children() {
                walk(pass, &child, modified)?;
            }
            pass.run_on_node(node, modified)?;
        }
    }
    Ok(())
}
