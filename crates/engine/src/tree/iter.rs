use std::sync::Arc;

use crate::node::OpNode;

use super::ExecutionTree;

/// Postorder walk over a snapshot of the tree: children left to right, then
/// the node itself. Later edits to the tree are not reflected.
pub struct PostOrderIter {
    nodes: std::vec::IntoIter<Arc<OpNode>>,
}

impl PostOrderIter {
    pub fn new(root: Option<&Arc<OpNode>>) -> Self {
        let mut nodes = Vec::new();
        if let Some(root) = root {
            post_order_traverse(root, &mut nodes);
        }
        Self {
            nodes: nodes.into_iter(),
        }
    }
}

fn post_order_traverse(node: &Arc<OpNode>, out: &mut Vec<Arc<OpNode>>) {
    for child in node.children() {
        post_order_traverse(&child, out);
    }
    out.push(Arc::clone(node));
}

impl Iterator for PostOrderIter {
    type Item = Arc<OpNode>;

    fn next(&mut self) -> Option<Self::Item> {
        self.nodes.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.nodes.size_hint()
    }
}

impl ExactSizeIterator for PostOrderIter {}

impl ExecutionTree {
    /// Postorder iterator over the whole tree (empty without a root).
    pub fn iter(&self) -> PostOrderIter {
        PostOrderIter::new(self.root.as_ref())
    }

    /// Postorder iterator over the subtree rooted at `node`.
    pub fn iter_from(&self, node: &Arc<OpNode>) -> PostOrderIter {
        PostOrderIter::new(Some(node))
    }
}
