use std::sync::Arc;

use tracing::debug;

use treeflow_core::{TreeError, TreeResult, TreeState};

use crate::node::OpNode;

use super::ExecutionTree;

/// States in which parent/child links may be edited.
const EDITABLE: &[TreeState] = &[TreeState::Building, TreeState::Prepare];

impl ExecutionTree {
    /// Append `child` to `parent`'s children. Both must belong to this tree
    /// and `child` must not have a parent yet. Links that would close a cycle,
    /// including making the root a child, are rejected.
    pub fn add_child(&mut self, parent: &Arc<OpNode>, child: &Arc<OpNode>) -> TreeResult<()> {
        self.expect_state("adding a child", EDITABLE)?;
        self.require_owned(parent)?;
        self.require_owned(child)?;

        if Arc::ptr_eq(parent, child) {
            return Err(TreeError::Association(format!(
                "operator {} cannot be its own child",
                parent.id()
            )));
        }
        if let Some(existing) = child.parent() {
            return Err(TreeError::Association(format!(
                "operator {} already has parent {}",
                child.id(),
                existing.id()
            )));
        }
        if self.root.as_ref().is_some_and(|root| Arc::ptr_eq(root, child)) {
            return Err(TreeError::Association(format!(
                "root operator {} cannot become a child",
                child.id()
            )));
        }
        if is_ancestor(child, parent) {
            return Err(TreeError::Association(format!(
                "linking {} under {} would create a cycle",
                child.id(),
                parent.id()
            )));
        }

        parent.push_child(Arc::clone(child));
        child.set_parent(Some(parent));
        debug!(parent = parent.id(), child = child.id(), "linked operators");
        Ok(())
    }

    /// Remove `node` from the tree structure, splicing its single child (if
    /// any) into its place. Removing the root promotes its child to root.
    ///
    /// The node keeps its id; ids are not compacted after removal.
    pub fn remove_node(&mut self, node: &Arc<OpNode>) -> TreeResult<()> {
        self.expect_state("removing a node", EDITABLE)?;
        self.require_owned(node)?;

        if node.child_count() > 1 {
            return Err(TreeError::Association(format!(
                "cannot remove operator {} ({}) with {} children",
                node.id(),
                node.name(),
                node.child_count()
            )));
        }

        let child = node.take_children().pop();
        let parent = node.parent();

        match &parent {
            Some(parent) => {
                if !parent.replace_child(node, child.clone()) {
                    return Err(TreeError::Association(format!(
                        "operator {} is not listed as a child of its parent {}",
                        node.id(),
                        parent.id()
                    )));
                }
            }
            None => {
                let is_root = self.root.as_ref().is_some_and(|r| Arc::ptr_eq(r, node));
                if is_root {
                    self.root = child.clone();
                }
            }
        }

        if let Some(child) = &child {
            child.set_parent(parent.as_ref());
        }
        node.set_parent(None);

        debug!(op_id = node.id(), op = %node.name(), "removed operator");
        Ok(())
    }

    /// Insert `new_parent` between `node` and its current parent. The new
    /// parent is associated with this tree if needed and must be detached.
    pub fn insert_as_parent(&mut self, node: &Arc<OpNode>, new_parent: &Arc<OpNode>) -> TreeResult<()> {
        self.expect_state("inserting a parent", EDITABLE)?;
        self.require_owned(node)?;
        if Arc::ptr_eq(node, new_parent) {
            return Err(TreeError::Association(format!(
                "operator {} cannot be inserted as its own parent",
                node.id()
            )));
        }
        if new_parent.tree_id().is_none() {
            // Building-only; editing during Prepare requires pre-associated nodes.
            self.associate_node(new_parent)?;
        }
        self.require_owned(new_parent)?;

        if new_parent.child_count() > 0 || new_parent.parent().is_some() {
            return Err(TreeError::Association(format!(
                "operator {} must be detached before insertion",
                new_parent.id()
            )));
        }

        match node.parent() {
            Some(old_parent) => {
                if !old_parent.replace_child(node, Some(Arc::clone(new_parent))) {
                    return Err(TreeError::Association(format!(
                        "operator {} is not listed as a child of its parent {}",
                        node.id(),
                        old_parent.id()
                    )));
                }
                new_parent.set_parent(Some(&old_parent));
            }
            None => {
                let is_root = self.root.as_ref().is_some_and(|r| Arc::ptr_eq(r, node));
                if is_root {
                    self.root = Some(Arc::clone(new_parent));
                }
            }
        }

        new_parent.push_child(Arc::clone(node));
        node.set_parent(Some(new_parent));
        debug!(op_id = node.id(), parent = new_parent.id(), "inserted parent");
        Ok(())
    }
}

/// Whether `candidate` is `node` or one of its ancestors.
fn is_ancestor(candidate: &Arc<OpNode>, node: &Arc<OpNode>) -> bool {
    let mut current = Some(Arc::clone(node));
    while let Some(op) = current {
        if Arc::ptr_eq(&op, candidate) {
            return true;
        }
        current = op.parent();
    }
    false
}
