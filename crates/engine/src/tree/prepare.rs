use std::sync::Arc;

use tracing::{debug, info};

use treeflow_core::{TreeError, TreeResult, TreeState};

use crate::node::OpNode;
use crate::pass::Pass;

use super::ExecutionTree;

impl ExecutionTree {
    /// Drive the prepare phase. Each sub-phase must succeed before the next:
    ///
    /// 1. `prepare_tree_pre_action`: compulsory passes before optimization
    ///    (e.g. removing shuffles under a cache).
    /// 2. `optimize`: optional passes.
    /// 3. `prepare_tree_post_action`: compulsory finalization, enters `Prepare`.
    /// 4. `prepare_deprecated`: the recursive per-node walk, enters `Ready`.
    ///
    /// The first failure is returned unchanged; nothing is rolled back.
    pub fn prepare(&mut self) -> TreeResult<()> {
        self.expect_state("preparing the tree", &[TreeState::Building])?;

        self.prepare_tree_pre_action()?;
        self.optimize()?;
        self.prepare_tree_post_action()?;
        self.prepare_deprecated()
    }

    fn prepare_tree_pre_action(&mut self) -> TreeResult<()> {
        info!("Running pre pass");
        let passes = std::mem::take(&mut self.pre_passes);
        let result = self.run_passes(&passes);
        self.pre_passes = passes;
        result
    }

    fn optimize(&mut self) -> TreeResult<()> {
        if self.optimization_passes.is_empty() {
            return Ok(());
        }
        info!("Running optimization passes");
        let passes = std::mem::take(&mut self.optimization_passes);
        let result = self.run_passes(&passes);
        self.optimization_passes = passes;
        result
    }

    fn prepare_tree_post_action(&mut self) -> TreeResult<()> {
        // The tree is ready to be prepared.
        self.set_state(TreeState::Prepare);
        Ok(())
    }

    fn run_passes(&mut self, passes: &[Box<dyn Pass>]) -> TreeResult<()> {
        let mut modified = false;
        for pass in passes {
            debug!(pass = %pass.name(), "running pass");
            pass.run(self, &mut modified)?;
        }
        debug!(modified, "passes finished");
        Ok(())
    }

    /// Recursive walk over the whole tree driving each node's pre and post
    /// actions. Kept until every node action has moved into passes.
    fn prepare_deprecated(&mut self) -> TreeResult<()> {
        self.expect_state("preparing the tree", &[TreeState::Prepare])?;
        let root = self
            .root
            .clone()
            .ok_or_else(|| TreeError::Association("tree has no root to prepare".to_string()))?;

        self.prepare_node(&root)?;
        self.set_state(TreeState::Ready);
        Ok(())
    }

    fn prepare_node(&mut self, node: &Arc<OpNode>) -> TreeResult<()> {
        node.op().prepare_node_pre_action(node, self)?;

        // Flags come into scope before the children are visited.
        let op_flags = node.op().prepare_flags();
        self.prepare_flags.enter(op_flags);

        for child in node.children() {
            self.prepare_node(&child)?;
        }

        node.op().prepare_node_post_action(node, self)?;

        self.prepare_flags.exit(op_flags);
        Ok(())
    }
}
