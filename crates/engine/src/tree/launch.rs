use std::sync::Arc;

use tracing::{debug, info};

use treeflow_core::{OpState, TreeResult, TreeState};

use crate::node::OpNode;
use crate::perf::Monitor;
use crate::task::{self, TaskContext};

use super::ExecutionTree;

/// Label of the profiling monitor task.
pub const MONITOR_TASK_LABEL: &str = "Monitor Thread launched";

/// Label of the task running operator `id`.
pub fn op_task_label(id: i32) -> String {
    format!("Op launched, OperatorId:{}", id)
}

impl ExecutionTree {
    /// Start executing the tree.
    ///
    /// Walks the tree in postorder so producers are spawned before their
    /// consumers. Every node is marked running; only non-inlined nodes get a
    /// task. An inlined node's work runs from the task of the node above it,
    /// or from the caller's own thread when it is the root.
    pub fn launch(&mut self) -> TreeResult<()> {
        self.expect_state("launching tree", &[TreeState::Ready])?;

        let dump = self.to_string();

        // Profiling must be set up before any operator starts.
        if self.profiling.is_profiling_enabled() {
            self.profiling.initialize()?;
            let monitor = Monitor::new(
                Arc::clone(&self.profiling),
                self.iter().collect(),
            );
            self.task_group.create_async_task(
                MONITOR_TASK_LABEL,
                Box::new(move |ctx: &TaskContext| monitor.run(ctx)),
            )?;
        }

        debug!("Printing the tree before launch tasks:\n{}", dump);

        let mut spawned = 0usize;
        for node in self.iter() {
            node.set_state(OpState::Running);
            if node.inlined() {
                continue;
            }
            let label = op_task_label(node.id());
            let task_node = Arc::clone(&node);
            self.task_group.create_async_task(
                &label,
                Box::new(move |ctx: &TaskContext| run_operator(&task_node, ctx)),
            )?;
            spawned += 1;
        }

        self.set_state(TreeState::Executing);
        info!(tasks = spawned, "execution tree launched");
        Ok(())
    }

    /// Spawn a pool of `num_workers` tasks in this tree's task group, each
    /// calling `func` with its worker index.
    pub fn launch_workers<F>(&self, num_workers: u32, func: F) -> TreeResult<()>
    where
        F: Fn(u32, &TaskContext) -> TreeResult<()> + Send + Sync + 'static,
    {
        task::launch_workers(self.task_group.as_ref(), num_workers, func)
    }

    /// Block until every launched task has finished. Returns the first task
    /// failure.
    pub fn wait_for_completion(&self) -> TreeResult<()> {
        self.task_group.join_all()
    }
}

fn run_operator(node: &Arc<OpNode>, ctx: &TaskContext) -> TreeResult<()> {
    debug!(op_id = node.id(), op = %node.name(), "operator task started");
    let result = node.op().run(node, ctx);
    node.set_state(OpState::Terminated);
    result
}
