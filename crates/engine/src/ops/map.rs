use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use treeflow_core::TreeResult;

use crate::node::{DatasetOp, OpKind, OpNode};
use crate::task::TaskContext;
use crate::tree::ExecutionTree;

use super::{hook_failure, PRE_ACTION};

/// Parallel operator fanning out into a pool of workers.
pub struct MapOp {
    num_workers: u32,
    state: Arc<MapState>,
}

#[derive(Default)]
struct MapState {
    /// Worker ids in the order the workers ran.
    workers_run: Mutex<Vec<u32>>,
    batches: AtomicU64,
}

impl MapOp {
    pub fn new(num_workers: u32) -> Self {
        Self {
            num_workers,
            state: Arc::new(MapState::default()),
        }
    }

    /// Ids of the workers that have run so far, in completion order.
    pub fn workers_run(&self) -> Vec<u32> {
        self.state
            .workers_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DatasetOp for MapOp {
    fn name(&self) -> &str {
        "MapOp"
    }

    fn kind(&self) -> OpKind {
        OpKind::Map
    }

    fn num_workers(&self) -> u32 {
        self.num_workers
    }

    fn prepare_node_pre_action(&self, node: &Arc<OpNode>, _tree: &mut ExecutionTree) -> TreeResult<()> {
        if self.num_workers == 0 {
            return Err(hook_failure(node, PRE_ACTION, "a map needs at least one worker"));
        }
        Ok(())
    }

    fn run(&self, node: &Arc<OpNode>, ctx: &TaskContext) -> TreeResult<()> {
        debug!(op_id = node.id(), workers = self.num_workers, "launching map workers");
        let state = Arc::clone(&self.state);
        ctx.launch_workers(self.num_workers, move |worker_id, worker_ctx| {
            worker_ctx.check_interrupt()?;
            state.batches.fetch_add(1, Ordering::Relaxed);
            state
                .workers_run
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(worker_id);
            Ok(())
        })
    }

    fn progress(&self) -> Option<u64> {
        Some(self.state.batches.load(Ordering::Relaxed))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
