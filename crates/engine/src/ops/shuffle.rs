use std::any::Any;
use std::sync::Arc;

use treeflow_core::TreeResult;

use crate::node::{DatasetOp, OpKind, OpNode};
use crate::task::TaskContext;

/// Shuffles rows through a buffer. Dropped by `RemovalPass` below a cache.
pub struct ShuffleOp {
    buffer_size: u32,
    seed: u64,
}

impl ShuffleOp {
    pub fn new(buffer_size: u32, seed: u64) -> Self {
        Self { buffer_size, seed }
    }
}

impl DatasetOp for ShuffleOp {
    fn name(&self) -> &str {
        "ShuffleOp"
    }

    fn kind(&self) -> OpKind {
        OpKind::Shuffle
    }

    fn run(&self, _node: &Arc<OpNode>, ctx: &TaskContext) -> TreeResult<()> {
        ctx.check_interrupt()
    }

    fn detail(&self) -> String {
        format!("Shuffle buffer size    : {}\nShuffle seed           : {}\n", self.buffer_size, self.seed)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
