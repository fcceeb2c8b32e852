use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use treeflow_core::{PrepareFlags, TreeResult};

use crate::node::{DatasetOp, OpKind, OpNode};
use crate::sampler::Sampler;
use crate::task::TaskContext;
use crate::tree::ExecutionTree;

/// Leaf operator producing `num_rows` rows through its sampler.
pub struct SourceOp {
    num_rows: u64,
    sampler: Mutex<Option<Arc<Sampler>>>,
    rows_produced: AtomicU64,
}

impl SourceOp {
    pub fn new(num_rows: u64) -> Self {
        Self::with_sampler(num_rows, Sampler::default())
    }

    pub fn with_sampler(num_rows: u64, sampler: Sampler) -> Self {
        Self {
            num_rows,
            sampler: Mutex::new(Some(Arc::new(sampler))),
            rows_produced: AtomicU64::new(0),
        }
    }

    /// The sampler still owned by this leaf. `None` once it was handed to a cache.
    pub fn sampler(&self) -> Option<Arc<Sampler>> {
        self.sampler.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn rows_produced(&self) -> u64 {
        self.rows_produced.load(Ordering::Relaxed)
    }

    /// Rows one epoch yields. A leaf without a sampler serves the full dataset.
    pub fn rows_per_epoch(&self) -> u64 {
        self.sampler()
            .map_or(self.num_rows, |s| s.samples_for(self.num_rows))
    }
}

impl DatasetOp for SourceOp {
    fn name(&self) -> &str {
        "SourceOp"
    }

    fn kind(&self) -> OpKind {
        OpKind::Source
    }

    fn prepare_node_post_action(&self, node: &Arc<OpNode>, tree: &mut ExecutionTree) -> TreeResult<()> {
        let flags = tree.prepare_flags();

        // Under a repeat, this leaf needs an end-of-epoch reset.
        if flags.contains(PrepareFlags::REPEAT) {
            tree.add_to_eoe_op_stack(Arc::clone(node));
        }

        // Under a cache, the cache takes over sampling.
        if flags.contains(PrepareFlags::CACHE) {
            let taken = self.sampler.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(sampler) = taken {
                debug!(op_id = node.id(), sampler = sampler.name(), "handing sampler to cache");
                tree.add_to_sampler_stack(sampler);
            }
        }
        Ok(())
    }

    fn run(&self, node: &Arc<OpNode>, ctx: &TaskContext) -> TreeResult<()> {
        let rows = self.rows_per_epoch();
        for _ in 0..rows {
            if ctx.is_interrupted() {
                debug!(op_id = node.id(), "source interrupted");
                return Ok(());
            }
            self.rows_produced.fetch_add(1, Ordering::Relaxed);
        }
        debug!(op_id = node.id(), rows, "source finished epoch");
        Ok(())
    }

    fn progress(&self) -> Option<u64> {
        Some(self.rows_produced())
    }

    fn detail(&self) -> String {
        let sampler = self
            .sampler()
            .map_or_else(|| "(handed to cache)".to_string(), |s| s.name().to_string());
        format!("Dataset rows           : {}\nSampler                : {}\n", self.num_rows, sampler)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
