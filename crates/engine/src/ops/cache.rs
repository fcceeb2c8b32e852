use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

use treeflow_core::{PrepareFlags, TreeResult};

use crate::node::{DatasetOp, OpKind, OpNode};
use crate::sampler::Sampler;
use crate::task::TaskContext;
use crate::tree::ExecutionTree;

use super::{hook_failure, POST_ACTION};

/// Caches the rows of its subtree, sampling with the sampler handed up by
/// the leaf below it.
pub struct CacheOp {
    sampler: Mutex<Option<Arc<Sampler>>>,
}

impl CacheOp {
    pub fn new() -> Self {
        Self {
            sampler: Mutex::new(None),
        }
    }

    pub fn sampler(&self) -> Option<Arc<Sampler>> {
        self.sampler.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Default for CacheOp {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetOp for CacheOp {
    fn name(&self) -> &str {
        "CacheOp"
    }

    fn kind(&self) -> OpKind {
        OpKind::Cache
    }

    fn prepare_flags(&self) -> PrepareFlags {
        PrepareFlags::CACHE
    }

    fn prepare_node_post_action(&self, node: &Arc<OpNode>, tree: &mut ExecutionTree) -> TreeResult<()> {
        let sampler = tree
            .pop_from_sampler_stack()
            .ok_or_else(|| hook_failure(node, POST_ACTION, "no sampler was handed up from a leaf"))?;
        *self.sampler.lock().unwrap_or_else(PoisonError::into_inner) = Some(sampler);
        Ok(())
    }

    fn run(&self, _node: &Arc<OpNode>, ctx: &TaskContext) -> TreeResult<()> {
        ctx.check_interrupt()
    }

    fn detail(&self) -> String {
        let sampler = self.sampler().map_or("(none)", |s| s.name());
        format!("Cache sampler          : {}\n", sampler)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
