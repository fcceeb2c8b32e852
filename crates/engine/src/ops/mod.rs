//! Reference operators.
//!
//! These implement the operator contract (flags, prepare hooks, run loop,
//! worker pools) without computing on real records: progress is tracked as
//! row counters.

mod cache;
mod map;
mod repeat;
mod shuffle;
mod source;

use treeflow_core::TreeError;

use crate::node::OpNode;

pub use cache::CacheOp;
pub use map::MapOp;
pub use repeat::{RepeatOp, REPEAT_FOREVER};
pub use shuffle::ShuffleOp;
pub use source::SourceOp;

/// Build a hook failure for `node`.
pub(crate) fn hook_failure(node: &OpNode, hook: &'static str, reason: impl Into<String>) -> TreeError {
    TreeError::HookFailure {
        op_id: node.id(),
        op_name: node.name().to_string(),
        hook,
        reason: reason.into(),
    }
}

pub(crate) const PRE_ACTION: &str = "prepare pre-action";
pub(crate) const POST_ACTION: &str = "prepare post-action";
