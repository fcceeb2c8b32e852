pub mod node;
pub mod ops;
pub mod pass;
pub mod perf;
pub mod pipeline;
pub mod sampler;
pub mod task;
pub mod tree;

pub use node::{DatasetOp, OpKind, OpNode, INVALID_OPERATOR_ID};
pub use ops::{CacheOp, MapOp, RepeatOp, ShuffleOp, SourceOp};
pub use pass::{NodePass, Pass, PrinterPass, RemovalPass, Traversal};
pub use perf::{Monitor, ProfilingManager};
pub use pipeline::{NodeSpec, OpSpec, PipelineSpec};
pub use sampler::Sampler;
pub use task::{launch_workers, TaskContext, TaskFn, TaskGroup, ThreadTaskGroup, PARALLEL_WORKER_LABEL};
pub use tree::{op_task_label, ExecutionTree, PostOrderIter, TreeId, MONITOR_TASK_LABEL};
pub use treeflow_core::{OpState, OperatorId, PrepareFlags, TreeError, TreeResult, TreeState};
