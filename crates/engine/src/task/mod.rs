//! Task group abstraction used to launch operator and worker tasks.
//!
//! The [`TaskGroup`] trait is the seam between the execution tree and the
//! thread management underneath it: spawn a labelled task, join everything,
//! stop everything. [`ThreadTaskGroup`] backs it with one OS thread per task
//! and a shared interrupt flag.

mod thread_group;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use treeflow_core::{TreeError, TreeResult};

pub use thread_group::ThreadTaskGroup;

/// Label given to every task spawned by [`launch_workers`].
pub const PARALLEL_WORKER_LABEL: &str = "Parallel Op Worker";

/// Boxed task body. Receives the context of the task it runs in.
pub type TaskFn = Box<dyn FnOnce(&TaskContext) -> TreeResult<()> + Send + 'static>;

/// A cooperative group of concurrently running named tasks.
pub trait TaskGroup: Send + Sync {
    /// Spawn `task` under `label`. Fails with [`TreeError::SpawnFailure`] when
    /// the group cannot start it.
    fn create_async_task(&self, label: &str, task: TaskFn) -> TreeResult<()>;

    /// Wait for every spawned task, including tasks spawned while waiting.
    /// Returns the first task failure, if any.
    fn join_all(&self) -> TreeResult<()>;

    /// Interrupt all tasks, refuse new ones and wait for the running ones.
    fn service_stop(&self) -> TreeResult<()>;
}

/// Handed to every task body.
pub struct TaskContext {
    label: String,
    interrupt: Arc<AtomicBool>,
    group: Arc<dyn TaskGroup>,
}

impl TaskContext {
    pub fn new(label: impl Into<String>, interrupt: Arc<AtomicBool>, group: Arc<dyn TaskGroup>) -> Self {
        Self {
            label: label.into(),
            interrupt,
            group,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// True once the owning group has been asked to stop.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// `Err(Interrupted)` once the group has been asked to stop.
    pub fn check_interrupt(&self) -> TreeResult<()> {
        if self.is_interrupted() {
            Err(TreeError::Interrupted)
        } else {
            Ok(())
        }
    }

    pub fn group(&self) -> &Arc<dyn TaskGroup> {
        &self.group
    }

    /// Launch a worker pool into the same group this task runs in.
    pub fn launch_workers<F>(&self, num_workers: u32, func: F) -> TreeResult<()>
    where
        F: Fn(u32, &TaskContext) -> TreeResult<()> + Send + Sync + 'static,
    {
        launch_workers(self.group.as_ref(), num_workers, func)
    }
}

/// Spawn `num_workers` tasks labelled [`PARALLEL_WORKER_LABEL`], each calling
/// `func` with its 0-based worker index. Spawns happen in index order and the
/// first rejected spawn aborts the remaining ones.
pub fn launch_workers<F>(group: &dyn TaskGroup, num_workers: u32, func: F) -> TreeResult<()>
where
    F: Fn(u32, &TaskContext) -> TreeResult<()> + Send + Sync + 'static,
{
    let func = Arc::new(func);
    for worker_id in 0..num_workers {
        let func = Arc::clone(&func);
        group.create_async_task(
            PARALLEL_WORKER_LABEL,
            Box::new(move |ctx: &TaskContext| func(worker_id, ctx)),
        )?;
    }
    Ok(())
}
