use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use treeflow_core::{TreeError, TreeResult};

use crate::node::INVALID_OPERATOR_ID;

use super::{TaskContext, TaskFn, TaskGroup};

struct TaskHandle {
    label: String,
    handle: JoinHandle<()>,
}

struct GroupInner {
    name: String,
    /// Raised by `service_stop` and by the first failing task.
    interrupt: Arc<AtomicBool>,
    /// Once set, no new tasks are accepted.
    stopped: AtomicBool,
    handles: Mutex<Vec<TaskHandle>>,
    first_error: Mutex<Option<TreeError>>,
    spawned: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GroupInner {
    /// Keep the first failure and interrupt everyone else.
    fn record_failure(&self, err: TreeError) {
        let mut slot = lock(&self.first_error);
        if slot.is_none() {
            *slot = Some(err);
        }
        self.interrupt.store(true, Ordering::Relaxed);
    }
}

/// [`TaskGroup`] backed by one named OS thread per task.
///
/// The group terminates on first failure: the first task that returns an
/// error (other than [`TreeError::Interrupted`]) is recorded and the shared
/// interrupt flag is raised.
#[derive(Clone)]
pub struct ThreadTaskGroup {
    inner: Arc<GroupInner>,
}

impl ThreadTaskGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name: name.into(),
                interrupt: Arc::new(AtomicBool::new(false)),
                stopped: AtomicBool::new(false),
                handles: Mutex::new(Vec::new()),
                first_error: Mutex::new(None),
                spawned: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Ask every task to wind down without refusing new spawns.
    pub fn interrupt_all(&self) {
        self.inner.interrupt.store(true, Ordering::Relaxed);
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupt.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Relaxed)
    }

    /// Total number of tasks spawned since creation.
    pub fn spawned_count(&self) -> usize {
        self.inner.spawned.load(Ordering::Relaxed)
    }
}

impl TaskGroup for ThreadTaskGroup {
    fn create_async_task(&self, label: &str, task: TaskFn) -> TreeResult<()> {
        if self.is_stopped() {
            return Err(TreeError::spawn_failure(label, "task group has been stopped"));
        }

        let ctx = TaskContext::new(
            label,
            Arc::clone(&self.inner.interrupt),
            Arc::new(self.clone()),
        );
        let inner = Arc::clone(&self.inner);
        let task_label = label.to_string();

        let handle = thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                debug!(group = %inner.name, task = %task_label, "task started");
                match task(&ctx) {
                    Ok(()) => debug!(task = %task_label, "task finished"),
                    Err(e) if e.is_interrupted() => debug!(task = %task_label, "task interrupted"),
                    Err(e) => {
                        warn!(task = %task_label, error = %e, "task failed");
                        inner.record_failure(e);
                    }
                }
            })
            .map_err(|e| TreeError::spawn_failure(label, e.to_string()))?;

        lock(&self.inner.handles).push(TaskHandle {
            label: label.to_string(),
            handle,
        });
        self.inner.spawned.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Must not be called from inside one of the group's own tasks.
    fn join_all(&self) -> TreeResult<()> {
        loop {
            let batch = std::mem::take(&mut *lock(&self.inner.handles));
            if batch.is_empty() {
                break;
            }
            for task in batch {
                if task.handle.join().is_err() {
                    warn!(task = %task.label, "task panicked");
                    self.inner.record_failure(TreeError::Execution {
                        op_id: INVALID_OPERATOR_ID,
                        reason: format!("task '{}' panicked", task.label),
                    });
                }
            }
        }

        match lock(&self.inner.first_error).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn service_stop(&self) -> TreeResult<()> {
        debug!(group = %self.inner.name, "stopping task group");
        self.inner.stopped.store(true, Ordering::Relaxed);
        self.inner.interrupt.store(true, Ordering::Relaxed);
        self.join_all()
    }
}
