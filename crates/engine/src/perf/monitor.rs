use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use treeflow_core::{OpState, TreeResult};

use crate::node::OpNode;
use crate::task::TaskContext;

use super::profiling::{OpSample, PipelineSample, ProfilingManager};

/// Upper bound on a single sleep so interrupts are noticed quickly.
const POLL_SLICE: Duration = Duration::from_millis(5);

/// Samples every operator at the profiling interval until all operator
/// tasks have terminated or the group is interrupted, then saves the data.
pub struct Monitor {
    manager: Arc<ProfilingManager>,
    nodes: Vec<Arc<OpNode>>,
}

impl Monitor {
    pub fn new(manager: Arc<ProfilingManager>, nodes: Vec<Arc<OpNode>>) -> Self {
        Self { manager, nodes }
    }

    pub fn sample(&self) -> PipelineSample {
        let ops = self
            .nodes
            .iter()
            .map(|node| OpSample {
                op_id: node.id(),
                name: node.name().to_string(),
                state: node.state(),
                progress: node.op().progress(),
            })
            .collect();
        PipelineSample {
            timestamp: Utc::now(),
            ops,
        }
    }

    fn all_terminated(&self) -> bool {
        self.nodes
            .iter()
            .filter(|n| !n.inlined())
            .all(|n| n.state() == OpState::Terminated)
    }

    /// Task body.
    pub fn run(&self, ctx: &TaskContext) -> TreeResult<()> {
        let interval = self.manager.sampling_interval();
        debug!(interval_ms = interval.as_millis() as u64, "monitor started");

        loop {
            // Checked before sampling so the last sample shows the final states.
            let done = self.all_terminated() || ctx.is_interrupted();
            self.manager.record(self.sample());
            if done {
                break;
            }
            let deadline = Instant::now() + interval;
            while Instant::now() < deadline && !ctx.is_interrupted() {
                thread::sleep(POLL_SLICE.min(deadline.saturating_duration_since(Instant::now())));
            }
        }

        self.manager.save_profiling_data()?;
        Ok(())
    }
}
