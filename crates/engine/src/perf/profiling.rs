use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use treeflow_core::{OpState, OperatorId, ProfilingConfig, TreeResult};

/// State of one operator at sampling time.
#[derive(Debug, Clone, Serialize)]
pub struct OpSample {
    pub op_id: OperatorId,
    pub name: String,
    pub state: OpState,
    pub progress: Option<u64>,
}

/// One monitor tick across the whole tree.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSample {
    pub timestamp: DateTime<Utc>,
    pub ops: Vec<OpSample>,
}

#[derive(Serialize)]
struct ProfilingReport<'a> {
    device_id: &'a str,
    sampling_interval_ms: u64,
    samples: &'a [PipelineSample],
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns profiling settings and the samples the monitor records.
pub struct ProfilingManager {
    config: ProfilingConfig,
    initialized: AtomicBool,
    samples: Mutex<Vec<PipelineSample>>,
}

impl ProfilingManager {
    pub fn new(config: ProfilingConfig) -> Self {
        Self {
            config,
            initialized: AtomicBool::new(false),
            samples: Mutex::new(Vec::new()),
        }
    }

    pub fn is_profiling_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }

    /// Prepare the output directory. Called once before operators launch.
    pub fn initialize(&self) -> TreeResult<()> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        self.initialized.store(true, Ordering::Relaxed);
        info!(dir = %self.config.output_dir.display(), "profiling initialized");
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        self.config.sampling_interval()
    }

    pub fn record(&self, sample: PipelineSample) {
        lock(&self.samples).push(sample);
    }

    pub fn samples(&self) -> Vec<PipelineSample> {
        lock(&self.samples).clone()
    }

    pub fn output_path(&self) -> PathBuf {
        self.config
            .output_dir
            .join(format!("pipeline_profiling_{}.json", self.config.device_id))
    }

    /// Write all samples collected so far as JSON. Returns the file written.
    pub fn save_profiling_data(&self) -> TreeResult<PathBuf> {
        let samples = lock(&self.samples);
        let report = ProfilingReport {
            device_id: &self.config.device_id,
            sampling_interval_ms: self.config.monitor_sampling_interval_ms,
            samples: &samples,
        };
        let path = self.output_path();
        std::fs::write(&path, serde_json::to_vec_pretty(&report)?)?;
        info!(path = %path.display(), samples = samples.len(), "profiling data saved");
        Ok(path)
    }
}
