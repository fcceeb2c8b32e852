//! Pipeline profiling: a manager holding samples and a monitor task that
//! collects them while the tree executes.

mod monitor;
mod profiling;

pub use monitor::Monitor;
pub use profiling::{OpSample, PipelineSample, ProfilingManager};
