pub mod config;
pub mod error;
pub mod state;

pub use config::{load_dotenv, EngineConfig, ExecutionConfig, ProfilingConfig};
pub use error::*;
pub use state::{join_states, OpState, PrepareFlags, TreeState};
