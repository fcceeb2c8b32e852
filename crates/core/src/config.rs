use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub profiling: ProfilingConfig,
}

impl EngineConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TREEFLOW_PROFILE`. When set (e.g. `BENCH`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TREEFLOW_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            execution: ExecutionConfig::from_env_profiled(p),
            profiling: ProfilingConfig::from_env_profiled(p),
        }
    }

    /// Parse a TOML document. Missing sections fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, TreeError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file from disk.
    pub fn load(path: &Path) -> Result<Self, TreeError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), TreeError> {
        if self.execution.num_parallel_workers == 0 {
            return Err(TreeError::Config(
                "num_parallel_workers must be at least 1".to_string(),
            ));
        }
        if self.profiling.monitor_sampling_interval_ms == 0 {
            return Err(TreeError::Config(
                "monitor_sampling_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  execution:   workers={}", self.execution.num_parallel_workers);
        tracing::info!(
            "  profiling:   enabled={}, dir={}, device={}, interval={}ms",
            self.profiling.enabled,
            self.profiling.output_dir.display(),
            self.profiling.device_id,
            self.profiling.monitor_sampling_interval_ms
        );
    }

    /// Summary view for reports.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "execution": {
                "num_parallel_workers": self.execution.num_parallel_workers,
            },
            "profiling": {
                "enabled": self.profiling.enabled,
                "output_dir": self.profiling.output_dir,
                "device_id": self.profiling.device_id,
            },
        })
    }
}

// ── Execution ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Default worker count for parallel operators that don't set one.
    #[serde(default = "default_num_parallel_workers")]
    pub num_parallel_workers: u32,
}

fn default_num_parallel_workers() -> u32 { 8 }

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            num_parallel_workers: default_num_parallel_workers(),
        }
    }
}

impl ExecutionConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            num_parallel_workers: profiled_env_u32(p, "NUM_PARALLEL_WORKERS", default_num_parallel_workers()),
        }
    }
}

// ── Profiling ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_sampling_interval")]
    pub monitor_sampling_interval_ms: u64,
}

fn default_output_dir() -> PathBuf { PathBuf::from("profiling") }
fn default_device_id() -> String { "0".to_string() }
fn default_sampling_interval() -> u64 { 10 }

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: default_output_dir(),
            device_id: default_device_id(),
            monitor_sampling_interval_ms: default_sampling_interval(),
        }
    }
}

impl ProfilingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            enabled: profiled_env_bool(p, "PROFILING_MODE", false),
            output_dir: PathBuf::from(profiled_env_or(p, "PROFILING_DIR", "profiling")),
            device_id: profiled_env_or(p, "DEVICE_ID", "0"),
            monitor_sampling_interval_ms: profiled_env_u64(
                p,
                "MONITOR_SAMPLING_INTERVAL",
                default_sampling_interval(),
            ),
        }
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_sampling_interval_ms.max(1))
    }
}
