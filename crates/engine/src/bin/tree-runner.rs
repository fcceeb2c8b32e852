//! tree-runner: build, prepare and execute a pipeline described in TOML.
//!
//! Flow: load config → parse pipeline → build tree → prepare → print →
//! launch → wait for every operator task.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use treeflow_core::{load_dotenv, EngineConfig};
use treeflow_engine::{ExecutionTree, PipelineSpec, PrinterPass};

// ── CLI ─────────────────────────────────────────────────────────────

/// Run a dataset pipeline through the execution tree.
#[derive(Parser, Debug)]
#[command(name = "tree-runner", version, about)]
struct Cli {
    /// Path to the pipeline description.
    pipeline: PathBuf,

    /// Engine config TOML. Falls back to environment variables when absent.
    #[arg(long, env = "TREEFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Prepare and print the tree without launching it.
    #[arg(long)]
    dry_run: bool,

    /// Log every node during optimization.
    #[arg(long)]
    trace_passes: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let config = EngineConfig::from_env();
            config.validate().context("invalid environment config")?;
            config
        }
    };
    config.log_summary();
    debug!(config = %config.summary(), "effective engine config");

    let spec = PipelineSpec::load(&cli.pipeline)
        .with_context(|| format!("failed to load pipeline {}", cli.pipeline.display()))?;

    let mut tree = ExecutionTree::with_config(config);
    if cli.trace_passes {
        tree.add_optimization_pass(Box::new(PrinterPass));
    }

    spec.build(&mut tree).context("failed to build execution tree")?;
    tree.prepare().context("failed to prepare execution tree")?;

    let mut dump = String::new();
    tree.print(&mut dump, None)?;
    println!("{}", dump);

    if cli.dry_run {
        return Ok(());
    }

    let started = Instant::now();
    tree.launch().context("failed to launch execution tree")?;
    tree.wait_for_completion().context("pipeline execution failed")?;

    if tree.profiling().is_profiling_enabled() {
        info!(path = %tree.profiling().output_path().display(), "profiling data written");
    }
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "pipeline finished");
    Ok(())
}
