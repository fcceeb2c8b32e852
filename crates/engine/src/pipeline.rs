//! Declarative pipeline descriptions.
//!
//! A pipeline is a nested TOML table: every node names its operator with an
//! `op` key next to the operator's parameters, and lists its inputs under
//! `children`.
//!
//! ```toml
//! [root]
//! op = "repeat"
//! count = 2
//!
//! [[root.children]]
//! op = "map"
//! workers = 4
//!
//! [[root.children.children]]
//! op = "source"
//! rows = 100
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use treeflow_core::TreeResult;

use crate::node::OpNode;
use crate::ops::{CacheOp, MapOp, RepeatOp, ShuffleOp, SourceOp};
use crate::sampler::Sampler;
use crate::tree::ExecutionTree;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub root: NodeSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(flatten)]
    pub op: OpSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

/// Operator parameters, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpSpec {
    Source {
        rows: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sampler: Option<Sampler>,
    },
    Map {
        /// Defaults to `execution.num_parallel_workers`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workers: Option<u32>,
    },
    Shuffle {
        #[serde(default = "default_shuffle_buffer")]
        buffer_size: u32,
        #[serde(default)]
        seed: u64,
    },
    Repeat {
        count: i32,
    },
    Cache,
}

fn default_shuffle_buffer() -> u32 {
    10_000
}

impl PipelineSpec {
    pub fn from_toml_str(raw: &str) -> TreeResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> TreeResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> TreeResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Materialize the pipeline into `tree` and make it the root.
    ///
    /// Nodes are associated in pre-order, so the root gets id 0 and ids grow
    /// down each branch before moving to the next sibling.
    pub fn build(&self, tree: &mut ExecutionTree) -> TreeResult<Arc<OpNode>> {
        let root = build_node(&self.root, tree)?;
        tree.assign_root(&root)?;
        debug!(nodes = tree.node_count(), "pipeline built");
        Ok(root)
    }
}

impl NodeSpec {
    pub fn new(op: OpSpec) -> Self {
        Self { op, children: Vec::new() }
    }

    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

impl OpSpec {
    fn instantiate(&self, tree: &ExecutionTree) -> Arc<OpNode> {
        match self {
            OpSpec::Source { rows, sampler } => {
                let sampler = sampler.clone().unwrap_or_default();
                OpNode::new(SourceOp::with_sampler(*rows, sampler))
            }
            OpSpec::Map { workers } => {
                let workers = workers.unwrap_or(tree.config().execution.num_parallel_workers);
                OpNode::new(MapOp::new(workers))
            }
            OpSpec::Shuffle { buffer_size, seed } => OpNode::new(ShuffleOp::new(*buffer_size, *seed)),
            OpSpec::Repeat { count } => OpNode::new(RepeatOp::new(*count)),
            OpSpec::Cache => OpNode::new(CacheOp::new()),
        }
    }
}

fn build_node(spec: &NodeSpec, tree: &mut ExecutionTree) -> TreeResult<Arc<OpNode>> {
    let node = spec.op.instantiate(tree);
    tree.associate_node(&node)?;
    for child_spec in &spec.children {
        let child = build_node(child_spec, tree)?;
        tree.add_child(&node, &child)?;
    }
    Ok(node)
}
