use thiserror::Error;

use crate::state::{join_states, TreeState};

/// Identifier assigned to an operator when it joins a tree.
pub type OperatorId = i32;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Invalid tree state for {operation}. Current state: {current}, expected: {}", join_states(.expected))]
    InvalidState {
        operation: &'static str,
        current: TreeState,
        expected: Vec<TreeState>,
    },

    #[error("Association error: {0}")]
    Association(String),

    #[error("Pass {pass} failed: {reason}")]
    PassFailure { pass: String, reason: String },

    #[error("Failed to spawn task '{label}': {reason}")]
    SpawnFailure { label: String, reason: String },

    #[error("{hook} failed on operator {op_id} ({op_name}): {reason}")]
    HookFailure {
        op_id: OperatorId,
        op_name: String,
        hook: &'static str,
        reason: String,
    },

    #[error("Operator {op_id} failed: {reason}")]
    Execution { op_id: OperatorId, reason: String },

    #[error("Task group interrupted")]
    Interrupted,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

impl TreeError {
    pub fn pass_failure(pass: impl Into<String>, reason: impl Into<String>) -> Self {
        TreeError::PassFailure {
            pass: pass.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn_failure(label: impl Into<String>, reason: impl Into<String>) -> Self {
        TreeError::SpawnFailure {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that only report cooperative shutdown.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, TreeError::Interrupted)
    }
}

impl From<serde_json::Error> for TreeError {
    fn from(e: serde_json::Error) -> Self {
        TreeError::Serialize(e.to_string())
    }
}

impl From<toml::de::Error> for TreeError {
    fn from(e: toml::de::Error) -> Self {
        TreeError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for TreeError {
    fn from(e: toml::ser::Error) -> Self {
        TreeError::Serialize(e.to_string())
    }
}

pub type TreeResult<T> = Result<T, TreeError>;
