use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of an execution tree. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TreeState {
    /// No nodes associated yet.
    Init,
    /// At least one node associated; the tree can still be edited.
    Building,
    /// Rewrite passes finished, the per-node prepare walk is pending.
    Prepare,
    /// Prepared and ready to launch.
    Ready,
    /// Launched. Terminal for this state machine.
    Executing,
}

impl TreeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeState::Init => "Init",
            TreeState::Building => "Building",
            TreeState::Prepare => "Prepare",
            TreeState::Ready => "Ready",
            TreeState::Executing => "Executing",
        }
    }
}

impl fmt::Display for TreeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a list of states as `A`, `A or B`, `A, B or C`.
pub fn join_states(states: &[TreeState]) -> String {
    match states {
        [] => "(none)".to_string(),
        [only] => only.to_string(),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(TreeState::as_str).collect();
            format!("{} or {}", head.join(", "), last)
        }
    }
}

/// Run state of a single operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpState {
    Idle,
    Running,
    Terminated,
}

impl fmt::Display for OpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpState::Idle => "Idle",
            OpState::Running => "Running",
            OpState::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

/// Bitmask of prepare-time flags an operator declares for its subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PrepareFlags(u32);

impl PrepareFlags {
    pub const NONE: PrepareFlags = PrepareFlags(0);
    /// The subtree sits below a repeat.
    pub const REPEAT: PrepareFlags = PrepareFlags(1);
    /// The subtree sits below a cache.
    pub const CACHE: PrepareFlags = PrepareFlags(1 << 1);

    pub const fn from_bits(bits: u32) -> Self {
        PrepareFlags(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(&self, other: PrepareFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: PrepareFlags) -> Self {
        PrepareFlags(self.0 | other.0)
    }

    /// Indices of the set bits, lowest first.
    pub fn bit_indices(&self) -> impl Iterator<Item = u32> + '_ {
        (0..u32::BITS).filter(move |i| self.0 & (1 << i) != 0)
    }
}

impl std::ops::BitOr for PrepareFlags {
    type Output = PrepareFlags;

    fn bitor(self, rhs: PrepareFlags) -> PrepareFlags {
        self.union(rhs)
    }
}

impl fmt::Display for PrepareFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06b}", self.0)
    }
}
