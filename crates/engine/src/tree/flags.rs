use treeflow_core::PrepareFlags;

/// Prepare flags active on the current path of the prepare walk.
///
/// Each bit carries a count of the nodes on the path that declared it, so a
/// node leaving scope only withdraws its own contribution: a bit declared by
/// both a node and one of its ancestors stays set until the ancestor leaves.
#[derive(Debug, Clone, Default)]
pub struct ScopedFlags {
    counts: [u32; u32::BITS as usize],
}

impl ScopedFlags {
    /// A node's flags come into scope (descending into it).
    pub fn enter(&mut self, flags: PrepareFlags) {
        for bit in flags.bit_indices() {
            self.counts[bit as usize] += 1;
        }
    }

    /// A node's flags leave scope (ascending out of it).
    pub fn exit(&mut self, flags: PrepareFlags) {
        for bit in flags.bit_indices() {
            let count = &mut self.counts[bit as usize];
            *count = count.saturating_sub(1);
        }
    }

    pub fn current(&self) -> PrepareFlags {
        let bits = self
            .counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .fold(0u32, |acc, (bit, _)| acc | (1 << bit));
        PrepareFlags::from_bits(bits)
    }

    /// Smallest count among the bits of `flags` (0 if any of them is unset).
    pub fn depth(&self, flags: PrepareFlags) -> u32 {
        flags
            .bit_indices()
            .map(|bit| self.counts[bit as usize])
            .min()
            .unwrap_or(0)
    }
}
