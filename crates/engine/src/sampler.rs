use serde::{Deserialize, Serialize};

/// How a leaf operator picks rows from its dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sampler {
    /// Rows in order starting at `start_index`.
    Sequential {
        #[serde(default)]
        start_index: u64,
        #[serde(default)]
        num_samples: Option<u64>,
    },
    /// Rows in a seeded random order.
    Random {
        #[serde(default)]
        seed: u64,
        #[serde(default)]
        num_samples: Option<u64>,
    },
    /// One shard out of `num_shards`, rows assigned round-robin.
    Distributed { num_shards: u32, shard_id: u32 },
}

impl Default for Sampler {
    fn default() -> Self {
        Sampler::Sequential {
            start_index: 0,
            num_samples: None,
        }
    }
}

impl Sampler {
    /// Number of rows this sampler yields from a dataset of `dataset_size` rows.
    pub fn samples_for(&self, dataset_size: u64) -> u64 {
        match self {
            Sampler::Sequential { start_index, num_samples } => {
                let available = dataset_size.saturating_sub(*start_index);
                num_samples.map_or(available, |n| n.min(available))
            }
            Sampler::Random { num_samples, .. } => {
                num_samples.map_or(dataset_size, |n| n.min(dataset_size))
            }
            Sampler::Distributed { num_shards, shard_id } => {
                let shards = u64::from((*num_shards).max(1));
                let shard = u64::from(*shard_id);
                if shard >= shards {
                    return 0;
                }
                // Round-robin: the first `size % shards` shards take one extra row.
                dataset_size / shards + u64::from(shard < dataset_size % shards)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sampler::Sequential { .. } => "SequentialSampler",
            Sampler::Random { .. } => "RandomSampler",
            Sampler::Distributed { .. } => "DistributedSampler",
        }
    }
}
