//! Sampling schedule configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// How many readings to take, how far apart, and how often to repeat the
/// whole sample-then-publish cycle.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SamplingConfig {
    /// Readings taken per cycle.
    #[validate(range(min = 1, message = "at least one sample per cycle is required"))]
    pub num_samples: u32,

    /// Seconds between consecutive readings within a cycle.
    pub sample_interval_secs: u64,

    /// Seconds between cycles. `0` means one-shot: sample, publish once,
    /// exit.
    pub collection_interval_secs: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            num_samples: 1,
            sample_interval_secs: 2,
            collection_interval_secs: 0,
        }
    }
}
