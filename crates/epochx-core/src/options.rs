use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CHAIN_FAILURE_THRESHOLD, DEFAULT_MAX_PARALLEL_BLOCKS_PER_EPOCH,
    DEFAULT_MAX_PENDING_JOBS, DEFAULT_POLLING_INTERVAL_MS, DEFAULT_QUOTE_VALIDITY_SLOTS,
};

/// Tuning shared by the orchestrator and both monitors. Built once from the
/// node configuration and passed down by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOptions {
    /// Poll interval for both monitors (milliseconds).
    pub polling_interval_ms: u64,
    /// Published quotes that may await resolution at once.
    pub max_pending_jobs: usize,
    /// Proving jobs carried in flight across all epochs.
    pub max_parallel_blocks_per_epoch: usize,
    /// Validity window for quotes whose terms carry no explicit slot.
    pub quote_validity_slots: u64,
    /// Consecutive failed chain reads before health degrades.
    pub chain_failure_threshold: u32,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            max_pending_jobs: DEFAULT_MAX_PENDING_JOBS,
            max_parallel_blocks_per_epoch: DEFAULT_MAX_PARALLEL_BLOCKS_PER_EPOCH,
            quote_validity_slots: DEFAULT_QUOTE_VALIDITY_SLOTS,
            chain_failure_threshold: DEFAULT_CHAIN_FAILURE_THRESHOLD,
        }
    }
}

impl NodeOptions {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}
