//! Consensus configuration.

use crate::{quorums::Quorums, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Static configuration of the consensus core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Number of nodes in the pool.
    pub pool_size: usize,
    /// Directory holding per-node BLS key files; `None` disables BLS.
    pub bls_keys_dir: Option<PathBuf>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            bls_keys_dir: None,
        }
    }
}

impl ConsensusConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size < 4 {
            return Err(Error::InvalidConfig(
                "pool size must be at least 4".to_string(),
            ));
        }

        if (self.pool_size - 1) % 3 != 0 {
            return Err(Error::InvalidConfig(
                "pool size must be 3f+1 for some number of tolerated faults f".to_string(),
            ));
        }

        Ok(())
    }

    /// Creates a configuration suitable for tests: the minimal 4-node pool.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Computes the quorum thresholds for this pool.
    pub fn quorums(&self) -> Quorums {
        Quorums::new(self.pool_size)
    }
}
