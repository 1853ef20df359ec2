use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::error::SwarmError;

/// Static configuration for a SwarmBots world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwarmConfig {
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
    /// Edge length of the spatial index cells used for neighbor queries.
    pub index_cell_size: f64,
    /// Half-width of the square around the origin used for random spawns.
    pub spawn_extent: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            history_capacity: 256,
            index_cell_size: 10.0,
            spawn_extent: 100.0,
        }
    }
}

impl SwarmConfig {
    /// Checks every field, reporting the first invalid one.
    pub fn validate(&self) -> Result<(), SwarmError> {
        if self.history_capacity == 0 {
            return Err(SwarmError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        if !(self.index_cell_size.is_finite() && self.index_cell_size > 0.0) {
            return Err(SwarmError::InvalidConfig(
                "index_cell_size must be positive",
            ));
        }
        if !(self.spawn_extent.is_finite() && self.spawn_extent >= 0.0) {
            return Err(SwarmError::InvalidConfig(
                "spawn_extent must be non-negative",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
