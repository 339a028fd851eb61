/*!
 * Allocator Configuration
 * Defaults from `limits`, optionally overridden from the environment
 */

use super::limits::{
    DEFAULT_BLOCK_SIZE, DEFAULT_POOL_SIZE, EMERGENCY_RESERVE_SIZE, ENV_BLOCK_SIZE,
    ENV_EMERGENCY_RESERVE, ENV_POOL_SIZE,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Tunables for trackers and pools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Size of the emergency reserve a tracker holds back (0 disables it)
    pub emergency_reserve_bytes: usize,
    /// Block size used by `MemoryPool::with_config`
    pub default_block_size: usize,
    /// Backing buffer size used by `MemoryPool::with_config`
    pub default_pool_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            emergency_reserve_bytes: EMERGENCY_RESERVE_SIZE,
            default_block_size: DEFAULT_BLOCK_SIZE,
            default_pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl MemoryConfig {
    /// Build from defaults, then apply `MEMTRACK_*` environment overrides
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        apply(&lookup, ENV_EMERGENCY_RESERVE, &mut self.emergency_reserve_bytes);
        apply(&lookup, ENV_BLOCK_SIZE, &mut self.default_block_size);
        apply(&lookup, ENV_POOL_SIZE, &mut self.default_pool_size);
        self
    }
}

fn apply<F>(lookup: &F, key: &str, slot: &mut usize)
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<usize>() {
        Ok(value) => *slot = value,
        Err(e) => warn!(key, value = %raw, error = %e, "Ignoring unparseable configuration override"),
    }
}
