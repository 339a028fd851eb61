/*!
 * Memory Limits and Constants
 *
 * Centralized location for allocator-wide defaults.
 */

// =============================================================================
// POOL DEFAULTS
// =============================================================================

/// Default pool block size (1KB)
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Default pool backing buffer size (1MB)
pub const DEFAULT_POOL_SIZE: usize = 1024 * 1024;

/// Alignment of a pool's backing buffer
/// Blocks inherit whatever alignment `base + i * block_size` yields
pub const POOL_BASE_ALIGN: usize = 16;

// =============================================================================
// HEAP DEFAULTS
// =============================================================================

/// Minimum alignment for heap-path acquisitions, matching what `malloc` guarantees
pub const MIN_HEAP_ALIGN: usize = 16;

/// Held-back buffer released once on heap exhaustion (1MB)
pub const EMERGENCY_RESERVE_SIZE: usize = 1024 * 1024;

// =============================================================================
// ENVIRONMENT OVERRIDES
// =============================================================================

pub const ENV_EMERGENCY_RESERVE: &str = "MEMTRACK_EMERGENCY_RESERVE";
pub const ENV_BLOCK_SIZE: &str = "MEMTRACK_BLOCK_SIZE";
pub const ENV_POOL_SIZE: &str = "MEMTRACK_POOL_SIZE";
pub const ENV_TRACE_JSON: &str = "MEMTRACK_TRACE_JSON";
