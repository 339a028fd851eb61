/*!
 * Memory Types
 * Common types for tracked and pooled allocation
 */

use crate::core::types::{Address, PoolId, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
///
/// Release-side variants are reported and leave all state unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum MemoryError {
    #[error("Pool exhausted: no free blocks remain")]
    Exhausted,

    #[error("Request too large: {requested} bytes exceeds pool block size {block_size}")]
    RequestTooLarge { requested: Size, block_size: Size },

    #[error("Invalid release of 0x{address:x}: {reason}")]
    InvalidRelease {
        address: Address,
        reason: InvalidReleaseReason,
    },

    #[error("Double release of pool block 0x{0:x}")]
    DoubleRelease(Address),

    #[error("Release of untracked address 0x{0:x}")]
    UntrackedRelease(Address),

    #[error("Out of memory: {requested} bytes could not be satisfied after recovery")]
    OutOfMemory { requested: Size },

    #[error("Path mismatch for 0x{address:x}: acquired via {acquired}, released via {released}")]
    PathMismatch {
        address: Address,
        acquired: AllocationPath,
        released: AllocationPath,
    },

    #[error("Allocation failure: could not reserve {requested} bytes of pool backing storage")]
    AllocationFailure { requested: Size },

    #[error("Invalid pool geometry: block size {block_size}, pool size {pool_size}")]
    InvalidPoolGeometry { block_size: Size, pool_size: Size },

    #[error("Size overflow: {count} elements of {element_size} bytes")]
    SizeOverflow { count: usize, element_size: Size },

    #[error("Alignment error: address 0x{address:x}, required alignment {alignment}")]
    AlignmentError { address: Address, alignment: Size },
}

/// Why a pool refused an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReleaseReason {
    /// Address lies outside the pool's buffer
    OutOfBounds,
    /// Address is inside the buffer but not at a block start
    Misaligned,
}

impl fmt::Display for InvalidReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InvalidReleaseReason::OutOfBounds => write!(f, "outside pool bounds"),
            InvalidReleaseReason::Misaligned => write!(f, "not a block start"),
        }
    }
}

/// Which acquisition family produced an allocation
///
/// Release must go through the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPath {
    /// Plain or tagged heap acquisition
    Heap,
    /// Block drawn from the pool with this id
    Pool(PoolId),
}

impl fmt::Display for AllocationPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocationPath::Heap => write!(f, "heap"),
            AllocationPath::Pool(id) => write!(f, "pool#{}", id),
        }
    }
}

/// Diagnostic label attached to a tracked allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Unknown,
    UnknownArray,
    Site { file: &'static str, line: u32 },
    Pool,
}

impl Origin {
    /// Origin of whoever called the enclosing `#[track_caller]` function
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Origin::Site {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Origin::Unknown => write!(f, "unknown"),
            Origin::UnknownArray => write!(f, "unknown[]"),
            Origin::Site { file, line } => write!(f, "{}:{}", file, line),
            Origin::Pool => write!(f, "pool"),
        }
    }
}

/// Metadata for one live allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationRecord {
    pub address: Address,
    pub size: Size,
    /// Alignment the storage was requested with; needed to rebuild the heap layout
    pub align: Size,
    pub origin: Origin,
    pub path: AllocationPath,
}

impl AllocationRecord {
    pub fn heap(address: Address, size: Size, align: Size, origin: Origin) -> Self {
        Self {
            address,
            size,
            align,
            origin,
            path: AllocationPath::Heap,
        }
    }

    pub fn pooled(address: Address, size: Size, pool: PoolId) -> Self {
        Self {
            address,
            size,
            align: 1,
            origin: Origin::Pool,
            path: AllocationPath::Pool(pool),
        }
    }
}

/// Point-in-time tracker statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub live_bytes: Size,
    pub live_allocations: usize,
    pub peak_live_bytes: Size,
    pub total_allocations: u64,
    pub total_releases: u64,
    pub rejected_releases: u64,
    pub reserve_held: bool,
    /// Heap exhaustions reported to the tracker, recovered or not
    pub exhaustion_events: u64,
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub id: PoolId,
    pub block_size: Size,
    pub block_count: usize,
    pub free_blocks: usize,
    pub used_bytes: Size,
    pub peak_used_bytes: Size,
}

impl PoolStats {
    /// Fraction of blocks currently loaned out (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.block_count == 0 {
            0.0
        } else {
            (self.block_count - self.free_blocks) as f64 / self.block_count as f64
        }
    }
}

/// Outcome of one exhaustion-recovery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The emergency reserve was just released; the caller may retry once more
    RetryPossible,
    /// Nothing left to release
    Unavailable,
}
