/*!
 * Memory Module
 * Tracked allocation, fixed-block pools and path-matched release
 */

pub mod guard;
pub mod heap;
pub mod pool;
pub mod router;
pub mod tracker;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use guard::{construct, AcquirePath, ConstructError, TrackedBox};
pub use heap::SystemHeap;
pub use pool::MemoryPool;
pub use router::{
    acquire, acquire_array, acquire_from_pool, acquire_here, acquire_tagged, leak_report, release,
    release_tagged, release_to_pool, total_live_bytes, AllocationRouter,
};
pub use tracker::{install, AllocationTracker, EmergencyReserve, LeakEntry, LeakReport, TeardownGuard};
pub use traits::*;
pub use types::*;
