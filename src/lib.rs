/*!
 * memtrack
 * Diagnostic memory management exposed as a library
 */

pub mod core;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use crate::core::MemoryConfig;
pub use memory::{
    install, AcquirePath, AllocationPath, AllocationRouter, AllocationTracker, ConstructError,
    LeakReport, MemoryError, MemoryPool, MemoryResult, Origin, TeardownGuard, TrackedBox,
};
pub use monitoring::init_tracing;
