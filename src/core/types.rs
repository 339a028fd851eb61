/*!
 * Core Types
 * Common types used across the allocator
 */

/// Address type for memory operations
pub type Address = usize;

/// Size type for memory operations
pub type Size = usize;

/// Identifier handed out to every `MemoryPool` at construction
pub type PoolId = u64;
