/*!
 * Fixed-Block Memory Pool
 *
 * One contiguous buffer carved into equal blocks and handed out from a free list.
 *
 * ## Invariants
 *
 * - `free_block_count() * block_size() + used_bytes() == capacity()`
 * - Every free-list entry is block-aligned and inside `[base, base + capacity)`
 * - No block appears twice in the free list
 *
 * Bounds, alignment and double-release checks run in every build profile.
 * The pool does not detect outstanding loans when it is dropped; every block
 * must be returned before the pool goes away.
 */

mod free_list;

use crate::core::config::MemoryConfig;
use crate::core::limits::{DEFAULT_BLOCK_SIZE, DEFAULT_POOL_SIZE, POOL_BASE_ALIGN};
use crate::core::types::{Address, PoolId, Size};
use crate::memory::heap::SystemHeap;
use crate::memory::traits::RawHeap;
use crate::memory::types::{InvalidReleaseReason, MemoryError, MemoryResult, PoolStats};
use free_list::FreeList;
use parking_lot::Mutex;
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct PoolState {
    free_list: FreeList,
    used: Size,
    peak_used: Size,
}

/// Fixed-block arena with an explicit free list
pub struct MemoryPool {
    id: PoolId,
    base: NonNull<u8>,
    layout: Layout,
    block_size: Size,
    pool_size: Size,
    block_count: usize,
    state: Mutex<PoolState>,
}

// SAFETY: `base` is only used to derive block pointers; it is never
// dereferenced by the pool itself, and all mutable bookkeeping lives behind
// `state`'s mutex.
unsafe impl Send for MemoryPool {}
unsafe impl Sync for MemoryPool {}

impl MemoryPool {
    /// Reserve `pool_size` bytes and split them into `pool_size / block_size` blocks
    ///
    /// Trailing bytes past the last whole block are never handed out.
    pub fn new(block_size: Size, pool_size: Size) -> MemoryResult<Self> {
        if block_size == 0 || pool_size == 0 {
            return Err(MemoryError::InvalidPoolGeometry {
                block_size,
                pool_size,
            });
        }

        let layout = Layout::from_size_align(pool_size, POOL_BASE_ALIGN)
            .map_err(|_| MemoryError::AllocationFailure {
                requested: pool_size,
            })?;
        let block_count = pool_size / block_size;
        let free_list = FreeList::full(block_size, block_count)?;

        let base = SystemHeap
            .allocate(layout)
            .ok_or(MemoryError::AllocationFailure {
                requested: pool_size,
            })?;

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            pool = id,
            blocks = block_count,
            block_size,
            "Memory pool created"
        );

        Ok(Self {
            id,
            base,
            layout,
            block_size,
            pool_size,
            block_count,
            state: Mutex::new(PoolState {
                free_list,
                used: 0,
                peak_used: 0,
            }),
        })
    }

    /// Pool with 1KB blocks over a 1MB buffer
    pub fn with_defaults() -> MemoryResult<Self> {
        Self::new(DEFAULT_BLOCK_SIZE, DEFAULT_POOL_SIZE)
    }

    /// Pool sized from configuration
    pub fn with_config(config: &MemoryConfig) -> MemoryResult<Self> {
        Self::new(config.default_block_size, config.default_pool_size)
    }

    /// Take the most recently freed block
    ///
    /// Returns `Exhausted` without touching any state when no block is free.
    pub fn allocate(&self) -> MemoryResult<NonNull<u8>> {
        let offset = {
            let mut state = self.state.lock();
            let offset = state.free_list.pop().ok_or(MemoryError::Exhausted)?;
            state.used += self.block_size;
            state.peak_used = state.peak_used.max(state.used);
            offset
        };

        let ptr = self.block_ptr(offset);
        debug!(pool = self.id, address = ptr.as_ptr() as usize, "Pool block allocated");
        Ok(ptr)
    }

    /// Return a block to the free list
    ///
    /// Rejected releases are logged and leave the pool unchanged.
    pub fn deallocate(&self, ptr: NonNull<u8>) -> MemoryResult<()> {
        let address = ptr.as_ptr() as Address;
        let offset = match self.offset_of(address) {
            Ok(offset) => offset,
            Err(e) => {
                warn!(pool = self.id, address, error = %e, "Rejected pool release");
                return Err(e);
            }
        };

        let mut state = self.state.lock();
        if state.free_list.contains(offset) {
            drop(state);
            warn!(pool = self.id, address, "Attempted to release a pool block twice");
            return Err(MemoryError::DoubleRelease(address));
        }

        state.free_list.push(offset);
        state.used -= self.block_size;
        drop(state);

        debug!(pool = self.id, address, "Pool block recycled");
        Ok(())
    }

    /// Whether `ptr` points anywhere inside the pool's usable range
    pub fn contains(&self, ptr: *const u8) -> bool {
        let address = ptr as Address;
        let base = self.base_address();
        address >= base && address - base < self.capacity()
    }

    #[inline]
    pub fn id(&self) -> PoolId {
        self.id
    }

    #[inline]
    pub fn block_size(&self) -> Size {
        self.block_size
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Bytes requested for the backing buffer
    #[inline]
    pub fn pool_size(&self) -> Size {
        self.pool_size
    }

    /// Bytes that can actually be handed out (`block_count * block_size`)
    #[inline]
    pub fn capacity(&self) -> Size {
        self.block_count * self.block_size
    }

    pub fn used_bytes(&self) -> Size {
        self.state.lock().used
    }

    pub fn free_block_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Consistent snapshot of all counters
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            id: self.id,
            block_size: self.block_size,
            block_count: self.block_count,
            free_blocks: state.free_list.len(),
            used_bytes: state.used,
            peak_used_bytes: state.peak_used,
        }
    }

    #[inline]
    fn base_address(&self) -> Address {
        self.base.as_ptr() as Address
    }

    fn offset_of(&self, address: Address) -> MemoryResult<Size> {
        let base = self.base_address();
        if address < base || address - base >= self.capacity() {
            return Err(MemoryError::InvalidRelease {
                address,
                reason: InvalidReleaseReason::OutOfBounds,
            });
        }

        let offset = address - base;
        if offset % self.block_size != 0 {
            return Err(MemoryError::InvalidRelease {
                address,
                reason: InvalidReleaseReason::Misaligned,
            });
        }
        Ok(offset)
    }

    #[inline]
    fn block_ptr(&self, offset: Size) -> NonNull<u8> {
        debug_assert!(offset < self.capacity());
        // SAFETY: offset is a block start inside the buffer, so the result is
        // in bounds of the original allocation and non-null
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        // SAFETY: base was allocated from SystemHeap with this layout in `new`
        unsafe { SystemHeap.deallocate(self.base, self.layout) };
        debug!(pool = self.id, "Memory pool destroyed");
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("id", &self.id)
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count)
            .field("pool_size", &self.pool_size)
            .finish_non_exhaustive()
    }
}
