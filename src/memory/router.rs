/*!
 * Allocation Router
 *
 * Acquisition and release entry points for the three paths:
 *
 * | Path   | Acquire                          | Release            |
 * |--------|----------------------------------|--------------------|
 * | plain  | heap, origin `unknown`           | `release`          |
 * | tagged | heap, origin `file:line`         | `release[_tagged]` |
 * | pooled | pool block, origin `pool`        | `release_to_pool`  |
 *
 * Every path reports to an `AllocationTracker`. Records carry the path they
 * were acquired through, and a release through any other path is refused.
 */

use super::heap::SystemHeap;
use super::pool::MemoryPool;
use super::tracker::{AllocationTracker, LeakReport};
use super::traits::RawHeap;
use super::types::{AllocationPath, AllocationRecord, MemoryError, MemoryResult, Origin, Recovery};
use crate::core::limits::MIN_HEAP_ALIGN;
use crate::core::types::{Address, Size};
use std::alloc::Layout;
use std::ptr::NonNull;
use tracing::{debug, error};

/// Stateless dispatch over a tracker and a heap
#[derive(Debug, Clone, Copy)]
pub struct AllocationRouter<'t, H: RawHeap = SystemHeap> {
    tracker: &'t AllocationTracker,
    heap: H,
}

impl AllocationRouter<'static, SystemHeap> {
    /// Router over the process-wide tracker and the system heap
    pub fn global() -> Self {
        Self::new(AllocationTracker::global())
    }
}

impl<'t> AllocationRouter<'t, SystemHeap> {
    pub fn new(tracker: &'t AllocationTracker) -> Self {
        Self::with_heap(tracker, SystemHeap)
    }
}

impl<'t, H: RawHeap> AllocationRouter<'t, H> {
    pub fn with_heap(tracker: &'t AllocationTracker, heap: H) -> Self {
        Self { tracker, heap }
    }

    #[inline]
    pub fn tracker(&self) -> &'t AllocationTracker {
        self.tracker
    }

    /// Plain path: heap storage tagged `unknown`
    pub fn acquire(&self, size: Size) -> MemoryResult<NonNull<u8>> {
        self.acquire_heap(size, MIN_HEAP_ALIGN, Origin::Unknown)
    }

    /// Tagged path: heap storage tagged with the caller-supplied site
    pub fn acquire_tagged(
        &self,
        size: Size,
        file: &'static str,
        line: u32,
    ) -> MemoryResult<NonNull<u8>> {
        self.acquire_heap(size, MIN_HEAP_ALIGN, Origin::Site { file, line })
    }

    /// Tagged path with the caller's own file and line
    #[track_caller]
    pub fn acquire_here(&self, size: Size) -> MemoryResult<NonNull<u8>> {
        let origin = Origin::caller();
        self.acquire_heap(size, MIN_HEAP_ALIGN, origin)
    }

    /// Plain path for `count` elements of `element_size` bytes
    pub fn acquire_array(&self, count: usize, element_size: Size) -> MemoryResult<NonNull<u8>> {
        let size = count
            .checked_mul(element_size)
            .ok_or(MemoryError::SizeOverflow {
                count,
                element_size,
            })?;
        self.acquire_heap(size, MIN_HEAP_ALIGN, Origin::UnknownArray)
    }

    /// Pooled path: one block, provided `size` fits in it
    pub fn acquire_from_pool(&self, pool: &MemoryPool, size: Size) -> MemoryResult<NonNull<u8>> {
        if size > pool.block_size() {
            debug!(requested = size, block_size = pool.block_size(), "Request too large for pool");
            return Err(MemoryError::RequestTooLarge {
                requested: size,
                block_size: pool.block_size(),
            });
        }

        let ptr = pool.allocate()?;
        self.tracker.record_allocation(AllocationRecord::pooled(
            ptr.as_ptr() as Address,
            size,
            pool.id(),
        ));
        Ok(ptr)
    }

    /// Heap acquisition with one emergency-reserve retry on exhaustion
    ///
    /// A zero-byte request is served as one byte.
    pub(crate) fn acquire_heap(
        &self,
        size: Size,
        align: Size,
        origin: Origin,
    ) -> MemoryResult<NonNull<u8>> {
        let size = size.max(1);
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| MemoryError::OutOfMemory { requested: size })?;

        loop {
            if let Some(ptr) = self.heap.allocate(layout) {
                self.tracker.record_allocation(AllocationRecord::heap(
                    ptr.as_ptr() as Address,
                    size,
                    align,
                    origin,
                ));
                return Ok(ptr);
            }

            match self.tracker.on_exhausted(size) {
                Recovery::RetryPossible => continue,
                Recovery::Unavailable => {
                    error!(requested = size, origin = %origin, "Heap acquisition failed");
                    return Err(MemoryError::OutOfMemory { requested: size });
                }
            }
        }
    }

    /// Release heap storage from the plain or tagged path
    ///
    /// Memory the tracker does not know as heap-acquired is never freed.
    pub fn release(&self, ptr: NonNull<u8>) -> MemoryResult<()> {
        let address = ptr.as_ptr() as Address;
        let record = self
            .tracker
            .take_matching(address, AllocationPath::Heap)
            .map_err(|e| self.reject(e))?;

        // SAFETY: the record proves `ptr` came from `self.heap` with exactly
        // this size and alignment, which `acquire_heap` already validated
        let layout = unsafe { Layout::from_size_align_unchecked(record.size, record.align) };
        unsafe { self.heap.deallocate(ptr, layout) };

        debug!(size = record.size, address, origin = %record.origin, "Heap storage released");
        Ok(())
    }

    /// Same as `release`, also naming the release site in diagnostics
    pub fn release_tagged(&self, ptr: NonNull<u8>, file: &'static str, line: u32) -> MemoryResult<()> {
        debug!(
            address = ptr.as_ptr() as Address,
            release_site = %Origin::Site { file, line },
            "Tagged release"
        );
        self.release(ptr)
    }

    /// Return a pooled block to the pool it came from
    ///
    /// A block unknown to the tracker is judged by the pool alone. This also
    /// covers the window between `pool.allocate()` and `record_allocation`
    /// inside a concurrent `acquire_from_pool`: a stray release of that block
    /// is accepted by the pool, and the record written afterwards is stale.
    /// The pool lock is not held across the tracker call, so the window is
    /// not closed; callers must not release blocks they do not own.
    pub fn release_to_pool(&self, pool: &MemoryPool, ptr: NonNull<u8>) -> MemoryResult<()> {
        let address = ptr.as_ptr() as Address;
        let path = AllocationPath::Pool(pool.id());

        match self.tracker.take_matching(address, path) {
            Ok(record) => match pool.deallocate(ptr) {
                Ok(()) => Ok(()),
                // The block is already on the free list; the record was stale
                Err(e @ MemoryError::DoubleRelease(_)) => {
                    debug!(address, size = record.size, "Dropped record of an already free block");
                    Err(e)
                }
                Err(e) => {
                    self.tracker.reinstate(record);
                    Err(e)
                }
            },
            Err(MemoryError::UntrackedRelease(_)) => pool.deallocate(ptr),
            Err(e) => Err(self.reject(e)),
        }
    }

    pub fn total_live_bytes(&self) -> Size {
        self.tracker.total_live_bytes()
    }

    pub fn leak_report(&self) -> LeakReport {
        self.tracker.leak_report()
    }

    fn reject(&self, err: MemoryError) -> MemoryError {
        self.tracker.note_rejected(&err);
        err
    }
}

// =============================================================================
// PROCESS-WIDE ENTRY POINTS
// =============================================================================

pub fn acquire(size: Size) -> MemoryResult<NonNull<u8>> {
    AllocationRouter::global().acquire(size)
}

pub fn acquire_tagged(size: Size, file: &'static str, line: u32) -> MemoryResult<NonNull<u8>> {
    AllocationRouter::global().acquire_tagged(size, file, line)
}

#[track_caller]
pub fn acquire_here(size: Size) -> MemoryResult<NonNull<u8>> {
    AllocationRouter::global().acquire_here(size)
}

pub fn acquire_array(count: usize, element_size: Size) -> MemoryResult<NonNull<u8>> {
    AllocationRouter::global().acquire_array(count, element_size)
}

pub fn acquire_from_pool(pool: &MemoryPool, size: Size) -> MemoryResult<NonNull<u8>> {
    AllocationRouter::global().acquire_from_pool(pool, size)
}

pub fn release(ptr: NonNull<u8>) -> MemoryResult<()> {
    AllocationRouter::global().release(ptr)
}

pub fn release_tagged(ptr: NonNull<u8>, file: &'static str, line: u32) -> MemoryResult<()> {
    AllocationRouter::global().release_tagged(ptr, file, line)
}

pub fn release_to_pool(pool: &MemoryPool, ptr: NonNull<u8>) -> MemoryResult<()> {
    AllocationRouter::global().release_to_pool(pool, ptr)
}

pub fn total_live_bytes() -> Size {
    AllocationTracker::global().total_live_bytes()
}

pub fn leak_report() -> LeakReport {
    AllocationTracker::global().leak_report()
}
