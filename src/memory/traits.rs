/*!
 * Memory Traits
 * Backing-store abstraction for the heap paths
 */

use std::alloc::Layout;
use std::ptr::NonNull;

/// Source of raw heap storage used by `AllocationRouter`
///
/// Returning `None` signals exhaustion; the router then consults the
/// tracker's emergency reserve before giving up.
pub trait RawHeap: Send + Sync {
    /// Allocate storage for `layout`
    ///
    /// Implementations must accept zero-sized layouts; the router itself
    /// never issues one.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return storage previously obtained from `allocate`
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `self.allocate(layout)` with the same layout
    /// and must not have been deallocated since.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

impl<H: RawHeap + ?Sized> RawHeap for &H {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}
