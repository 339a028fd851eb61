/*!
 * System Heap
 * Default `RawHeap` over the global allocator
 */

use super::traits::RawHeap;
use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

/// Heap backed by `std::alloc`
///
/// Zero-sized layouts never reach the global allocator: they get a dangling
/// pointer aligned to `layout.align()`, and releasing one does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHeap;

impl RawHeap for SystemHeap {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return NonNull::new(layout.align() as *mut u8);
        }
        // SAFETY: layout has a non-zero size
        NonNull::new(unsafe { alloc(layout) })
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        dealloc(ptr.as_ptr(), layout)
    }
}
