/*!
 * Exhaustion Recovery Tests
 * One-shot emergency reserve release on heap exhaustion
 */

use memtrack::memory::{
    AllocationRouter, AllocationTracker, MemoryError, RawHeap, Recovery, SystemHeap,
};
use memtrack::MemoryConfig;
use pretty_assertions::assert_eq;
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Heap that refuses everything while `starved` is set
#[derive(Default)]
struct StarvedHeap {
    starved: AtomicBool,
    refusals: AtomicUsize,
}

impl RawHeap for StarvedHeap {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if self.starved.load(Ordering::SeqCst) {
            self.refusals.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        SystemHeap.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        SystemHeap.deallocate(ptr, layout)
    }
}

/// Heap that refuses exactly one request, then recovers
#[derive(Default)]
struct HiccupHeap {
    tripped: AtomicBool,
}

impl RawHeap for HiccupHeap {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            return None;
        }
        SystemHeap.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        SystemHeap.deallocate(ptr, layout)
    }
}

fn tracker_with_reserve() -> AllocationTracker {
    AllocationTracker::new(&MemoryConfig {
        emergency_reserve_bytes: 64 * 1024,
        ..MemoryConfig::default()
    })
}

#[test]
fn test_first_exhaustion_recovers_and_retries() {
    let tracker = tracker_with_reserve();
    let heap = HiccupHeap::default();
    let router = AllocationRouter::with_heap(&tracker, &heap);
    assert!(tracker.reserve_held());

    let ptr = router
        .acquire_tagged(512, "retry.rs", 7)
        .expect("Retry after releasing the reserve should succeed");
    assert!(!tracker.reserve_held());
    assert_eq!(tracker.stats().exhaustion_events, 1);
    assert_eq!(router.total_live_bytes(), 512);

    router.release(ptr).expect("Release failed");
}

#[test]
fn test_second_exhaustion_fails_without_recovery() {
    let tracker = tracker_with_reserve();
    let heap = StarvedHeap::default();
    heap.starved.store(true, Ordering::SeqCst);
    let router = AllocationRouter::with_heap(&tracker, &heap);

    assert_eq!(
        router.acquire(4096),
        Err(MemoryError::OutOfMemory { requested: 4096 })
    );
    // Initial attempt plus the single retry
    assert_eq!(heap.refusals.load(Ordering::SeqCst), 2);
    assert!(!tracker.reserve_held());

    assert_eq!(
        router.acquire(16),
        Err(MemoryError::OutOfMemory { requested: 16 })
    );
    assert_eq!(heap.refusals.load(Ordering::SeqCst), 3);
    assert_eq!(tracker.on_exhausted(1), Recovery::Unavailable);

    heap.starved.store(false, Ordering::SeqCst);
    let ptr = router.acquire(16).expect("Heap recovered");
    router.release(ptr).expect("Release failed");
    assert_eq!(tracker.stats().live_bytes, 0);
}

#[test]
fn test_without_reserve_exhaustion_fails_immediately() {
    let tracker = AllocationTracker::new(&MemoryConfig {
        emergency_reserve_bytes: 0,
        ..MemoryConfig::default()
    });
    let heap = StarvedHeap::default();
    heap.starved.store(true, Ordering::SeqCst);
    let router = AllocationRouter::with_heap(&tracker, &heap);

    assert!(matches!(
        router.acquire_array(4, 4),
        Err(MemoryError::OutOfMemory { requested: 16 })
    ));
    assert_eq!(heap.refusals.load(Ordering::SeqCst), 1);
}
