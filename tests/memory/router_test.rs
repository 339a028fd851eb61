/*!
 * Process-Wide Router Tests
 * Free-function entry points over the global tracker
 *
 * Every test here touches the shared tracker, so they run serially and only
 * assert on deltas.
 */

use memtrack::memory::{self, AllocationPath, AllocationTracker, MemoryError, MemoryPool};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::ptr::NonNull;

#[test]
#[serial]
fn test_tagged_acquire_release_round_trip() {
    let before = memory::total_live_bytes();

    let ptr = memory::acquire_tagged(100, "f.cc", 10).expect("Tagged acquisition failed");
    assert_eq!(memory::total_live_bytes(), before + 100);

    memory::release(ptr).expect("Release failed");
    assert_eq!(memory::total_live_bytes(), before);
    assert!(
        memory::leak_report()
            .entries
            .iter()
            .all(|entry| entry.address != ptr.as_ptr() as usize),
        "Released allocation must not appear in the leak report"
    );
}

#[test]
#[serial]
fn test_acquire_here_records_this_file() {
    let ptr = memory::acquire_here(24).expect("Acquisition failed");
    let record = AllocationTracker::global()
        .record(ptr.as_ptr() as usize)
        .expect("Allocation should be tracked");
    assert!(record.origin.to_string().contains("router_test.rs"));

    memory::release_tagged(ptr, file!(), line!()).expect("Release failed");
}

#[test]
#[serial]
fn test_untracked_release_changes_nothing() {
    let before = memory::total_live_bytes();
    let mut local = [0u8; 32];
    let ptr = NonNull::new(local.as_mut_ptr()).unwrap();

    assert_eq!(
        memory::release(ptr),
        Err(MemoryError::UntrackedRelease(ptr.as_ptr() as usize))
    );
    assert_eq!(memory::total_live_bytes(), before);
}

#[test]
#[serial]
fn test_pool_block_cannot_leave_through_heap_path() {
    let pool = MemoryPool::new(256, 256 * 4).expect("Failed to create pool");
    let before = memory::total_live_bytes();

    let block = memory::acquire_from_pool(&pool, 200).expect("Pool acquisition failed");
    assert_eq!(memory::total_live_bytes(), before + 200);

    assert_eq!(
        memory::release(block),
        Err(MemoryError::PathMismatch {
            address: block.as_ptr() as usize,
            acquired: AllocationPath::Pool(pool.id()),
            released: AllocationPath::Heap,
        })
    );
    assert_eq!(memory::total_live_bytes(), before + 200);
    assert_eq!(pool.used_bytes(), 256);

    memory::release_to_pool(&pool, block).expect("Pool release failed");
    assert_eq!(memory::total_live_bytes(), before);
    assert_eq!(pool.used_bytes(), 0);
}

#[test]
#[serial]
fn test_array_acquisition_overflow() {
    assert_eq!(
        memory::acquire_array(usize::MAX / 2, 4),
        Err(MemoryError::SizeOverflow {
            count: usize::MAX / 2,
            element_size: 4
        })
    );

    let before = memory::total_live_bytes();
    let ptr = memory::acquire_array(10, 12).expect("Array acquisition failed");
    assert_eq!(memory::total_live_bytes(), before + 120);
    memory::release(ptr).expect("Release failed");
}
