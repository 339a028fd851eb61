/*!
 * Scoped Construction Tests
 * Storage cleanup on failed construction, per acquisition path
 */

use memtrack::memory::{
    AcquirePath, AllocationRouter, AllocationTracker, ConstructError, MemoryError, MemoryPool,
};
use memtrack::MemoryConfig;
use pretty_assertions::assert_eq;

#[derive(Debug)]
struct Connection {
    port: u16,
    buffer: Vec<u8>,
}

#[derive(Debug, PartialEq)]
enum ConnectError {
    Refused(u16),
}

impl Connection {
    fn open(port: u16) -> Result<Self, ConnectError> {
        if port == 0 {
            return Err(ConnectError::Refused(port));
        }
        Ok(Self {
            port,
            buffer: vec![0; 32],
        })
    }
}

fn tracker() -> AllocationTracker {
    AllocationTracker::new(&MemoryConfig {
        emergency_reserve_bytes: 0,
        ..MemoryConfig::default()
    })
}

#[test]
fn test_failed_construct_heap_path_nets_zero() {
    let tracker = tracker();
    let router = AllocationRouter::new(&tracker);
    let existing = router.acquire(40).unwrap();
    let before = router.total_live_bytes();

    for path in [AcquirePath::Plain, AcquirePath::here()] {
        let result = router.construct(path, || Connection::open(0));
        assert_eq!(
            result.unwrap_err(),
            ConstructError::Init(ConnectError::Refused(0))
        );
        assert_eq!(router.total_live_bytes(), before);
    }

    let stats = tracker.stats();
    assert_eq!(stats.total_allocations, 3);
    assert_eq!(stats.total_releases, 2);
    assert_eq!(stats.rejected_releases, 0);
    router.release(existing).unwrap();
}

#[test]
fn test_failed_construct_pool_path_returns_block() {
    let tracker = tracker();
    let router = AllocationRouter::new(&tracker);
    let pool = MemoryPool::new(128, 128 * 2).expect("Failed to create pool");

    let result = router.construct(AcquirePath::Pool(&pool), || Connection::open(0));
    assert!(matches!(result, Err(ConstructError::Init(_))));
    assert_eq!(pool.used_bytes(), 0);
    assert_eq!(pool.free_block_count(), 2);
    assert_eq!(router.total_live_bytes(), 0);

    // Both blocks are still usable afterwards
    let a = router
        .construct(AcquirePath::Pool(&pool), || Connection::open(80))
        .expect("Construction failed");
    let b = router
        .construct(AcquirePath::Pool(&pool), || Connection::open(443))
        .expect("Construction failed");
    assert_eq!(a.port + b.port, 523);
    assert_eq!(a.buffer.len(), 32);
    assert_eq!(pool.free_block_count(), 0);

    assert!(matches!(
        router.construct(AcquirePath::Pool(&pool), || Connection::open(22)),
        Err(ConstructError::Alloc(MemoryError::Exhausted))
    ));

    drop(a);
    b.release().expect("Release failed");
    assert_eq!(pool.used_bytes(), 0);
    assert_eq!(router.total_live_bytes(), 0);
}

#[test]
fn test_constructed_value_tracked_under_its_path() {
    let tracker = tracker();
    let router = AllocationRouter::new(&tracker);
    let pool = MemoryPool::new(128, 128).expect("Failed to create pool");

    let conn = router
        .construct(AcquirePath::Pool(&pool), || Connection::open(8080))
        .expect("Construction failed");
    let record = tracker
        .record(conn.address())
        .expect("Constructed value should be tracked");
    assert_eq!(record.size, std::mem::size_of::<Connection>());
    assert!(pool.contains(conn.address() as *const u8));

    drop(conn);
    assert!(tracker.leak_report().is_clean());
}
