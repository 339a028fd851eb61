/*!
 * Allocation Tracker Tests
 * Live-byte accounting across mixed acquisition paths
 */

use memtrack::memory::{AllocationRouter, AllocationTracker, MemoryError, MemoryPool, Origin};
use memtrack::MemoryConfig;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::ptr::NonNull;
use std::sync::Arc;
use std::thread;

fn small_reserve() -> MemoryConfig {
    MemoryConfig {
        emergency_reserve_bytes: 4096,
        ..MemoryConfig::default()
    }
}

#[test]
fn test_leak_report_lists_live_allocations() {
    let tracker = AllocationTracker::new(&small_reserve());
    let router = AllocationRouter::new(&tracker);

    let kept = router.acquire_tagged(48, "leaky.rs", 12).unwrap();
    let freed = router.acquire(16).unwrap();
    router.release(freed).unwrap();

    let report = tracker.leak_report();
    assert_eq!(report.len(), 1);
    assert_eq!(report.total_bytes, 48);
    assert_eq!(report.entries[0].address, kept.as_ptr() as usize);
    assert_eq!(
        report.entries[0].origin,
        Origin::Site {
            file: "leaky.rs",
            line: 12
        }
    );

    let text = report.to_string();
    assert!(text.contains("leaky.rs:12"), "report was: {}", text);
    assert!(report.to_json().unwrap().contains("\"total_bytes\": 48"));

    router.release(kept).unwrap();
    assert!(tracker.leak_report().is_clean());
}

#[test]
fn test_teardown_reports_once_and_frees_reserve() {
    let tracker = AllocationTracker::new(&small_reserve());
    let router = AllocationRouter::new(&tracker);
    let leaked = router.acquire(32).unwrap();
    assert!(tracker.reserve_held());

    let report = tracker.teardown().expect("First teardown should report");
    assert_eq!(report.total_bytes, 32);
    assert!(!tracker.reserve_held());
    assert!(tracker.is_torn_down());
    assert!(tracker.teardown().is_none());

    router.release(leaked).unwrap();
}

#[test]
fn test_concurrent_mixed_paths() {
    let tracker = Arc::new(AllocationTracker::new(&small_reserve()));
    let pool = Arc::new(MemoryPool::new(64, 64 * 32).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let tracker = Arc::clone(&tracker);
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let router = AllocationRouter::new(&tracker);
                for i in 0..200 {
                    let heap = router.acquire_tagged(8 + i % 64, "worker.rs", t).unwrap();
                    if let Ok(block) = router.acquire_from_pool(&pool, 32) {
                        router.release_to_pool(&pool, block).unwrap();
                    }
                    router.release(heap).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Worker thread panicked");
    }

    let stats = tracker.stats();
    assert_eq!(stats.live_bytes, 0);
    assert_eq!(stats.live_allocations, 0);
    assert_eq!(stats.total_allocations, stats.total_releases);
    assert_eq!(pool.used_bytes(), 0);
}

#[derive(Debug, Clone)]
enum Step {
    Plain(usize),
    Tagged(usize),
    Pooled(usize),
    Release(usize),
    ReleaseBogus,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1usize..512).prop_map(Step::Plain),
        (1usize..512).prop_map(Step::Tagged),
        (1usize..=64).prop_map(Step::Pooled),
        any::<usize>().prop_map(Step::Release),
        Just(Step::ReleaseBogus),
    ]
}

enum Held {
    Heap(NonNull<u8>, usize),
    Pool(NonNull<u8>, usize),
}

proptest! {
    #[test]
    fn prop_live_bytes_match_outstanding(steps in prop::collection::vec(step(), 0..96)) {
        let tracker = AllocationTracker::new(&MemoryConfig {
            emergency_reserve_bytes: 0,
            ..MemoryConfig::default()
        });
        let router = AllocationRouter::new(&tracker);
        let pool = MemoryPool::new(64, 64 * 16).unwrap();
        let mut held: Vec<Held> = Vec::new();
        let mut bogus = 0u32;

        for step in steps {
            match step {
                Step::Plain(size) => {
                    held.push(Held::Heap(router.acquire(size).unwrap(), size));
                }
                Step::Tagged(size) => {
                    let ptr = router.acquire_tagged(size, "prop.rs", 1).unwrap();
                    held.push(Held::Heap(ptr, size));
                }
                Step::Pooled(size) => match router.acquire_from_pool(&pool, size) {
                    Ok(ptr) => held.push(Held::Pool(ptr, size)),
                    Err(e) => {
                        prop_assert_eq!(e, MemoryError::Exhausted);
                    }
                },
                Step::Release(i) if !held.is_empty() => {
                    match held.swap_remove(i % held.len()) {
                        Held::Heap(ptr, _) => {
                            prop_assert!(router.release(ptr).is_ok());
                        }
                        Held::Pool(ptr, _) => {
                            prop_assert!(router.release_to_pool(&pool, ptr).is_ok());
                        }
                    }
                }
                Step::ReleaseBogus => {
                    let before = router.total_live_bytes();
                    let ptr = NonNull::from(&mut bogus).cast::<u8>();
                    prop_assert!(
                        matches!(router.release(ptr), Err(MemoryError::UntrackedRelease(_))),
                        "bogus release must be untracked"
                    );
                    prop_assert_eq!(router.total_live_bytes(), before);
                }
                _ => {}
            }

            let expected: usize = held
                .iter()
                .map(|h| match h {
                    Held::Heap(_, size) | Held::Pool(_, size) => *size,
                })
                .sum();
            prop_assert_eq!(router.total_live_bytes(), expected);
        }

        for h in held {
            match h {
                Held::Heap(ptr, _) => router.release(ptr).unwrap(),
                Held::Pool(ptr, _) => router.release_to_pool(&pool, ptr).unwrap(),
            }
        }
        prop_assert!(tracker.leak_report().is_clean());
    }
}
