/*!
 * Allocation Tracker
 *
 * Registry of live allocations for leak and usage accounting.
 *
 * ## Concurrency
 *
 * The record map and its counters sit behind one mutex; every operation is
 * fully serialised. No tracker lock is ever held while calling into a pool,
 * so tracker and pool locks have no ordering between them.
 *
 * ## Lifecycle
 *
 * A process-wide instance is created lazily on first use (see `global`).
 * Teardown emits the final leak report and frees the emergency reserve; it
 * runs exactly once, either through `TeardownGuard`, an explicit
 * `teardown()` call, or `Drop` for standalone trackers.
 */

mod global;
mod reserve;
mod report;

pub use global::{install, TeardownGuard};
pub use report::{LeakEntry, LeakReport};
pub use reserve::EmergencyReserve;

use crate::core::config::MemoryConfig;
use crate::core::types::{Address, Size};
use crate::memory::types::{
    AllocationPath, AllocationRecord, MemoryError, MemoryResult, Recovery, TrackerStats,
};
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
struct TrackerState {
    records: HashMap<Address, AllocationRecord, RandomState>,
    live_bytes: Size,
    peak_live_bytes: Size,
    total_allocations: u64,
    total_releases: u64,
    rejected_releases: u64,
}

impl TrackerState {
    fn insert(&mut self, record: AllocationRecord) -> Option<AllocationRecord> {
        self.live_bytes += record.size;
        let replaced = self.records.insert(record.address, record);
        if let Some(ref old) = replaced {
            self.live_bytes -= old.size;
        }
        self.peak_live_bytes = self.peak_live_bytes.max(self.live_bytes);
        replaced
    }

    fn remove(&mut self, address: Address) -> Option<AllocationRecord> {
        let record = self.records.remove(&address)?;
        self.live_bytes -= record.size;
        Some(record)
    }
}

/// Registry mapping live addresses to their allocation metadata
#[derive(Debug)]
pub struct AllocationTracker {
    state: Mutex<TrackerState>,
    reserve: EmergencyReserve,
    exhaustion_events: AtomicU64,
    torn_down: AtomicBool,
}

impl AllocationTracker {
    /// Standalone tracker; creates its emergency reserve immediately
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            reserve: EmergencyReserve::new(config.emergency_reserve_bytes),
            exhaustion_events: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Record a successful acquisition
    ///
    /// A null address is ignored.
    pub fn record_allocation(&self, record: AllocationRecord) {
        if record.address == 0 {
            return;
        }

        let (address, size, origin, path) =
            (record.address, record.size, record.origin, record.path);
        let replaced = {
            let mut state = self.state.lock();
            state.total_allocations += 1;
            state.insert(record)
        };

        if let Some(old) = replaced {
            warn!(
                address,
                stale_size = old.size,
                stale_origin = %old.origin,
                "Allocation recorded over a live record; previous record dropped"
            );
        }
        debug!(size, origin = %origin, path = %path, address, "Allocation recorded");
    }

    /// Forget a tracked allocation regardless of its path
    ///
    /// Untracked addresses are reported and change nothing; the tracker never
    /// frees memory itself.
    pub fn record_deallocation(&self, address: Address) -> MemoryResult<AllocationRecord> {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.remove(address);
            match removed {
                Some(_) => state.total_releases += 1,
                None => state.rejected_releases += 1,
            }
            removed
        };

        match removed {
            Some(record) => {
                debug!(size = record.size, address, "Deallocation recorded");
                Ok(record)
            }
            None => {
                warn!(address, "Attempted to release untracked memory");
                Err(MemoryError::UntrackedRelease(address))
            }
        }
    }

    /// Remove the record for `address` only if it was acquired via `path`
    ///
    /// Does not log or count failures; callers decide how to report them.
    pub(crate) fn take_matching(
        &self,
        address: Address,
        path: AllocationPath,
    ) -> MemoryResult<AllocationRecord> {
        let mut state = self.state.lock();
        let acquired = match state.records.get(&address) {
            Some(record) => record.path,
            None => return Err(MemoryError::UntrackedRelease(address)),
        };
        if acquired != path {
            return Err(MemoryError::PathMismatch {
                address,
                acquired,
                released: path,
            });
        }

        state.total_releases += 1;
        state
            .remove(address)
            .ok_or(MemoryError::UntrackedRelease(address))
    }

    /// Put back a record taken by `take_matching` whose release was then refused
    pub(crate) fn reinstate(&self, record: AllocationRecord) {
        let mut state = self.state.lock();
        state.total_releases = state.total_releases.saturating_sub(1);
        state.insert(record);
    }

    /// Log and count a refused release
    pub(crate) fn note_rejected(&self, err: &MemoryError) {
        self.state.lock().rejected_releases += 1;
        warn!(error = %err, "Release rejected");
    }

    pub fn is_tracked(&self, address: Address) -> bool {
        self.state.lock().records.contains_key(&address)
    }

    /// Copy of the record for `address`, if tracked
    pub fn record(&self, address: Address) -> Option<AllocationRecord> {
        self.state.lock().records.get(&address).cloned()
    }

    /// Sum of sizes of all live records
    pub fn total_live_bytes(&self) -> Size {
        self.state.lock().live_bytes
    }

    pub fn live_allocations(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Snapshot of every live record, sorted by address
    pub fn leak_report(&self) -> LeakReport {
        let state = self.state.lock();
        LeakReport::from_records(state.records.values())
    }

    /// Exhaustion hook for the heap paths
    ///
    /// Frees the emergency reserve the first time and answers `RetryPossible`;
    /// every later call answers `Unavailable` straight away.
    pub fn on_exhausted(&self, requested: Size) -> Recovery {
        self.exhaustion_events.fetch_add(1, Ordering::Relaxed);

        if self.reserve.release() {
            warn!(
                requested,
                reserve_bytes = self.reserve.size(),
                "Heap exhausted; emergency reserve released, retrying"
            );
            Recovery::RetryPossible
        } else {
            error!(requested, "Heap exhausted and no emergency reserve remains");
            Recovery::Unavailable
        }
    }

    pub fn reserve_held(&self) -> bool {
        self.reserve.is_held()
    }

    pub fn stats(&self) -> TrackerStats {
        let state = self.state.lock();
        TrackerStats {
            live_bytes: state.live_bytes,
            live_allocations: state.records.len(),
            peak_live_bytes: state.peak_live_bytes,
            total_allocations: state.total_allocations,
            total_releases: state.total_releases,
            rejected_releases: state.rejected_releases,
            reserve_held: self.reserve.is_held(),
            exhaustion_events: self.exhaustion_events.load(Ordering::Relaxed),
        }
    }

    /// Emit the final leak report and free the reserve
    ///
    /// Only the first call does anything; it returns the report it emitted.
    pub fn teardown(&self) -> Option<LeakReport> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return None;
        }

        let report = self.leak_report();
        report.emit();
        self.reserve.release();
        Some(report)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

impl Default for AllocationTracker {
    fn default() -> Self {
        Self::new(&MemoryConfig::default())
    }
}

impl Drop for AllocationTracker {
    fn drop(&mut self) {
        self.teardown();
    }
}
