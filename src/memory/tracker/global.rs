/*!
 * Process-Wide Tracker
 * Lazy first-use initialisation and an explicit teardown hook
 */

use super::{AllocationTracker, LeakReport};
use crate::core::config::MemoryConfig;
use std::sync::OnceLock;
use tracing::info;

static GLOBAL_TRACKER: OnceLock<AllocationTracker> = OnceLock::new();

impl AllocationTracker {
    /// The process-wide tracker, created from `MemoryConfig::from_env()` on first use
    ///
    /// Statics are never dropped, so the final leak report needs an explicit
    /// hook; hold the guard returned by [`install`] for the life of `main`.
    pub fn global() -> &'static AllocationTracker {
        GLOBAL_TRACKER.get_or_init(|| {
            let config = MemoryConfig::from_env();
            info!(
                reserve_bytes = config.emergency_reserve_bytes,
                "Process-wide allocation tracker initialized"
            );
            AllocationTracker::new(&config)
        })
    }
}

/// Runs the global tracker's teardown when dropped
#[must_use = "dropping the guard immediately emits the final leak report"]
#[derive(Debug)]
pub struct TeardownGuard {
    tracker: &'static AllocationTracker,
}

impl TeardownGuard {
    /// Tear down now and hand back the report
    ///
    /// `None` if teardown already ran elsewhere.
    pub fn finish(self) -> Option<LeakReport> {
        self.tracker.teardown()
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.tracker.teardown();
    }
}

/// Initialise the global tracker and arm its teardown
pub fn install() -> TeardownGuard {
    TeardownGuard {
        tracker: AllocationTracker::global(),
    }
}
