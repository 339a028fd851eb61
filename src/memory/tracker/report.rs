/*!
 * Leak Report
 * Snapshot of every allocation still live when the report is taken
 */

use crate::core::types::{Address, Size};
use crate::memory::types::{AllocationRecord, Origin};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// One still-live allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakEntry {
    pub address: Address,
    pub size: Size,
    pub origin: Origin,
}

impl From<&AllocationRecord> for LeakEntry {
    fn from(record: &AllocationRecord) -> Self {
        Self {
            address: record.address,
            size: record.size,
            origin: record.origin,
        }
    }
}

/// Live allocations sorted by address, plus their byte total
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeakReport {
    pub entries: Vec<LeakEntry>,
    pub total_bytes: Size,
}

impl LeakReport {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a AllocationRecord>,
    {
        let mut entries: Vec<LeakEntry> = records.into_iter().map(LeakEntry::from).collect();
        entries.sort_by_key(|entry| entry.address);
        let total_bytes = entries.iter().map(|entry| entry.size).sum();
        Self {
            entries,
            total_bytes,
        }
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Log the report: one warning per leak plus a summary, or "no leaks"
    pub fn emit(&self) {
        if self.is_clean() {
            info!("Leak report: no leaks detected");
            return;
        }

        for entry in &self.entries {
            warn!(
                address = entry.address,
                size = entry.size,
                origin = %entry.origin,
                "Leaked allocation"
            );
        }
        warn!(
            leaks = self.entries.len(),
            bytes = self.total_bytes,
            "Leak report: allocations still live"
        );
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "====== Memory leak report ======")?;
        writeln!(f, "Live bytes: {}", self.total_bytes)?;
        if self.is_clean() {
            writeln!(f, "No leaks detected")?;
        } else {
            writeln!(f, "Detected {} leak(s):", self.entries.len())?;
            for entry in &self.entries {
                writeln!(
                    f,
                    "  leak: {} bytes at {} address 0x{:x}",
                    entry.size, entry.origin, entry.address
                )?;
            }
        }
        write!(f, "================================")
    }
}
