/*!
 * Emergency Reserve
 * Held-back buffer released at most once to give a starved heap some slack
 */

use crate::core::types::Size;
use parking_lot::Mutex;
use std::fmt;
use tracing::{info, warn};

/// One-shot safety valve for heap exhaustion
///
/// This is not general reclamation: once the buffer has been handed back
/// there is nothing left to release.
pub struct EmergencyReserve {
    buffer: Mutex<Option<Vec<u8>>>,
    size: Size,
    created: bool,
}

impl EmergencyReserve {
    /// Reserve and touch `size` bytes; a size of zero creates an empty reserve
    pub fn new(size: Size) -> Self {
        let buffer = if size == 0 {
            None
        } else {
            let mut buffer = Vec::new();
            match buffer.try_reserve_exact(size) {
                Ok(()) => {
                    // Touch the pages so releasing them gives back resident memory
                    buffer.resize(size, 0u8);
                    info!(bytes = size, "Emergency reserve created");
                    Some(buffer)
                }
                Err(e) => {
                    warn!(bytes = size, error = %e, "Could not create emergency reserve");
                    None
                }
            }
        };

        Self {
            created: buffer.is_some(),
            buffer: Mutex::new(buffer),
            size,
        }
    }

    /// Free the reserve; `true` only for the call that actually freed it
    pub fn release(&self) -> bool {
        let released = self.buffer.lock().take();
        released.is_some()
    }

    pub fn is_held(&self) -> bool {
        self.buffer.lock().is_some()
    }

    /// Whether the reserve was ever successfully created
    pub fn was_created(&self) -> bool {
        self.created
    }

    pub fn size(&self) -> Size {
        self.size
    }
}

impl fmt::Debug for EmergencyReserve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmergencyReserve")
            .field("size", &self.size)
            .field("held", &self.is_held())
            .finish_non_exhaustive()
    }
}
