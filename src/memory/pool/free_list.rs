/*!
 * Block Free List
 * Stack of free block offsets for a fixed-block pool
 */

use crate::core::types::Size;
use crate::memory::types::{MemoryError, MemoryResult};

/// Free blocks of one pool, stored as byte offsets from the pool base
///
/// Stack discipline: the most recently freed block is handed out first.
/// All blocks are the same size, so LIFO costs nothing in fragmentation
/// and keeps recently touched memory hot.
#[derive(Debug)]
pub(super) struct FreeList {
    offsets: Vec<Size>,
}

impl FreeList {
    /// Free list holding every block of the pool, ascending by offset
    pub fn full(block_size: Size, block_count: usize) -> MemoryResult<Self> {
        let mut offsets = Vec::new();
        offsets
            .try_reserve_exact(block_count)
            .map_err(|_| MemoryError::AllocationFailure {
                requested: block_count.saturating_mul(std::mem::size_of::<Size>()),
            })?;
        offsets.extend((0..block_count).map(|i| i * block_size));
        Ok(Self { offsets })
    }

    #[inline]
    pub fn pop(&mut self) -> Option<Size> {
        self.offsets.pop()
    }

    /// Push a block back; capacity was reserved for every block up front
    #[inline]
    pub fn push(&mut self, offset: Size) {
        self.offsets.push(offset);
    }

    /// Linear scan, O(n) in free blocks
    pub fn contains(&self, offset: Size) -> bool {
        self.offsets.contains(&offset)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }
}
