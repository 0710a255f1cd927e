//! Bucket - fixed-block region tracked by an occupancy ledger
//!
//! A bucket carves `block_size * block_count` bytes from a backing allocator
//! and hands them out in runs of whole blocks, first-fit by block index.
//! Alongside the occupancy ledger it keeps a second bitmap marking the first
//! block of every live allocation, so a free with the wrong pointer or the
//! wrong size is rejected instead of clearing someone else's blocks.

use std::fmt;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use void_structures::bitset;

use crate::config::BucketDescription;
use crate::error::{InvalidFree, PoolError, PoolResult};
use crate::sync::Guarded;
use crate::SharedAllocator;

/// Number of blocks a request of `size` bytes occupies; zero-byte requests take one block
#[inline]
pub(crate) fn blocks_needed(size: usize, block_size: usize) -> usize {
    debug_assert!(block_size > 0);
    size.div_ceil(block_size).max(1)
}

/// Occupancy bits followed by allocation-start bits, both `size_bytes` long
struct Ledger {
    bits: NonNull<u8>,
    size_bytes: usize,
    used_blocks: usize,
    #[cfg(feature = "tracking")]
    peak_blocks: usize,
}

// Safety: the ledger bytes are only reached through the bucket's lock
unsafe impl Send for Ledger {}

impl Ledger {
    fn empty() -> Self {
        Self {
            bits: NonNull::dangling(),
            size_bytes: 0,
            used_blocks: 0,
            #[cfg(feature = "tracking")]
            peak_blocks: 0,
        }
    }

    fn occupancy(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.bits.as_ptr(), self.size_bytes) }
    }

    fn split_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        let all = unsafe { slice::from_raw_parts_mut(self.bits.as_ptr(), self.size_bytes * 2) };
        all.split_at_mut(self.size_bytes)
    }

    fn claim(&mut self, block_count: usize, blocks: usize) -> Option<usize> {
        let (occupancy, starts) = self.split_mut();
        let first = bitset::find_clear_run(occupancy, block_count, blocks)?;

        bitset::set_range(occupancy, first, blocks);
        bitset::set(starts, first);

        self.used_blocks += blocks;
        #[cfg(feature = "tracking")]
        {
            self.peak_blocks = self.peak_blocks.max(self.used_blocks);
        }
        Some(first)
    }

    fn release(&mut self, block_count: usize, first: usize, blocks: usize) -> Result<(), InvalidFree> {
        let (occupancy, starts) = self.split_mut();

        if first >= block_count || !bitset::get(starts, first) {
            return Err(InvalidFree::NotAllocated { block: first });
        }

        let end = match first.checked_add(blocks) {
            Some(end) if blocks > 0 && end <= block_count => end,
            _ => return Err(InvalidFree::SizeMismatch { block: first, blocks }),
        };
        let mismatched = !bitset::is_range_set(occupancy, first, blocks)
            || bitset::any_in_range(starts, first + 1, blocks - 1)
            // a shorter size would leave the tail of this allocation behind
            || (end < block_count && bitset::get(occupancy, end) && !bitset::get(starts, end));
        if mismatched {
            return Err(InvalidFree::SizeMismatch { block: first, blocks });
        }

        bitset::clear_range(occupancy, first, blocks);
        bitset::clear(starts, first);
        self.used_blocks -= blocks;
        Ok(())
    }

    fn clear(&mut self) {
        let (occupancy, starts) = self.split_mut();
        occupancy.fill(0);
        starts.fill(0);
        self.used_blocks = 0;
    }
}

/// Bucket statistics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketStats {
    pub block_size: usize,
    pub block_count: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    pub largest_free_run: usize,
    #[cfg(feature = "tracking")]
    pub peak_blocks: usize,
}

/// A region of equal-size blocks plus its ledger
pub struct Bucket {
    block_size: usize,
    block_count: usize,
    memory: NonNull<u8>,
    ledger: CachePadded<Guarded<Ledger>>,
    backing: Option<SharedAllocator>,
}

// Safety: the block region is only handed out in disjoint runs, and the
// ledger deciding those runs sits behind the bucket's lock
unsafe impl Send for Bucket {}
#[cfg(feature = "lock")]
unsafe impl Sync for Bucket {}

impl Bucket {
    /// Create an uninitialized bucket
    pub fn new() -> Self {
        Self {
            block_size: 0,
            block_count: 0,
            memory: NonNull::dangling(),
            ledger: CachePadded::new(Guarded::new(Ledger::empty())),
            backing: None,
        }
    }

    /// Carve block storage and ledger from `backing`
    ///
    /// On failure the bucket stays uninitialized and anything already carved
    /// is handed back.
    pub fn initialize(
        &mut self,
        block_size: usize,
        block_count: usize,
        backing: &SharedAllocator,
    ) -> PoolResult<()> {
        if self.is_initialized() {
            return Err(PoolError::AlreadyInitialized);
        }

        let desc = BucketDescription::new(block_size, block_count);
        if !desc.is_valid() {
            return Err(PoolError::InvalidDescription {
                block_size,
                block_count,
            });
        }

        let memory_size = desc.memory_size();
        let ledger_bytes = bitset::bytes_for(block_count);
        // occupancy and allocation-start bitmaps
        let ledger_total = ledger_bytes
            .checked_mul(2)
            .ok_or(PoolError::InvalidDescription {
                block_size,
                block_count,
            })?;

        let memory = backing.allocate(memory_size).ok_or(PoolError::BackingExhausted {
            requested: memory_size,
        })?;

        let Some(bits) = backing.allocate(ledger_total) else {
            unsafe { backing.deallocate(memory, memory_size) };
            return Err(PoolError::BackingExhausted {
                requested: ledger_total,
            });
        };

        unsafe { ptr::write_bytes(bits.as_ptr(), 0, ledger_total) };

        self.block_size = block_size;
        self.block_count = block_count;
        self.memory = memory;
        *self.ledger.get_mut() = Ledger {
            bits,
            size_bytes: ledger_bytes,
            ..Ledger::empty()
        };
        self.backing = Some(Arc::clone(backing));

        log::debug!(
            "Initialized bucket: {} blocks of {} bytes at {:p}",
            block_count,
            block_size,
            memory
        );
        Ok(())
    }

    /// Whether storage has been carved for this bucket
    pub fn is_initialized(&self) -> bool {
        self.backing.is_some()
    }

    /// Allocate a run of blocks covering `size` bytes
    ///
    /// `None` when no contiguous run is free; the bucket is full or fragmented.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.allocate_blocks(size)
            .map(|(first, _)| self.block_ptr(first))
    }

    /// Free an allocation made with the same `size`
    pub fn deallocate(&self, ptr: NonNull<u8>, size: usize) -> Result<(), InvalidFree> {
        let first = self.block_index(ptr.as_ptr())?;
        let blocks = blocks_needed(size, self.block_size);
        self.release_blocks(first, blocks)
    }

    /// Whether `ptr` lies inside this bucket's block storage
    pub fn contains(&self, ptr: *const u8) -> bool {
        if !self.is_initialized() {
            return false;
        }
        let base = self.memory.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= base && addr < base + self.memory_size_bytes()
    }

    /// Number of blocks a request of `size` bytes would take here
    pub fn blocks_for(&self, size: usize) -> Option<usize> {
        self.is_initialized()
            .then(|| blocks_needed(size, self.block_size))
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Bytes of block storage
    pub fn memory_size_bytes(&self) -> usize {
        self.block_size * self.block_count
    }

    /// Bytes in the occupancy ledger
    pub fn ledger_size_bytes(&self) -> usize {
        bitset::bytes_for(self.block_count)
    }

    /// Copy of the occupancy ledger, one bit per block
    pub fn ledger_snapshot(&self) -> Vec<u8> {
        self.ledger.with(|ledger| ledger.occupancy().to_vec())
    }

    /// Number of occupied blocks
    pub fn used_blocks(&self) -> usize {
        self.ledger.with(|ledger| ledger.used_blocks)
    }

    /// Get statistics
    pub fn stats(&self) -> BucketStats {
        self.ledger.with(|ledger| BucketStats {
            block_size: self.block_size,
            block_count: self.block_count,
            used_blocks: ledger.used_blocks,
            free_blocks: self.block_count - ledger.used_blocks,
            largest_free_run: bitset::longest_clear_run(ledger.occupancy(), self.block_count),
            #[cfg(feature = "tracking")]
            peak_blocks: ledger.peak_blocks,
        })
    }

    /// Mark every block free
    pub fn reset(&mut self) {
        self.ledger.get_mut().clear();
    }

    pub(crate) fn allocate_blocks(&self, size: usize) -> Option<(usize, usize)> {
        if !self.is_initialized() {
            return None;
        }

        let blocks = blocks_needed(size, self.block_size);
        if blocks > self.block_count {
            return None;
        }

        let first = self
            .ledger
            .with(|ledger| ledger.claim(self.block_count, blocks))?;
        Some((first, blocks))
    }

    pub(crate) fn release_blocks(&self, first: usize, blocks: usize) -> Result<(), InvalidFree> {
        self.ledger
            .with(|ledger| ledger.release(self.block_count, first, blocks))
    }

    pub(crate) fn block_ptr(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.block_count);
        unsafe { NonNull::new_unchecked(self.memory.as_ptr().add(index * self.block_size)) }
    }

    fn block_index(&self, ptr: *const u8) -> Result<usize, InvalidFree> {
        if !self.contains(ptr) {
            return Err(InvalidFree::ForeignPointer { addr: ptr as usize });
        }

        let offset = ptr as usize - self.memory.as_ptr() as usize;
        if offset % self.block_size != 0 {
            return Err(InvalidFree::Misaligned {
                offset,
                block_size: self.block_size,
            });
        }
        Ok(offset / self.block_size)
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        let Some(backing) = self.backing.take() else {
            return;
        };

        let memory_size = self.memory_size_bytes();
        let ledger = self.ledger.get_mut();
        // reverse carve order, so LIFO parents can reclaim both
        unsafe {
            backing.deallocate(ledger.bits, ledger.size_bytes * 2);
            backing.deallocate(self.memory, memory_size);
        }
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count)
            .field("used_blocks", &self.used_blocks())
            .finish()
    }
}
