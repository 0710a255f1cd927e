//! Pool allocator - best-fit routing across fixed-block buckets
//!
//! Each request is scored against every bucket that could hold it: fewest
//! blocks used first, then fewest bytes wasted, then declaration order. The
//! best bucket is tried first; a bucket that is momentarily full passes the
//! request on to the next candidate.
//!
//! The `*_using_allocation_info` family records each pointer's size in a
//! fixed-capacity table, so callers that only keep the pointer (native
//! libraries with malloc/free-style signatures) can still free and resize.

use std::ptr::{self, NonNull};

use void_structures::FixedVec;

use crate::allocation::{AllocationInfo, PoolAllocation};
use crate::bucket::Bucket;
use crate::config::{BucketDescription, PoolConfig, MAX_ALLOCATION_INFOS, MAX_BUCKETS};
use crate::error::{InvalidFree, PoolError, PoolResult};
use crate::sync::Guarded;
use crate::{Allocator, SharedAllocator};

/// Ordering key for bucket selection; derived `Ord` compares fields in order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
struct BucketScore {
    blocks_used: usize,
    memory_wasted: usize,
    bucket: usize,
}

/// Buckets able to take a request, best first
struct Candidates {
    scores: [BucketScore; MAX_BUCKETS],
    len: usize,
}

impl Candidates {
    fn as_slice(&self) -> &[BucketScore] {
        &self.scores[..self.len]
    }
}

/// Pool statistics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub buckets: usize,
    pub capacity_bytes: usize,
    pub used_bytes: usize,
    pub tracked_allocations: usize,
}

/// Allocator over a fixed set of buckets
pub struct PoolAllocator {
    buckets: FixedVec<Bucket, MAX_BUCKETS>,
    allocation_infos: Guarded<FixedVec<AllocationInfo, MAX_ALLOCATION_INFOS>>,
    initialized: bool,
}

impl PoolAllocator {
    /// Create an allocator with no buckets; call [`initialize`](Self::initialize) once
    pub fn new() -> Self {
        Self {
            buckets: FixedVec::new(),
            allocation_infos: Guarded::new(FixedVec::new()),
            initialized: false,
        }
    }

    /// Create and initialize in one step
    pub fn with_buckets(
        descriptions: &[BucketDescription],
        backing: &SharedAllocator,
    ) -> PoolResult<Self> {
        let mut pool = Self::new();
        pool.initialize(descriptions, backing)?;
        Ok(pool)
    }

    /// Create from a loaded config
    pub fn from_config(config: &PoolConfig, backing: &SharedAllocator) -> PoolResult<Self> {
        Self::with_buckets(config.buckets(), backing)
    }

    /// Carve one bucket per description from `backing`
    ///
    /// All or nothing: if any bucket fails, the ones already carved are
    /// handed back and the pool stays uninitialized.
    pub fn initialize(
        &mut self,
        descriptions: &[BucketDescription],
        backing: &SharedAllocator,
    ) -> PoolResult<()> {
        if self.initialized {
            return Err(PoolError::AlreadyInitialized);
        }

        if descriptions.len() > MAX_BUCKETS {
            return Err(PoolError::TooManyBuckets {
                requested: descriptions.len(),
                max: MAX_BUCKETS,
            });
        }

        for desc in descriptions {
            if let Err(err) = self.push_bucket(desc, backing) {
                self.release_buckets();
                return Err(err);
            }
        }

        self.initialized = true;
        log::debug!(
            "Pool allocator initialized: {} buckets, {} bytes",
            self.buckets.len(),
            self.memory_size_bytes()
        );
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has succeeded
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Allocate `size` bytes from the best-fitting bucket with room
    ///
    /// `None` when every candidate bucket is exhausted.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.allocate_in_buckets(size)
            .map(|(bucket, first, _)| self.buckets[bucket].block_ptr(first))
    }

    /// Free an allocation made with the same `size`; null is a no-op
    ///
    /// A pointer that was also recorded by the size-free API loses its
    /// record, so a later tracked free of the same address is ignored.
    pub fn deallocate(&self, ptr: *mut u8, size: usize) -> Result<(), InvalidFree> {
        let Some(ptr) = NonNull::new(ptr) else {
            return Ok(());
        };

        // the blocks stay claimed until freed below, so no other record can
        // appear for this address in between
        let record = self
            .allocation_infos
            .with(|infos| infos.remove_first(|info| info.ptr == ptr));

        let result = self.free_blocks(ptr, size);
        if let (Err(_), Some(info)) = (&result, record) {
            let restored = self.allocation_infos.with(|infos| infos.push(info).is_ok());
            if !restored {
                log::warn!("Allocation info for {:p} dropped after a rejected free", ptr);
            }
        }
        result
    }

    /// Allocate and hand back an owned handle instead of a bare pointer
    pub fn allocate_handle(&self, size: usize) -> Option<PoolAllocation> {
        let (bucket, first_block, blocks) = self.allocate_in_buckets(size)?;
        let owner = &self.buckets[bucket];

        Some(PoolAllocation {
            ptr: owner.block_ptr(first_block),
            bucket,
            first_block,
            blocks,
            size,
            capacity: blocks * owner.block_size(),
        })
    }

    /// Release a handle from [`allocate_handle`](Self::allocate_handle)
    pub fn release(&self, allocation: PoolAllocation) -> Result<(), InvalidFree> {
        let bucket = self
            .buckets
            .get(allocation.bucket)
            .ok_or(InvalidFree::UnknownBucket {
                bucket: allocation.bucket,
            })?;

        if !bucket.contains(allocation.ptr.as_ptr()) {
            return Err(InvalidFree::ForeignPointer {
                addr: allocation.ptr.as_ptr() as usize,
            });
        }
        bucket.release_blocks(allocation.first_block, allocation.blocks)
    }

    /// Allocate and remember the size, for release without it later
    ///
    /// Fails (and rolls the allocation back) when the allocation-info table
    /// is full.
    pub fn allocate_using_allocation_info(&self, size: usize) -> Option<NonNull<u8>> {
        let ptr = self.allocate(size)?;

        // a record already holding this address is stale: the ledger just
        // granted these blocks
        let recorded = self.allocation_infos.with(|infos| {
            let info = AllocationInfo { ptr, size };
            match infos.iter_mut().find(|existing| existing.ptr == ptr) {
                Some(existing) => {
                    *existing = info;
                    true
                }
                None => infos.push(info).is_ok(),
            }
        });

        if !recorded {
            log::warn!(
                "Allocation info table full ({} entries), rolling back {} byte allocation",
                MAX_ALLOCATION_INFOS,
                size
            );
            self.free_sized(ptr, size);
            return None;
        }
        Some(ptr)
    }

    /// Free a pointer from [`allocate_using_allocation_info`](Self::allocate_using_allocation_info)
    ///
    /// Untracked pointers (including ones already freed this way) are
    /// ignored. Returns whether anything was freed.
    pub fn deallocate_using_allocation_info(&self, ptr: *mut u8) -> bool {
        let Some(ptr) = NonNull::new(ptr) else {
            return false;
        };

        let removed = self
            .allocation_infos
            .with(|infos| infos.remove_first(|info| info.ptr == ptr));

        match removed {
            Some(info) => {
                self.free_sized(info.ptr, info.size);
                true
            }
            None => {
                log::trace!("{:p} has no allocation info, ignoring free", ptr);
                false
            }
        }
    }

    /// Resize a tracked allocation, moving it to a fresh block run
    ///
    /// The first `min(old, new)` bytes are copied. On failure `None` is
    /// returned and the old allocation stays valid. A null pointer behaves
    /// like [`allocate_using_allocation_info`](Self::allocate_using_allocation_info).
    pub fn reallocate_using_allocation_info(
        &self,
        ptr: *mut u8,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let Some(old_ptr) = NonNull::new(ptr) else {
            return self.allocate_using_allocation_info(new_size);
        };

        let Some(old_size) = self.allocation_size(old_ptr.as_ptr()) else {
            log::warn!("Cannot reallocate {:p}: no allocation info", old_ptr);
            return None;
        };

        let new_ptr = self.allocate(new_size)?;

        // both runs are live, so they cannot overlap
        unsafe {
            ptr::copy_nonoverlapping(old_ptr.as_ptr(), new_ptr.as_ptr(), old_size.min(new_size));
        }

        let replaced = self.allocation_infos.with(|infos| {
            match infos.iter_mut().find(|info| info.ptr == old_ptr) {
                Some(info) => {
                    *info = AllocationInfo {
                        ptr: new_ptr,
                        size: new_size,
                    };
                    true
                }
                None => false,
            }
        });

        if !replaced {
            log::warn!("{:p} was freed during reallocation", old_ptr);
            self.free_sized(new_ptr, new_size);
            return None;
        }

        self.free_sized(old_ptr, old_size);
        Some(new_ptr)
    }

    /// Recorded size of a tracked pointer
    pub fn allocation_size(&self, ptr: *const u8) -> Option<usize> {
        self.allocation_infos.with(|infos| {
            infos
                .iter()
                .find(|info| ptr::eq(info.ptr.as_ptr(), ptr))
                .map(|info| info.size)
        })
    }

    /// Number of pointers currently tracked by the size-free API
    pub fn tracked_allocations(&self) -> usize {
        self.allocation_infos.with(|infos| infos.len())
    }

    /// Index of the bucket that would be tried first for `size`, ignoring occupancy
    pub fn select_bucket(&self, size: usize) -> Option<usize> {
        self.candidates(size).as_slice().first().map(|score| score.bucket)
    }

    /// Index of the bucket owning `ptr`
    pub fn owner_of(&self, ptr: *const u8) -> Option<usize> {
        self.buckets.iter().position(|bucket| bucket.contains(ptr))
    }

    /// Buckets in declaration order
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Get a bucket by index
    pub fn bucket(&self, index: usize) -> Option<&Bucket> {
        self.buckets.get(index)
    }

    /// Bytes of block storage across all buckets
    pub fn memory_size_bytes(&self) -> usize {
        self.buckets.iter().map(Bucket::memory_size_bytes).sum()
    }

    /// Bytes held by live allocations, in whole blocks
    pub fn used_bytes(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.used_blocks() * bucket.block_size())
            .sum()
    }

    /// Get statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            buckets: self.buckets.len(),
            capacity_bytes: self.memory_size_bytes(),
            used_bytes: self.used_bytes(),
            tracked_allocations: self.tracked_allocations(),
        }
    }

    /// Free every allocation in every bucket and forget all allocation info
    pub fn reset(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.reset();
        }
        self.allocation_infos.get_mut().clear();
    }

    fn candidates(&self, size: usize) -> Candidates {
        let mut candidates = Candidates {
            scores: [BucketScore::default(); MAX_BUCKETS],
            len: 0,
        };

        for (index, bucket) in self.buckets.iter().enumerate() {
            let Some(blocks_used) = bucket.blocks_for(size) else {
                continue;
            };
            if blocks_used > bucket.block_count() {
                continue;
            }

            candidates.scores[candidates.len] = BucketScore {
                blocks_used,
                memory_wasted: blocks_used * bucket.block_size() - size,
                bucket: index,
            };
            candidates.len += 1;
        }

        candidates.scores[..candidates.len].sort_unstable();
        candidates
    }

    fn allocate_in_buckets(&self, size: usize) -> Option<(usize, usize, usize)> {
        for score in self.candidates(size).as_slice() {
            if let Some((first, blocks)) = self.buckets[score.bucket].allocate_blocks(size) {
                return Some((score.bucket, first, blocks));
            }
            log::trace!(
                "Bucket {} has no run of {} blocks, falling through",
                score.bucket,
                score.blocks_used
            );
        }

        log::trace!("No bucket can satisfy {} bytes", size);
        None
    }

    fn free_blocks(&self, ptr: NonNull<u8>, size: usize) -> Result<(), InvalidFree> {
        let bucket = self
            .owner_of(ptr.as_ptr())
            .ok_or(InvalidFree::ForeignPointer {
                addr: ptr.as_ptr() as usize,
            })?;
        self.buckets[bucket].deallocate(ptr, size)
    }

    fn free_sized(&self, ptr: NonNull<u8>, size: usize) {
        if let Err(err) = self.free_blocks(ptr, size) {
            log::error!("Pool lost track of {:p} ({} bytes): {}", ptr, size, err);
        }
    }

    fn push_bucket(&mut self, desc: &BucketDescription, backing: &SharedAllocator) -> PoolResult<()> {
        let mut bucket = Bucket::new();
        bucket.initialize(desc.block_size, desc.block_count, backing)?;
        self.buckets.push(bucket).map_err(|_| PoolError::TooManyBuckets {
            requested: MAX_BUCKETS + 1,
            max: MAX_BUCKETS,
        })
    }

    fn release_buckets(&mut self) {
        // newest first, so LIFO parents get their storage back
        while let Some(bucket) = self.buckets.pop() {
            drop(bucket);
        }
    }
}

impl Default for PoolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        self.release_buckets();
    }
}

impl Allocator for PoolAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        PoolAllocator::allocate(self, size)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        if let Err(err) = PoolAllocator::deallocate(self, ptr.as_ptr(), size) {
            log::error!("Rejected pool deallocation of {:p}: {}", ptr, err);
        }
    }

    fn reset(&mut self) {
        PoolAllocator::reset(self);
    }

    fn capacity(&self) -> usize {
        self.memory_size_bytes()
    }

    fn used(&self) -> usize {
        self.used_bytes()
    }
}
