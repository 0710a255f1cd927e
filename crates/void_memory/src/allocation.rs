//! Allocation records handed out by the pool allocator

use std::ptr::NonNull;

/// Pointer/size pair kept for the size-free API
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AllocationInfo {
    pub(crate) ptr: NonNull<u8>,
    pub(crate) size: usize,
}

// Safety: the record only carries an address, it never dereferences it
unsafe impl Send for AllocationInfo {}

/// Owned handle to a pool allocation
///
/// Carries the owning bucket and block range, so releasing it needs no
/// pointer lookup and cannot pass a wrong size. Not `Clone`: a handle can
/// only be released once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a PoolAllocation leaks its blocks until the pool is reset"]
pub struct PoolAllocation {
    pub(crate) ptr: NonNull<u8>,
    pub(crate) bucket: usize,
    pub(crate) first_block: usize,
    pub(crate) blocks: usize,
    pub(crate) size: usize,
    pub(crate) capacity: usize,
}

impl PoolAllocation {
    /// Start of the allocation
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Requested size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Usable bytes, the requested size rounded up to whole blocks
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index of the owning bucket, in declaration order
    pub fn bucket(&self) -> usize {
        self.bucket
    }

    /// First block index inside the bucket
    pub fn first_block(&self) -> usize {
        self.first_block
    }

    /// Number of blocks held
    pub fn blocks(&self) -> usize {
        self.blocks
    }
}

// Safety: the handle exclusively owns its block range
unsafe impl Send for PoolAllocation {}
