//! # void_memory - Custom Memory Allocators
//!
//! Allocation without touching the general-purpose heap on hot paths:
//! - PoolAllocator: Best-fit routing across fixed-block buckets, with a
//!   size-free API for callers that cannot remember allocation sizes
//! - Bucket: Fixed-block region tracked by an occupancy bitmap
//! - StackAllocator: LIFO allocation, the usual parent for pool storage
//! - SystemAllocator: Process heap
//!
//! Subsystems take an [`Allocator`] by reference (or [`SharedAllocator`])
//! instead of reaching for a global instance.

use std::ptr::NonNull;
use std::sync::Arc;

pub mod allocation;
pub mod bucket;
pub mod buffer;
pub mod config;
pub mod error;
pub mod pool;
pub mod stack;
pub mod system;

mod sync;

pub use allocation::PoolAllocation;
pub use bucket::{Bucket, BucketStats};
pub use buffer::PoolBuffer;
pub use config::{load_config, parse_config, BucketDescription, PoolConfig};
pub use error::{InvalidFree, PoolError, PoolResult};
pub use pool::{PoolAllocator, PoolStats};
pub use stack::StackAllocator;
pub use system::SystemAllocator;

/// Allocation capability shared by every allocator in the engine
pub trait Allocator {
    /// Allocate `size` bytes, `None` when the allocator is exhausted
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Deallocate memory
    /// # Safety
    /// The pointer must have been allocated by this allocator with the same
    /// `size`, and must not be used afterwards
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize);

    /// Reset the allocator, freeing all allocations
    fn reset(&mut self);

    /// Get the total capacity
    fn capacity(&self) -> usize;

    /// Get the currently used memory
    fn used(&self) -> usize;

    /// Get the available memory
    fn available(&self) -> usize {
        self.capacity().saturating_sub(self.used())
    }
}

/// Allocator handle that can be injected across threads
pub type SharedAllocator = Arc<dyn Allocator + Send + Sync>;

/// Align a value up to the given alignment
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Check if a pointer is aligned
#[inline]
pub fn is_aligned(ptr: *const u8, align: usize) -> bool {
    (ptr as usize) & (align - 1) == 0
}

pub mod prelude {
    pub use crate::{Allocator, SharedAllocator};
    pub use crate::{Bucket, BucketDescription, PoolAllocation, PoolAllocator, PoolBuffer};
    pub use crate::{InvalidFree, PoolError, PoolResult};
    pub use crate::{StackAllocator, SystemAllocator};
    pub use crate::{align_up, is_aligned};
}
