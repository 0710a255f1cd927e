//! System allocator - the process heap behind the engine's allocator trait

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::BLOCK_ALIGNMENT;
use crate::Allocator;

/// Wrapper for the system's default allocator
///
/// Allocations are aligned to [`BLOCK_ALIGNMENT`]. Only the byte count in
/// use is tracked; there is no capacity limit.
#[derive(Debug, Default)]
pub struct SystemAllocator {
    used: AtomicUsize,
}

impl SystemAllocator {
    /// Creates a new SystemAllocator
    pub const fn new() -> Self {
        Self {
            used: AtomicUsize::new(0),
        }
    }

    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size, BLOCK_ALIGNMENT).ok()
    }
}

impl Allocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            // Non-null aligned dangling pointer
            return NonNull::new(BLOCK_ALIGNMENT as *mut u8);
        }

        let layout = Self::layout(size)?;
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) })?;
        self.used.fetch_add(size, Ordering::Relaxed);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        if size == 0 {
            return;
        }

        if let Some(layout) = Self::layout(size) {
            alloc::dealloc(ptr.as_ptr(), layout);
            self.used.fetch_sub(size, Ordering::Relaxed);
        }
    }

    fn reset(&mut self) {
        // Heap allocations are owned by whoever holds them
    }

    fn capacity(&self) -> usize {
        usize::MAX
    }

    fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_aligned;

    #[test]
    fn test_basic_allocation() {
        let allocator = SystemAllocator::new();

        let ptr = allocator.allocate(100).unwrap();
        assert!(is_aligned(ptr.as_ptr(), BLOCK_ALIGNMENT));
        assert_eq!(allocator.used(), 100);

        unsafe { allocator.deallocate(ptr, 100) };
        assert_eq!(allocator.used(), 0);
    }

    #[test]
    fn test_zero_sized_allocation() {
        let allocator = SystemAllocator::new();
        let ptr = allocator.allocate(0).unwrap();
        assert!(is_aligned(ptr.as_ptr(), BLOCK_ALIGNMENT));
        unsafe { allocator.deallocate(ptr, 0) };
        assert_eq!(allocator.used(), 0);
    }
}
