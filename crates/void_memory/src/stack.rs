//! Stack allocator - LIFO allocation

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::BLOCK_ALIGNMENT;
use crate::{align_up, Allocator};

/// Allocation header, stored right before the user pointer
#[repr(C)]
struct StackHeader {
    /// Stack top before this allocation
    previous_top: usize,
}

/// Stack allocator - LIFO allocation with markers
///
/// Every allocation is aligned to [`BLOCK_ALIGNMENT`]. Deallocating the top
/// allocation pops it; deallocating anything else is ignored until a marker
/// rollback or reset reclaims it. This is the usual parent for pool storage,
/// which is carved once at startup and released in reverse order.
pub struct StackAllocator {
    /// Backing memory, never touched after construction except through `base`
    _buffer: Vec<u8>,
    base: NonNull<u8>,
    /// Current top of stack, as an offset from `base`
    top: AtomicUsize,
    /// Total capacity
    capacity: usize,
}

// Safety: Stack uses atomic top for thread-safe allocation
unsafe impl Send for StackAllocator {}
unsafe impl Sync for StackAllocator {}

impl StackAllocator {
    const HEADER_SIZE: usize = std::mem::size_of::<StackHeader>();

    /// Create a new stack allocator
    pub fn new(capacity: usize) -> Self {
        let mut buffer = vec![0u8; capacity];
        let base = NonNull::new(buffer.as_mut_ptr()).unwrap_or(NonNull::dangling());

        Self {
            _buffer: buffer,
            base,
            top: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Create with capacity in KB
    pub fn with_capacity_kb(kb: usize) -> Self {
        Self::new(kb * 1024)
    }

    /// Create with capacity in MB
    pub fn with_capacity_mb(mb: usize) -> Self {
        Self::new(mb * 1024 * 1024)
    }

    /// Get a marker for the current stack position
    pub fn marker(&self) -> StackMarker {
        StackMarker(self.top.load(Ordering::Acquire))
    }

    /// Rollback to a previous marker
    pub fn rollback(&self, marker: StackMarker) {
        let current = self.top.load(Ordering::Acquire);
        if marker.0 <= current {
            self.top.store(marker.0, Ordering::Release);
        }
    }

    /// Get the current top position
    pub fn current_position(&self) -> usize {
        self.top.load(Ordering::Relaxed)
    }

    fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = (ptr.as_ptr() as usize).checked_sub(self.base.as_ptr() as usize)?;
        (offset >= Self::HEADER_SIZE && offset <= self.capacity).then_some(offset)
    }
}

impl Allocator for StackAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let base = self.base.as_ptr() as usize;

        loop {
            let current_top = self.top.load(Ordering::Relaxed);

            let user_offset = align_up(base + current_top + Self::HEADER_SIZE, BLOCK_ALIGNMENT) - base;
            let new_top = user_offset.checked_add(size)?;

            if new_top > self.capacity {
                return None;
            }

            // Try to claim this allocation
            match self.top.compare_exchange_weak(
                current_top,
                new_top,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let user_ptr = unsafe { self.base.as_ptr().add(user_offset) };
                    unsafe {
                        let header = user_ptr.sub(Self::HEADER_SIZE) as *mut StackHeader;
                        header.write_unaligned(StackHeader {
                            previous_top: current_top,
                        });
                    }
                    return NonNull::new(user_ptr);
                }
                Err(_) => continue,
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        let Some(user_offset) = self.offset_of(ptr) else {
            return;
        };

        let header = ptr.as_ptr().sub(Self::HEADER_SIZE) as *const StackHeader;
        let previous_top = header.read_unaligned().previous_top;

        // Only the top allocation can be popped
        if self
            .top
            .compare_exchange(
                user_offset + size,
                previous_top,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_err()
        {
            log::trace!("Stack deallocation at offset {} is not the top, ignored", user_offset);
        }
    }

    fn reset(&mut self) {
        self.top.store(0, Ordering::Release);
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn used(&self) -> usize {
        self.top.load(Ordering::Relaxed)
    }
}

impl Default for StackAllocator {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

/// Marker for stack position
#[derive(Clone, Copy, Debug)]
pub struct StackMarker(usize);

/// Scoped stack allocator guard
pub struct StackScope<'a> {
    stack: &'a StackAllocator,
    marker: StackMarker,
}

impl<'a> StackScope<'a> {
    /// Create a new scoped stack
    pub fn new(stack: &'a StackAllocator) -> Self {
        Self {
            marker: stack.marker(),
            stack,
        }
    }

    /// Access the stack for allocations
    pub fn stack(&self) -> &StackAllocator {
        self.stack
    }
}

impl Drop for StackScope<'_> {
    fn drop(&mut self) {
        self.stack.rollback(self.marker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_aligned;

    #[test]
    fn test_stack_allocation_is_aligned() {
        let stack = StackAllocator::new(1024);

        let a = stack.allocate(3).unwrap();
        let b = stack.allocate(40).unwrap();

        assert!(is_aligned(a.as_ptr(), BLOCK_ALIGNMENT));
        assert!(is_aligned(b.as_ptr(), BLOCK_ALIGNMENT));
        assert!(b.as_ptr() as usize >= a.as_ptr() as usize + 3);
    }

    #[test]
    fn test_lifo_pop() {
        let stack = StackAllocator::new(1024);

        let a = stack.allocate(64).unwrap();
        let after_a = stack.used();
        let b = stack.allocate(32).unwrap();

        unsafe {
            // not the top, ignored
            stack.deallocate(a, 64);
            assert!(stack.used() > after_a);

            stack.deallocate(b, 32);
            assert_eq!(stack.used(), after_a);

            stack.deallocate(a, 64);
        }
        assert_eq!(stack.used(), 0);
    }

    #[test]
    fn test_exhaustion() {
        let stack = StackAllocator::new(128);
        assert!(stack.allocate(256).is_none());
        assert_eq!(stack.used(), 0);
        assert!(stack.allocate(64).is_some());
    }

    #[test]
    fn test_stack_scope() {
        let stack = StackAllocator::new(1024);

        let initial = stack.used();

        {
            let scope = StackScope::new(&stack);
            scope.stack().allocate(42).unwrap();
            scope.stack().allocate(42).unwrap();
            assert!(stack.used() > initial);
        }

        assert_eq!(stack.used(), initial);
    }

    #[test]
    fn test_stack_marker() {
        let mut stack = StackAllocator::with_capacity_kb(1);

        stack.allocate(4).unwrap();
        let marker = stack.marker();
        stack.allocate(4).unwrap();
        stack.allocate(4).unwrap();

        stack.rollback(marker);
        assert_eq!(stack.current_position(), marker.0);

        stack.reset();
        assert_eq!(stack.available(), 1024);
    }
}
