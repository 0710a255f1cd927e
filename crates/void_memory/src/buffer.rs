//! PoolBuffer - growable byte buffer stored in a pool allocator
//!
//! Storage is tracked through the size-free API, so growth is a single
//! `reallocate_using_allocation_info` call and nothing touches the system
//! heap. Useful for file contents and strings assembled on hot paths.

use std::fmt;
use std::io;
use std::ptr::{self, NonNull};
use std::slice;

use crate::error::{PoolError, PoolResult};
use crate::pool::PoolAllocator;

/// Growable byte buffer backed by a [`PoolAllocator`]
pub struct PoolBuffer<'a> {
    pool: &'a PoolAllocator,
    ptr: Option<NonNull<u8>>,
    len: usize,
    capacity: usize,
}

impl<'a> PoolBuffer<'a> {
    /// Smallest capacity requested from the pool
    const MIN_CAPACITY: usize = 16;

    /// Create an empty buffer; nothing is allocated until the first write
    pub fn new(pool: &'a PoolAllocator) -> Self {
        Self {
            pool,
            ptr: None,
            len: 0,
            capacity: 0,
        }
    }

    /// Create a buffer with room for `capacity` bytes
    pub fn with_capacity(pool: &'a PoolAllocator, capacity: usize) -> PoolResult<Self> {
        let mut buffer = Self::new(pool);
        buffer.reserve(capacity)?;
        Ok(buffer)
    }

    /// Make room for at least `additional` more bytes
    pub fn reserve(&mut self, additional: usize) -> PoolResult<()> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(PoolError::Exhausted { requested: usize::MAX })?;
        if required <= self.capacity {
            return Ok(());
        }

        let new_capacity = required.max(self.capacity * 2).max(Self::MIN_CAPACITY);
        let old = self.ptr.map_or(ptr::null_mut(), NonNull::as_ptr);

        let new_ptr = self
            .pool
            .reallocate_using_allocation_info(old, new_capacity)
            .ok_or(PoolError::Exhausted {
                requested: new_capacity,
            })?;

        self.ptr = Some(new_ptr);
        self.capacity = new_capacity;
        Ok(())
    }

    /// Append one byte
    pub fn push(&mut self, byte: u8) -> PoolResult<()> {
        self.extend_from_slice(&[byte])
    }

    /// Append bytes
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> PoolResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.reserve(bytes.len())?;

        if let Some(ptr) = self.ptr {
            unsafe {
                ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr().add(self.len), bytes.len());
            }
            self.len += bytes.len();
        }
        Ok(())
    }

    /// Drop the contents, keeping the storage
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Number of bytes written
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes available before the next reallocation
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// View the contents
    pub fn as_slice(&self) -> &[u8] {
        match self.ptr {
            Some(ptr) => unsafe { slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    /// Mutable view of the contents
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.ptr {
            Some(ptr) => unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }
}

impl Drop for PoolBuffer<'_> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            self.pool.deallocate_using_allocation_info(ptr.as_ptr());
        }
    }
}

impl io::Write for PoolBuffer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::OutOfMemory, err))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for PoolBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use super::*;
    use crate::{BucketDescription, SharedAllocator, SystemAllocator};

    fn pool() -> PoolAllocator {
        let backing: SharedAllocator = Arc::new(SystemAllocator::new());
        PoolAllocator::with_buckets(
            &[
                BucketDescription::new(16, 64),
                BucketDescription::new(256, 16),
            ],
            &backing,
        )
        .unwrap()
    }

    #[test]
    fn test_grows_through_pool() {
        let pool = pool();
        let mut buffer = PoolBuffer::new(&pool);
        assert_eq!(buffer.as_slice(), &[] as &[u8]);

        for i in 0..200u8 {
            buffer.push(i).unwrap();
        }

        assert_eq!(buffer.len(), 200);
        assert!(buffer.capacity() >= 200);
        assert_eq!(buffer.as_slice(), (0..200u8).collect::<Vec<_>>().as_slice());
        assert_eq!(pool.tracked_allocations(), 1);

        drop(buffer);
        assert_eq!(pool.tracked_allocations(), 0);
        assert_eq!(pool.used_bytes(), 0);
    }

    #[test]
    fn test_write_trait() {
        let pool = pool();
        let mut buffer = PoolBuffer::with_capacity(&pool, 32).unwrap();

        write!(buffer, "frame {} took {}ms", 42, 16).unwrap();
        assert_eq!(buffer.as_slice(), b"frame 42 took 16ms");

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 32);
    }

    #[test]
    fn test_exhaustion_keeps_contents() {
        let pool = pool();
        let mut buffer = PoolBuffer::new(&pool);
        buffer.extend_from_slice(b"hello").unwrap();

        let too_big = vec![0u8; 64 * 1024];
        assert!(matches!(
            buffer.extend_from_slice(&too_big),
            Err(PoolError::Exhausted { .. })
        ));
        assert_eq!(buffer.as_slice(), b"hello");
    }

    #[test]
    fn test_mutable_view() {
        let pool = pool();
        let mut buffer = PoolBuffer::new(&pool);
        buffer.extend_from_slice(b"abc").unwrap();
        buffer.as_mut_slice()[0] = b'x';
        assert_eq!(buffer.as_slice(), b"xbc");
    }
}
