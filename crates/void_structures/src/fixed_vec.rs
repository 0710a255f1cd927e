//! FixedVec - Capacity-bounded vector with O(1) unordered removal
//!
//! Storage for `N` elements is reserved once on construction and never grows.
//! Removal swaps the last element into the vacated slot, so element order is
//! not preserved across removals.

use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};

/// Capacity-bounded vector
pub struct FixedVec<T, const N: usize> {
    items: Vec<T>,
}

impl<T, const N: usize> FixedVec<T, N> {
    /// Maximum number of elements
    pub const CAPACITY: usize = N;

    /// Create an empty vector with storage for `N` elements
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(N),
        }
    }

    /// Push an element, handing it back if the vector is full
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.items.len() >= N {
            return Err(value);
        }
        self.items.push(value);
        Ok(())
    }

    /// Remove the element at `index`, moving the last element into its place
    pub fn swap_remove(&mut self, index: usize) -> Option<T> {
        if index >= self.items.len() {
            return None;
        }
        Some(self.items.swap_remove(index))
    }

    /// Remove the first element matching the predicate
    pub fn remove_first(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let index = self.items.iter().position(|item| predicate(item))?;
        self.swap_remove(index)
    }

    /// Remove and return the last element
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Remove every element
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of stored elements
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Check if no further element fits
    pub fn is_full(&self) -> bool {
        self.items.len() >= N
    }

    /// Maximum number of elements
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Remaining free slots
    pub fn remaining(&self) -> usize {
        N - self.items.len()
    }
}

impl<T, const N: usize> Default for FixedVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Deref for FixedVec<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T, const N: usize> DerefMut for FixedVec<T, N> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<T: core::fmt::Debug, const N: usize> core::fmt::Debug for FixedVec<T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let mut v: FixedVec<u32, 3> = FixedVec::new();

        assert!(v.push(1).is_ok());
        assert!(v.push(2).is_ok());
        assert!(v.push(3).is_ok());
        assert!(v.is_full());
        assert_eq!(v.push(4), Err(4));
        assert_eq!(v.len(), 3);
        assert_eq!(v.remaining(), 0);
    }

    #[test]
    fn test_swap_remove() {
        let mut v: FixedVec<u32, 4> = FixedVec::new();
        for i in 0..4 {
            v.push(i).unwrap();
        }

        assert_eq!(v.swap_remove(1), Some(1));
        assert_eq!(&v[..], &[0, 3, 2]);
        assert_eq!(v.swap_remove(7), None);
    }

    #[test]
    fn test_remove_first() {
        let mut v: FixedVec<(u32, &str), 4> = FixedVec::new();
        v.push((1, "a")).unwrap();
        v.push((2, "b")).unwrap();

        assert_eq!(v.remove_first(|(k, _)| *k == 2), Some((2, "b")));
        assert_eq!(v.remove_first(|(k, _)| *k == 2), None);
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn test_reuse_after_clear() {
        let mut v: FixedVec<u8, 2> = FixedVec::new();
        v.push(1).unwrap();
        v.push(2).unwrap();
        v.clear();

        assert!(v.is_empty());
        assert!(v.push(3).is_ok());
        assert_eq!(v.capacity(), 2);
    }
}
