//! # void_structures - Fixed-Capacity Data Structures
//!
//! Containers for code that must not grow the heap after startup:
//! - FixedVec: Capacity-bounded vector with swap-remove
//! - bitset: Bit helpers over borrowed byte storage (allocator ledgers)

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod bitset;
pub mod fixed_vec;

pub use fixed_vec::FixedVec;

pub mod prelude {
    pub use crate::bitset;
    pub use crate::fixed_vec::FixedVec;
}
