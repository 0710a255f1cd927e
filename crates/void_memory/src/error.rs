//! Error types for the memory layer
//!
//! Exhaustion is not an error here: allocation paths return `None` for it.
//! These types cover setup failures and rejected frees.

use thiserror::Error;

/// Pool and bucket setup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool allocator is already initialized")]
    AlreadyInitialized,

    #[error("too many buckets: {requested} requested, at most {max} supported")]
    TooManyBuckets { requested: usize, max: usize },

    #[error("invalid bucket description: block size {block_size}, block count {block_count}")]
    InvalidDescription { block_size: usize, block_count: usize },

    #[error("backing allocator could not provide {requested} bytes")]
    BackingExhausted { requested: usize },

    #[error("no bucket could provide {requested} bytes")]
    Exhausted { requested: usize },
}

/// Result type for pool setup
pub type PoolResult<T> = Result<T, PoolError>;

/// A rejected deallocation
///
/// The ledger is left untouched whenever one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidFree {
    #[error("pointer {addr:#x} is not owned by this allocator")]
    ForeignPointer { addr: usize },

    #[error("offset {offset} is not on a {block_size}-byte block boundary")]
    Misaligned { offset: usize, block_size: usize },

    #[error("block {block} is not the start of a live allocation")]
    NotAllocated { block: usize },

    #[error("size does not match the allocation at block {block} ({blocks} blocks requested)")]
    SizeMismatch { block: usize, blocks: usize },

    #[error("bucket {bucket} does not exist")]
    UnknownBucket { bucket: usize },
}
