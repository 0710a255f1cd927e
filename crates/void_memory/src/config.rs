//! Pool configuration
//!
//! Capacity limits are compile-time constants. The bucket layout itself is
//! chosen at startup, either in code through [`BucketDescription`] or from a
//! TOML file:
//!
//! ```toml
//! [[bucket]]
//! block_size = 16
//! block_count = 1024
//!
//! [[bucket]]
//! block_size = 4096
//! memory_size = 1048576  # 256 blocks
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Maximum number of buckets a pool allocator can hold
pub const MAX_BUCKETS: usize = 32;

/// Maximum number of live allocations tracked by the size-free API
pub const MAX_ALLOCATION_INFOS: usize = 1024;

/// Alignment of every region handed out by the backing allocators
pub const BLOCK_ALIGNMENT: usize = 16;

/// Layout of one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketDescription {
    pub block_size: usize,
    pub block_count: usize,
}

impl BucketDescription {
    /// Describe a bucket by block size and count
    pub const fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            block_count,
        }
    }

    /// Describe a bucket by block size and total memory; the count rounds down
    pub const fn from_memory_size(block_size: usize, memory_size: usize) -> Self {
        let block_count = if block_size == 0 {
            0
        } else {
            memory_size / block_size
        };
        Self {
            block_size,
            block_count,
        }
    }

    /// Bytes of block storage this bucket needs
    pub const fn memory_size(&self) -> usize {
        self.block_size.saturating_mul(self.block_count)
    }

    /// Whether the description can back a bucket
    ///
    /// The block storage must fit in a single allocation, which Rust caps at
    /// `isize::MAX` bytes.
    pub const fn is_valid(&self) -> bool {
        if self.block_size == 0 || self.block_count == 0 {
            return false;
        }
        match self.block_size.checked_mul(self.block_count) {
            Some(size) => size <= isize::MAX as usize,
            None => false,
        }
    }
}

/// Errors from config loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("bucket {index}: {reason}")]
    InvalidBucket { index: usize, reason: String },

    #[error("too many buckets: {count} configured, at most {max} supported")]
    TooManyBuckets { count: usize, max: usize },
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Raw TOML structure for one bucket
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BucketToml {
    block_size: usize,
    block_count: Option<usize>,
    memory_size: Option<usize>,
}

/// Root TOML structure
#[derive(Debug, Deserialize)]
struct PoolToml {
    #[serde(default, rename = "bucket")]
    buckets: Vec<BucketToml>,
}

/// Validated bucket layout for a pool allocator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolConfig {
    buckets: Vec<BucketDescription>,
}

impl PoolConfig {
    /// Build from descriptions, applying the same checks as the TOML path
    pub fn new(buckets: Vec<BucketDescription>) -> ConfigResult<Self> {
        if buckets.len() > MAX_BUCKETS {
            return Err(ConfigError::TooManyBuckets {
                count: buckets.len(),
                max: MAX_BUCKETS,
            });
        }

        for (index, desc) in buckets.iter().enumerate() {
            if !desc.is_valid() {
                return Err(ConfigError::InvalidBucket {
                    index,
                    reason: format!(
                        "block size {} with block count {} is not a usable layout",
                        desc.block_size, desc.block_count
                    ),
                });
            }
        }

        Ok(Self { buckets })
    }

    /// Bucket descriptions in declaration order
    pub fn buckets(&self) -> &[BucketDescription] {
        &self.buckets
    }

    /// Total block storage across all buckets, saturating at `usize::MAX`
    pub fn total_memory_size(&self) -> usize {
        self.buckets
            .iter()
            .map(BucketDescription::memory_size)
            .fold(0, usize::saturating_add)
    }
}

fn convert_bucket(index: usize, raw: &BucketToml) -> ConfigResult<BucketDescription> {
    let invalid = |reason: &str| ConfigError::InvalidBucket {
        index,
        reason: reason.to_string(),
    };

    if raw.block_size == 0 {
        return Err(invalid("block_size must be non-zero"));
    }

    let desc = match (raw.block_count, raw.memory_size) {
        (Some(count), None) => BucketDescription::new(raw.block_size, count),
        (None, Some(memory)) => BucketDescription::from_memory_size(raw.block_size, memory),
        (Some(_), Some(_)) => return Err(invalid("set either block_count or memory_size, not both")),
        (None, None) => return Err(invalid("one of block_count or memory_size is required")),
    };

    if desc.block_count == 0 {
        return Err(invalid("bucket would hold zero blocks"));
    }

    Ok(desc)
}

/// Parse a pool config from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<PoolConfig> {
    let raw: PoolToml = toml::from_str(content)?;

    let buckets = raw
        .buckets
        .iter()
        .enumerate()
        .map(|(index, bucket)| convert_bucket(index, bucket))
        .collect::<ConfigResult<Vec<_>>>()?;

    PoolConfig::new(buckets)
}

/// Load and parse a pool config from a file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<PoolConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
