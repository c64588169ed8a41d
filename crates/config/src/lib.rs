//! # Config - StrataKV tuning knobs
//!
//! A single plain struct handed to the engine at open time. Every field has a
//! default that suits small embedded workloads; callers override individual
//! knobs with the `with_*` setters and the engine calls
//! [`LsmConfig::validate`] before using them.
//!
//! ```rust,no_run
//! use config::LsmConfig;
//!
//! let cfg = LsmConfig::default()
//!     .with_block_size(1024)
//!     .with_memtable_flush_threshold(256 * 1024);
//! cfg.validate().unwrap();
//! ```

use anyhow::{ensure, Result};

/// Default target size of one encoded SST block (4 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Default cap on skip list tower height.
pub const DEFAULT_SKIPLIST_MAX_LEVEL: usize = 16;

/// Default memtable size (key + value bytes) that triggers an automatic flush.
pub const DEFAULT_MEMTABLE_FLUSH_THRESHOLD: usize = 4 * 1024 * 1024;

/// Default bloom filter false positive rate (1%).
pub const DEFAULT_BLOOM_FPR: f64 = 0.01;

/// Default number of decoded blocks kept in the shared block cache.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 1024;

/// Smallest accepted block size. Anything lower degenerates into one pair
/// per block.
pub const MIN_BLOCK_SIZE: usize = 64;

/// Hard ceiling for `skiplist_max_level`.
pub const MAX_SKIPLIST_LEVEL: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct LsmConfig {
    /// Target encoded size of an SST block in bytes.
    pub block_size: usize,
    /// Maximum tower height of a memtable skip list node.
    pub skiplist_max_level: usize,
    /// `put` flushes the memtable once its size estimate reaches this value.
    pub memtable_flush_threshold: usize,
    /// Target false positive rate of each table's bloom filter.
    pub bloom_false_positive_rate: f64,
    /// Capacity of the block cache, counted in blocks.
    pub block_cache_capacity: usize,
}

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            skiplist_max_level: DEFAULT_SKIPLIST_MAX_LEVEL,
            memtable_flush_threshold: DEFAULT_MEMTABLE_FLUSH_THRESHOLD,
            bloom_false_positive_rate: DEFAULT_BLOOM_FPR,
            block_cache_capacity: DEFAULT_BLOCK_CACHE_CAPACITY,
        }
    }
}

impl LsmConfig {
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub fn with_skiplist_max_level(mut self, level: usize) -> Self {
        self.skiplist_max_level = level;
        self
    }

    #[must_use]
    pub fn with_memtable_flush_threshold(mut self, threshold: usize) -> Self {
        self.memtable_flush_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_bloom_false_positive_rate(mut self, fpr: f64) -> Self {
        self.bloom_false_positive_rate = fpr;
        self
    }

    #[must_use]
    pub fn with_block_cache_capacity(mut self, capacity: usize) -> Self {
        self.block_cache_capacity = capacity;
        self
    }

    /// Checks every knob against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.block_size >= MIN_BLOCK_SIZE,
            "block_size must be at least {} bytes (got {})",
            MIN_BLOCK_SIZE,
            self.block_size
        );
        ensure!(
            (1..=MAX_SKIPLIST_LEVEL).contains(&self.skiplist_max_level),
            "skiplist_max_level must be in 1..={} (got {})",
            MAX_SKIPLIST_LEVEL,
            self.skiplist_max_level
        );
        ensure!(
            self.memtable_flush_threshold > 0,
            "memtable_flush_threshold must be > 0"
        );
        ensure!(
            self.bloom_false_positive_rate > 0.0 && self.bloom_false_positive_rate < 1.0,
            "bloom_false_positive_rate must be in (0, 1) (got {})",
            self.bloom_false_positive_rate
        );
        ensure!(
            self.block_cache_capacity > 0,
            "block_cache_capacity must be > 0"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = LsmConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(cfg.skiplist_max_level, DEFAULT_SKIPLIST_MAX_LEVEL);
    }

    #[test]
    fn setters_override_single_fields() {
        let cfg = LsmConfig::default()
            .with_block_size(128)
            .with_memtable_flush_threshold(10);
        assert_eq!(cfg.block_size, 128);
        assert_eq!(cfg.memtable_flush_threshold, 10);
        assert_eq!(cfg.block_cache_capacity, DEFAULT_BLOCK_CACHE_CAPACITY);
    }

    #[test]
    fn tiny_block_size_rejected() {
        let err = LsmConfig::default().with_block_size(8).validate().unwrap_err();
        assert!(err.to_string().contains("block_size"));
    }

    #[test]
    fn skiplist_level_bounds() {
        assert!(LsmConfig::default().with_skiplist_max_level(0).validate().is_err());
        assert!(LsmConfig::default().with_skiplist_max_level(33).validate().is_err());
        assert!(LsmConfig::default().with_skiplist_max_level(1).validate().is_ok());
    }

    #[test]
    fn bloom_fpr_bounds() {
        assert!(LsmConfig::default().with_bloom_false_positive_rate(0.0).validate().is_err());
        assert!(LsmConfig::default().with_bloom_false_positive_rate(1.0).validate().is_err());
    }

    #[test]
    fn zero_threshold_and_cache_rejected() {
        assert!(LsmConfig::default().with_memtable_flush_threshold(0).validate().is_err());
        assert!(LsmConfig::default().with_block_cache_capacity(0).validate().is_err());
    }
}
