//! # Engine - StrataKV Storage Engine
//!
//! The central orchestrator that ties together the [`memtable`], [`sstable`]
//! and [`config`] crates into an LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   ENGINE                      │
//! │                                               │
//! │ write.rs → SkipList insert                    │
//! │              |                                │
//! │              |  (threshold reached?)          │
//! │              |            yes                 │
//! │              v                                │
//! │           flush() → new L0 SST (front)        │
//! │                                               │
//! │ read.rs → SkipList → L0 SSTs newest first     │
//! │            (first match wins)                 │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                                 |
//! |--------------|---------------------------------------------------------|
//! | `lib.rs`     | `Engine` struct, `open`, accessors, `Debug`, `Drop`     |
//! | [`recovery`] | tmp file cleanup, reopening SSTs found on disk          |
//! | [`write`]    | `put()`, `remove()`, `flush()`, `get_sst_path()`        |
//! | [`read`]     | `get()`, `scan()`                                       |
//!
//! ## Deletes
//!
//! A delete is a `put` of the empty value, the tombstone marker. The
//! tombstone shadows every older value of the key, in the memtable and in
//! older tables alike, and is written into SSTs like any other pair. Because
//! of that, empty values cannot be stored.
//!
//! ## Concurrency
//!
//! Every method takes `&self`. The level-0 id list and the id → table map
//! sit together behind one `RwLock`: reads and writes take it shared,
//! `flush` takes it exclusive for the whole drain, build and register
//! sequence, so no reader ever sees a drained memtable without the table
//! that replaced it.
mod read;
mod recovery;
mod write;

use anyhow::{Context, Result};
use config::LsmConfig;
use memtable::SkipList;
use parking_lot::RwLock;
use sstable::{BlockCache, SsTable};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// The value that marks a key as deleted.
pub const TOMBSTONE: &[u8] = b"";

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// On-disk table registry.
#[derive(Default)]
pub(crate) struct Levels {
    /// Level-0 table ids, newest first.
    pub(crate) l0_sst_ids: Vec<u64>,
    pub(crate) ssts: HashMap<u64, Arc<SsTable>>,
    /// Id handed to the next flush.
    pub(crate) next_sst_id: u64,
}

/// LSM-tree storage engine over one data directory.
///
/// # Write Path
///
/// 1. Reject empty or oversized keys and empty or oversized values.
/// 2. Insert into the skip list memtable.
/// 3. If the memtable size reaches `memtable_flush_threshold`, flush it to a
///    new level-0 SST.
///
/// # Read Path
///
/// 1. Check the memtable (freshest data, includes tombstones).
/// 2. Check level-0 SSTs from newest to oldest.
/// 3. First match wins; tombstones shadow older values.
///
/// # Recovery
///
/// [`Engine::open`] reopens every table already in the directory. The
/// memtable is not persisted: pairs that were never flushed are lost if the
/// process dies without dropping the engine.
pub struct Engine {
    pub(crate) data_dir: PathBuf,
    pub(crate) config: LsmConfig,
    pub(crate) mem: SkipList,
    pub(crate) levels: RwLock<Levels>,
    pub(crate) cache: Arc<BlockCache>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let levels = self.levels.read();
        f.debug_struct("Engine")
            .field("data_dir", &self.data_dir)
            .field("memtable_size", &self.mem.get_size())
            .field("memtable_entries", &self.mem.len())
            .field("l0_sst_ids", &levels.l0_sst_ids)
            .field("next_sst_id", &levels.next_sst_id)
            .field("flush_threshold", &self.config.memtable_flush_threshold)
            .field("block_size", &self.config.block_size)
            .finish()
    }
}

impl Engine {
    /// Opens an engine rooted at `data_dir`.
    ///
    /// The directory must already exist.
    ///
    /// # Recovery Steps
    ///
    /// 1. Validate `config`.
    /// 2. Remove leftover `.sst.tmp` files from interrupted table builds.
    /// 3. Reopen every `sst_<id>.sst` (20-digit id), newest id first.
    /// 4. Continue id assignment after the highest id found.
    ///
    /// # Errors
    ///
    /// Fails on an invalid config, a missing directory, or a table that
    /// cannot be reopened.
    pub fn open(data_dir: impl AsRef<Path>, config: LsmConfig) -> Result<Self> {
        config.validate().context("invalid engine config")?;
        let data_dir = data_dir.as_ref().to_path_buf();
        anyhow::ensure!(
            data_dir.is_dir(),
            "data directory {} does not exist",
            data_dir.display()
        );

        Self::cleanup_tmp_files(&data_dir);

        let cache = Arc::new(BlockCache::new(config.block_cache_capacity));
        let levels = Self::load_tables(&data_dir, &cache)?;

        info!(
            data_dir = %data_dir.display(),
            tables = levels.l0_sst_ids.len(),
            next_sst_id = levels.next_sst_id,
            "engine opened"
        );

        Ok(Self {
            mem: SkipList::with_max_level(config.skiplist_max_level),
            data_dir,
            config,
            levels: RwLock::new(levels),
            cache,
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn config(&self) -> &LsmConfig {
        &self.config
    }

    /// Level-0 table ids, newest first.
    #[must_use]
    pub fn l0_sst_ids(&self) -> Vec<u64> {
        self.levels.read().l0_sst_ids.clone()
    }

    /// Number of open tables.
    #[must_use]
    pub fn sst_count(&self) -> usize {
        self.levels.read().ssts.len()
    }

    /// Key and value bytes currently held by the memtable.
    #[must_use]
    pub fn memtable_size(&self) -> usize {
        self.mem.get_size()
    }

    /// The block cache shared by every table of this engine.
    #[must_use]
    pub fn block_cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }
}

/// Best-effort flush on drop.
///
/// Whatever is left in the memtable is flushed to a table so a clean
/// shutdown loses nothing. Drop cannot propagate errors, so a failure is
/// only logged.
impl Drop for Engine {
    fn drop(&mut self) {
        if self.mem.is_empty() {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(error = %e, data_dir = %self.data_dir.display(), "flush on drop failed");
        }
    }
}

#[cfg(test)]
mod tests;
