/// Write path: `put()`, `remove()` and `flush()`.
///
/// Mutations only touch the skip list. Once its size estimate reaches the
/// configured threshold the whole memtable is drained into a new level-0
/// table.
use anyhow::{Context, Result};
use sstable::{SsTable, SsTableBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{Engine, MAX_KEY_SIZE, MAX_VALUE_SIZE, TOMBSTONE};

impl Engine {
    /// Inserts or overwrites `key`.
    ///
    /// Empty keys are rejected, and so are empty values since the empty
    /// value is the tombstone marker. Use [`remove`](Engine::remove) to
    /// delete. Keys are limited to [`MAX_KEY_SIZE`] and values to
    /// [`MAX_VALUE_SIZE`].
    ///
    /// # Errors
    ///
    /// A validation error leaves the engine untouched. An error from the
    /// automatic flush that may follow the insert means the pair **was**
    /// stored: it stays in the memtable and is readable, so the write must
    /// not be retried. Only the flush failed, and a later
    /// [`flush`](Engine::flush) will pick the pair up.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        Self::check_key(&key)?;
        anyhow::ensure!(
            value.as_slice() != TOMBSTONE,
            "value must not be empty (the empty value marks a deleted key)"
        );
        anyhow::ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );
        self.insert_entry(key, value)
    }

    /// Deletes `key` by writing a tombstone.
    ///
    /// The tombstone shadows any older value, including values already
    /// flushed to tables.
    ///
    /// # Errors
    ///
    /// Same contract as [`put`](Engine::put): a failed automatic flush does
    /// not undo the tombstone.
    pub fn remove(&self, key: Vec<u8>) -> Result<()> {
        Self::check_key(&key)?;
        self.insert_entry(key, TOMBSTONE.to_vec())
    }

    fn check_key(key: &[u8]) -> Result<()> {
        anyhow::ensure!(!key.is_empty(), "key must not be empty");
        anyhow::ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );
        Ok(())
    }

    fn insert_entry(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let size = {
            // shared: keeps a running flush from interleaving with this put
            let _levels = self.levels.read();
            self.mem.put(key, value);
            self.mem.get_size()
        };

        if size >= self.config.memtable_flush_threshold {
            debug!(
                memtable_size = size,
                threshold = self.config.memtable_flush_threshold,
                "memtable threshold reached"
            );
            self.flush()
                .context("write stored in memtable, but the automatic flush failed")?;
        }
        Ok(())
    }

    /// Drains the memtable into a new level-0 table.
    ///
    /// No-op when the memtable is empty (including when a concurrent flush
    /// already drained it).
    ///
    /// # Steps
    ///
    /// 1. Take the registry lock exclusively.
    /// 2. Drain the skip list into ascending pairs.
    /// 3. Build a table at the next id with the configured block size and a
    ///    bloom filter sized for the drained pairs.
    /// 4. Register the id at the front of the level-0 list.
    ///
    /// If the build fails the drained pairs are written back into the
    /// memtable, the id is not consumed, and the error is returned.
    pub fn flush(&self) -> Result<()> {
        let mut levels = self.levels.write();

        let pairs = self.mem.flush();
        if pairs.is_empty() {
            return Ok(());
        }

        let sst_id = levels.next_sst_id;
        let path = self.get_sst_path(sst_id);

        let table = match self.build_table(sst_id, &path, &pairs) {
            Ok(table) => table,
            Err(e) => {
                warn!(sst_id, error = %e, entries = pairs.len(), "flush failed, restoring memtable");
                for (key, value) in pairs {
                    self.mem.put(key, value);
                }
                return Err(e).with_context(|| format!("failed to flush to {}", path.display()));
            }
        };

        info!(
            sst_id,
            entries = pairs.len(),
            blocks = table.num_blocks(),
            bytes = table.sst_size(),
            "flushed memtable"
        );

        levels.next_sst_id += 1;
        levels.l0_sst_ids.insert(0, sst_id);
        levels.ssts.insert(sst_id, Arc::new(table));
        Ok(())
    }

    fn build_table(
        &self,
        sst_id: u64,
        path: &Path,
        pairs: &[(Vec<u8>, Vec<u8>)],
    ) -> sstable::Result<SsTable> {
        let mut builder = SsTableBuilder::new(self.config.block_size)
            .with_bloom(pairs.len(), self.config.bloom_false_positive_rate);
        for (key, value) in pairs {
            builder.add(key, value)?;
        }
        builder.build(sst_id, path, Some(Arc::clone(&self.cache)))
    }

    /// `data_dir/sst_<id>.sst`, with the id zero-padded to 20 digits so
    /// file names sort by id.
    #[must_use]
    pub fn get_sst_path(&self, sst_id: u64) -> PathBuf {
        Self::sst_path_in(&self.data_dir, sst_id)
    }

    pub(crate) fn sst_path_in(data_dir: &Path, sst_id: u64) -> PathBuf {
        data_dir.join(format!("sst_{:020}.sst", sst_id))
    }
}
