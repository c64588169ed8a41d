/// Read path: get() and scan().
///
/// Point lookups check the memtable first (freshest data), then level-0
/// tables newest first. The first match wins; tombstones shadow older
/// values.
///
/// Range scans merge the memtable and every table through a
/// [`MergeIterator`], so each key resolves to its newest copy before
/// tombstones are filtered out.
use anyhow::Result;
use sstable::{MergeIterator, MergeSource, SstError};

use crate::{Engine, TOMBSTONE};

impl Engine {
    /// Looks up a key, returning its value if found and live.
    ///
    /// # Errors
    ///
    /// Returns an error if a table read fails (I/O, corruption).
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let levels = self.levels.read();

        // 1. Memtable, tombstones included
        if let Some(value) = self.mem.get(key) {
            return Ok(live(value));
        }

        // 2. Level 0, newest -> oldest
        for id in &levels.l0_sst_ids {
            let Some(sst) = levels.ssts.get(id) else {
                continue;
            };
            if !sst.may_contain(key) {
                continue;
            }
            let idx = match sst.find_block_idx(key) {
                Ok(idx) => idx,
                Err(SstError::KeyOutOfRange) => continue,
                Err(e) => return Err(e.into()),
            };
            let block = sst.read_block(idx)?;
            if let Some(value) = block.get_value_binary(key) {
                return Ok(live(value.to_vec()));
            }
        }

        Ok(None)
    }

    /// Returns the live pairs with `start <= key < end`, in ascending key
    /// order.
    ///
    /// An empty `start` scans from the first key; an empty `end` scans to
    /// the last.
    ///
    /// # Errors
    ///
    /// Returns an error if a table read fails.
    pub fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let levels = self.levels.read();

        // Copy the memtable range out so its read lock is released before
        // the tables are touched.
        let mem_pairs: Vec<(Vec<u8>, Vec<u8>)> = self
            .mem
            .begin()
            .skip_while(|(k, _)| k.as_slice() < start)
            .take_while(|(k, _)| end.is_empty() || k.as_slice() < end)
            .collect();

        let mut sources: Vec<MergeSource<'_>> = Vec::with_capacity(levels.l0_sst_ids.len() + 1);
        sources.push(Box::new(mem_pairs.into_iter().map(Ok)));
        for id in &levels.l0_sst_ids {
            if let Some(sst) = levels.ssts.get(id) {
                sources.push(Box::new(sst.iter_from(start)));
            }
        }

        let mut merge = MergeIterator::new(sources)?;
        let mut out = Vec::new();
        while let Some((key, value)) = merge.next_entry()? {
            if !end.is_empty() && key.as_slice() >= end {
                break;
            }
            if value.as_slice() != TOMBSTONE {
                out.push((key, value));
            }
        }
        Ok(out)
    }
}

fn live(value: Vec<u8>) -> Option<Vec<u8>> {
    (value.as_slice() != TOMBSTONE).then_some(value)
}
