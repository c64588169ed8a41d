use bloom::BloomFilter;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::block::Block;
use crate::cache::BlockCache;
use crate::error::{corrupt, Result, SstError};
use crate::format::{BlockMeta, Footer, FOOTER_BYTES};
use crate::iterator::SstIter;

/// An open, immutable SST.
///
/// On [`open`](SsTable::open) only the footer, the sparse block index and the
/// bloom filter are loaded. Block bodies are read on demand by
/// [`read_block`](SsTable::read_block), through the shared [`BlockCache`]
/// when one is attached.
///
/// The file handle stays open for the table's lifetime behind a `Mutex`, so
/// every read method works through `&self`.
pub struct SsTable {
    sst_id: u64,
    path: PathBuf,
    file: Mutex<File>,
    /// Sparse index, one entry per block, in key order.
    metas: Vec<BlockMeta>,
    bloom: Option<BloomFilter>,
    file_size: u64,
    cache: Option<Arc<BlockCache>>,
}

impl SsTable {
    /// Opens a table previously written by
    /// [`SsTableBuilder::build`](crate::SsTableBuilder::build).
    ///
    /// # Validation
    ///
    /// - The footer magic must be `STB1` and the section offsets in order.
    /// - The id recorded in the footer must equal `sst_id`.
    /// - The metadata CRC32 must match, at least one block must exist, and
    ///   every block must lie inside the data section.
    ///
    /// # Errors
    ///
    /// [`SstError::Corrupt`] or [`SstError::IdMismatch`] for a malformed
    /// file, [`SstError::Io`] on filesystem failure.
    pub fn open(
        sst_id: u64,
        path: impl AsRef<Path>,
        cache: Option<Arc<BlockCache>>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let footer = Footer::read_from(&mut file, file_size)?;
        if footer.sst_id != sst_id {
            return Err(SstError::IdMismatch {
                expected: sst_id,
                found: footer.sst_id,
            });
        }

        let meta_bytes = read_range(&mut file, footer.meta_offset, footer.bloom_offset)?;
        let metas = BlockMeta::decode_all(&meta_bytes)?;
        if metas.is_empty() {
            return Err(corrupt("table has no blocks"));
        }
        for (idx, meta) in metas.iter().enumerate() {
            let end = meta.offset.checked_add(meta.len as u64);
            if end.map_or(true, |end| end > footer.meta_offset) {
                return Err(corrupt(format!("block {} extends past the data section", idx)));
            }
        }

        let bloom_end = file_size - FOOTER_BYTES;
        let bloom = if footer.bloom_offset < bloom_end {
            let bytes = read_range(&mut file, footer.bloom_offset, bloom_end)?;
            Some(BloomFilter::decode(&bytes).map_err(|e| corrupt(format!("bloom filter: {}", e)))?)
        } else {
            None
        };

        debug!(
            sst_id,
            blocks = metas.len(),
            bytes = file_size,
            bloom = bloom.is_some(),
            path = %path.display(),
            "opened SST"
        );

        Ok(Self {
            sst_id,
            path: path.to_path_buf(),
            file: Mutex::new(file),
            metas,
            bloom,
            file_size,
            cache,
        })
    }

    /// Wraps the state a builder already holds in memory, skipping the
    /// decode round trip.
    pub(crate) fn from_parts(
        sst_id: u64,
        path: &Path,
        metas: Vec<BlockMeta>,
        bloom: Option<BloomFilter>,
        file_size: u64,
        cache: Option<Arc<BlockCache>>,
    ) -> Result<Self> {
        Ok(Self {
            sst_id,
            path: path.to_path_buf(),
            file: Mutex::new(File::open(path)?),
            metas,
            bloom,
            file_size,
            cache,
        })
    }

    /// Loads block `idx`, from the cache when possible.
    ///
    /// # Errors
    ///
    /// [`SstError::BlockIndexOutOfRange`] unless `idx < num_blocks()`;
    /// I/O or decode failures otherwise.
    pub fn read_block(&self, idx: usize) -> Result<Arc<Block>> {
        let meta = self.metas.get(idx).ok_or(SstError::BlockIndexOutOfRange {
            index: idx,
            num_blocks: self.metas.len(),
        })?;

        if let Some(cache) = &self.cache {
            if let Some(block) = cache.get(self.sst_id, idx) {
                return Ok(block);
            }
        }

        trace!(sst_id = self.sst_id, block = idx, "reading block from disk");
        let bytes = {
            let mut file = self.file.lock();
            read_range(&mut *file, meta.offset, meta.offset + meta.len as u64)?
        };
        let block = Arc::new(Block::decode(&bytes)?);

        if let Some(cache) = &self.cache {
            cache.insert(self.sst_id, idx, Arc::clone(&block));
        }
        Ok(block)
    }

    /// Binary search over the sparse index for the last block whose first
    /// key is `<= key`: the only block that can hold `key`.
    ///
    /// # Errors
    ///
    /// [`SstError::KeyOutOfRange`] if `key` sorts before the table's first
    /// key or after its last key.
    pub fn find_block_idx(&self, key: &[u8]) -> Result<usize> {
        if key < self.first_key() || key > self.last_key() {
            return Err(SstError::KeyOutOfRange);
        }
        // key >= metas[0].first_key, so the partition point is at least 1
        Ok(self.metas.partition_point(|m| m.first_key.as_slice() <= key) - 1)
    }

    /// `false` means the table definitely does not hold `key`. Tables built
    /// without a bloom filter always answer `true`.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.bloom.as_ref().map_or(true, |bf| bf.may_contain(key))
    }

    /// Point lookup: bloom probe, block search, block read.
    ///
    /// Returns `Ok(None)` when the table does not hold `key`, including when
    /// the key is outside the table's range.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.may_contain(key) {
            return Ok(None);
        }
        let idx = match self.find_block_idx(key) {
            Ok(idx) => idx,
            Err(SstError::KeyOutOfRange) => return Ok(None),
            Err(e) => return Err(e),
        };
        let block = self.read_block(idx)?;
        Ok(block.get_value_binary(key).map(<[u8]>::to_vec))
    }

    /// Iterates every pair in key order.
    pub fn iter(&self) -> SstIter<'_> {
        SstIter::new(self, None)
    }

    /// Iterates pairs with keys `>= start`, in key order.
    pub fn iter_from(&self, start: &[u8]) -> SstIter<'_> {
        SstIter::new(self, Some(start))
    }

    #[must_use]
    pub fn sst_id(&self) -> u64 {
        self.sst_id
    }

    #[must_use]
    pub fn first_key(&self) -> &[u8] {
        &self.metas[0].first_key
    }

    #[must_use]
    pub fn last_key(&self) -> &[u8] {
        &self.metas[self.metas.len() - 1].last_key
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.metas.len()
    }

    /// Size of the table file in bytes.
    #[must_use]
    pub fn sst_size(&self) -> u64 {
        self.file_size
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn has_bloom(&self) -> bool {
        self.bloom.is_some()
    }

    /// Sparse index entries, one per block.
    #[must_use]
    pub fn block_metas(&self) -> &[BlockMeta] {
        &self.metas
    }
}

impl std::fmt::Debug for SsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsTable")
            .field("sst_id", &self.sst_id)
            .field("path", &self.path)
            .field("num_blocks", &self.metas.len())
            .field("sst_size", &self.file_size)
            .field("has_bloom", &self.bloom.is_some())
            .finish()
    }
}

fn read_range<R: Read + Seek>(r: &mut R, start: u64, end: u64) -> Result<Vec<u8>> {
    let len = end
        .checked_sub(start)
        .ok_or_else(|| corrupt(format!("invalid byte range {}..{}", start, end)))?;
    r.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}
