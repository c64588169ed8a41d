use bloom::BloomFilter;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::block::{Block, MAX_KEY_BYTES, MAX_VALUE_BYTES};
use crate::cache::BlockCache;
use crate::error::{Result, SstError};
use crate::format::{BlockMeta, Footer, FOOTER_BYTES};
use crate::reader::SsTable;

/// Bloom filter sizing used when the caller does not know the entry count.
pub const DEFAULT_BLOOM_EXPECTED_ENTRIES: usize = 4096;

/// Default bloom filter false positive rate (1%).
pub const DEFAULT_BLOOM_FPR: f64 = 0.01;

/// Packs ascending key/value pairs into blocks and writes them out as one
/// SST file.
///
/// Block boundaries depend only on the insertion sequence and the block
/// size: a block is sealed as soon as the next pair would push its encoded
/// size past `block_size`. The builder does not sort; pairs must be added in
/// non-decreasing key order for the table's key-range metadata to hold.
pub struct SsTableBuilder {
    block_size: usize,
    /// Block currently being filled.
    block: Block,
    /// Encoded bodies of sealed blocks, back to back.
    data: Vec<u8>,
    metas: Vec<BlockMeta>,
    bloom: Option<BloomFilter>,
    first_key: Option<Vec<u8>>,
    last_key: Vec<u8>,
    num_entries: usize,
}

impl SsTableBuilder {
    /// Creates a builder with a bloom filter sized for
    /// [`DEFAULT_BLOOM_EXPECTED_ENTRIES`].
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            block: Block::new(block_size),
            data: Vec::new(),
            metas: Vec::new(),
            bloom: Some(BloomFilter::new(
                DEFAULT_BLOOM_EXPECTED_ENTRIES,
                DEFAULT_BLOOM_FPR,
            )),
            first_key: None,
            last_key: Vec::new(),
            num_entries: 0,
        }
    }

    /// Replaces the bloom filter with one sized for `expected_entries` at
    /// `false_positive_rate`. Call before the first [`add`](Self::add).
    #[must_use]
    pub fn with_bloom(mut self, expected_entries: usize, false_positive_rate: f64) -> Self {
        debug_assert_eq!(self.num_entries, 0, "bloom filter replaced after add");
        self.bloom = Some(BloomFilter::new(expected_entries.max(1), false_positive_rate));
        self
    }

    /// Builds the table without a bloom filter section.
    #[must_use]
    pub fn without_bloom(mut self) -> Self {
        self.bloom = None;
        self
    }

    /// Appends a pair, sealing the current block first if the pair does not
    /// fit in it.
    ///
    /// # Errors
    ///
    /// [`SstError::EntryTooLarge`] if the key is over [`MAX_KEY_BYTES`] or
    /// the value over [`MAX_VALUE_BYTES`]. The builder is left unchanged.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_BYTES || value.len() > MAX_VALUE_BYTES {
            return Err(SstError::EntryTooLarge {
                key_len: key.len(),
                value_len: value.len(),
            });
        }
        debug_assert!(
            self.first_key.is_none() || self.last_key.as_slice() <= key,
            "keys must be added in non-decreasing order"
        );

        if self.first_key.is_none() {
            self.first_key = Some(key.to_vec());
        }
        if let Some(bloom) = self.bloom.as_mut() {
            bloom.insert(key);
        }

        if !self.block.add_entry(key, value) {
            self.finish_block();
            // a fresh block always accepts its first pair
            self.block.add_entry(key, value);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        Ok(())
    }

    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Encoded bytes of the blocks sealed so far.
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        self.data.len()
    }

    fn finish_block(&mut self) {
        let block = mem::replace(&mut self.block, Block::new(self.block_size));
        let (Some(first), Some(last)) = (block.first_key(), block.last_key()) else {
            return;
        };
        let encoded = block.encode();
        self.metas.push(BlockMeta {
            offset: self.data.len() as u64,
            len: encoded.len() as u32,
            first_key: first.to_vec(),
            last_key: last.to_vec(),
        });
        self.data.extend_from_slice(&encoded);
    }

    /// Seals the last block and writes the table to `path`.
    ///
    /// # File Layout
    ///
    /// ```text
    /// [DATA]   block 0 | block 1 | ...
    /// [META]   num_blocks | per-block offset, len, first_key, last_key | crc32
    /// [BLOOM]  serialized BloomFilter (empty when built without one)
    /// [FOOTER] sst_id(u64) | meta_offset(u64) | bloom_offset(u64) | magic(u32 = "STB1")
    /// ```
    ///
    /// # Crash Safety
    ///
    /// The table is written to `<path>.tmp`, fsynced, then renamed over
    /// `path`. A crash leaves at most a `.tmp` file behind.
    ///
    /// # Errors
    ///
    /// [`SstError::EmptyTable`] if nothing was added (no file is created), or
    /// any I/O failure while writing.
    pub fn build(
        mut self,
        sst_id: u64,
        path: impl AsRef<Path>,
        cache: Option<Arc<BlockCache>>,
    ) -> Result<SsTable> {
        if !self.block.is_empty() {
            self.finish_block();
        }
        if self.metas.is_empty() {
            return Err(SstError::EmptyTable);
        }

        let path = path.as_ref();
        let meta_bytes = BlockMeta::encode_all(&self.metas)?;
        let bloom_bytes = self
            .bloom
            .as_ref()
            .map(BloomFilter::encode)
            .unwrap_or_default();

        let meta_offset = self.data.len() as u64;
        let bloom_offset = meta_offset + meta_bytes.len() as u64;
        let file_size = bloom_offset + bloom_bytes.len() as u64 + FOOTER_BYTES;
        let footer = Footer {
            sst_id,
            meta_offset,
            bloom_offset,
        };

        let tmp = tmp_path(path);
        if let Err(e) = write_sections(
            &tmp,
            &[self.data.as_slice(), meta_bytes.as_slice(), bloom_bytes.as_slice()],
            &footer,
        ) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        // Make the rename itself durable.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(
            sst_id,
            blocks = self.metas.len(),
            entries = self.num_entries,
            bytes = file_size,
            path = %path.display(),
            "built SST"
        );

        SsTable::from_parts(sst_id, path, self.metas, self.bloom, file_size, cache)
    }
}

impl std::fmt::Debug for SsTableBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsTableBuilder")
            .field("block_size", &self.block_size)
            .field("sealed_blocks", &self.metas.len())
            .field("entries", &self.num_entries)
            .field("has_bloom", &self.bloom.is_some())
            .finish()
    }
}

/// `<path>.tmp`, next to the final file so the rename stays on one filesystem.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

fn write_sections(path: &Path, sections: &[&[u8]], footer: &Footer) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut w = BufWriter::new(file);
    for section in sections {
        w.write_all(section)?;
    }
    footer.write_to(&mut w)?;
    w.flush()?;
    w.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}
