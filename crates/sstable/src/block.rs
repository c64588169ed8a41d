//! Block: the unit of SST storage and of each lookup's disk read.
//!
//! ```text
//! [entry 0] ... [entry n-1] [offset 0: u32] ... [offset n-1: u32] [n: u32]
//!
//! entry = key_len: u32 | key | value_len: u32 | value
//! ```
//!
//! Entries are stored in ascending key order. `offset i` is the byte position
//! of entry `i` inside the entry area, so a lookup binary-searches the offset
//! table instead of scanning. All integers are little-endian.

use byteorder::{ByteOrder, LittleEndian};
use std::cmp::Ordering;

use crate::error::{corrupt, Result};

/// Per-entry cost on top of the key and value bytes: two length prefixes and
/// one offset slot.
pub const ENTRY_OVERHEAD: usize = 4 + 4 + 4;

/// Trailing entry count.
pub const BLOCK_TRAILER_BYTES: usize = 4;

/// Largest key a table accepts (64 MiB). The metadata decoder refuses
/// longer keys.
pub const MAX_KEY_BYTES: usize = 64 * 1024 * 1024;

/// Largest value a table accepts (256 MiB). Together with [`MAX_KEY_BYTES`]
/// this keeps every encoded block addressable by `u32` offsets.
pub const MAX_VALUE_BYTES: usize = 256 * 1024 * 1024;

/// A sorted run of key/value pairs with an offset index.
///
/// A block is filled through [`add_entry`](Block::add_entry) by the builder
/// and is never modified after it is sealed or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    data: Vec<u8>,
    offsets: Vec<u32>,
    capacity: usize,
}

impl Block {
    /// Creates an empty block that accepts entries up to `capacity` encoded
    /// bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            offsets: Vec::new(),
            capacity,
        }
    }

    /// Appends a pair if it fits within the capacity.
    ///
    /// An empty block always takes its first pair, however large, so a pair
    /// bigger than the capacity still ends up in a block of its own. Pairs
    /// over [`MAX_KEY_BYTES`] or [`MAX_VALUE_BYTES`] are always refused.
    pub fn add_entry(&mut self, key: &[u8], value: &[u8]) -> bool {
        if key.len() > MAX_KEY_BYTES || value.len() > MAX_VALUE_BYTES {
            return false;
        }
        let needed = ENTRY_OVERHEAD + key.len() + value.len();
        // offsets and the block length are stored as u32
        let limit = self.capacity.min(u32::MAX as usize);
        if !self.is_empty() && self.encoded_size() + needed > limit {
            return false;
        }

        self.offsets.push(self.data.len() as u32);
        self.data.extend_from_slice(&(key.len() as u32).to_le_bytes());
        self.data.extend_from_slice(key);
        self.data.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.data.extend_from_slice(value);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Size of [`encode`](Block::encode)'s output.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        self.data.len() + self.offsets.len() * 4 + BLOCK_TRAILER_BYTES
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size());
        out.extend_from_slice(&self.data);
        for off in &self.offsets {
            out.extend_from_slice(&off.to_le_bytes());
        }
        out.extend_from_slice(&(self.offsets.len() as u32).to_le_bytes());
        out
    }

    /// Parses an encoded block.
    ///
    /// Every entry must be well formed and the entries must tile the entry
    /// area exactly, so that later lookups can slice without bounds checks
    /// failing.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_TRAILER_BYTES {
            return Err(corrupt("block shorter than its trailer"));
        }
        let trailer_at = buf.len() - BLOCK_TRAILER_BYTES;
        let count = LittleEndian::read_u32(&buf[trailer_at..]) as usize;

        let index_bytes = count
            .checked_mul(4)
            .filter(|&n| n <= trailer_at)
            .ok_or_else(|| corrupt(format!("block entry count {} exceeds block size", count)))?;
        let data_end = trailer_at - index_bytes;
        let data = &buf[..data_end];

        let mut offsets = Vec::with_capacity(count);
        let mut expected = 0usize;
        for chunk in buf[data_end..trailer_at].chunks_exact(4) {
            let off = LittleEndian::read_u32(chunk) as usize;
            if off != expected {
                return Err(corrupt(format!(
                    "block offset {} does not follow previous entry (expected {})",
                    off, expected
                )));
            }
            expected = entry_end(data, off)?;
            offsets.push(off as u32);
        }
        if expected != data_end {
            return Err(corrupt("trailing bytes after last block entry"));
        }

        Ok(Self {
            data: data.to_vec(),
            offsets,
            capacity: buf.len(),
        })
    }

    /// Returns the pair at position `idx`, or `None` past the end.
    #[must_use]
    pub fn entry(&self, idx: usize) -> Option<(&[u8], &[u8])> {
        let off = *self.offsets.get(idx)? as usize;
        Some(self.entry_at(off))
    }

    #[must_use]
    pub fn first_key(&self) -> Option<&[u8]> {
        self.entry(0).map(|(k, _)| k)
    }

    #[must_use]
    pub fn last_key(&self) -> Option<&[u8]> {
        self.len().checked_sub(1).and_then(|i| self.entry(i)).map(|(k, _)| k)
    }

    /// Point lookup by binary search over the offset table.
    #[must_use]
    pub fn get_value_binary(&self, key: &[u8]) -> Option<&[u8]> {
        let idx = self
            .offsets
            .binary_search_by(|&off| self.entry_at(off as usize).0.cmp(key))
            .ok()?;
        self.entry(idx).map(|(_, v)| v)
    }

    /// Position of the first entry whose key is `>= key` (`len()` if none).
    #[must_use]
    pub fn lower_bound(&self, key: &[u8]) -> usize {
        self.offsets
            .partition_point(|&off| self.entry_at(off as usize).0.cmp(key) == Ordering::Less)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.offsets.iter().map(move |&off| self.entry_at(off as usize))
    }

    fn entry_at(&self, off: usize) -> (&[u8], &[u8]) {
        let key_len = LittleEndian::read_u32(&self.data[off..]) as usize;
        let key_start = off + 4;
        let val_len_at = key_start + key_len;
        let val_len = LittleEndian::read_u32(&self.data[val_len_at..]) as usize;
        let val_start = val_len_at + 4;
        (
            &self.data[key_start..val_len_at],
            &self.data[val_start..val_start + val_len],
        )
    }
}

/// Validates the entry starting at `off` and returns where it ends.
fn entry_end(data: &[u8], off: usize) -> Result<usize> {
    let read_len = |at: usize| -> Result<usize> {
        data.get(at..at + 4)
            .map(|b| LittleEndian::read_u32(b) as usize)
            .ok_or_else(|| corrupt(format!("block entry length prefix truncated at {}", at)))
    };
    let key_len = read_len(off)?;
    let val_len_at = off + 4 + key_len;
    let val_len = read_len(val_len_at)?;
    let end = val_len_at + 4 + val_len;
    if end > data.len() {
        return Err(corrupt(format!("block entry at {} runs past the entry area", off)));
    }
    Ok(end)
}
