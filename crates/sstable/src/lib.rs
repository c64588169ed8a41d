//! # SSTable - Sorted String Table
//!
//! Immutable, block-structured on-disk tables for the StrataKV storage
//! engine.
//!
//! When the memtable reaches its flush threshold the engine drains it, in
//! key order, into an [`SsTableBuilder`]. The builder packs pairs into
//! fixed-capacity [`Block`]s and writes them out as one file. An
//! [`SsTable`] answers lookups by binary-searching a sparse in-memory index
//! of block key ranges, then binary-searching inside the one block that can
//! hold the key.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (blocks, back to back)                           │
//! │                                                               │
//! │ entries: key_len (u32) | key | val_len (u32) | val            │
//! │ offsets: u32 per entry                                        │
//! │ count (u32)                                                   │
//! ├───────────────────────────────────────────────────────────────┤
//! │ META SECTION (sparse block index)                             │
//! │                                                               │
//! │ num_blocks (u32)                                              │
//! │ offset (u64) | len (u32) | first_key | last_key  per block    │
//! │ crc32 (u32) over the section                                  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOOM SECTION (serialized BloomFilter, may be empty)          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 28 bytes)                                 │
//! │                                                               │
//! │ sst_id (u64 LE) | meta_offset (u64 LE)                        │
//! │ bloom_offset (u64 LE) | magic (u32 LE) "STB1"                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Keys inside a table are strictly
//! increasing, and the blocks partition the key range in order.

mod block;
mod builder;
mod cache;
mod error;
mod format;
mod iterator;
mod merge;
mod reader;

pub use block::{Block, BLOCK_TRAILER_BYTES, ENTRY_OVERHEAD, MAX_KEY_BYTES, MAX_VALUE_BYTES};
pub use builder::{tmp_path, SsTableBuilder, DEFAULT_BLOOM_EXPECTED_ENTRIES, DEFAULT_BLOOM_FPR};
pub use cache::BlockCache;
pub use error::{Result, SstError};
pub use format::{BlockMeta, Footer, FOOTER_BYTES, SST_MAGIC};
pub use iterator::SstIter;
pub use merge::{MergeIterator, MergeSource};
pub use reader::SsTable;

#[cfg(test)]
mod tests;
