//! Error type shared by every SST operation.

use std::io;
use thiserror::Error;

/// Errors raised while building, opening or reading an SST.
///
/// `KeyOutOfRange` is the one variant that is routine rather than a fault:
/// it tells a caller probing several tables that this table cannot hold the
/// key, and the engine skips to the next table when it sees it.
#[derive(Debug, Error)]
pub enum SstError {
    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `build` was called before any pair was added.
    #[error("cannot build an empty SST (no entries were added)")]
    EmptyTable,

    /// `read_block` was asked for a block the table does not have.
    #[error("block index {index} out of range (table has {num_blocks} blocks)")]
    BlockIndexOutOfRange { index: usize, num_blocks: usize },

    /// The key sorts before the table's first key or after its last key.
    #[error("key is outside the table's key range")]
    KeyOutOfRange,

    /// The file's footer, metadata or a block body failed to decode.
    #[error("corrupt SST: {0}")]
    Corrupt(String),

    /// A pair exceeds `MAX_KEY_BYTES` or `MAX_VALUE_BYTES`.
    #[error("entry too large: key {key_len} bytes, value {value_len} bytes")]
    EntryTooLarge { key_len: usize, value_len: usize },

    /// The footer records a different id than the one the caller opened.
    #[error("SST id mismatch: expected {expected}, file records {found}")]
    IdMismatch { expected: u64, found: u64 },
}

/// Result alias for SST operations.
pub type Result<T> = std::result::Result<T, SstError>;

pub(crate) fn corrupt(msg: impl Into<String>) -> SstError {
    SstError::Corrupt(msg.into())
}
