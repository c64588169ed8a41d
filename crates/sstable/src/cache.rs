//! LRU cache of decoded blocks shared by every open table.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::block::Block;

/// Decoded blocks keyed by `(sst_id, block_idx)`.
///
/// Table ids are never reused, so an entry can never describe the wrong
/// table; stale entries of a released table simply age out.
pub struct BlockCache {
    blocks: Mutex<LruCache<(u64, usize), Arc<Block>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlockCache {
    /// Creates a cache holding at most `capacity` blocks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            blocks: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, sst_id: u64, block_idx: usize) -> Option<Arc<Block>> {
        let found = self.blocks.lock().get(&(sst_id, block_idx)).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, sst_id: u64, block_idx: usize, block: Arc<Block>) {
        self.blocks.lock().put((sst_id, block_idx), block);
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.blocks.lock().cap().get()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (hits, misses) = self.stats();
        f.debug_struct("BlockCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("hits", &hits)
            .field("misses", &misses)
            .finish()
    }
}
