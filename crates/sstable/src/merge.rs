//! K-way merge over sorted key/value streams.
//!
//! Produces pairs in ascending key order. When the same key appears in more
//! than one source, the pair from the source with the **lowest index** wins
//! and the others are dropped, so callers list sources newest first
//! (memtable, then level-0 tables from newest to oldest).
//!
//! Tombstones are passed through untouched; filtering them is up to the
//! caller.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::Result;

/// Boxed sorted source accepted by [`MergeIterator`].
pub type MergeSource<'a> = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + 'a>;

/// Head of one source, ordered for a min-heap on `(key, source)`.
struct HeapEntry {
    key: Vec<u8>,
    value: Vec<u8>,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse both comparisons so the smallest
        // key, and on ties the newest source, surfaces first.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges sorted sources into one sorted, deduplicated stream.
///
/// Each source is pulled one pair at a time, so memory use is one pending
/// pair per source.
pub struct MergeIterator<'a> {
    sources: Vec<MergeSource<'a>>,
    heap: BinaryHeap<HeapEntry>,
}

impl<'a> MergeIterator<'a> {
    /// Primes the heap with the first pair of every source.
    ///
    /// # Errors
    ///
    /// Propagates the first error any source yields while priming.
    pub fn new(sources: Vec<MergeSource<'a>>) -> Result<Self> {
        let mut it = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
        };
        for source in 0..it.sources.len() {
            it.refill(source)?;
        }
        Ok(it)
    }

    fn refill(&mut self, source: usize) -> Result<()> {
        if let Some(next) = self.sources[source].next() {
            let (key, value) = next?;
            self.heap.push(HeapEntry { key, value, source });
        }
        Ok(())
    }

    /// Returns the next pair in key order, or `None` once every source is
    /// exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let Some(top) = self.heap.pop() else {
            return Ok(None);
        };
        self.refill(top.source)?;

        // Older copies of the same key.
        while self.heap.peek().is_some_and(|e| e.key == top.key) {
            if let Some(dup) = self.heap.pop() {
                self.refill(dup.source)?;
            }
        }

        Ok(Some((top.key, top.value)))
    }

    /// Drains every remaining pair into a `Vec`.
    pub fn collect_all(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        while let Some(pair) = self.next_entry()? {
            out.push(pair);
        }
        Ok(out)
    }
}

impl Iterator for MergeIterator<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
