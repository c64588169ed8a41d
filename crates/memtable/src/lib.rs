//! # Memtable - concurrent skip list
//!
//! The in-memory write buffer of StrataKV. Every write lands here first; the
//! engine drains it into an SST with [`SkipList::flush`] once it grows past
//! the configured threshold.
//!
//! ## Layout
//!
//! Nodes live in an arena (`Vec<Node>`) and link to each other by slot index,
//! with [`NIL`] standing for "no successor". Slot 0 is the head sentinel, which
//! carries no key and participates in every level. Physically removed slots
//! are recycled through a free list.
//!
//! ```text
//! level 2:  HEAD ───────────────► c ─────────────────► NIL
//! level 1:  HEAD ──────► b ─────► c ──────► e ───────► NIL
//! level 0:  HEAD ─► a ─► b ─► c ─► d ─► e ─► f ──────► NIL
//! ```
//!
//! ## Locking
//!
//! One reader-writer lock guards the whole arena:
//!
//! | Shared (read)                      | Exclusive (write)                    |
//! |------------------------------------|--------------------------------------|
//! | `get`, `get_size`, `len`, `begin`  | `put`, `remove`, `flush`, `clear`    |
//!
//! A [`SkipListIter`] owns its read guard until it is dropped, so writers
//! (including `flush`) wait for every live iterator. Calling a writing method
//! on the same thread while holding an iterator deadlocks.
//!
//! ## Deletes
//!
//! [`SkipList::remove`] is a physical unlink. It leaves no trace, so it must
//! not be used to delete a key whose older version may live in an SST; the
//! engine writes a tombstone value with [`SkipList::put`] instead.

use parking_lot::{RwLock, RwLockReadGuard};
use rand::Rng;
use std::mem;

/// Sentinel slot index meaning "no node".
pub const NIL: usize = usize::MAX;

/// Default cap on tower height.
pub const DEFAULT_MAX_LEVEL: usize = 16;

const HEAD: usize = 0;

struct Node {
    key: Vec<u8>,
    value: Vec<u8>,
    /// Successor slot per level; `forward.len()` is the node's height.
    forward: Vec<usize>,
}

struct Arena {
    nodes: Vec<Node>,
    free: Vec<usize>,
    /// Number of levels currently in use (at least 1).
    level: usize,
    size_bytes: usize,
    len: usize,
}

impl Arena {
    fn new(max_level: usize) -> Self {
        Self {
            nodes: vec![Node {
                key: Vec::new(),
                value: Vec::new(),
                forward: vec![NIL; max_level],
            }],
            free: Vec::new(),
            level: 1,
            size_bytes: 0,
            len: 0,
        }
    }

    /// Top-down search. Fills `update[l]` with the last node at level `l`
    /// whose key is less than `key` and returns that node's level-0 successor,
    /// the only slot that can hold `key`.
    fn find_predecessors(&self, key: &[u8], update: &mut [usize]) -> usize {
        let mut x = HEAD;
        for lvl in (0..self.level).rev() {
            loop {
                let next = self.nodes[x].forward[lvl];
                if next != NIL && self.nodes[next].key.as_slice() < key {
                    x = next;
                } else {
                    break;
                }
            }
            update[lvl] = x;
        }
        self.nodes[x].forward[0]
    }

    fn find(&self, key: &[u8]) -> Option<usize> {
        let mut x = HEAD;
        for lvl in (0..self.level).rev() {
            loop {
                let next = self.nodes[x].forward[lvl];
                if next != NIL && self.nodes[next].key.as_slice() < key {
                    x = next;
                } else {
                    break;
                }
            }
        }
        let candidate = self.nodes[x].forward[0];
        (candidate != NIL && self.nodes[candidate].key == key).then_some(candidate)
    }

    fn alloc(&mut self, key: Vec<u8>, value: Vec<u8>, height: usize) -> usize {
        let node = Node {
            key,
            value,
            forward: vec![NIL; height],
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn reset(&mut self) {
        self.nodes.truncate(1);
        self.nodes[HEAD].forward.fill(NIL);
        self.free.clear();
        self.level = 1;
        self.size_bytes = 0;
        self.len = 0;
    }
}

/// Sorted map from byte-string keys to byte-string values, safe to share
/// between threads (`&self` everywhere).
pub struct SkipList {
    arena: RwLock<Arena>,
    max_level: usize,
}

impl SkipList {
    /// Creates an empty list with [`DEFAULT_MAX_LEVEL`].
    pub fn new() -> Self {
        Self::with_max_level(DEFAULT_MAX_LEVEL)
    }

    /// Creates an empty list whose towers are at most `max_level` high.
    ///
    /// # Panics
    ///
    /// Panics if `max_level` is 0.
    pub fn with_max_level(max_level: usize) -> Self {
        assert!(max_level > 0, "max_level must be > 0");
        Self {
            arena: RwLock::new(Arena::new(max_level)),
            max_level,
        }
    }

    #[must_use]
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Inserts `key` or replaces its value in place.
    ///
    /// An overwrite keeps the node's height and moves the size estimate by
    /// the value-length delta; an insert adds `key.len() + value.len()`.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        let height = self.random_level();
        let mut guard = self.arena.write();
        let arena = &mut *guard;

        let mut update = vec![HEAD; self.max_level];
        let candidate = arena.find_predecessors(&key, &mut update);

        if candidate != NIL && arena.nodes[candidate].key == key {
            let node = &mut arena.nodes[candidate];
            arena.size_bytes = arena.size_bytes - node.value.len() + value.len();
            node.value = value;
            return;
        }

        // update[] already points at HEAD for levels above `arena.level`.
        arena.level = arena.level.max(height);
        arena.size_bytes += key.len() + value.len();
        arena.len += 1;

        let slot = arena.alloc(key, value, height);
        for (lvl, &prev) in update.iter().enumerate().take(height) {
            arena.nodes[slot].forward[lvl] = arena.nodes[prev].forward[lvl];
            arena.nodes[prev].forward[lvl] = slot;
        }
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let arena = self.arena.read();
        arena.find(key).map(|slot| arena.nodes[slot].value.clone())
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.arena.read().find(key).is_some()
    }

    /// Physically unlinks `key` from every level it occupies.
    ///
    /// Returns `false` if the key was not present. See the crate docs for why
    /// the engine never deletes through this method.
    pub fn remove(&self, key: &[u8]) -> bool {
        let mut guard = self.arena.write();
        let arena = &mut *guard;

        let mut update = vec![HEAD; self.max_level];
        let target = arena.find_predecessors(key, &mut update);
        if target == NIL || arena.nodes[target].key != key {
            return false;
        }

        let height = arena.nodes[target].forward.len();
        for (lvl, &prev) in update.iter().enumerate().take(height) {
            if arena.nodes[prev].forward[lvl] == target {
                arena.nodes[prev].forward[lvl] = arena.nodes[target].forward[lvl];
            }
        }

        let node = &mut arena.nodes[target];
        let freed = node.key.len() + node.value.len();
        node.key = Vec::new();
        node.value = Vec::new();
        node.forward.clear();

        arena.size_bytes -= freed;
        arena.len -= 1;
        arena.free.push(target);

        while arena.level > 1 && arena.nodes[HEAD].forward[arena.level - 1] == NIL {
            arena.level -= 1;
        }
        true
    }

    /// Drains the list into ascending `(key, value)` pairs and leaves it
    /// empty with a size estimate of zero.
    pub fn flush(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut guard = self.arena.write();
        let arena = &mut *guard;

        let mut out = Vec::with_capacity(arena.len);
        let mut cur = arena.nodes[HEAD].forward[0];
        while cur != NIL {
            let node = &mut arena.nodes[cur];
            out.push((mem::take(&mut node.key), mem::take(&mut node.value)));
            cur = node.forward[0];
        }

        arena.reset();
        out
    }

    /// Drops every node.
    pub fn clear(&self) {
        self.arena.write().reset();
    }

    /// Sum of key and value lengths currently stored.
    pub fn get_size(&self) -> usize {
        self.arena.read().size_bytes
    }

    pub fn len(&self) -> usize {
        self.arena.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens a cursor at the smallest key.
    ///
    /// The cursor holds the read lock until it is dropped.
    pub fn begin(&self) -> SkipListIter<'_> {
        let arena = self.arena.read();
        let current = arena.nodes[HEAD].forward[0];
        SkipListIter { arena, current }
    }

    /// Geometric draw: starts at 1 and grows while a fair coin lands heads.
    fn random_level(&self) -> usize {
        let mut rng = rand::thread_rng();
        let mut level = 1;
        while level < self.max_level && rng.gen::<bool>() {
            level += 1;
        }
        level
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SkipList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arena = self.arena.read();
        f.debug_struct("SkipList")
            .field("len", &arena.len)
            .field("size_bytes", &arena.size_bytes)
            .field("level", &arena.level)
            .field("max_level", &self.max_level)
            .finish()
    }
}

/// Forward cursor over a [`SkipList`] in ascending key order.
///
/// Holds the list's read lock for its whole lifetime; the guard is released
/// when the cursor is dropped, whichever way the caller's scope ends. Once
/// the cursor moves past the last node it is invalid and its accessors
/// return `None`.
///
/// Besides the cursor methods it implements [`Iterator`], yielding owned
/// copies of the current pair and then advancing.
pub struct SkipListIter<'a> {
    arena: RwLockReadGuard<'a, Arena>,
    current: usize,
}

impl<'a> SkipListIter<'a> {
    /// `false` once the cursor is past the last node (the end position).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.current != NIL
    }

    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        self.node().map(|n| n.key.as_slice())
    }

    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        self.node().map(|n| n.value.as_slice())
    }

    /// Moves to the next node. A no-op at the end position.
    pub fn advance(&mut self) {
        if let Some(node) = self.node() {
            self.current = node.forward[0];
        }
    }

    fn node(&self) -> Option<&Node> {
        (self.current != NIL).then(|| &self.arena.nodes[self.current])
    }
}

impl Iterator for SkipListIter<'_> {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.node().map(|n| (n.key.clone(), n.value.clone()))?;
        self.advance();
        Some(item)
    }
}
