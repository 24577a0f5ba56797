//! Ordered chunk-address sets
//!
//! The per-tier free sets and the pool-wide reclaim set are ordered sets
//! of chunk addresses. Ordering matters twice: allocation hands out the
//! lowest free chunk so pages fill from the bottom, and quarantine moves
//! a whole host page's worth of chunks with one range sweep.
//!
//! Chunk bookkeeping lives out-of-line in the set, never inside the
//! chunk's own bytes. An allocated chunk therefore carries no metadata
//! of ours and its full tier size belongs to the user.

use alloc::collections::BTreeSet;

/// Ordered set of chunk addresses
pub struct ChunkSet {
    chunks: BTreeSet<usize>,
}

impl ChunkSet {
    /// Create an empty set
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunks: BTreeSet::new(),
        }
    }

    /// Add a chunk address.
    ///
    /// # Panics
    /// If `addr` is already present. A duplicate insert is a double free
    /// upstream, and silently accepting it would corrupt the pool.
    pub fn insert(&mut self, addr: usize) {
        let inserted = self.chunks.insert(addr);
        assert!(inserted, "chunk {addr:#x} freed twice");
    }

    /// Remove a chunk address.
    ///
    /// # Panics
    /// If `addr` is not present.
    pub fn remove(&mut self, addr: usize) {
        let removed = self.chunks.remove(&addr);
        assert!(removed, "chunk {addr:#x} not in set");
    }

    /// Membership test
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        self.chunks.contains(&addr)
    }

    /// Lowest address in the set, if any
    #[must_use]
    pub fn first(&self) -> Option<usize> {
        self.chunks.first().copied()
    }

    /// Remove and return the lowest address
    pub fn take_min(&mut self) -> Option<usize> {
        self.chunks.pop_first()
    }

    /// Remove and return some address, order unspecified
    pub fn take_any(&mut self) -> Option<usize> {
        self.chunks.pop_last()
    }

    /// Move every address in `lo..hi` from this set into `to`.
    ///
    /// Re-seeks from `lo` after each removal rather than iterating while
    /// erasing, so the scan never follows a link out of a removed entry.
    pub fn move_range(&mut self, to: &mut ChunkSet, lo: usize, hi: usize) {
        while let Some(&addr) = self.chunks.range(lo..hi).next() {
            self.chunks.remove(&addr);
            to.insert(addr);
        }
    }

    /// Discard every address in `lo..hi`, returning how many were removed
    pub fn drain_range(&mut self, lo: usize, hi: usize) -> usize {
        let mut removed = 0;
        while let Some(&addr) = self.chunks.range(lo..hi).next() {
            self.chunks.remove(&addr);
            removed += 1;
        }
        removed
    }

    /// Number of addresses in `lo..hi`
    #[must_use]
    pub fn count_range(&self, lo: usize, hi: usize) -> usize {
        self.chunks.range(lo..hi).count()
    }

    /// Addresses in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.chunks.iter().copied()
    }

    /// Number of addresses in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Default for ChunkSet {
    fn default() -> Self {
        Self::new()
    }
}
