//! Pool facade
//!
//! A [`TierPool`] hands out chunks carved from 4 KiB host pages, one
//! tier per page. All pool state sits behind a single interrupt-safe
//! lock; `free` may be called from interrupt context, e.g. as the
//! completion of eviction writeback.
//!
//! The pool grows lazily: an allocation that finds its tier's free set
//! empty takes one page from the [`PageSource`] and splits it. Pages are
//! only ever given back by the reclaim driver (see
//! [`reclaim_page`](TierPool::reclaim_page)) or at teardown.

use ctier_sync::IrqSpinMutex;

use crate::chunk_set::ChunkSet;
use crate::config::{chunks_per_page, NUM_TIERS, PAGE_SIZE, TIER_SIZES};
use crate::error::AllocError;
use crate::handle::Handle;
use crate::page::{PageTable, TierRoster};
use crate::tier::tier_for_size;
use crate::traits::{AllocFlags, EvictOps, HostPage, NoOps, PageSource};

#[cfg(feature = "stats")]
use crate::stats::PoolStats;

/// Tiered backing store for compressed page images.
///
/// `P` supplies host pages; `E` is the eviction callback used by the
/// reclaim driver. Pools built with [`TierPool::new`] have no evictor
/// and cannot reclaim.
pub struct TierPool<P: PageSource, E: EvictOps<P> = NoOps> {
    pub(crate) inner: IrqSpinMutex<PoolInner>,
    pub(crate) source: P,
    pub(crate) ops: Option<E>,
}

/// Lock-protected pool state.
///
/// # Invariants
///
/// - Every address in `free[t]` lies in a page of tier `t` that is not
///   under reclaim; every address in `reclaim` lies in a page that is.
/// - The free sets and the reclaim set are pairwise disjoint; a live
///   chunk appears in none of them.
/// - `bytes` is always `PAGE_SIZE * table.len()`.
pub(crate) struct PoolInner {
    pub(crate) free: [ChunkSet; NUM_TIERS],
    pub(crate) reclaim: ChunkSet,
    pub(crate) pages: [TierRoster; NUM_TIERS],
    pub(crate) table: PageTable,
    pub(crate) bytes: u64,
    #[cfg(feature = "stats")]
    pub(crate) stats: PoolStats,
}

impl PoolInner {
    const fn new() -> Self {
        Self {
            free: [const { ChunkSet::new() }; NUM_TIERS],
            reclaim: ChunkSet::new(),
            pages: [const { TierRoster::new() }; NUM_TIERS],
            table: PageTable::new(),
            bytes: 0,
            #[cfg(feature = "stats")]
            stats: PoolStats::new(),
        }
    }

    /// Split a fresh host page into chunks of the given tier and make
    /// the page an allocation source.
    pub(crate) fn carve(&mut self, page: HostPage, tier: usize) {
        let base = page.base();
        self.table.insert(base, tier);

        let chunk = TIER_SIZES[tier];
        let mut addr = base;
        while addr < base + PAGE_SIZE {
            self.free[tier].insert(addr);
            addr += chunk;
        }

        self.pages[tier].attach_head(base);
        self.bytes += PAGE_SIZE as u64;
        #[cfg(feature = "stats")]
        {
            self.stats.pages += 1;
            self.stats.bytes = self.bytes;
            self.stats.grow_ops += 1;
        }
    }

    /// Account for one page leaving the pool.
    pub(crate) fn account_page_released(&mut self, reclaimed: bool) {
        self.bytes -= PAGE_SIZE as u64;
        #[cfg(feature = "stats")]
        {
            self.stats.pages -= 1;
            self.stats.bytes = self.bytes;
            if reclaimed {
                self.stats.pages_reclaimed += 1;
            }
        }
        #[cfg(not(feature = "stats"))]
        let _ = reclaimed;
    }

    /// Select the next reclaim victim and quarantine its free chunks.
    ///
    /// Walks tiers from the largest chunk size down: the bigger the
    /// chunks, the fewer live entries a page can hold, so eviction work
    /// per reclaimed page is smallest there. Within a tier the oldest
    /// candidate is taken first. Returns the victim's base address and
    /// tier, or `None` when no tier has a candidate left.
    pub(crate) fn quarantine_victim(&mut self) -> Option<(usize, usize)> {
        for tier in 0..NUM_TIERS {
            let candidate = self.pages[tier]
                .candidates()
                .find(|&base| self.table.get(base).is_some_and(|m| !m.under_reclaim()));
            let Some(base) = candidate else { continue };

            // Detaching makes the page unselectable by a concurrent
            // reclaimer; the flag reroutes concurrent frees.
            self.pages[tier].detach(base);
            self.table
                .get_mut(base)
                .expect("candidate page is in the pool")
                .set_under_reclaim(true);
            self.free[tier]
                .move_range(&mut self.reclaim, base, base + PAGE_SIZE);
            return Some((base, tier));
        }
        None
    }
}

impl<P: PageSource> TierPool<P, NoOps> {
    /// Create a pool without an eviction callback.
    ///
    /// Such a pool can allocate and free but never reclaim pages.
    #[must_use]
    pub fn new(source: P) -> Self {
        Self {
            inner: IrqSpinMutex::new(PoolInner::new()),
            source,
            ops: None,
        }
    }
}

impl<P: PageSource, E: EvictOps<P>> TierPool<P, E> {
    /// Create a pool with an eviction callback for page reclamation.
    #[must_use]
    pub fn with_ops(source: P, ops: E) -> Self {
        Self {
            inner: IrqSpinMutex::new(PoolInner::new()),
            source,
            ops: Some(ops),
        }
    }

    /// Allocate a chunk of at least `size` bytes.
    ///
    /// The chunk comes from the smallest tier that holds the request.
    /// If that tier has no free chunk the pool grows by one host page.
    ///
    /// # Errors
    /// - [`AllocError::InvalidRequest`] for a zero size or a `HIGHMEM`
    ///   hint: chunk handles are direct addresses, so pool pages must
    ///   stay permanently addressable.
    /// - [`AllocError::NoSpace`] when `size` exceeds the largest tier.
    /// - [`AllocError::OutOfMemory`] when the page source refuses to
    ///   grow the pool.
    pub fn alloc(&self, size: usize, flags: AllocFlags) -> Result<Handle, AllocError> {
        if size == 0 || flags.contains(AllocFlags::HIGHMEM) {
            return Err(AllocError::InvalidRequest);
        }
        let tier = tier_for_size(size).ok_or(AllocError::NoSpace)?;

        {
            let mut inner = self.inner.lock();
            if let Some(addr) = inner.free[tier].take_min() {
                #[cfg(feature = "stats")]
                {
                    inner.stats.total_allocs += 1;
                }
                return Ok(Handle::new(addr));
            }
        }

        // The page source may block, so grow with the pool lock dropped.
        let page = self.source.alloc_page(flags).map_err(|err| {
            log::debug!("page source refused to grow tier {tier}: {err:?}");
            AllocError::OutOfMemory
        })?;

        let mut inner = self.inner.lock();
        inner.carve(page, tier);
        log::debug!("tier {} grew with page {:#x}", tier, page.base());

        // The carve above ran under the same lock hold, so at least one
        // chunk of the new page is still free.
        let addr = inner.free[tier]
            .take_min()
            .expect("freshly carved page has a free chunk");
        #[cfg(feature = "stats")]
        {
            inner.stats.total_allocs += 1;
        }
        Ok(Handle::new(addr))
    }

    /// Return a chunk to the pool.
    ///
    /// If the chunk's page is under reclamation the chunk is folded into
    /// the reclaim set as drained work rather than re-enabled for
    /// allocation; the host page itself is only ever released by the
    /// reclaim driver or at teardown.
    ///
    /// # Panics
    /// If the handle does not belong to this pool, is misaligned for
    /// its tier, or was already freed. All three are caller bugs this
    /// close to page tables; corrupting the pool instead would be worse.
    pub fn free(&self, handle: Handle) {
        let base = handle.page_base();
        let mut inner = self.inner.lock();
        let meta = *inner
            .table
            .get(base)
            .unwrap_or_else(|| panic!("{handle:?} does not belong to this pool"));
        let tier = meta.tier();
        assert!(
            handle.is_aligned_to(TIER_SIZES[tier]),
            "{handle:?} is not aligned to its tier"
        );

        if meta.under_reclaim() {
            inner.reclaim.insert(handle.addr());
        } else {
            inner.free[tier].insert(handle.addr());
        }
        #[cfg(feature = "stats")]
        {
            inner.stats.total_frees += 1;
        }
    }

    /// Get a pointer to the chunk's bytes.
    ///
    /// No copy and no pinning beyond the pool's own residency guarantee:
    /// the bytes stay valid until the handle is freed.
    #[inline]
    #[must_use]
    pub fn map(&self, handle: Handle) -> *mut u8 {
        handle.as_ptr()
    }

    /// Release a mapping obtained from [`map`](Self::map). A no-op.
    #[inline]
    pub fn unmap(&self, _handle: Handle) {}

    /// Total bytes of host memory currently carved by this pool.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.lock().bytes
    }

    /// The eviction callback this pool was built with, if any.
    #[must_use]
    pub fn ops(&self) -> Option<&E> {
        self.ops.as_ref()
    }

    /// Snapshot of the pool's counters.
    #[cfg(feature = "stats")]
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats
    }
}

impl<P: PageSource, E: EvictOps<P>> Drop for TierPool<P, E> {
    /// Tear the pool down, returning every host page to the source.
    ///
    /// # Panics
    /// If any handle is still live or a reclamation is in flight; a
    /// teardown at that point would hand referenced pages back to the
    /// page-frame allocator.
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        assert!(
            inner.reclaim.is_empty(),
            "pool torn down with a reclamation in flight"
        );

        for tier in 0..NUM_TIERS {
            while let Some(base) = inner.pages[tier].detach_oldest() {
                let drained = inner.free[tier].drain_range(base, base + PAGE_SIZE);
                assert!(
                    drained == chunks_per_page(tier),
                    "pool torn down with live handles in page {base:#x}"
                );
                inner.table.remove(base);
                inner.account_page_released(false);
                self.source.free_page(HostPage::new(base));
            }
            assert!(
                inner.free[tier].is_empty(),
                "free chunks left over in tier {tier}"
            );
        }
        assert!(inner.table.is_empty(), "pages leaked at teardown");
    }
}

// Test-only introspection, used to pin down internal invariants that
// the public surface deliberately hides.
#[cfg(test)]
impl<P: PageSource, E: EvictOps<P>> TierPool<P, E> {
    pub(crate) fn free_contains(&self, tier: usize, addr: usize) -> bool {
        self.inner.lock().free[tier].contains(addr)
    }

    pub(crate) fn free_len(&self, tier: usize) -> usize {
        self.inner.lock().free[tier].len()
    }

    pub(crate) fn reclaim_len(&self) -> usize {
        self.inner.lock().reclaim.len()
    }

    pub(crate) fn page_tier(&self, base: usize) -> Option<usize> {
        self.inner.lock().table.get(base).map(|m| m.tier())
    }

    pub(crate) fn page_under_reclaim(&self, base: usize) -> Option<bool> {
        self.inner.lock().table.get(base).map(|m| m.under_reclaim())
    }

    pub(crate) fn page_count(&self) -> usize {
        self.inner.lock().table.len()
    }

    /// Check every global invariant the lock is supposed to protect.
    pub(crate) fn debug_check_invariants(&self) {
        use crate::config::PAGE_MASK;

        let inner = self.inner.lock();
        let mut seen = std::collections::HashSet::new();

        for tier in 0..NUM_TIERS {
            for addr in inner.free[tier].iter() {
                let meta = inner
                    .table
                    .get(addr & !PAGE_MASK)
                    .expect("free chunk has an owning page");
                assert_eq!(meta.tier(), tier);
                assert!(!meta.under_reclaim());
                assert!(Handle::new(addr).is_aligned_to(TIER_SIZES[tier]));
                assert!(seen.insert(addr), "chunk in two sets");
            }
        }
        for addr in inner.reclaim.iter() {
            let meta = inner
                .table
                .get(addr & !PAGE_MASK)
                .expect("quarantined chunk has an owning page");
            assert!(meta.under_reclaim());
            assert!(seen.insert(addr), "chunk in two sets");
        }

        assert_eq!(inner.bytes, (PAGE_SIZE * inner.table.len()) as u64);
    }
}
