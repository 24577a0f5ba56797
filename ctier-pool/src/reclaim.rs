//! Whole-page reclamation
//!
//! Reclamation runs bottom-up: only the pool knows how chunks are laid
//! out inside a host page, so the pool picks the victim and asks the
//! user's eviction callback to write out each chunk that is still live.
//! An evicted chunk is freed by the callback itself; because the victim
//! page carries the reclaim flag at that point, such frees land in the
//! pool-wide reclaim set instead of re-entering circulation. Once every
//! chunk of the victim sits in the reclaim set the page is empty and
//! goes back to the page source.
//!
//! A failed eviction reverses the quarantine: the victim's chunks move
//! back to its tier's free set and the page re-enters the candidate
//! roster at the head, so the next attempt starts from a different tail
//! page.

use crate::config::{chunks_per_page, DEFAULT_RECLAIM_RETRIES, PAGE_SIZE, TIER_SIZES};
use crate::error::ReclaimError;
use crate::handle::Handle;
use crate::pool::TierPool;
use crate::traits::{EvictOps, HostPage, PageSource};

impl<P: PageSource, E: EvictOps<P>> TierPool<P, E> {
    /// Try to return one host page to the page source.
    ///
    /// Makes up to `retries` attempts. Each attempt quarantines a
    /// victim page, drives the eviction callback over the victim's live
    /// chunks with the pool lock dropped, and either frees the page or
    /// reverses the quarantine.
    ///
    /// # Errors
    /// - [`ReclaimError::NoEvict`] if the pool has no eviction callback
    ///   or `retries` is zero.
    /// - [`ReclaimError::Exhausted`] if no page could be freed within
    ///   the retry budget, including the case of a pool with no
    ///   candidate pages left.
    pub fn reclaim_page(&self, retries: usize) -> Result<(), ReclaimError> {
        let ops = self.ops.as_ref().ok_or(ReclaimError::NoEvict)?;
        if retries == 0 {
            return Err(ReclaimError::NoEvict);
        }

        for _ in 0..retries {
            // Select a victim and quarantine its free chunks. From here
            // until the attempt resolves, the page is detached from its
            // roster and flagged: concurrent reclaimers cannot pick it
            // and concurrent frees drain into the reclaim set.
            let (base, tier) = {
                let mut inner = self.inner.lock();
                match inner.quarantine_victim() {
                    Some(victim) => victim,
                    None => return Err(ReclaimError::Exhausted),
                }
            };
            log::trace!("reclaiming page {base:#x} (tier {tier})");

            // Walk the victim's chunks in address order. Anything
            // already in the reclaim set is drained; everything else is
            // live and goes through the eviction callback, which may
            // block, so the lock is dropped around it. The callback
            // frees the chunk on success, and that free lands in the
            // reclaim set because the page is flagged.
            let chunk = TIER_SIZES[tier];
            let mut evict_failed = false;
            let mut addr = base;
            while addr < base + PAGE_SIZE {
                let drained = self.inner.lock().reclaim.contains(addr);
                if !drained && ops.evict(self, Handle::new(addr)).is_err() {
                    evict_failed = true;
                    break;
                }
                addr += chunk;
            }

            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let drained = inner.reclaim.count_range(base, base + PAGE_SIZE);
            if !evict_failed && drained == chunks_per_page(tier) {
                // Fully drained: drop the quarantined chunks and give
                // the page back.
                inner.reclaim.drain_range(base, base + PAGE_SIZE);
                inner.table.remove(base);
                inner.account_page_released(true);
                self.source.free_page(HostPage::new(base));
                drop(guard);
                log::debug!("reclaimed page {base:#x} (tier {tier})");
                return Ok(());
            }

            if !evict_failed {
                // An eviction reported success without freeing its
                // chunk. Treat the page as not reclaimable this round.
                log::warn!("eviction left page {base:#x} partially drained");
            }

            // Reverse the quarantine: chunks evicted this round stay
            // free, the page becomes an ordinary candidate again.
            inner
                .table
                .get_mut(base)
                .expect("victim page is in the pool")
                .set_under_reclaim(false);
            inner
                .reclaim
                .move_range(&mut inner.free[tier], base, base + PAGE_SIZE);
            inner.pages[tier].attach_head(base);
            #[cfg(feature = "stats")]
            {
                inner.stats.failed_reclaims += 1;
            }
        }

        Err(ReclaimError::Exhausted)
    }

    /// Reclaim up to `target_pages` host pages.
    ///
    /// Runs [`reclaim_page`](Self::reclaim_page) with the default retry
    /// budget until the target is met or an attempt fails. Returns the
    /// number of pages reclaimed, or the error if not even one page
    /// could be freed.
    pub fn shrink(&self, target_pages: usize) -> Result<usize, ReclaimError> {
        let mut reclaimed = 0;
        while reclaimed < target_pages {
            match self.reclaim_page(DEFAULT_RECLAIM_RETRIES) {
                Ok(()) => reclaimed += 1,
                Err(err) => {
                    if reclaimed == 0 {
                        return Err(err);
                    }
                    break;
                }
            }
        }
        Ok(reclaimed)
    }
}
