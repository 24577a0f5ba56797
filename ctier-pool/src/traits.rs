//! Trait definitions for runtime-provided collaborators
//!
//! The pool is agnostic to where its host pages come from and to what
//! eviction actually does with a chunk's bytes. These traits abstract
//! the page-frame allocator underneath and the swap writeback layer
//! above.

use core::fmt::Debug;

use bitflags::bitflags;

use crate::config::PAGE_MASK;
use crate::handle::Handle;
use crate::pool::TierPool;

bitflags! {
    /// Allocation hints forwarded to the page source.
    ///
    /// `HIGHMEM` is rejected by the pool itself: handles are direct
    /// chunk addresses, so every host page must stay permanently
    /// addressable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// Page may come from non-permanently-mapped memory (rejected)
        const HIGHMEM = 1 << 0;
        /// Page source must not block to satisfy the request
        const NO_WAIT = 1 << 1;
        /// Page source should hand out zeroed memory
        const ZERO = 1 << 2;
    }
}

/// One host page obtained from a [`PageSource`].
///
/// Carries the page's base address. The source guarantees the page is
/// mapped, writable, and exclusively owned by the holder until it is
/// passed back to [`PageSource::free_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPage {
    base: usize,
}

impl HostPage {
    /// Wrap a page base address.
    ///
    /// # Panics
    /// If `base` is zero or not page-aligned.
    #[must_use]
    pub const fn new(base: usize) -> Self {
        assert!(base != 0, "null host page");
        assert!(base & PAGE_MASK == 0, "host page base not page-aligned");
        Self { base }
    }

    /// Base address of the page
    #[inline]
    #[must_use]
    pub const fn base(self) -> usize {
        self.base
    }
}

/// Page-frame source trait
///
/// Supplies and takes back the 4 KiB host pages the pool carves into
/// chunks. In a kernel this wraps the page-frame allocator; in tests it
/// hands out aligned heap memory.
pub trait PageSource {
    /// Error type for page allocation
    type Error: Debug;

    /// Allocate one host page.
    ///
    /// May block unless `flags` contains
    /// [`NO_WAIT`](AllocFlags::NO_WAIT); the pool drops its own lock
    /// around this call.
    fn alloc_page(&self, flags: AllocFlags) -> Result<HostPage, Self::Error>;

    /// Return one host page.
    ///
    /// Precondition: no outstanding references into the page.
    fn free_page(&self, page: HostPage);
}

/// Eviction callback trait
///
/// The reclaim driver hands each still-live chunk of a victim page to
/// `evict`. On success the implementation must have written the chunk's
/// contents out and called [`TierPool::free`] on the handle before
/// returning. On failure it must leave the chunk untouched.
pub trait EvictOps<P: PageSource>: Sized {
    /// Error type for a refused eviction
    type Error: Debug;

    /// Write out and release one live chunk
    fn evict(&self, pool: &TierPool<P, Self>, handle: Handle) -> Result<(), Self::Error>;
}

/// Evictor type for pools with reclamation disabled.
///
/// Uninhabited: a pool built with [`TierPool::new`](crate::TierPool::new)
/// carries no evictor value, and the impl below can never actually run.
#[derive(Debug, Clone, Copy)]
pub enum NoOps {}

impl<P: PageSource> EvictOps<P> for NoOps {
    type Error = core::convert::Infallible;

    fn evict(&self, _pool: &TierPool<P, Self>, _handle: Handle) -> Result<(), Self::Error> {
        match *self {}
    }
}
