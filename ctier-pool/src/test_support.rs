//! Shared fixtures for pool tests
//!
//! A page source backed by the host allocator, a handful of eviction
//! callbacks with different behaviours, and a deterministic generator
//! for randomised traces.

use std::alloc::{alloc, alloc_zeroed, dealloc, Layout};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use crate::config::PAGE_SIZE;
use crate::handle::Handle;
use crate::pool::TierPool;
use crate::traits::{AllocFlags, EvictOps, HostPage, PageSource};

const PAGE_LAYOUT: Layout = match Layout::from_size_align(PAGE_SIZE, PAGE_SIZE) {
    Ok(layout) => layout,
    Err(_) => panic!("bad page layout"),
};

/// Page source handing out real, page-aligned host memory.
///
/// Tracks outstanding pages so tests can assert the pool gave every
/// page back, and panics on a page being returned twice.
pub(crate) struct TestSource {
    outstanding: Arc<Mutex<HashSet<usize>>>,
    limit: Option<usize>,
}

impl TestSource {
    pub(crate) fn new() -> (Self, PageTracker) {
        Self::build(None)
    }

    /// A source that refuses to have more than `limit` pages out at once.
    pub(crate) fn with_limit(limit: usize) -> (Self, PageTracker) {
        Self::build(Some(limit))
    }

    fn build(limit: Option<usize>) -> (Self, PageTracker) {
        let outstanding = Arc::new(Mutex::new(HashSet::new()));
        let tracker = PageTracker(Arc::clone(&outstanding));
        (Self { outstanding, limit }, tracker)
    }
}

impl PageSource for TestSource {
    type Error = &'static str;

    fn alloc_page(&self, flags: AllocFlags) -> Result<HostPage, Self::Error> {
        let mut outstanding = self.outstanding.lock().unwrap();
        if let Some(limit) = self.limit {
            if outstanding.len() >= limit {
                return Err("page budget exhausted");
            }
        }

        // SAFETY: PAGE_LAYOUT has non-zero size.
        let ptr = unsafe {
            if flags.contains(AllocFlags::ZERO) {
                alloc_zeroed(PAGE_LAYOUT)
            } else {
                alloc(PAGE_LAYOUT)
            }
        };
        if ptr.is_null() {
            return Err("host allocation failed");
        }

        let base = ptr as usize;
        outstanding.insert(base);
        Ok(HostPage::new(base))
    }

    fn free_page(&self, page: HostPage) {
        let mut outstanding = self.outstanding.lock().unwrap();
        assert!(outstanding.remove(&page.base()), "page returned twice");
        // SAFETY: allocated in alloc_page with the same layout.
        unsafe { dealloc(page.base() as *mut u8, PAGE_LAYOUT) };
    }
}

/// Handle onto a [`TestSource`]'s outstanding-page bookkeeping.
pub(crate) struct PageTracker(Arc<Mutex<HashSet<usize>>>);

impl PageTracker {
    pub(crate) fn outstanding(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// Evictor that always refuses, recording every handle it was shown.
pub(crate) struct RefuseEvict {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<Handle>>,
}

impl RefuseEvict {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl EvictOps<TestSource> for RefuseEvict {
    type Error = &'static str;

    fn evict(&self, _pool: &TierPool<TestSource, Self>, handle: Handle) -> Result<(), Self::Error> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.seen.lock().unwrap().push(handle);
        Err("entry still referenced")
    }
}

/// Evictor that writes the entry out (here: just frees it) and succeeds.
pub(crate) struct WriteoutEvict {
    pub calls: AtomicUsize,
}

impl WriteoutEvict {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl EvictOps<TestSource> for WriteoutEvict {
    type Error = &'static str;

    fn evict(&self, pool: &TierPool<TestSource, Self>, handle: Handle) -> Result<(), Self::Error> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        pool.free(handle);
        Ok(())
    }
}

/// Evictor that, on its first call, also frees a second handle before
/// handling its own. Stands in for a racing thread freeing a chunk of
/// the victim page after quarantine.
pub(crate) struct SideFreeEvict {
    pub side: Mutex<Option<Handle>>,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<Handle>>,
}

impl SideFreeEvict {
    pub(crate) fn new() -> Self {
        Self {
            side: Mutex::new(None),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl EvictOps<TestSource> for SideFreeEvict {
    type Error = &'static str;

    fn evict(&self, pool: &TierPool<TestSource, Self>, handle: Handle) -> Result<(), Self::Error> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.seen.lock().unwrap().push(handle);
        if let Some(side) = self.side.lock().unwrap().take() {
            pool.free(side);
        }
        pool.free(handle);
        Ok(())
    }
}

/// Evictor that claims success without freeing anything, violating the
/// callback contract.
pub(crate) struct LazyEvict {
    pub calls: AtomicUsize,
}

impl LazyEvict {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl EvictOps<TestSource> for LazyEvict {
    type Error = &'static str;

    fn evict(&self, _pool: &TierPool<TestSource, Self>, _handle: Handle) -> Result<(), Self::Error> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Small deterministic generator for randomised traces (xorshift64).
pub(crate) struct XorShift(u64);

impl XorShift {
    pub(crate) fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    pub(crate) fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}
