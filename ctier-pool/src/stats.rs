//! Statistics collection for the pool
//!
//! Feature-gated under the `stats` feature (on by default).

/// Counters describing a pool's lifetime activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Host pages currently carved
    pub pages: usize,
    /// Bytes currently carved (pages x page size)
    pub bytes: u64,
    /// Successful allocations since creation
    pub total_allocs: u64,
    /// Frees since creation
    pub total_frees: u64,
    /// Pages grown from the page source
    pub grow_ops: u64,
    /// Pages returned via reclamation
    pub pages_reclaimed: u64,
    /// Reclaim iterations that ended in reverse quarantine
    pub failed_reclaims: u64,
}

impl PoolStats {
    /// Fresh zeroed counters
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pages: 0,
            bytes: 0,
            total_allocs: 0,
            total_frees: 0,
            grow_ops: 0,
            pages_reclaimed: 0,
            failed_reclaims: 0,
        }
    }
}
