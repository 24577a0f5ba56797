//! Tiered backing store for compressed page images
//!
//! A special-purpose allocator for a swap-compression subsystem: it
//! holds variable-sized compressed page images in fixed-size chunks
//! carved out of 4 KiB host pages. Three chunk tiers (2 KiB, 1 KiB,
//! 256 B) trade the determinism of a buddy-of-two scheme for noticeably
//! higher density.
//!
//! The API differs from a conventional allocator in that
//! [`TierPool::alloc`] returns an opaque [`Handle`] rather than a
//! dereferenceable pointer. Callers map the handle with
//! [`TierPool::map`] while touching the data and unmap it afterwards.
//!
//! # Features
//!
//! - **Tiered free sets**: each tier keeps an ordered set of free
//!   chunks, so allocation always hands out the lowest free address and
//!   pages fill densely from the bottom
//! - **Whole-page reclamation**: a cooperative protocol quarantines one
//!   victim page, drives the embedder's eviction callback over its live
//!   chunks, and returns the page to the page source — or reverses the
//!   quarantine if an eviction fails
//! - **Interrupt-safe locking**: a single `IrqSpinMutex` protects the
//!   pool, so `free` may be called from eviction-writeback completions
//!
//! # Usage
//!
//! ```ignore
//! use ctier_pool::{AllocFlags, TierPool};
//!
//! let pool = TierPool::with_ops(frame_source, writeback_ops);
//! let handle = pool.alloc(compressed_len, AllocFlags::empty())?;
//! unsafe {
//!     core::ptr::copy_nonoverlapping(src, pool.map(handle), compressed_len);
//! }
//! pool.unmap(handle);
//! ```
//!
//! # Optional Features
//!
//! - `stats` (default): pool activity counters via [`TierPool::stats`]

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod chunk_set;
pub mod config;
pub mod error;
pub mod handle;
pub mod page;
pub mod pool;
pub mod reclaim;
pub mod tier;
pub mod traits;

#[cfg(feature = "stats")]
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

pub use chunk_set::ChunkSet;
pub use config::{DEFAULT_RECLAIM_RETRIES, NUM_TIERS, PAGE_SIZE, TIER_SIZES};
pub use error::{AllocError, ReclaimError};
pub use handle::Handle;
pub use pool::TierPool;
pub use traits::{AllocFlags, EvictOps, HostPage, NoOps, PageSource};

#[cfg(feature = "stats")]
pub use stats::PoolStats;
