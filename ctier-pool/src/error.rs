//! Error types for the pool

use core::fmt;

/// Errors that can occur during allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Zero size or a hint the pool cannot honour
    InvalidRequest,
    /// Request exceeds the largest tier; this pool cannot hold it
    NoSpace,
    /// The page source refused to grow the pool
    OutOfMemory,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "invalid size or allocation hint"),
            Self::NoSpace => write!(f, "request exceeds the largest tier"),
            Self::OutOfMemory => write!(f, "page source out of memory"),
        }
    }
}

/// Errors that can occur during whole-page reclamation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimError {
    /// No eviction callback registered, or a zero retry budget
    NoEvict,
    /// Retry budget spent without freeing a page
    Exhausted,
}

impl fmt::Display for ReclaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEvict => write!(f, "reclamation not possible"),
            Self::Exhausted => write!(f, "reclaim retry budget exhausted"),
        }
    }
}
