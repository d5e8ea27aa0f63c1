//! Error types for pool operations and free-list inspection.

use thiserror::Error;

/// Failure of a pool operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// A request for zero elements.
    #[error("allocation request for zero elements")]
    EmptyRequest,
    /// No free block fits and the request is larger than one chunk.
    ///
    /// This is an expected outcome; the caller may obtain the memory directly
    /// from the system (see [`Pool::allocate_or_system`](crate::Pool::allocate_or_system)).
    #[error("pool miss: {requested} elements exceed chunk size {chunk_size}")]
    PoolMiss { requested: usize, chunk_size: usize },
    /// The memory source could not provide `elements` elements.
    #[error("system allocation of {elements} elements failed")]
    SystemAllocation { elements: usize },
    /// `elements` elements of the pool's type do not form a valid layout.
    #[error("layout for {elements} elements overflows")]
    LayoutOverflow { elements: usize },
    /// The configured chunk size is zero.
    #[error("chunk size must be at least one element")]
    ZeroChunkSize,
}

impl PoolError {
    /// Returns true for [`PoolError::PoolMiss`].
    #[must_use]
    pub const fn is_pool_miss(&self) -> bool {
        matches!(self, Self::PoolMiss { .. })
    }
}

/// A broken free-list invariant found by
/// [`Pool::check_invariants`](crate::Pool::check_invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("free list is empty")]
    Empty,
    #[error("free block at {addr:#x} has zero size")]
    EmptyBlock { addr: usize },
    #[error("free block at {addr:#x} does not follow {prev:#x} in address order")]
    OutOfOrder { prev: usize, addr: usize },
    #[error("free blocks at {prev:#x} and {addr:#x} overlap")]
    Overlap { prev: usize, addr: usize },
    #[error("free blocks at {prev:#x} and {addr:#x} are adjacent but not merged")]
    Unmerged { prev: usize, addr: usize },
    #[error("cached tail {cached:#x?} is not the last block {actual:#x?}")]
    TailMismatch {
        cached: Option<usize>,
        actual: Option<usize>,
    },
    #[error("walked {counted} free blocks but {cached} are recorded")]
    BlockCountDrift { counted: usize, cached: usize },
    #[error("walked {counted} free elements but {cached} are recorded")]
    ElementCountDrift { counted: usize, cached: usize },
}
