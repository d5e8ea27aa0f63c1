//! Pool counters.

use serde::Serialize;

/// Snapshot of pool activity since construction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Successful `allocate` calls, system fallbacks included.
    pub allocations: u64,
    pub deallocations: u64,
    pub chunks_acquired: u64,
    pub chunks_released: u64,
    /// Chunks acquired and not yet released.
    pub chunks_live: usize,
    pub free_blocks: usize,
    pub free_elements: usize,
    /// Elements currently on loan from pool chunks.
    pub lent_elements: usize,
    /// Chunks acquired because no listed block fit.
    pub growths: u64,
    /// Chunks acquired to refill a list whose sole block was taken or evicted.
    pub replenishments: u64,
    pub splits: u64,
    pub exact_fits: u64,
    /// Neighbour merges performed on insertion.
    pub merges: u64,
    pub pool_misses: u64,
    pub system_fallbacks: u64,
    /// Oversize blocks unlinked and abandoned.
    pub evictions: u64,
    pub evicted_elements: usize,
}

/// Outcome of tearing a pool down.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Chunks fully covered by a free block and returned to the source.
    pub chunks_released: usize,
    /// Chunks with memory still on loan (or evicted); left untouched.
    pub chunks_retained: usize,
    /// Free blocks listed at teardown.
    pub free_blocks_dropped: usize,
}
