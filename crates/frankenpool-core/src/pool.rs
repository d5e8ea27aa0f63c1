//! The element pool.
//!
//! A [`Pool`] starts with one free chunk of `chunk_size` elements and serves
//! every request first-fit over its address-ordered free list, splitting the
//! chosen block when it is larger than needed. When nothing fits and the
//! request is no larger than a chunk, one more chunk is acquired; larger
//! requests are reported as a pool miss and never grow the pool.
//!
//! Returned runs are inserted back at their address and merged with
//! physically adjacent free neighbours. A merged block that grows beyond one
//! chunk is unlinked and abandoned (its memory is neither reused nor
//! released), which keeps every listed block chunk-sized or smaller.

use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;

use crate::chunk::ChunkLedger;
use crate::config::PoolConfig;
use crate::error::{InvariantViolation, PoolError};
use crate::free_list::{Blocks, Fit, FreeList, Inserted};
use crate::loan::{Loan, LoanOrigin};
use crate::log::{Event, LifecycleLog, PoolLogLevel, PoolLogRecord, Snapshot};
use crate::raw::{HEADER_SIZE, Region};
use crate::source::{ChunkSource, SystemSource};
use crate::stats::{PoolStats, TeardownReport};

/// Chunked pool of `T` elements backed by a [`ChunkSource`].
///
/// `T` must be at least [`HEADER_SIZE`] bytes; smaller types fail to compile
/// when a pool for them is constructed. The pool never constructs or drops
/// `T` values.
pub struct Pool<T, S: ChunkSource = SystemSource> {
    config: PoolConfig,
    list: FreeList,
    ledger: ChunkLedger<S>,
    stats: PoolStats,
    log: LifecycleLog,
    _marker: PhantomData<T>,
}

impl<T> Pool<T> {
    /// Pool with the default configuration over the system allocator.
    pub fn new() -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::new())
    }

    /// Pool of `chunk_size` elements per chunk over the system allocator.
    ///
    /// Fails with [`PoolError::ZeroChunkSize`] for zero, or with
    /// [`PoolError::SystemAllocation`] when the first chunk cannot be acquired.
    ///
    /// ```
    /// use frankenpool_core::Pool;
    ///
    /// let mut pool = Pool::<[u64; 2]>::with_chunk_size(16).unwrap();
    /// let loan = pool.allocate(16).unwrap();
    /// assert_eq!(pool.stats().chunks_live, 2);
    /// pool.deallocate(loan);
    /// assert!(Pool::<[u64; 2]>::with_chunk_size(0).is_err());
    /// ```
    pub fn with_chunk_size(chunk_size: usize) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::new().with_chunk_size(chunk_size))
    }

    /// Pool built from an explicit [`PoolConfig`] over the system allocator.
    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_source(config, SystemSource)
    }
}

impl<T, S: ChunkSource> Pool<T, S> {
    /// Builds a pool drawing chunks from `source` and acquires its first chunk.
    pub fn with_source(config: PoolConfig, source: S) -> Result<Self, PoolError> {
        const {
            assert!(
                size_of::<T>() >= HEADER_SIZE,
                "pool element type must be at least as large as a free-block header"
            );
        }
        let layout = config.chunk_layout::<T>()?;
        let mut pool = Self {
            config,
            list: FreeList::new(size_of::<T>()),
            ledger: ChunkLedger::new(source, layout, config.chunk_size()),
            stats: PoolStats::default(),
            log: LifecycleLog::new(config.log_level()),
            _marker: PhantomData,
        };
        let Some(region) = pool.ledger.acquire() else {
            pool.record_lifecycle(
                PoolLogLevel::Error,
                "construct",
                "chunk_acquire",
                None,
                Some(config.chunk_size()),
                "system_allocation_failed",
                String::new(),
            );
            return Err(PoolError::SystemAllocation {
                elements: config.chunk_size(),
            });
        };
        let addr = region.addr().get();
        pool.list.insert(region);
        pool.record_lifecycle(
            PoolLogLevel::Info,
            "construct",
            "chunk_acquire",
            Some(addr),
            Some(config.chunk_size()),
            "ok",
            format!("stride={}", size_of::<T>()),
        );
        Ok(pool)
    }

    /// Lends `n` contiguous elements.
    ///
    /// Returns [`PoolError::PoolMiss`] when no free block fits and `n`
    /// exceeds the chunk size; see [`allocate_or_system`](Self::allocate_or_system)
    /// for the fallback.
    pub fn allocate(&mut self, n: usize) -> Result<Loan<T>, PoolError> {
        if n == 0 {
            return Err(PoolError::EmptyRequest);
        }
        let fit = match self.list.first_fit(n) {
            Some(fit) => fit,
            None if n > self.config.chunk_size() => {
                self.stats.pool_misses += 1;
                self.record_lifecycle(
                    PoolLogLevel::Debug,
                    "allocate",
                    "pool_miss",
                    None,
                    Some(n),
                    "miss",
                    format!("chunk_size={}", self.config.chunk_size()),
                );
                return Err(PoolError::PoolMiss {
                    requested: n,
                    chunk_size: self.config.chunk_size(),
                });
            }
            None => self.grow()?.fit(),
        };
        let region = self.carve(fit, n)?;
        self.stats.allocations += 1;
        self.stats.lent_elements += n;
        Ok(Loan::from_region(region, LoanOrigin::Pool))
    }

    /// Like [`allocate`](Self::allocate), but satisfies a pool miss with a
    /// run taken directly from the memory source.
    ///
    /// The fallback run is not tracked as a chunk. It may still be handed to
    /// [`deallocate`](Self::deallocate), where it joins the free list.
    pub fn allocate_or_system(&mut self, n: usize) -> Result<Loan<T>, PoolError> {
        match self.allocate(n) {
            Err(PoolError::PoolMiss { .. }) => {}
            other => return other,
        }
        let layout = Layout::array::<T>(n).map_err(|_| PoolError::LayoutOverflow { elements: n })?;
        let Some(region) = self.ledger.acquire_unpooled(layout, n) else {
            self.record_lifecycle(
                PoolLogLevel::Error,
                "allocate",
                "system_fallback",
                None,
                Some(n),
                "system_allocation_failed",
                String::new(),
            );
            return Err(PoolError::SystemAllocation { elements: n });
        };
        self.stats.allocations += 1;
        self.stats.system_fallbacks += 1;
        self.record_lifecycle(
            PoolLogLevel::Debug,
            "allocate",
            "system_fallback",
            Some(region.addr().get()),
            Some(n),
            "ok",
            String::new(),
        );
        Ok(Loan::from_region(region, LoanOrigin::System))
    }

    /// Takes a loan back, merging it with adjacent free blocks.
    pub fn deallocate(&mut self, loan: Loan<T>) {
        let origin = loan.origin();
        let region = loan.into_region();
        let elements = region.elements();
        let inserted = self.list.insert(region);
        self.stats.deallocations += 1;
        self.stats.merges += inserted.merges() as u64;
        if origin == LoanOrigin::Pool {
            debug_assert!(
                elements <= self.stats.lent_elements,
                "{elements} pooled elements returned but only {} are lent",
                self.stats.lent_elements
            );
            self.stats.lent_elements = self.stats.lent_elements.saturating_sub(elements);
        }
        self.record_lifecycle(
            PoolLogLevel::Trace,
            "deallocate",
            "insert",
            Some(inserted.node.get()),
            Some(elements),
            "ok",
            format!(
                "merged_prev={};merged_next={};block_size={}",
                inserted.merged_prev, inserted.merged_next, inserted.free_size
            ),
        );
        if inserted.free_size > self.config.chunk_size() {
            self.evict(inserted);
        }
    }

    /// Destroys the pool, returning to the source every chunk that lies
    /// wholly inside one free block.
    ///
    /// Chunks with memory still on loan, or abandoned by eviction, are left
    /// untouched. Dropping the pool does the same without the report.
    pub fn teardown(mut self) -> TeardownReport {
        self.release_held()
    }

    /// Free blocks in address order.
    pub fn free_blocks(&self) -> Blocks<'_> {
        self.list.iter()
    }

    /// Walks the free list and verifies its structural invariants.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.list.check()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            chunks_acquired: self.ledger.acquired(),
            chunks_released: self.ledger.released(),
            chunks_live: self.ledger.live(),
            free_blocks: self.list.blocks(),
            free_elements: self.list.free_elements(),
            ..self.stats
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.config.chunk_size()
    }

    #[must_use]
    pub fn source(&self) -> &S {
        self.ledger.source()
    }

    /// Lifecycle records at or above the configured threshold.
    #[must_use]
    pub fn lifecycle_logs(&self) -> &[PoolLogRecord] {
        self.log.records()
    }

    pub fn drain_lifecycle_logs(&mut self) -> Vec<PoolLogRecord> {
        self.log.drain()
    }

    /// A fresh pool for `U` with the same configuration and a clone of the source.
    pub fn rebind<U>(&self) -> Result<Pool<U, S>, PoolError>
    where
        S: Clone,
    {
        Pool::with_source(self.config, self.ledger.source().clone())
    }

    /// Acquires one chunk and links it into the free list.
    fn grow(&mut self) -> Result<Inserted, PoolError> {
        let chunk_size = self.config.chunk_size();
        let Some(region) = self.ledger.acquire() else {
            self.record_lifecycle(
                PoolLogLevel::Error,
                "allocate",
                "grow",
                None,
                Some(chunk_size),
                "system_allocation_failed",
                String::new(),
            );
            return Err(PoolError::SystemAllocation {
                elements: chunk_size,
            });
        };
        let addr = region.addr().get();
        let inserted = self.list.insert(region);
        self.stats.growths += 1;
        self.stats.merges += inserted.merges() as u64;
        self.record_lifecycle(
            PoolLogLevel::Debug,
            "allocate",
            "grow",
            Some(addr),
            Some(chunk_size),
            "ok",
            format!("block_size={}", inserted.free_size),
        );
        Ok(inserted)
    }

    /// Removes `n` elements from the front of `fit`.
    fn carve(&mut self, fit: Fit, n: usize) -> Result<Region, PoolError> {
        if fit.free_size > n {
            self.stats.splits += 1;
            let region = self.list.split(fit, n);
            self.record_lifecycle(
                PoolLogLevel::Trace,
                "allocate",
                "split",
                Some(fit.node.get()),
                Some(n),
                "ok",
                format!("remainder={}", fit.free_size - n),
            );
            return Ok(region);
        }

        if !self.list.is_sole(fit.node) {
            self.stats.exact_fits += 1;
            let region = self.list.take(fit);
            self.record_lifecycle(
                PoolLogLevel::Trace,
                "allocate",
                "exact_fit",
                Some(fit.node.get()),
                Some(n),
                "ok",
                String::new(),
            );
            return Ok(region);
        }

        // The sole block is going out; refill before unlinking it.
        let fresh = self.replenish("allocate")?;
        self.stats.exact_fits += 1;
        Ok(self.list.replace_sole(fit.node, fresh))
    }

    fn replenish(&mut self, symbol: &'static str) -> Result<Region, PoolError> {
        let chunk_size = self.config.chunk_size();
        match self.ledger.acquire() {
            Some(fresh) => {
                self.stats.replenishments += 1;
                self.record_lifecycle(
                    PoolLogLevel::Debug,
                    symbol,
                    "replenish",
                    Some(fresh.addr().get()),
                    Some(chunk_size),
                    "ok",
                    String::new(),
                );
                Ok(fresh)
            }
            None => {
                self.record_lifecycle(
                    PoolLogLevel::Warn,
                    symbol,
                    "replenish",
                    None,
                    Some(chunk_size),
                    "system_allocation_failed",
                    String::new(),
                );
                Err(PoolError::SystemAllocation {
                    elements: chunk_size,
                })
            }
        }
    }

    /// Unlinks an oversize merged block without releasing its memory.
    fn evict(&mut self, inserted: Inserted) {
        let evicted = if self.list.is_sole(inserted.node) {
            match self.replenish("deallocate") {
                Ok(fresh) => self.list.replace_sole(inserted.node, fresh),
                Err(_) => {
                    self.record_lifecycle(
                        PoolLogLevel::Warn,
                        "deallocate",
                        "evict",
                        Some(inserted.node.get()),
                        Some(inserted.free_size),
                        "retained",
                        "sole block kept until a chunk can replace it".to_owned(),
                    );
                    return;
                }
            }
        } else {
            self.list.take(inserted.fit())
        };
        self.stats.evictions += 1;
        self.stats.evicted_elements += evicted.elements();
        self.record_lifecycle(
            PoolLogLevel::Info,
            "deallocate",
            "evict",
            Some(evicted.addr().get()),
            Some(evicted.elements()),
            "abandoned",
            format!("chunk_size={}", self.config.chunk_size()),
        );
    }

    fn release_held(&mut self) -> TeardownReport {
        let list = std::mem::replace(&mut self.list, FreeList::new(size_of::<T>()));
        let report = self.ledger.release_covered(list);
        if report.free_blocks_dropped > 0 || report.chunks_retained > 0 {
            self.record_lifecycle(
                PoolLogLevel::Info,
                "teardown",
                "release",
                None,
                None,
                "ok",
                format!(
                    "released={};retained={};blocks={}",
                    report.chunks_released, report.chunks_retained, report.free_blocks_dropped
                ),
            );
        }
        report
    }

    #[allow(clippy::too_many_arguments)]
    fn record_lifecycle(
        &mut self,
        level: PoolLogLevel,
        symbol: &'static str,
        event: &'static str,
        addr: Option<usize>,
        elements: Option<usize>,
        outcome: &'static str,
        details: String,
    ) {
        let snapshot = Snapshot {
            free_blocks: self.list.blocks(),
            free_elements: self.list.free_elements(),
            chunks_live: self.ledger.live(),
        };
        self.log.push(
            Event {
                level,
                symbol,
                event,
                addr,
                elements,
                outcome,
                details,
            },
            snapshot,
        );
    }
}

impl<T, S: ChunkSource> Drop for Pool<T, S> {
    fn drop(&mut self) {
        self.release_held();
    }
}

impl<T, S: ChunkSource + fmt::Debug> fmt::Debug for Pool<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("element", &std::any::type_name::<T>())
            .field("config", &self.config)
            .field("source", self.ledger.source())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CountingSource;

    type Slot = [u64; 2];

    fn pool(chunk_size: usize) -> Pool<Slot, CountingSource> {
        let config = PoolConfig::new()
            .with_chunk_size(chunk_size)
            .with_log_level(PoolLogLevel::Trace);
        Pool::with_source(config, CountingSource::new(SystemSource)).expect("pool")
    }

    #[test]
    fn construct_acquires_one_chunk() {
        let pool = pool(8);
        assert_eq!(pool.source().acquired(), 1);
        let blocks: Vec<_> = pool.free_blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].free_size, 8);
        pool.check_invariants().expect("invariants");
        let log = &pool.lifecycle_logs()[0];
        assert_eq!(log.symbol, "construct");
        assert!(log.trace_id.starts_with("core::pool::construct::"));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = Pool::<Slot>::with_chunk_size(0).expect_err("zero chunk");
        assert_eq!(err, PoolError::ZeroChunkSize);
    }

    #[test]
    fn construction_fails_when_source_is_exhausted() {
        let source = CountingSource::new(SystemSource).with_limit(0);
        let err = Pool::<Slot, _>::with_source(PoolConfig::new().with_chunk_size(4), source)
            .expect_err("exhausted");
        assert_eq!(err, PoolError::SystemAllocation { elements: 4 });
    }

    #[test]
    fn empty_request_is_an_error() {
        let mut pool = pool(8);
        assert_eq!(pool.allocate(0).map(|_| ()), Err(PoolError::EmptyRequest));
    }

    #[test]
    fn split_then_reassemble() {
        let mut pool = pool(8);
        let a = pool.allocate(3).expect("a");
        let b = pool.allocate(2).expect("b");
        assert_eq!(b.addr(), a.addr() + 3 * size_of::<Slot>());
        assert_eq!(pool.stats().free_elements, 3);
        assert_eq!(pool.stats().lent_elements, 5);

        pool.deallocate(a);
        pool.deallocate(b);
        let blocks: Vec<_> = pool.free_blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].free_size, 8);
        assert_eq!(pool.stats().lent_elements, 0);
        assert_eq!(pool.stats().merges, 2);
        pool.check_invariants().expect("invariants");
    }

    #[test]
    fn exact_fit_of_sole_block_replenishes_first() {
        let mut pool = pool(4);
        let whole = pool.allocate(4).expect("whole chunk");
        assert_eq!(pool.source().acquired(), 2);
        assert_eq!(pool.stats().replenishments, 1);
        let blocks: Vec<_> = pool.free_blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].free_size, 4);
        assert_ne!(blocks[0].addr, whole.addr());
        pool.deallocate(whole);
        pool.check_invariants().expect("invariants");
    }

    #[test]
    fn exact_fit_fails_cleanly_without_replenishment() {
        let config = PoolConfig::new().with_chunk_size(4);
        let source = CountingSource::new(SystemSource).with_limit(1);
        let mut pool = Pool::<Slot, _>::with_source(config, source).expect("pool");
        let before: Vec<_> = pool.free_blocks().collect();
        let err = pool.allocate(4).expect_err("no replenishment");
        assert_eq!(err, PoolError::SystemAllocation { elements: 4 });
        let after: Vec<_> = pool.free_blocks().collect();
        assert_eq!(before, after);
        assert_eq!(pool.stats().allocations, 0);
    }

    #[test]
    fn oversize_request_misses_without_growth() {
        let mut pool = pool(8);
        let err = pool.allocate(9).expect_err("miss");
        assert!(err.is_pool_miss());
        assert_eq!(pool.source().acquired(), 1);
        assert_eq!(pool.stats().pool_misses, 1);
    }

    #[test]
    fn system_fallback_serves_oversize_requests() {
        let mut pool = pool(8);
        let big = pool.allocate_or_system(20).expect("fallback");
        assert_eq!(big.origin(), LoanOrigin::System);
        assert_eq!(big.len(), 20);
        assert_eq!(pool.stats().system_fallbacks, 1);
        assert_eq!(pool.stats().chunks_live, 1);

        // Larger than a chunk: joins the list, then is evicted.
        pool.deallocate(big);
        assert_eq!(pool.stats().evictions, 1);
        assert_eq!(pool.stats().evicted_elements, 20);
        pool.check_invariants().expect("invariants");
    }

    #[test]
    fn rebind_builds_an_equivalent_pool() {
        let pool = pool(16);
        let other: Pool<[u64; 4], _> = pool.rebind().expect("rebind");
        assert_eq!(other.chunk_size(), 16);
        assert_eq!(other.config().log_level(), PoolLogLevel::Trace);
        assert_eq!(other.free_blocks().next().map(|b| b.free_size), Some(16));
    }

    #[test]
    fn teardown_releases_only_whole_chunks() {
        let mut pool = pool(4);
        let a = pool.allocate(2).expect("a");
        let _b = pool.allocate(3).expect("grows");
        pool.deallocate(a);
        let report = pool.teardown();
        assert_eq!(report.chunks_released, 1);
        assert_eq!(report.chunks_retained, 1);
    }

    #[test]
    fn lifecycle_logs_respect_threshold_and_drain() {
        let config = PoolConfig::new()
            .with_chunk_size(8)
            .with_log_level(PoolLogLevel::Debug);
        let mut pool = Pool::<Slot>::with_config(config).expect("pool");
        let a = pool.allocate(2).expect("a");
        pool.deallocate(a);
        assert!(
            pool.lifecycle_logs()
                .iter()
                .all(|record| record.level >= PoolLogLevel::Debug)
        );
        let drained = pool.drain_lifecycle_logs();
        assert!(!drained.is_empty());
        assert!(pool.lifecycle_logs().is_empty());
        assert!(
            drained
                .iter()
                .all(|record| record.trace_id.starts_with("core::pool::"))
        );
    }
}
