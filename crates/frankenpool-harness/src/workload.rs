//! Seeded allocation storms.
//!
//! A [`WorkloadRunner`] drives a pool with a xorshift-generated mix of
//! allocations and frees, checks the free-list invariants at a fixed cadence
//! and collects fragmentation and latency metrics.

use std::time::Instant;

use frankenpool_core::{
    ChunkSource, CountingSource, Loan, Pool, PoolConfig, PoolLogLevel, PoolStats, SlabSource,
    SystemSource,
};
use serde::Serialize;

use crate::error::HarnessError;

/// Element type used by storms.
pub type StormSlot = [u64; 2];

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

/// Storm parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkloadConfig {
    pub seed: u64,
    pub ops: usize,
    pub chunk_size: usize,
    /// Largest request; above `chunk_size` exercises the system fallback.
    pub max_request: usize,
    /// Live loans above which the storm only frees.
    pub max_live: usize,
    /// Invariant check cadence in operations (0 checks only at the end).
    pub check_every: usize,
    /// Percentage of operations that allocate while below `max_live`.
    pub alloc_percent: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            seed: 0xDEAD_BEEF,
            ops: 10_000,
            chunk_size: 256,
            max_request: 32,
            max_live: 512,
            check_every: 64,
            alloc_percent: 55,
        }
    }
}

/// Metrics from one storm.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    pub config: WorkloadConfig,
    pub allocations: usize,
    pub deallocations: usize,
    pub fallbacks: usize,
    pub peak_live_loans: usize,
    pub peak_lent_elements: usize,
    pub invariant_checks: usize,
    /// Mean of `1 - largest_free_block / free_elements` over samples.
    pub mean_fragmentation: f64,
    pub max_free_blocks: usize,
    pub alloc_p50_ns: u64,
    pub alloc_p99_ns: u64,
    pub stats: PoolStats,
}

/// Drives one storm against a pool over `S`.
///
/// Over [`SystemSource`] chunk placement follows the global heap, so split
/// and merge counts vary between runs with the same seed. A [`SlabSource`]
/// makes the whole report a function of the seed.
pub struct WorkloadRunner<S: ChunkSource = SystemSource> {
    config: WorkloadConfig,
    pool: Pool<StormSlot, CountingSource<S>>,
    rng: XorShift64,
    live: Vec<Loan<StormSlot>>,
}

impl WorkloadRunner {
    pub fn new(config: WorkloadConfig) -> Result<Self, HarnessError> {
        Self::with_source(config, SystemSource)
    }
}

impl WorkloadRunner<SlabSource> {
    /// Runner over a fresh slab of `bytes` bytes.
    pub fn with_slab(config: WorkloadConfig, bytes: usize) -> Result<Self, HarnessError> {
        let slab = SlabSource::new(bytes).ok_or(HarnessError::Slab { bytes })?;
        Self::with_source(config, slab)
    }
}

impl<S: ChunkSource> WorkloadRunner<S> {
    pub fn with_source(config: WorkloadConfig, source: S) -> Result<Self, HarnessError> {
        let pool_config = PoolConfig::new()
            .with_chunk_size(config.chunk_size)
            .with_log_level(PoolLogLevel::Off);
        let pool = Pool::with_source(pool_config, CountingSource::new(source))?;
        Ok(Self {
            config,
            pool,
            rng: XorShift64::new(config.seed),
            live: Vec::new(),
        })
    }

    fn check(&self, op: usize) -> Result<(), HarnessError> {
        self.pool
            .check_invariants()
            .map_err(|source| HarnessError::Invariant { op, source })
    }

    fn fragmentation(&self) -> Option<f64> {
        let mut total = 0usize;
        let mut largest = 0usize;
        for block in self.pool.free_blocks() {
            total += block.free_size;
            largest = largest.max(block.free_size);
        }
        (total > 0).then(|| 1.0 - largest as f64 / total as f64)
    }

    /// Runs the storm, then returns every outstanding loan to the pool.
    pub fn run(mut self) -> Result<WorkloadReport, HarnessError> {
        let cfg = self.config;
        let mut report = WorkloadReport {
            config: cfg,
            allocations: 0,
            deallocations: 0,
            fallbacks: 0,
            peak_live_loans: 0,
            peak_lent_elements: 0,
            invariant_checks: 0,
            mean_fragmentation: 0.0,
            max_free_blocks: 0,
            alloc_p50_ns: 0,
            alloc_p99_ns: 0,
            stats: PoolStats::default(),
        };
        let mut latencies = Vec::with_capacity(cfg.ops);
        let mut frag_sum = 0.0;
        let mut frag_samples = 0usize;

        for op in 0..cfg.ops {
            let allocate = self.live.is_empty()
                || (self.live.len() < cfg.max_live
                    && self.rng.gen_range(0, 99) < cfg.alloc_percent);
            if allocate {
                let n = self.rng.gen_range(1, cfg.max_request.max(1));
                let start = Instant::now();
                let loan = self.pool.allocate_or_system(n)?;
                latencies.push(start.elapsed().as_nanos() as u64);
                if !loan.is_pooled() {
                    report.fallbacks += 1;
                }
                self.live.push(loan);
                report.allocations += 1;
            } else {
                let idx = self.rng.gen_range(0, self.live.len() - 1);
                let loan = self.live.swap_remove(idx);
                self.pool.deallocate(loan);
                report.deallocations += 1;
            }

            report.peak_live_loans = report.peak_live_loans.max(self.live.len());
            let stats = self.pool.stats();
            report.peak_lent_elements = report.peak_lent_elements.max(stats.lent_elements);
            report.max_free_blocks = report.max_free_blocks.max(stats.free_blocks);
            if let Some(frag) = self.fragmentation() {
                frag_sum += frag;
                frag_samples += 1;
            }

            if cfg.check_every > 0 && op % cfg.check_every == 0 {
                self.check(op)?;
                report.invariant_checks += 1;
            }
        }

        for loan in std::mem::take(&mut self.live) {
            self.pool.deallocate(loan);
        }
        self.check(cfg.ops)?;
        report.invariant_checks += 1;

        if frag_samples > 0 {
            report.mean_fragmentation = frag_sum / frag_samples as f64;
        }
        latencies.sort_unstable();
        report.alloc_p50_ns = percentile(&latencies, 50);
        report.alloc_p99_ns = percentile(&latencies, 99);
        report.stats = self.pool.stats();
        Ok(report)
    }
}

/// Runs a storm over the system allocator, or over a slab of `slab_bytes`
/// when given.
pub fn run_storm(
    config: WorkloadConfig,
    slab_bytes: Option<usize>,
) -> Result<WorkloadReport, HarnessError> {
    match slab_bytes {
        Some(bytes) => WorkloadRunner::with_slab(config, bytes)?.run(),
        None => WorkloadRunner::new(config)?.run(),
    }
}

fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() - 1) * pct) / 100;
    sorted[idx]
}
