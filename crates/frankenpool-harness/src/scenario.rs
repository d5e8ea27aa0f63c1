//! Replay of the chunk-of-eight walkthrough.
//!
//! Construct a pool with eight elements per chunk, then:
//! 1. `allocate(3)`: A at offset 0 of chunk 0; one free block (chunk 0, 3, size 5).
//! 2. `allocate(5)`: B at offset 3 takes the sole block exactly; a fresh chunk 1
//!    becomes the only free block.
//! 3. `deallocate(A)`: a free block at chunk 0 offset 0 of size 3, unmerged.
//! 4. `deallocate(B)`: merges with it into one block spanning all of chunk 0.
//!
//! Addresses are reported as (chunk index, element offset) so the report does
//! not depend on where the memory source placed the chunks.

use frankenpool_core::{CountingSource, Pool, PoolConfig, PoolLogLevel, PoolLogRecord, SystemSource};
use serde::Serialize;

use crate::error::HarnessError;

/// Element type used by the scenario: exactly one header wide.
pub type ScenarioSlot = [u64; 2];

pub const SCENARIO_CHUNK_SIZE: usize = 8;

/// A free block or loan located relative to the chunk holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Placement {
    pub chunk: usize,
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioStep {
    pub action: String,
    /// Where the loan landed, for allocations.
    pub loan: Option<Placement>,
    pub free_list: Vec<Placement>,
    pub expected: Vec<Placement>,
    pub chunks_acquired: usize,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub chunk_size: usize,
    pub steps: Vec<ScenarioStep>,
    pub passed: bool,
    /// Pool lifecycle records captured during the run.
    #[serde(skip)]
    pub lifecycle: Vec<PoolLogRecord>,
}

/// Chunk bases in discovery order.
struct ChunkMap {
    bases: Vec<usize>,
    chunk_bytes: usize,
    stride: usize,
}

impl ChunkMap {
    fn learn(&mut self, base: usize) {
        if !self.bases.contains(&base) {
            self.bases.push(base);
        }
    }

    fn place(&self, addr: usize, size: usize) -> Placement {
        let (chunk, base) = self
            .bases
            .iter()
            .copied()
            .enumerate()
            .find(|&(_, base)| (base..base + self.chunk_bytes).contains(&addr))
            .unwrap_or((usize::MAX, addr));
        Placement {
            chunk,
            offset: (addr - base) / self.stride,
            size,
        }
    }
}

type ScenarioPool = Pool<ScenarioSlot, CountingSource>;

fn snapshot(pool: &ScenarioPool, map: &ChunkMap) -> Vec<Placement> {
    let mut blocks: Vec<_> = pool
        .free_blocks()
        .map(|b| map.place(b.addr, b.free_size))
        .collect();
    blocks.sort_unstable();
    blocks
}

fn step(
    pool: &ScenarioPool,
    map: &ChunkMap,
    action: &str,
    loan: Option<Placement>,
    expected_loan: Option<Placement>,
    expected: Vec<Placement>,
) -> ScenarioStep {
    let free_list = snapshot(pool, map);
    let passed = free_list == expected && loan == expected_loan && pool.check_invariants().is_ok();
    ScenarioStep {
        action: action.to_string(),
        loan,
        free_list,
        expected,
        chunks_acquired: pool.source().acquired(),
        passed,
    }
}

const fn at(chunk: usize, offset: usize, size: usize) -> Placement {
    Placement {
        chunk,
        offset,
        size,
    }
}

/// Runs the walkthrough against the system allocator.
pub fn run_scenario() -> Result<ScenarioReport, HarnessError> {
    let config = PoolConfig::new()
        .with_chunk_size(SCENARIO_CHUNK_SIZE)
        .with_log_level(PoolLogLevel::Trace);
    let mut pool: ScenarioPool = Pool::with_source(config, CountingSource::new(SystemSource))?;
    let stride = size_of::<ScenarioSlot>();
    let mut map = ChunkMap {
        bases: Vec::new(),
        chunk_bytes: SCENARIO_CHUNK_SIZE * stride,
        stride,
    };
    if let Some(first) = pool.free_blocks().next() {
        map.learn(first.addr);
    }

    let mut steps = vec![step(
        &pool,
        &map,
        "construct",
        None,
        None,
        vec![at(0, 0, 8)],
    )];

    let a = pool.allocate(3)?;
    let a_at = map.place(a.addr(), a.len());
    steps.push(step(
        &pool,
        &map,
        "allocate(3)",
        Some(a_at),
        Some(at(0, 0, 3)),
        vec![at(0, 3, 5)],
    ));

    let b = pool.allocate(5)?;
    // The sole block went out whole; whatever is listed now is the fresh chunk.
    for block in pool.free_blocks() {
        map.learn(block.addr);
    }
    let b_at = map.place(b.addr(), b.len());
    steps.push(step(
        &pool,
        &map,
        "allocate(5)",
        Some(b_at),
        Some(at(0, 3, 5)),
        vec![at(1, 0, 8)],
    ));

    pool.deallocate(a);
    steps.push(step(
        &pool,
        &map,
        "deallocate(A)",
        None,
        None,
        vec![at(0, 0, 3), at(1, 0, 8)],
    ));

    pool.deallocate(b);
    steps.push(step(
        &pool,
        &map,
        "deallocate(B)",
        None,
        None,
        vec![at(0, 0, 8), at(1, 0, 8)],
    ));

    let passed = steps.iter().all(|s| s.passed);
    Ok(ScenarioReport {
        chunk_size: SCENARIO_CHUNK_SIZE,
        steps,
        passed,
        lifecycle: pool.drain_lifecycle_logs(),
    })
}
