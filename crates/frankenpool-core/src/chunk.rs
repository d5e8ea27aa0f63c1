//! Registry of chunks acquired from a [`ChunkSource`].

use std::alloc::Layout;

use crate::free_list::FreeList;
use crate::raw::{BlockAddr, Region};
use crate::source::ChunkSource;
use crate::stats::TeardownReport;

#[derive(Debug)]
pub(crate) struct ChunkLedger<S> {
    source: S,
    layout: Layout,
    elements: usize,
    /// Base addresses of live chunks, sorted.
    chunks: Vec<BlockAddr>,
    acquired: u64,
    released: u64,
}

impl<S: ChunkSource> ChunkLedger<S> {
    pub(crate) const fn new(source: S, layout: Layout, elements: usize) -> Self {
        Self {
            source,
            layout,
            elements,
            chunks: Vec::new(),
            acquired: 0,
            released: 0,
        }
    }

    /// Acquires and registers one chunk.
    pub(crate) fn acquire(&mut self) -> Option<Region> {
        let ptr = self.source.acquire(self.layout)?;
        let addr = BlockAddr::expose(ptr);
        let at = self.chunks.partition_point(|&c| c < addr);
        self.chunks.insert(at, addr);
        self.acquired += 1;
        // SAFETY: the source hands out exclusive memory for `layout`, which
        // holds `elements` elements.
        Some(unsafe { Region::from_raw(addr, self.elements) })
    }

    /// Acquires memory for `elements` elements without registering it.
    ///
    /// Such memory is never returned to the source.
    pub(crate) fn acquire_unpooled(&mut self, layout: Layout, elements: usize) -> Option<Region> {
        let ptr = self.source.acquire(layout)?;
        // SAFETY: as in `acquire`, for the caller-provided layout.
        Some(unsafe { Region::from_raw(BlockAddr::expose(ptr), elements) })
    }

    /// Releases every chunk lying wholly inside one block of `list`.
    ///
    /// Consumes the list: released chunks may hold its headers.
    pub(crate) fn release_covered(&mut self, list: FreeList) -> TeardownReport {
        let stride = list.stride();
        let spans: Vec<(usize, usize)> = list
            .iter()
            .map(|block| (block.addr, block.addr + block.free_size * stride))
            .collect();
        let chunk_bytes = self.layout.size();
        let mut report = TeardownReport {
            free_blocks_dropped: spans.len(),
            ..TeardownReport::default()
        };
        for chunk in std::mem::take(&mut self.chunks) {
            let base = chunk.get();
            let at = spans.partition_point(|&(start, _)| start <= base);
            let covered = at > 0 && spans[at - 1].1 >= base + chunk_bytes;
            if covered {
                // SAFETY: the chunk came from `acquire` with `self.layout`,
                // and no loan overlaps it because a free block spans it.
                unsafe { self.source.release(chunk.as_non_null(), self.layout) };
                self.released += 1;
                report.chunks_released += 1;
            } else {
                report.chunks_retained += 1;
            }
        }
        report
    }

    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    pub(crate) fn live(&self) -> usize {
        self.chunks.len()
    }

    pub(crate) const fn acquired(&self) -> u64 {
        self.acquired
    }

    pub(crate) const fn released(&self) -> u64 {
        self.released
    }
}
