//! Bulk memory sources backing a pool.
//!
//! A pool never talks to the global allocator directly. It asks a
//! [`ChunkSource`] for whole chunks (and, on the fallback path, for
//! oversized runs) and hands them back only at teardown.

use std::alloc::Layout;
use std::ptr::NonNull;

/// Provider of raw memory for a pool.
///
/// # Safety
///
/// A successful [`acquire`](ChunkSource::acquire) must return memory that is
/// valid for reads and writes of `layout.size()` bytes, aligned to
/// `layout.align()`, and not handed to anybody else until it is passed back
/// to [`release`](ChunkSource::release) with the same layout.
pub unsafe trait ChunkSource {
    /// Acquires memory for `layout`, or `None` if the source is exhausted.
    fn acquire(&mut self, layout: Layout) -> Option<NonNull<u8>>;

    /// Returns memory obtained from [`acquire`](ChunkSource::acquire).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `acquire` on this source with the same `layout`,
    /// and must not be used afterwards.
    unsafe fn release(&mut self, ptr: NonNull<u8>, layout: Layout);
}

/// The process-wide system allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemSource;

// SAFETY: memory comes straight from `std::alloc::alloc` for the given layout.
unsafe impl ChunkSource for SystemSource {
    fn acquire(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: caller guarantees `ptr` was allocated with `layout` by `acquire`.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// Source wrapper that counts traffic and can cap successful acquisitions.
///
/// Useful for asserting how many chunks an operation acquired and for
/// simulating exhaustion of the underlying source.
#[derive(Debug, Default, Clone)]
pub struct CountingSource<S = SystemSource> {
    inner: S,
    limit: Option<usize>,
    acquired: usize,
    released: usize,
    failed: usize,
}

impl<S> CountingSource<S> {
    /// Wraps `inner` without an acquisition cap.
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            limit: None,
            acquired: 0,
            released: 0,
            failed: 0,
        }
    }

    /// Fails every acquisition after `limit` successful ones.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Changes the acquisition cap; `None` removes it.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Successful acquisitions so far.
    #[must_use]
    pub const fn acquired(&self) -> usize {
        self.acquired
    }

    /// Releases so far.
    #[must_use]
    pub const fn released(&self) -> usize {
        self.released
    }

    /// Acquisitions refused by the cap or by the inner source.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.failed
    }

    /// Acquired and not yet released.
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.acquired.saturating_sub(self.released)
    }

    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

// SAFETY: every pointer handed out comes from the wrapped source unchanged.
unsafe impl<S: ChunkSource> ChunkSource for CountingSource<S> {
    fn acquire(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if self.limit.is_some_and(|limit| self.acquired >= limit) {
            self.failed += 1;
            return None;
        }
        match self.inner.acquire(layout) {
            Some(ptr) => {
                self.acquired += 1;
                Some(ptr)
            }
            None => {
                self.failed += 1;
                None
            }
        }
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, layout: Layout) {
        self.released += 1;
        // SAFETY: forwarded contract; `ptr` came from `self.inner.acquire`.
        unsafe { self.inner.release(ptr, layout) }
    }
}

/// Bump source over one buffer allocated up front.
///
/// Chunks are carved at ascending offsets and released memory is never
/// reused, so where each chunk lands relative to the others depends only on
/// the sequence of requests. The buffer is freed on drop once every
/// acquisition has been released and leaked otherwise, which keeps
/// outstanding loans valid past the pool.
#[derive(Debug)]
pub struct SlabSource {
    base: NonNull<u8>,
    layout: Layout,
    cursor: usize,
    outstanding: usize,
}

impl SlabSource {
    /// Alignment of the buffer; larger alignments are refused.
    pub const ALIGN: usize = 16;

    /// Allocates a buffer of `capacity` bytes, or `None` if the system
    /// allocator refuses it.
    #[must_use]
    pub fn new(capacity: usize) -> Option<Self> {
        let layout = Layout::from_size_align(capacity.max(1), Self::ALIGN).ok()?;
        // SAFETY: layout has non-zero size.
        let base = NonNull::new(unsafe { std::alloc::alloc(layout) })?;
        Some(Self {
            base,
            layout,
            cursor: 0,
            outstanding: 0,
        })
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Bytes carved so far, alignment padding included.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.cursor
    }

    /// Address of the first byte of the buffer.
    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.base.addr().get()
    }
}

// SAFETY: every acquisition is a distinct, in-bounds range of the buffer,
// aligned as requested, and the buffer is never freed while one is out.
unsafe impl ChunkSource for SlabSource {
    fn acquire(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 || layout.align() > Self::ALIGN {
            return None;
        }
        let start = self.cursor.checked_next_multiple_of(layout.align())?;
        let end = start.checked_add(layout.size())?;
        if end > self.layout.size() {
            return None;
        }
        self.cursor = end;
        self.outstanding += 1;
        // SAFETY: start..end lies inside the buffer.
        Some(unsafe { self.base.add(start) })
    }

    unsafe fn release(&mut self, _ptr: NonNull<u8>, _layout: Layout) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}

impl Drop for SlabSource {
    fn drop(&mut self) {
        if self.outstanding == 0 {
            // SAFETY: allocated in `new` with `self.layout`; nothing carved
            // from it is still in use.
            unsafe { std::alloc::dealloc(self.base.as_ptr(), self.layout) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_source_round_trip() {
        let mut source = SystemSource;
        let layout = Layout::array::<u64>(32).expect("valid layout");
        let ptr = source.acquire(layout).expect("system allocation");
        assert_eq!(ptr.as_ptr() as usize % layout.align(), 0);
        // SAFETY: ptr was just acquired with this layout.
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0x5A, layout.size());
            source.release(ptr, layout);
        }
    }

    #[test]
    fn system_source_refuses_zero_sized_layouts() {
        let mut source = SystemSource;
        let layout = Layout::from_size_align(0, 8).expect("valid layout");
        assert!(source.acquire(layout).is_none());
    }

    #[test]
    fn counting_source_enforces_limit() {
        let mut source = CountingSource::new(SystemSource).with_limit(2);
        let layout = Layout::array::<u128>(4).expect("valid layout");

        let a = source.acquire(layout).expect("first");
        let b = source.acquire(layout).expect("second");
        assert!(source.acquire(layout).is_none(), "third must hit the cap");
        assert_eq!(source.acquired(), 2);
        assert_eq!(source.failed(), 1);
        assert_eq!(source.outstanding(), 2);

        // SAFETY: both pointers were acquired with `layout`.
        unsafe {
            source.release(a, layout);
            source.release(b, layout);
        }
        assert_eq!(source.released(), 2);
        assert_eq!(source.outstanding(), 0);

        source.set_limit(None);
        let c = source.acquire(layout).expect("cap removed");
        // SAFETY: acquired above with `layout`.
        unsafe { source.release(c, layout) };
    }

    #[test]
    fn slab_source_carves_ascending_and_runs_dry() {
        let mut slab = SlabSource::new(256).expect("slab");
        let layout = Layout::array::<u128>(4).expect("valid layout");
        let base = slab.base_addr();

        let a = slab.acquire(layout).expect("first");
        let b = slab.acquire(layout).expect("second");
        assert_eq!(a.addr().get(), base);
        assert_eq!(b.addr().get(), base + 64);
        assert_eq!(slab.used(), 128);

        let big = Layout::array::<u128>(9).expect("valid layout");
        assert!(slab.acquire(big).is_none(), "only 128 bytes remain");
        let over_aligned = Layout::from_size_align(64, 64).expect("valid layout");
        assert!(slab.acquire(over_aligned).is_none());

        // SAFETY: both pointers were acquired with `layout`.
        unsafe {
            slab.release(a, layout);
            slab.release(b, layout);
        }
        assert_eq!(slab.used(), 128, "released memory is not reused");
    }

    #[test]
    fn slab_pools_place_chunks_identically() {
        use crate::{Pool, PoolConfig, PoolLogLevel};

        fn layout_after_churn() -> Vec<(usize, usize)> {
            let slab = SlabSource::new(1 << 14).expect("slab");
            let base = slab.base_addr();
            let config = PoolConfig::new()
                .with_chunk_size(8)
                .with_log_level(PoolLogLevel::Off);
            let mut pool = Pool::<[u64; 2], _>::with_source(config, slab).expect("pool");
            let a = pool.allocate(5).expect("a");
            let b = pool.allocate(8).expect("b");
            let c = pool.allocate(2).expect("c");
            pool.deallocate(b);
            pool.deallocate(a);
            let blocks = pool
                .free_blocks()
                .map(|block| (block.addr - base, block.free_size))
                .collect();
            pool.deallocate(c);
            blocks
        }

        assert_eq!(layout_after_churn(), layout_after_churn());
    }
}
