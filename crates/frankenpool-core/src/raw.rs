//! Raw-memory overlay for intrusive block headers.
//!
//! Every free run of elements starts with a [`BlockHeader`] written in place
//! over its first element. Blocks are named by [`BlockAddr`], an exposed
//! address rather than a reference, so the free list can splice nodes living
//! in different chunks (or in memory obtained outside the pool) without
//! holding borrows across calls.
//!
//! Header reads and writes are unaligned: the element type only has to be as
//! large as a header, not as strictly aligned.

use std::mem::size_of;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

/// Size in bytes of the header stored at the start of every free block.
///
/// The pool's element type must be at least this large.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

/// Address of a free block (or of a region about to become one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BlockAddr(NonZeroUsize);

impl BlockAddr {
    /// Exposes the provenance of `ptr` and returns its address.
    pub(crate) fn expose<T>(ptr: NonNull<T>) -> Self {
        let _ = ptr.as_ptr().expose_provenance();
        Self(ptr.addr())
    }

    pub(crate) const fn get(self) -> usize {
        self.0.get()
    }

    /// Address `elements * stride` bytes past `self`.
    pub(crate) const fn offset(self, elements: usize, stride: usize) -> Self {
        Self(self.0.saturating_add(elements.saturating_mul(stride)))
    }

    /// Rebuilds a pointer from the exposed address.
    pub(crate) fn as_non_null<T>(self) -> NonNull<T> {
        let ptr = std::ptr::with_exposed_provenance_mut::<T>(self.0.get());
        // SAFETY: the address is non-zero by construction.
        unsafe { NonNull::new_unchecked(ptr) }
    }
}

/// Header overlaid on the first element of a free block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHeader {
    /// Elements spanned by the block, the header's own slot included.
    pub(crate) free_size: usize,
    /// Next free block in address order.
    pub(crate) next: Option<BlockAddr>,
}

/// An exclusively owned run of elements that is not on any free list.
///
/// Holding a `Region` is the proof that its bytes may be overwritten with a
/// header. It has no destructor: dropping one leaks the memory it names.
#[derive(Debug)]
pub(crate) struct Region {
    addr: BlockAddr,
    elements: usize,
}

impl Region {
    /// # Safety
    ///
    /// `addr` must be an exposed address of `elements` consecutive elements
    /// (at least one) that nothing else reads or writes while the region is
    /// held or listed.
    pub(crate) const unsafe fn from_raw(addr: BlockAddr, elements: usize) -> Self {
        Self { addr, elements }
    }

    pub(crate) const fn addr(&self) -> BlockAddr {
        self.addr
    }

    pub(crate) const fn elements(&self) -> usize {
        self.elements
    }
}

/// Writes `header` at `addr`.
///
/// # Safety
///
/// `addr` must start a region of at least [`HEADER_SIZE`] bytes that the
/// caller owns exclusively (a [`Region`] or a listed free block).
pub(crate) unsafe fn write_header(addr: BlockAddr, header: BlockHeader) {
    // SAFETY: caller guarantees exclusive ownership of HEADER_SIZE bytes.
    unsafe { addr.as_non_null::<BlockHeader>().as_ptr().write_unaligned(header) }
}

/// Reads the header at `addr`.
///
/// # Safety
///
/// `addr` must be a listed free block whose header was written by
/// [`write_header`] and not overwritten since.
pub(crate) unsafe fn read_header(addr: BlockAddr) -> BlockHeader {
    // SAFETY: caller guarantees a live header at `addr`.
    unsafe { addr.as_non_null::<BlockHeader>().as_ptr().read_unaligned() }
}
