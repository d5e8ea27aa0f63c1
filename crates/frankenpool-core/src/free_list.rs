//! Intrusive, address-ordered, self-coalescing free list.
//!
//! The list owns only its head and tail; every node lives inside the free
//! memory it describes. Nodes are kept in strictly increasing address order
//! and no two neighbours are ever physically adjacent: insertion merges with
//! an adjacent predecessor and/or successor before returning.
//!
//! Sizes are in elements of the pool's type; `stride` converts them to bytes.

use serde::Serialize;

use crate::error::InvariantViolation;
use crate::raw::{self, BlockAddr, BlockHeader, Region};

/// A free block as seen from outside the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreeBlock {
    /// Address of the block's first element.
    pub addr: usize,
    /// Elements spanned by the block.
    pub free_size: usize,
}

/// A block chosen to satisfy a request, together with its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fit {
    pub(crate) prev: Option<BlockAddr>,
    pub(crate) node: BlockAddr,
    pub(crate) free_size: usize,
}

/// Result of inserting a region: the node of record after merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Inserted {
    pub(crate) prev: Option<BlockAddr>,
    pub(crate) node: BlockAddr,
    pub(crate) free_size: usize,
    pub(crate) merged_prev: bool,
    pub(crate) merged_next: bool,
}

impl Inserted {
    pub(crate) const fn merges(&self) -> usize {
        self.merged_prev as usize + self.merged_next as usize
    }

    pub(crate) const fn fit(&self) -> Fit {
        Fit {
            prev: self.prev,
            node: self.node,
            free_size: self.free_size,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FreeList {
    head: Option<BlockAddr>,
    tail: Option<BlockAddr>,
    stride: usize,
    blocks: usize,
    free_elements: usize,
}

impl FreeList {
    pub(crate) const fn new(stride: usize) -> Self {
        Self {
            head: None,
            tail: None,
            stride,
            blocks: 0,
            free_elements: 0,
        }
    }

    pub(crate) const fn stride(&self) -> usize {
        self.stride
    }

    pub(crate) const fn blocks(&self) -> usize {
        self.blocks
    }

    pub(crate) const fn free_elements(&self) -> usize {
        self.free_elements
    }

    pub(crate) fn is_sole(&self, node: BlockAddr) -> bool {
        self.head == Some(node) && self.tail == Some(node)
    }

    fn header(&self, node: BlockAddr) -> BlockHeader {
        // SAFETY: listed nodes carry a header written by `insert`, `split` or
        // `replace_sole`, and their memory stays untouched while listed.
        unsafe { raw::read_header(node) }
    }

    fn set_header(&mut self, node: BlockAddr, header: BlockHeader) {
        // SAFETY: `node` is listed, so the list owns its header bytes.
        unsafe { raw::write_header(node, header) }
    }

    fn set_next(&mut self, node: BlockAddr, next: Option<BlockAddr>) {
        let mut header = self.header(node);
        header.next = next;
        self.set_header(node, header);
    }

    fn end_of(&self, node: BlockAddr, free_size: usize) -> BlockAddr {
        node.offset(free_size, self.stride)
    }

    /// First block in address order holding at least `n` elements.
    pub(crate) fn first_fit(&self, n: usize) -> Option<Fit> {
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            let header = self.header(node);
            if header.free_size >= n {
                return Some(Fit {
                    prev,
                    node,
                    free_size: header.free_size,
                });
            }
            prev = Some(node);
            cursor = header.next;
        }
        None
    }

    /// Links `region` at its address-sorted position and merges it with
    /// physically adjacent neighbours.
    pub(crate) fn insert(&mut self, region: Region) -> Inserted {
        let addr = region.addr();
        let free_size = region.elements();
        debug_assert!(free_size > 0, "inserting an empty region");

        let mut before_prev = None;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            if node >= addr {
                break;
            }
            before_prev = prev;
            prev = Some(node);
            cursor = self.header(node).next;
        }
        let next = cursor;

        debug_assert!(next != Some(addr), "region {:#x} is already free", addr.get());
        debug_assert!(
            prev.is_none_or(|p| self.end_of(p, self.header(p).free_size) <= addr),
            "region {:#x} overlaps its free predecessor",
            addr.get()
        );
        debug_assert!(
            next.is_none_or(|n| self.end_of(addr, free_size) <= n),
            "region {:#x} overlaps its free successor",
            addr.get()
        );

        self.set_header(addr, BlockHeader { free_size, next });
        match prev {
            Some(p) => self.set_next(p, Some(addr)),
            None => self.head = Some(addr),
        }
        if next.is_none() {
            self.tail = Some(addr);
        }
        self.blocks += 1;
        self.free_elements += free_size;

        let mut inserted = Inserted {
            prev,
            node: addr,
            free_size,
            merged_prev: false,
            merged_next: false,
        };

        if let Some(p) = prev {
            let prev_size = self.header(p).free_size;
            if self.end_of(p, prev_size) == addr {
                inserted.free_size = self.absorb_next(p);
                inserted.node = p;
                inserted.prev = before_prev;
                inserted.merged_prev = true;
            }
        }

        let end = self.end_of(inserted.node, inserted.free_size);
        if self.header(inserted.node).next == Some(end) {
            inserted.free_size = self.absorb_next(inserted.node);
            inserted.merged_next = true;
        }

        inserted
    }

    /// Folds the successor of `node` into `node`; returns the merged size.
    fn absorb_next(&mut self, node: BlockAddr) -> usize {
        let mut header = self.header(node);
        let Some(next) = header.next else {
            return header.free_size;
        };
        let absorbed = self.header(next);
        header.free_size += absorbed.free_size;
        header.next = absorbed.next;
        self.set_header(node, header);
        if self.tail == Some(next) {
            self.tail = Some(node);
        }
        self.blocks -= 1;
        header.free_size
    }

    /// Unlinks `fit.node` and hands its memory back as a region.
    pub(crate) fn take(&mut self, fit: Fit) -> Region {
        let header = self.header(fit.node);
        match fit.prev {
            Some(p) => {
                debug_assert_eq!(self.header(p).next, Some(fit.node), "stale predecessor");
                self.set_next(p, header.next);
            }
            None => {
                debug_assert_eq!(self.head, Some(fit.node), "stale head");
                self.head = header.next;
            }
        }
        if self.tail == Some(fit.node) {
            self.tail = fit.prev;
        }
        self.blocks -= 1;
        self.free_elements -= header.free_size;
        // SAFETY: the block was listed (so exclusively owned by the list) and
        // is now unlinked.
        unsafe { Region::from_raw(fit.node, header.free_size) }
    }

    /// Removes the sole listed block and installs `fresh` in its place.
    pub(crate) fn replace_sole(&mut self, node: BlockAddr, fresh: Region) -> Region {
        debug_assert!(self.is_sole(node), "replace_sole on a list with other blocks");
        let old = self.header(node);
        let addr = fresh.addr();
        self.set_header(
            addr,
            BlockHeader {
                free_size: fresh.elements(),
                next: None,
            },
        );
        self.head = Some(addr);
        self.tail = Some(addr);
        self.blocks = 1;
        self.free_elements = fresh.elements();
        // SAFETY: `node` was the only listed block and is no longer reachable.
        unsafe { Region::from_raw(node, old.free_size) }
    }

    /// Carves the first `n` elements off `fit.node`, leaving the remainder listed.
    pub(crate) fn split(&mut self, fit: Fit, n: usize) -> Region {
        let header = self.header(fit.node);
        debug_assert!(n > 0 && n < header.free_size, "split of {n} from {}", header.free_size);
        let remainder = fit.node.offset(n, self.stride);
        self.set_header(
            remainder,
            BlockHeader {
                free_size: header.free_size - n,
                next: header.next,
            },
        );
        match fit.prev {
            Some(p) => self.set_next(p, Some(remainder)),
            None => self.head = Some(remainder),
        }
        if self.tail == Some(fit.node) {
            self.tail = Some(remainder);
        }
        self.free_elements -= n;
        // SAFETY: the first `n` elements of a listed block are now outside
        // every listed block.
        unsafe { Region::from_raw(fit.node, n) }
    }

    pub(crate) fn iter(&self) -> Blocks<'_> {
        Blocks {
            list: self,
            cursor: self.head,
            remaining: self.blocks,
        }
    }

    /// Walks the list and verifies ordering, adjacency, tail and counters.
    pub(crate) fn check(&self) -> Result<(), InvariantViolation> {
        if self.head.is_none() {
            return Err(InvariantViolation::Empty);
        }
        let mut counted = 0usize;
        let mut elements = 0usize;
        let mut last: Option<(BlockAddr, usize)> = None;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            if counted > self.blocks {
                return Err(InvariantViolation::BlockCountDrift {
                    counted,
                    cached: self.blocks,
                });
            }
            let header = self.header(node);
            if header.free_size == 0 {
                return Err(InvariantViolation::EmptyBlock { addr: node.get() });
            }
            if let Some((prev, prev_size)) = last {
                let prev_end = self.end_of(prev, prev_size);
                if node <= prev {
                    return Err(InvariantViolation::OutOfOrder {
                        prev: prev.get(),
                        addr: node.get(),
                    });
                }
                if prev_end > node {
                    return Err(InvariantViolation::Overlap {
                        prev: prev.get(),
                        addr: node.get(),
                    });
                }
                if prev_end == node {
                    return Err(InvariantViolation::Unmerged {
                        prev: prev.get(),
                        addr: node.get(),
                    });
                }
            }
            counted += 1;
            elements += header.free_size;
            last = Some((node, header.free_size));
            cursor = header.next;
        }
        let actual = last.map(|(node, _)| node);
        if self.tail != actual {
            return Err(InvariantViolation::TailMismatch {
                cached: self.tail.map(BlockAddr::get),
                actual: actual.map(BlockAddr::get),
            });
        }
        if counted != self.blocks {
            return Err(InvariantViolation::BlockCountDrift {
                counted,
                cached: self.blocks,
            });
        }
        if elements != self.free_elements {
            return Err(InvariantViolation::ElementCountDrift {
                counted: elements,
                cached: self.free_elements,
            });
        }
        Ok(())
    }
}

/// Iterator over listed blocks in address order.
pub struct Blocks<'a> {
    list: &'a FreeList,
    cursor: Option<BlockAddr>,
    remaining: usize,
}

impl Iterator for Blocks<'_> {
    type Item = FreeBlock;

    fn next(&mut self) -> Option<FreeBlock> {
        let node = self.cursor?;
        if self.remaining == 0 {
            return None;
        }
        let header = self.list.header(node);
        self.cursor = header.next;
        self.remaining -= 1;
        Some(FreeBlock {
            addr: node.get(),
            free_size: header.free_size,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
