//! Typed handle for memory lent out by a pool.

use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use crate::raw::{BlockAddr, Region};

/// Where the memory behind a [`Loan`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanOrigin {
    /// Carved from a pool chunk.
    Pool,
    /// Obtained directly from the memory source after a pool miss.
    System,
}

/// `len` contiguous, uninitialized elements of `T` owned by the caller until
/// handed back with [`Pool::deallocate`](crate::Pool::deallocate).
///
/// The pool never constructs or drops elements. Values written into a loan
/// must be dropped by the caller before the loan is returned; the pool
/// overwrites the first bytes with bookkeeping as soon as it gets them back.
///
/// Dropping a `Loan` without returning it leaks its elements.
#[must_use = "dropping a loan leaks its elements; return it with `Pool::deallocate`"]
pub struct Loan<T> {
    ptr: NonNull<T>,
    len: usize,
    origin: LoanOrigin,
    _owns: PhantomData<T>,
}

// SAFETY: a loan is the sole handle to its elements.
unsafe impl<T: Send> Send for Loan<T> {}
// SAFETY: shared access only yields shared views of the elements.
unsafe impl<T: Sync> Sync for Loan<T> {}

impl<T> fmt::Debug for Loan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loan")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len)
            .field("origin", &self.origin)
            .finish()
    }
}

impl<T> Loan<T> {
    pub(crate) fn from_region(region: Region, origin: LoanOrigin) -> Self {
        Self {
            ptr: region.addr().as_non_null(),
            len: region.elements(),
            origin,
            _owns: PhantomData,
        }
    }

    pub(crate) fn into_region(self) -> Region {
        // SAFETY: the loan owned exactly these elements and is consumed here.
        unsafe { Region::from_raw(BlockAddr::expose(self.ptr), self.len) }
    }

    /// Number of elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always false; pools reject empty requests.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn origin(&self) -> LoanOrigin {
        self.origin
    }

    #[must_use]
    pub const fn is_pooled(&self) -> bool {
        matches!(self.origin, LoanOrigin::Pool)
    }

    #[must_use]
    pub const fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    #[must_use]
    pub const fn as_non_null(&self) -> NonNull<T> {
        self.ptr
    }

    /// Address of the first element.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.ptr.addr().get()
    }

    #[must_use]
    pub fn as_uninit_slice(&self) -> &[MaybeUninit<T>] {
        // SAFETY: the loan owns `len` elements of `T`; MaybeUninit has no
        // validity requirement.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast(), self.len) }
    }

    #[must_use]
    pub fn as_uninit_slice_mut(&mut self) -> &mut [MaybeUninit<T>] {
        // SAFETY: as above, and `&mut self` makes the view exclusive.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast(), self.len) }
    }

    /// Writes `init(i)` into every element and returns the initialized slice.
    ///
    /// Previous contents are overwritten without being dropped.
    pub fn init_with(&mut self, mut init: impl FnMut(usize) -> T) -> &mut [T] {
        for (i, slot) in self.as_uninit_slice_mut().iter_mut().enumerate() {
            slot.write(init(i));
        }
        // SAFETY: every element was written above.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Splits the loan into its pointer, element count and origin.
    #[must_use]
    pub fn into_raw_parts(self) -> (NonNull<T>, usize, LoanOrigin) {
        let _ = self.ptr.as_ptr().expose_provenance();
        (self.ptr, self.len, self.origin)
    }

    /// Rebuilds a loan from [`into_raw_parts`](Loan::into_raw_parts) output.
    ///
    /// # Safety
    ///
    /// `ptr`, `len` and `origin` must be exactly the parts of one loan from
    /// the pool it will be returned to (or from a pool sharing its memory
    /// source), and that loan must not have been rebuilt before.
    #[must_use]
    pub unsafe fn from_raw_parts(ptr: NonNull<T>, len: usize, origin: LoanOrigin) -> Self {
        Self {
            ptr,
            len,
            origin,
            _owns: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_over(slots: &mut [u128]) -> Region {
        let addr = BlockAddr::expose(NonNull::from(slots).cast::<u128>());
        // SAFETY: the test owns the slots for the duration of the loan.
        unsafe { Region::from_raw(addr, 4) }
    }

    #[test]
    fn init_with_fills_every_element() {
        let mut slots = [0u128; 4];
        let mut loan = Loan::<u128>::from_region(region_over(&mut slots), LoanOrigin::Pool);
        let values = loan.init_with(|i| (i as u128) * 10);
        assert_eq!(values, &[0, 10, 20, 30]);
        assert_eq!(loan.len(), 4);
        assert!(loan.is_pooled());
        let region = loan.into_region();
        assert_eq!(region.elements(), 4);
    }

    #[test]
    fn raw_parts_round_trip_preserves_address_and_count() {
        let mut slots = [0u128; 4];
        let loan = Loan::<u128>::from_region(region_over(&mut slots), LoanOrigin::System);
        let addr = loan.addr();
        assert_eq!(loan.origin(), LoanOrigin::System);
        let (ptr, len, origin) = loan.into_raw_parts();
        assert_eq!(origin, LoanOrigin::System);
        // SAFETY: parts come from the loan above.
        let loan = unsafe { Loan::from_raw_parts(ptr, len, origin) };
        assert_eq!(loan.addr(), addr);
        assert_eq!(loan.len(), 4);
        assert!(!loan.is_pooled());
        let _ = loan.into_region();
    }

    #[test]
    fn debug_shows_address_and_origin() {
        let mut slots = [0u128; 4];
        let loan = Loan::<u128>::from_region(region_over(&mut slots), LoanOrigin::Pool);
        let text = format!("{loan:?}");
        assert!(text.contains("len: 4"));
        assert!(text.contains("Pool"));
        let _ = loan.into_region();
    }
}
