//! Element-allocator interface for containers.
//!
//! Containers generic over an allocator need the value type, the handle type
//! and a way to obtain an allocator for a different element type (for node
//! types that wrap the value).

use crate::error::PoolError;
use crate::loan::Loan;
use crate::pool::Pool;
use crate::source::ChunkSource;

/// Allocator handing out runs of one element type.
pub trait ElementAllocator {
    type Value;
    /// Handle for an allocated run.
    type Pointer;
    /// The same allocator family for another element type.
    type Rebound<U>: ElementAllocator<Value = U>;

    fn allocate(&mut self, n: usize) -> Result<Self::Pointer, PoolError>;

    fn deallocate(&mut self, ptr: Self::Pointer);

    /// An equivalent, independent allocator for `U`.
    fn rebind<U>(&self) -> Result<Self::Rebound<U>, PoolError>;
}

impl<T, S: ChunkSource + Clone> ElementAllocator for Pool<T, S> {
    type Value = T;
    type Pointer = Loan<T>;
    type Rebound<U> = Pool<U, S>;

    /// Falls back to the memory source on a pool miss, as containers expect
    /// every request to be served.
    fn allocate(&mut self, n: usize) -> Result<Loan<T>, PoolError> {
        self.allocate_or_system(n)
    }

    fn deallocate(&mut self, ptr: Loan<T>) {
        Pool::deallocate(self, ptr);
    }

    fn rebind<U>(&self) -> Result<Pool<U, S>, PoolError> {
        Pool::rebind::<U>(self)
    }
}
