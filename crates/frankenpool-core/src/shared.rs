//! Mutex-guarded pool for use across threads.

use parking_lot::Mutex;

use crate::error::PoolError;
use crate::loan::Loan;
use crate::pool::Pool;
use crate::source::{ChunkSource, SystemSource};
use crate::stats::PoolStats;

/// A [`Pool`] behind a `parking_lot` mutex.
///
/// Every call takes the lock for its whole duration, so operations are
/// serialized exactly as on a single-threaded pool.
pub struct SharedPool<T, S: ChunkSource = SystemSource> {
    inner: Mutex<Pool<T, S>>,
}

impl<T, S: ChunkSource> SharedPool<T, S> {
    pub fn new(pool: Pool<T, S>) -> Self {
        Self {
            inner: Mutex::new(pool),
        }
    }

    pub fn allocate(&self, n: usize) -> Result<Loan<T>, PoolError> {
        self.inner.lock().allocate(n)
    }

    pub fn allocate_or_system(&self, n: usize) -> Result<Loan<T>, PoolError> {
        self.inner.lock().allocate_or_system(n)
    }

    pub fn deallocate(&self, loan: Loan<T>) {
        self.inner.lock().deallocate(loan);
    }

    /// Runs `f` with the pool locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Pool<T, S>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats()
    }

    pub fn into_inner(self) -> Pool<T, S> {
        self.inner.into_inner()
    }
}

impl<T, S: ChunkSource> From<Pool<T, S>> for SharedPool<T, S> {
    fn from(pool: Pool<T, S>) -> Self {
        Self::new(pool)
    }
}
