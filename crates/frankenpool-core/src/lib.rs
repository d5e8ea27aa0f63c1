//! # frankenpool-core
//!
//! Chunked pool allocator for runs of a single element type.
//!
//! A [`Pool<T>`](Pool) carves variable-length runs of `T` out of a few large
//! chunks obtained from a [`ChunkSource`]. Free space is tracked by an
//! intrusive free list: each free run stores its own header (a count and a
//! link) in its first element, runs are kept in address order, and a returned
//! run merges with any physically adjacent free neighbour.
//!
//! ```
//! use frankenpool_core::{Pool, PoolConfig};
//!
//! let mut pool = Pool::<[u64; 2]>::with_config(PoolConfig::new().with_chunk_size(64))?;
//! let mut loan = pool.allocate(3)?;
//! loan.init_with(|i| [i as u64, 0]);
//! pool.deallocate(loan);
//! pool.check_invariants()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Unsafe code is confined to the modules that touch raw memory; the pool
//! logic itself is safe.

#![deny(unsafe_code)]

pub mod adapter;
#[allow(unsafe_code)]
mod chunk;
pub mod config;
pub mod error;
#[allow(unsafe_code)]
mod free_list;
#[allow(unsafe_code)]
pub mod loan;
pub mod log;
pub mod pool;
#[allow(unsafe_code)]
mod raw;
pub mod shared;
#[allow(unsafe_code)]
pub mod source;
pub mod stats;

pub use adapter::ElementAllocator;
pub use config::{DEFAULT_CHUNK_SIZE, PoolConfig};
pub use error::{InvariantViolation, PoolError};
pub use free_list::{Blocks, FreeBlock};
pub use loan::{Loan, LoanOrigin};
pub use log::{PoolLogLevel, PoolLogRecord};
pub use pool::Pool;
pub use raw::HEADER_SIZE;
pub use shared::SharedPool;
pub use source::{ChunkSource, CountingSource, SlabSource, SystemSource};
pub use stats::{PoolStats, TeardownReport};
