//! Harness error type.

use frankenpool_core::{InvariantViolation, PoolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("invariant violated after operation {op}: {source}")]
    Invariant {
        op: usize,
        #[source]
        source: InvariantViolation,
    },
    #[error("slab of {bytes} bytes could not be allocated")]
    Slab { bytes: usize },
    #[error("{count} structured-log validation errors")]
    LogValidation { count: usize },
}
