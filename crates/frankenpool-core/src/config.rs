//! Pool configuration.
//!
//! Two environment variables feed [`PoolConfig::from_env`]:
//! - `FRANKENPOOL_CHUNK_SIZE`: elements per chunk, decimal or `0x` hex
//!   (default 1024).
//! - `FRANKENPOOL_LOG`: lifecycle log threshold,
//!   `trace|debug|info|warn|error|off` (default `info`).
//!
//! The log threshold is resolved once per process and cached; the chunk size
//! is read on every call.

use std::alloc::Layout;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::PoolError;
use crate::log::PoolLogLevel;

/// Elements per chunk when nothing else is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const CHUNK_SIZE_ENV: &str = "FRANKENPOOL_CHUNK_SIZE";
pub const LOG_LEVEL_ENV: &str = "FRANKENPOOL_LOG";

/// Construction parameters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    chunk_size: usize,
    log_level: PoolLogLevel,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_level: PoolLogLevel::Info,
        }
    }

    /// Configuration from the process environment.
    ///
    /// A missing or malformed chunk size falls back to [`DEFAULT_CHUNK_SIZE`].
    #[must_use]
    pub fn from_env() -> Self {
        let chunk_size = std::env::var(CHUNK_SIZE_ENV)
            .ok()
            .and_then(|raw| parse_chunk_size_env(&raw))
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        Self {
            chunk_size,
            log_level: log_level(),
        }
    }

    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub const fn with_log_level(mut self, log_level: PoolLogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub const fn log_level(&self) -> PoolLogLevel {
        self.log_level
    }

    /// Layout of one chunk of `T`, validating the chunk size.
    pub fn chunk_layout<T>(&self) -> Result<Layout, PoolError> {
        if self.chunk_size == 0 {
            return Err(PoolError::ZeroChunkSize);
        }
        Layout::array::<T>(self.chunk_size).map_err(|_| PoolError::LayoutOverflow {
            elements: self.chunk_size,
        })
    }
}

fn parse_chunk_size_env(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok()?,
        None => raw.parse().ok()?,
    };
    (parsed > 0).then_some(parsed)
}

// Atomic cache: 0=unresolved, 1..=6 the level, 255=resolving.
static CACHED_LOG_LEVEL: AtomicU8 = AtomicU8::new(0);

const LEVEL_UNRESOLVED: u8 = 0;
const LEVEL_RESOLVING: u8 = 255;

const fn level_to_u8(level: PoolLogLevel) -> u8 {
    match level {
        PoolLogLevel::Trace => 1,
        PoolLogLevel::Debug => 2,
        PoolLogLevel::Info => 3,
        PoolLogLevel::Warn => 4,
        PoolLogLevel::Error => 5,
        PoolLogLevel::Off => 6,
    }
}

const fn u8_to_level(v: u8) -> PoolLogLevel {
    match v {
        1 => PoolLogLevel::Trace,
        2 => PoolLogLevel::Debug,
        4 => PoolLogLevel::Warn,
        5 => PoolLogLevel::Error,
        6 => PoolLogLevel::Off,
        _ => PoolLogLevel::Info,
    }
}

/// Process-wide log threshold (reads `FRANKENPOOL_LOG` on first call).
///
/// Concurrent callers racing the first resolution see `Info` until the
/// winner stores its result.
#[must_use]
pub fn log_level() -> PoolLogLevel {
    let cached = CACHED_LOG_LEVEL.load(Ordering::Acquire);
    if cached != LEVEL_UNRESOLVED && cached != LEVEL_RESOLVING {
        return u8_to_level(cached);
    }
    if cached == LEVEL_RESOLVING {
        return PoolLogLevel::Info;
    }
    if CACHED_LOG_LEVEL
        .compare_exchange(
            LEVEL_UNRESOLVED,
            LEVEL_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        let v = CACHED_LOG_LEVEL.load(Ordering::Acquire);
        return if v != LEVEL_UNRESOLVED && v != LEVEL_RESOLVING {
            u8_to_level(v)
        } else {
            PoolLogLevel::Info
        };
    }
    let level = std::env::var(LOG_LEVEL_ENV)
        .map(|v| PoolLogLevel::from_str_loose(&v))
        .unwrap_or_default();
    CACHED_LOG_LEVEL.store(level_to_u8(level), Ordering::Release);
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.log_level(), PoolLogLevel::Info);
    }

    #[test]
    fn chunk_size_env_parser() {
        assert_eq!(parse_chunk_size_env("64"), Some(64));
        assert_eq!(parse_chunk_size_env(" 0x40 "), Some(64));
        assert_eq!(parse_chunk_size_env("0X10"), Some(16));
        assert_eq!(parse_chunk_size_env("0"), None);
        assert_eq!(parse_chunk_size_env("-3"), None);
        assert_eq!(parse_chunk_size_env("lots"), None);
    }

    #[test]
    fn chunk_layout_validates() {
        let zero = PoolConfig::new().with_chunk_size(0);
        assert_eq!(zero.chunk_layout::<u128>(), Err(PoolError::ZeroChunkSize));

        let huge = PoolConfig::new().with_chunk_size(usize::MAX);
        assert_eq!(
            huge.chunk_layout::<u128>(),
            Err(PoolError::LayoutOverflow {
                elements: usize::MAX
            })
        );

        let layout = PoolConfig::new()
            .with_chunk_size(8)
            .chunk_layout::<u128>()
            .expect("valid");
        assert_eq!(layout.size(), 128);
    }

    #[test]
    fn level_codes_round_trip() {
        for level in [
            PoolLogLevel::Trace,
            PoolLogLevel::Debug,
            PoolLogLevel::Info,
            PoolLogLevel::Warn,
            PoolLogLevel::Error,
            PoolLogLevel::Off,
        ] {
            assert_eq!(u8_to_level(level_to_u8(level)), level);
        }
    }

    #[test]
    fn cached_level_is_process_sticky_until_cache_reset() {
        let previous = CACHED_LOG_LEVEL.swap(level_to_u8(PoolLogLevel::Debug), Ordering::SeqCst);
        assert_eq!(log_level(), PoolLogLevel::Debug);
        assert_eq!(log_level(), PoolLogLevel::Debug);

        CACHED_LOG_LEVEL.store(level_to_u8(PoolLogLevel::Off), Ordering::SeqCst);
        assert_eq!(log_level(), PoolLogLevel::Off);

        CACHED_LOG_LEVEL.store(previous, Ordering::SeqCst);
    }

    #[test]
    fn resolving_state_returns_info() {
        let previous = CACHED_LOG_LEVEL.swap(LEVEL_RESOLVING, Ordering::SeqCst);
        assert_eq!(log_level(), PoolLogLevel::Info);
        CACHED_LOG_LEVEL.store(previous, Ordering::SeqCst);
    }
}
