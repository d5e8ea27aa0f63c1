//! Structured pool lifecycle records.

use serde::Serialize;

/// Pool lifecycle log level.
///
/// Ordered by severity; a pool stores records at or above its threshold.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolLogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Threshold only: stores nothing.
    Off,
}

impl PoolLogLevel {
    /// Parse from string (case-insensitive). Unknown values map to `Info`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "all" => Self::Trace,
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::Info,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        }
    }
}

/// Structured pool lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolLogRecord {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    /// Correlation id for this lifecycle record.
    pub trace_id: String,
    /// Severity level.
    pub level: PoolLogLevel,
    /// API symbol (`allocate`, `deallocate`, `construct`, `teardown`).
    pub symbol: &'static str,
    /// Event kind (`split`, `exact_fit`, `grow`, `evict`, ...).
    pub event: &'static str,
    /// Block address involved in the event.
    pub addr: Option<usize>,
    /// Element count involved in the event.
    pub elements: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form details for debugging.
    pub details: String,
    /// Snapshot: listed free blocks.
    pub free_blocks: usize,
    /// Snapshot: listed free elements.
    pub free_elements: usize,
    /// Snapshot: chunks acquired and not released.
    pub chunks_live: usize,
}

/// Buffer of lifecycle records filtered by a threshold.
#[derive(Debug)]
pub(crate) struct LifecycleLog {
    threshold: PoolLogLevel,
    next_decision_id: u64,
    records: Vec<PoolLogRecord>,
}

/// Fields of a record supplied by the caller; the log fills in the ids.
pub(crate) struct Event {
    pub(crate) level: PoolLogLevel,
    pub(crate) symbol: &'static str,
    pub(crate) event: &'static str,
    pub(crate) addr: Option<usize>,
    pub(crate) elements: Option<usize>,
    pub(crate) outcome: &'static str,
    pub(crate) details: String,
}

/// Pool state captured alongside each record.
#[derive(Clone, Copy)]
pub(crate) struct Snapshot {
    pub(crate) free_blocks: usize,
    pub(crate) free_elements: usize,
    pub(crate) chunks_live: usize,
}

impl LifecycleLog {
    pub(crate) const fn new(threshold: PoolLogLevel) -> Self {
        Self {
            threshold,
            next_decision_id: 1,
            records: Vec::new(),
        }
    }

    pub(crate) fn enabled(&self, level: PoolLogLevel) -> bool {
        self.threshold != PoolLogLevel::Off && level >= self.threshold
    }

    pub(crate) fn push(&mut self, event: Event, snapshot: Snapshot) {
        let decision_id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        if !self.enabled(event.level) {
            return;
        }
        let trace_id = format!("core::pool::{}::{:016x}", event.symbol, decision_id);
        self.records.push(PoolLogRecord {
            decision_id,
            trace_id,
            level: event.level,
            symbol: event.symbol,
            event: event.event,
            addr: event.addr,
            elements: event.elements,
            outcome: event.outcome,
            details: event.details,
            free_blocks: snapshot.free_blocks,
            free_elements: snapshot.free_elements,
            chunks_live: snapshot.chunks_live,
        });
    }

    pub(crate) fn records(&self) -> &[PoolLogRecord] {
        &self.records
    }

    pub(crate) fn drain(&mut self) -> Vec<PoolLogRecord> {
        std::mem::take(&mut self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(level: PoolLogLevel) -> Event {
        Event {
            level,
            symbol: "allocate",
            event: "split",
            addr: Some(0x1000),
            elements: Some(3),
            outcome: "ok",
            details: String::new(),
        }
    }

    const SNAPSHOT: Snapshot = Snapshot {
        free_blocks: 1,
        free_elements: 5,
        chunks_live: 1,
    };

    #[test]
    fn parse_levels_loosely() {
        assert_eq!(PoolLogLevel::from_str_loose("TRACE"), PoolLogLevel::Trace);
        assert_eq!(PoolLogLevel::from_str_loose("debug"), PoolLogLevel::Debug);
        assert_eq!(PoolLogLevel::from_str_loose(" warning "), PoolLogLevel::Warn);
        assert_eq!(PoolLogLevel::from_str_loose("error"), PoolLogLevel::Error);
        assert_eq!(PoolLogLevel::from_str_loose("none"), PoolLogLevel::Off);
        assert_eq!(PoolLogLevel::from_str_loose("bogus"), PoolLogLevel::Info);
    }

    #[test]
    fn threshold_filters_but_ids_stay_monotonic() {
        let mut log = LifecycleLog::new(PoolLogLevel::Info);
        log.push(event(PoolLogLevel::Debug), SNAPSHOT);
        log.push(event(PoolLogLevel::Warn), SNAPSHOT);
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decision_id, 2);
        assert_eq!(records[0].trace_id, "core::pool::allocate::0000000000000002");
    }

    #[test]
    fn off_stores_nothing() {
        let mut log = LifecycleLog::new(PoolLogLevel::Off);
        log.push(event(PoolLogLevel::Error), SNAPSHOT);
        assert!(log.records().is_empty());
    }

    #[test]
    fn drain_empties_buffer() {
        let mut log = LifecycleLog::new(PoolLogLevel::Trace);
        log.push(event(PoolLogLevel::Trace), SNAPSHOT);
        assert_eq!(log.drain().len(), 1);
        assert!(log.records().is_empty());
    }

    #[test]
    fn records_serialize_with_lowercase_level() {
        let mut log = LifecycleLog::new(PoolLogLevel::Trace);
        log.push(event(PoolLogLevel::Warn), SNAPSHOT);
        let json = serde_json::to_value(&log.records()[0]).expect("serialize");
        assert_eq!(json["level"], "warn");
        assert_eq!(json["event"], "split");
        assert_eq!(json["free_elements"], 5);
    }
}
