//! Structured logging for harness runs.
//!
//! Harness summaries and pool lifecycle records share one JSONL stream.
//! Pool records keep their `core::pool::<symbol>::<decision_id>` trace ids;
//! harness entries get `harness::<run>::<seq>` ids from the [`LogEmitter`].
//! [`ArtifactIndex`] pins emitted files by SHA-256.

use frankenpool_core::{PoolLogLevel, PoolLogRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

const POOL_SCOPE: &str = "core::pool::";
const HARNESS_SCOPE: &str = "harness::";

/// Symbols a log line may name.
pub const KNOWN_SYMBOLS: &[&str] = &[
    "construct",
    "allocate",
    "deallocate",
    "teardown",
    "scenario",
    "storm",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<PoolLogLevel> for LogLevel {
    fn from(level: PoolLogLevel) -> Self {
        match level {
            PoolLogLevel::Trace => Self::Trace,
            PoolLogLevel::Debug => Self::Debug,
            PoolLogLevel::Info | PoolLogLevel::Off => Self::Info,
            PoolLogLevel::Warn => Self::Warn,
            PoolLogLevel::Error => Self::Error,
        }
    }
}

/// Verdict of a scenario or storm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
}

/// One JSONL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Pool API symbol, or `scenario` / `storm` for harness summaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// p99 allocation latency for storms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// An entry stamped now. An empty `trace_id` is filled in by the emitter.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            run_id: None,
            symbol: None,
            chunk_size: None,
            elements: None,
            addr: None,
            outcome: None,
            latency_ns: None,
            duration_ms: None,
            details: None,
        }
    }

    /// Entry mirroring a pool lifecycle record.
    #[must_use]
    pub fn from_pool_record(record: &PoolLogRecord) -> Self {
        Self {
            symbol: Some(record.symbol.to_owned()),
            elements: record.elements,
            addr: record.addr,
            details: Some(serde_json::json!({
                "decision_id": record.decision_id,
                "outcome": record.outcome,
                "free_blocks": record.free_blocks,
                "free_elements": record.free_elements,
                "chunks_live": record.chunks_live,
                "details": record.details,
            })),
            ..Self::new(&record.trace_id, record.level.into(), record.event)
        }
    }

    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    #[must_use]
    pub fn with_elements(mut self, elements: usize) -> Self {
        self.elements = Some(elements);
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_latency_ns(mut self, ns: u64) -> Self {
        self.latency_ns = Some(ns);
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// True for entries carried over from a pool's lifecycle log.
    #[must_use]
    pub fn is_pool_record(&self) -> bool {
        self.trace_id.starts_with(POOL_SCOPE)
    }
}

/// A hashed file in an [`ArtifactIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Hashes the file at `path` and adds it.
    pub fn add_file(&mut self, path: &Path, kind: impl Into<String>) -> std::io::Result<&mut Self> {
        let bytes = std::fs::read(path)?;
        self.artifacts.push(ArtifactEntry {
            path: path.display().to_string(),
            kind: kind.into(),
            sha256: sha256_hex(&bytes),
            size_bytes: bytes.len() as u64,
        });
        Ok(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Writes JSONL entries for one run.
pub struct LogEmitter {
    writer: Box<dyn Write>,
    seq: u64,
    run_id: String,
}

impl LogEmitter {
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(std::io::BufWriter::new(file), run_id))
    }

    #[must_use]
    pub fn to_writer(writer: impl Write + 'static, run_id: &str) -> Self {
        Self {
            writer: Box::new(writer),
            seq: 0,
            run_id: run_id.to_string(),
        }
    }

    /// Writes `entry`, filling in a missing trace id and run id.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            self.seq += 1;
            entry.trace_id = format!("{HARNESS_SCOPE}{}::{:03}", self.run_id, self.seq);
        }
        if entry.run_id.is_none() {
            entry.run_id = Some(self.run_id.clone());
        }
        serde_json::to_writer(&mut self.writer, &entry).map_err(std::io::Error::other)?;
        self.writer.write_all(b"\n")
    }

    /// Writes every pool lifecycle record in order.
    pub fn emit_pool_records(&mut self, records: &[PoolLogRecord]) -> std::io::Result<()> {
        records
            .iter()
            .try_for_each(|record| self.emit_entry(LogEntry::from_pool_record(record)))
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[derive(Debug, Error)]
#[error("line {line_number}: field '{field}': {message}")]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

/// Checks one JSONL line and returns the parsed entry.
///
/// Beyond the schema, pool records must name a known symbol and carry a
/// `details.decision_id` equal to the hex id ending their trace id.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let mut errors = Vec::new();
    let mut fail = |field: &str, message: String| {
        errors.push(LogValidationError {
            line_number,
            field: field.to_string(),
            message,
        });
    };

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            fail("<json>", format!("invalid JSON: {err}"));
            return Err(errors);
        }
    };
    let Some(obj) = value.as_object() else {
        fail("<root>", "expected JSON object".to_string());
        return Err(errors);
    };
    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            fail(field, "required field missing".to_string());
        }
    }
    check_enum::<LogLevel>(obj, "level", &mut fail);
    check_enum::<Outcome>(obj, "outcome", &mut fail);
    if !errors.is_empty() {
        return Err(errors);
    }

    let entry = match serde_json::from_value::<LogEntry>(value) {
        Ok(entry) => entry,
        Err(err) => {
            errors.push(LogValidationError {
                line_number,
                field: "<schema>".to_string(),
                message: err.to_string(),
            });
            return Err(errors);
        }
    };

    let mut fail = |field: &str, message: String| {
        errors.push(LogValidationError {
            line_number,
            field: field.to_string(),
            message,
        });
    };
    if let Some(symbol) = entry.symbol.as_deref()
        && !KNOWN_SYMBOLS.contains(&symbol)
    {
        fail("symbol", format!("unknown symbol: '{symbol}'"));
    }
    if entry.chunk_size == Some(0) {
        fail("chunk_size", "chunk_size must be positive".to_string());
    }
    check_trace_id(&entry, &mut fail);

    if errors.is_empty() {
        Ok(entry)
    } else {
        Err(errors)
    }
}

fn check_enum<E: DeserializeOwned>(
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    fail: &mut impl FnMut(&str, String),
) {
    if let Some(raw) = obj.get(field)
        && serde_json::from_value::<E>(raw.clone()).is_err()
    {
        fail(field, format!("invalid {field}: {raw}"));
    }
}

fn check_trace_id(entry: &LogEntry, fail: &mut impl FnMut(&str, String)) {
    let trace_id = entry.trace_id.as_str();
    if let Some(rest) = trace_id.strip_prefix(POOL_SCOPE) {
        let Some((symbol, id)) = rest.split_once("::") else {
            fail("trace_id", format!("pool trace id lacks a decision id: '{trace_id}'"));
            return;
        };
        if entry.symbol.as_deref() != Some(symbol) {
            fail("symbol", format!("pool record symbol does not match '{trace_id}'"));
        }
        let recorded = entry
            .details
            .as_ref()
            .and_then(|details| details.get("decision_id"))
            .and_then(serde_json::Value::as_u64);
        match (u64::from_str_radix(id, 16), recorded) {
            (Ok(from_trace), Some(recorded)) if from_trace == recorded => {}
            (Ok(_), Some(recorded)) => fail(
                "details.decision_id",
                format!("decision id {recorded} does not match trace id '{trace_id}'"),
            ),
            (Ok(_), None) => fail(
                "details.decision_id",
                "pool record without a decision id".to_string(),
            ),
            (Err(_), _) => fail("trace_id", format!("decision id is not hex: '{id}'")),
        }
    } else if let Some(rest) = trace_id.strip_prefix(HARNESS_SCOPE) {
        if rest.split("::").count() != 2 {
            fail(
                "trace_id",
                format!("harness trace id should be harness::<run>::<seq>, got '{trace_id}'"),
            );
        }
    } else {
        fail("trace_id", format!("unknown trace scope: '{trace_id}'"));
    }
}

/// Validates every non-empty line of a JSONL file.
///
/// Returns the non-empty line count and the errors found.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut errors = Vec::new();
    let mut lines = 0;
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        lines += 1;
        if let Err(found) = validate_log_line(line, i + 1) {
            errors.extend(found);
        }
    }
    Ok((lines, errors))
}

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        duration.subsec_millis(),
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
