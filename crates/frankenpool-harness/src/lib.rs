//! Verification harness for frankenpool.
//!
//! This crate provides:
//! - Scenario replay: the chunk-of-eight walkthrough with per-step free-list snapshots
//! - Workload storms: seeded alloc/free sequences with invariant checks and metrics
//! - Structured logging: JSONL records, validation and a SHA-256 artifact index

#![forbid(unsafe_code)]

pub mod error;
pub mod scenario;
pub mod structured_log;
pub mod workload;

pub use error::HarnessError;
pub use scenario::{ScenarioReport, run_scenario};
pub use workload::{WorkloadConfig, WorkloadReport, WorkloadRunner, run_storm};
