use frankenpool_harness::structured_log::{
    ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome, sha256_hex, validate_log_file,
};
use frankenpool_harness::{
    HarnessError, WorkloadConfig, WorkloadRunner, run_scenario, run_storm,
};
use std::path::PathBuf;

const SLAB_BYTES: usize = 16 << 20;

fn scratch_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("frankenpool-harness-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir.join(name)
}

#[test]
fn scenario_reports_expected_placements() {
    let report = run_scenario().expect("scenario");
    assert_eq!(report.chunk_size, 8);
    assert_eq!(report.steps.len(), 5);
    for step in &report.steps {
        assert!(step.passed, "step {} diverged: {:?}", step.action, step);
    }
    assert!(report.passed);
    assert_eq!(report.steps[2].chunks_acquired, 2);
    assert!(
        report
            .lifecycle
            .iter()
            .any(|record| record.event == "replenish")
    );
}

#[test]
fn storm_completes_with_consistent_stats() {
    let config = WorkloadConfig {
        seed: 0xC0FFEE,
        ops: 3_000,
        chunk_size: 64,
        max_request: 80,
        max_live: 128,
        check_every: 16,
        ..WorkloadConfig::default()
    };
    let report = WorkloadRunner::new(config)
        .expect("runner")
        .run()
        .expect("storm");
    assert_eq!(report.allocations + report.deallocations, 3_000);
    assert!(report.fallbacks > 0, "requests above 64 fall back");
    assert_eq!(report.stats.lent_elements, 0);
    assert_eq!(report.stats.allocations, report.stats.deallocations);
    assert!(report.invariant_checks > 3_000 / 16);
    assert!((0.0..=1.0).contains(&report.mean_fragmentation));
    assert!(report.alloc_p50_ns <= report.alloc_p99_ns);
}

#[test]
fn slab_storms_are_reproducible_per_seed() {
    let config = WorkloadConfig {
        ops: 1_000,
        ..WorkloadConfig::default()
    };
    // Allocate some heap between the runs so the slabs land elsewhere.
    let a = run_storm(config, Some(SLAB_BYTES)).expect("a");
    let spacer = vec![0u8; 3 * 4096 + 40];
    let b = run_storm(config, Some(SLAB_BYTES)).expect("b");
    drop(spacer);

    assert_eq!(a.allocations, b.allocations);
    assert_eq!(a.peak_live_loans, b.peak_live_loans);
    assert_eq!(a.stats.splits, b.stats.splits);
    assert_eq!(a.stats.merges, b.stats.merges);
    assert_eq!(a.stats.evictions, b.stats.evictions);
    assert_eq!(a.stats.chunks_acquired, b.stats.chunks_acquired);
    assert_eq!(a.max_free_blocks, b.max_free_blocks);
    assert_eq!(a.mean_fragmentation.to_bits(), b.mean_fragmentation.to_bits());
}

#[test]
fn system_storms_agree_on_seed_driven_counts() {
    let config = WorkloadConfig {
        ops: 1_000,
        ..WorkloadConfig::default()
    };
    let a = WorkloadRunner::new(config).expect("a").run().expect("a");
    let b = WorkloadRunner::new(config).expect("b").run().expect("b");
    assert_eq!(a.allocations, b.allocations);
    assert_eq!(a.deallocations, b.deallocations);
    assert_eq!(a.peak_live_loans, b.peak_live_loans);
}

#[test]
fn exhausted_slab_surfaces_as_pool_error() {
    let config = WorkloadConfig {
        ops: 2_000,
        chunk_size: 64,
        ..WorkloadConfig::default()
    };
    // Room for two 64-element chunks of 16-byte slots.
    let err = run_storm(config, Some(2 * 64 * 16)).expect_err("slab runs dry");
    assert!(matches!(err, HarnessError::Pool(_)), "{err}");
}

#[test]
fn emitted_logs_validate_and_are_indexed() {
    let path = scratch_path("scenario.jsonl");
    let report = run_scenario().expect("scenario");
    {
        let mut emitter = LogEmitter::to_file(&path, "scenario-test").expect("log file");
        emitter.emit_pool_records(&report.lifecycle).expect("records");
        emitter
            .emit_entry(
                LogEntry::new("", LogLevel::Info, "scenario_complete")
                    .with_symbol("scenario")
                    .with_chunk_size(8)
                    .with_outcome(Outcome::Pass),
            )
            .expect("summary");
        emitter.flush().expect("flush");
    }

    let (lines, errors) = validate_log_file(&path).expect("read log");
    assert_eq!(lines, report.lifecycle.len() + 1);
    assert!(errors.is_empty(), "validation errors: {errors:?}");

    let mut index = ArtifactIndex::new("scenario-test");
    index.add_file(&path, "log").expect("hash log");
    let bytes = std::fs::read(&path).expect("log bytes");
    let entry = &index.artifacts[0];
    assert_eq!(entry.sha256, sha256_hex(&bytes));
    assert_eq!(entry.size_bytes, bytes.len() as u64);
}
