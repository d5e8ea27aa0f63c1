//! CLI entrypoint for the frankenpool harness.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use frankenpool_harness::structured_log::{
    ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome, validate_log_file,
};
use frankenpool_harness::{HarnessError, WorkloadConfig, run_scenario, run_storm};

/// Verification tooling for frankenpool.
#[derive(Debug, Parser)]
#[command(name = "frankenpool-harness")]
#[command(about = "Scenario, storm and log tooling for frankenpool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay the chunk-of-eight walkthrough and print the report as JSON.
    Scenario {
        /// Structured JSONL log path (pool lifecycle records included).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Output report path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run a seeded allocation storm with invariant checks.
    Storm {
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xDEAD_BEEF")]
        seed: String,
        #[arg(long, default_value_t = 10_000)]
        ops: usize,
        #[arg(long, default_value_t = 256)]
        chunk_size: usize,
        #[arg(long, default_value_t = 32)]
        max_request: usize,
        #[arg(long, default_value_t = 512)]
        max_live: usize,
        /// Invariant check cadence in operations.
        #[arg(long, default_value_t = 64)]
        check_every: usize,
        /// Carve chunks from one slab of this many bytes instead of the
        /// system heap, making the report reproducible per seed.
        #[arg(long)]
        slab_bytes: Option<usize>,
        /// Output report path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Artifact index path covering the report and log.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        /// JSONL log path.
        #[arg(long)]
        log: PathBuf,
    },
}

fn parse_seed(raw: &str) -> Result<u64, String> {
    let cleaned = raw.trim().replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|err| format!("invalid seed '{raw}': {err}"))
}

fn write_or_print(output: Option<&PathBuf>, body: &str) -> Result<(), HarnessError> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, body)?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scenario { log, output } => {
            let report = run_scenario()?;
            if let Some(path) = &log {
                let mut emitter = LogEmitter::to_file(path, "scenario")?;
                emitter.emit_pool_records(&report.lifecycle)?;
                let outcome = if report.passed {
                    Outcome::Pass
                } else {
                    Outcome::Fail
                };
                emitter.emit_entry(
                    LogEntry::new("", LogLevel::Info, "scenario_complete")
                        .with_symbol("scenario")
                        .with_chunk_size(report.chunk_size)
                        .with_outcome(outcome),
                )?;
                emitter.flush()?;
            }
            write_or_print(output.as_ref(), &serde_json::to_string_pretty(&report)?)?;
            if !report.passed {
                return Err("scenario diverged from the expected free-list states".into());
            }
        }
        Command::Storm {
            seed,
            ops,
            chunk_size,
            max_request,
            max_live,
            check_every,
            slab_bytes,
            output,
            log,
            artifact_index,
        } => {
            let config = WorkloadConfig {
                seed: parse_seed(&seed)?,
                ops,
                chunk_size,
                max_request,
                max_live,
                check_every,
                ..WorkloadConfig::default()
            };
            let run_id = format!("storm-{:016x}", config.seed);
            let started = Instant::now();
            let result = run_storm(config, slab_bytes);
            let duration_ms = started.elapsed().as_millis() as u64;

            if let Some(path) = &log {
                let mut emitter = LogEmitter::to_file(path, &run_id)?;
                let entry = LogEntry::new("", LogLevel::Info, "storm_complete")
                    .with_symbol("storm")
                    .with_chunk_size(chunk_size)
                    .with_elements(ops)
                    .with_duration_ms(duration_ms);
                let entry = match &result {
                    Ok(report) => entry
                        .with_outcome(Outcome::Pass)
                        .with_latency_ns(report.alloc_p99_ns),
                    Err(err) => entry
                        .with_outcome(Outcome::Fail)
                        .with_details(serde_json::json!({ "error": err.to_string() })),
                };
                emitter.emit_entry(entry)?;
                emitter.flush()?;
            }

            let report = result?;
            write_or_print(output.as_ref(), &serde_json::to_string_pretty(&report)?)?;

            if let Some(index_path) = &artifact_index {
                let mut index = ArtifactIndex::new(&run_id);
                if let Some(path) = &output {
                    index.add_file(path, "storm_report")?;
                }
                if let Some(path) = &log {
                    index.add_file(path, "log")?;
                }
                write_or_print(Some(index_path), &index.to_json()?)?;
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for error in &errors {
                eprintln!("{error}");
            }
            eprintln!("{lines} lines, {} errors", errors.len());
            if !errors.is_empty() {
                return Err(HarnessError::LogValidation {
                    count: errors.len(),
                }
                .into());
            }
        }
    }

    Ok(())
}
