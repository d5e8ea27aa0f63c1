//! Benchmarks for frankenpool live under `benches/`.
