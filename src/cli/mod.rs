//! Command-line interface for sam-forge.
//!
//! Provides commands for chunk dispatch, per-job chunk execution,
//! aggregation, and dataset templating.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
