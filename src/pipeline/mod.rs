//! Chunk execution for the inference phase.
//!
//! - **Config**: run inputs and the shared output directory layout
//! - **Worker**: runs the inference step over one chunk, one artifact per item
//! - **Progress**: per-chunk counters and periodic progress logs
//!
//! A chunk worker never sees the scheduler. It receives its chunk and its
//! output directory as arguments; the CLI resolves the directory from the
//! job's runtime context before calling it.

pub mod config;
pub mod progress;
pub mod worker;

pub use config::{resolve_job_dir, ForgeConfig, OutputLayout, JOB_ID_PLACEHOLDER};
pub use progress::{ChunkProgress, ItemOutcome, ProgressSnapshot};
pub use worker::{ChunkReport, ChunkWorker};
