//! Progress accounting for a running chunk.
//!
//! Items inside a chunk are processed one at a time, so plain counters are
//! enough. The worker logs a line every `log_every` items so operators can
//! follow a long job from its log file alone.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Written,
    AlreadyPresent,
    Failed,
}

/// Snapshot of chunk progress at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub written: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn done(&self) -> usize {
        self.written + self.skipped_existing + self.failed
    }

    /// Items per second over newly written artifacts.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.written as f64 / secs
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.done() as f64 * 100.0 / self.total as f64
    }
}

/// Counters for one chunk.
#[derive(Debug)]
pub struct ChunkProgress {
    chunk_index: usize,
    total: usize,
    written: usize,
    skipped_existing: usize,
    failed: usize,
    log_every: usize,
    start: Instant,
}

impl ChunkProgress {
    pub fn new(chunk_index: usize, total: usize, log_every: usize) -> Self {
        Self {
            chunk_index,
            total,
            written: 0,
            skipped_existing: 0,
            failed: 0,
            log_every: log_every.max(1),
            start: Instant::now(),
        }
    }

    /// Records one item and logs if a reporting boundary was crossed.
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Written => self.written += 1,
            ItemOutcome::AlreadyPresent => self.skipped_existing += 1,
            ItemOutcome::Failed => self.failed += 1,
        }

        let snapshot = self.snapshot();
        if snapshot.done() % self.log_every == 0 {
            info!(
                chunk = self.chunk_index,
                done = snapshot.done(),
                total = snapshot.total,
                written = snapshot.written,
                skipped = snapshot.skipped_existing,
                failed = snapshot.failed,
                "[{:.1}%] {:.2} items/s",
                snapshot.percent(),
                snapshot.rate()
            );
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            written: self.written,
            skipped_existing: self.skipped_existing,
            failed: self.failed,
            elapsed: self.start.elapsed(),
        }
    }
}
