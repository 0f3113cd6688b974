//! Job definitions for the scheduler.
//!
//! - `ChunkSpec`: the indices one job processes
//! - `JobHandle`: what a scheduler returns for an accepted submission
//! - `JobStatus`: state of a job as far as the dispatcher knows

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::artifact::write_atomic;
use crate::error::StorageError;
use crate::pipeline::ChunkReport;

/// Indices assigned to one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkIndices {
    /// Half-open range `[start, end)`.
    Range { start: usize, end: usize },
    /// Explicit list, used when resubmitting missing indices.
    List { indices: Vec<usize> },
}

impl ChunkIndices {
    pub fn len(&self) -> usize {
        match self {
            ChunkIndices::Range { start, end } => end.saturating_sub(*start),
            ChunkIndices::List { indices } => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the indices in processing order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        match self {
            ChunkIndices::Range { start, end } => Box::new(*start..*end),
            ChunkIndices::List { indices } => Box::new(indices.iter().copied()),
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        match self {
            ChunkIndices::Range { start, end } => *start <= index && index < *end,
            ChunkIndices::List { indices } => indices.contains(&index),
        }
    }
}

/// One unit of work submitted to a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpec {
    /// Position of this chunk within its dispatch.
    pub chunk_index: usize,
    pub indices: ChunkIndices,
}

impl ChunkSpec {
    pub fn range(chunk_index: usize, start: usize, end: usize) -> Self {
        Self {
            chunk_index,
            indices: ChunkIndices::Range { start, end },
        }
    }

    pub fn list(chunk_index: usize, indices: Vec<usize>) -> Self {
        Self {
            chunk_index,
            indices: ChunkIndices::List { indices },
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Writes this chunk as JSON so a remote worker can pick it up.
    pub async fn save(&self, path: &Path) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json).await
    }

    pub async fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Status of a submitted job as seen at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted by a cluster scheduler; runs asynchronously.
    Submitted,
    /// Ran to completion in-process.
    Completed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Submitted => write!(f, "submitted"),
            JobStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Handle for an accepted chunk submission.
#[derive(Debug, Clone)]
pub struct JobHandle {
    /// Scheduler-assigned job id.
    pub job_id: String,
    pub chunk: ChunkSpec,
    /// Directory the job writes its artifacts into.
    pub output_dir: PathBuf,
    pub status: JobStatus,
    /// Present when the chunk ran in-process.
    pub report: Option<ChunkReport>,
}

impl JobHandle {
    pub fn submitted(job_id: impl Into<String>, chunk: ChunkSpec, output_dir: PathBuf) -> Self {
        Self {
            job_id: job_id.into(),
            chunk,
            output_dir,
            status: JobStatus::Submitted,
            report: None,
        }
    }

    pub fn completed(
        job_id: impl Into<String>,
        chunk: ChunkSpec,
        output_dir: PathBuf,
        report: ChunkReport,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            chunk,
            output_dir,
            status: JobStatus::Completed,
            report: Some(report),
        }
    }
}
