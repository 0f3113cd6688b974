//! Plans chunks and submits each one to a job scheduler.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::job::{ChunkIndices, ChunkSpec, JobHandle};
use super::partition::{partition, split_indices};
use super::resources::ResourceSpec;
use super::JobScheduler;
use crate::error::DispatchError;

/// A chunk the scheduler refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedChunk {
    pub chunk_index: usize,
    pub indices: ChunkIndices,
    pub error: String,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub run_id: String,
    /// Accepted submissions, in chunk order.
    pub handles: Vec<JobHandle>,
    pub rejected: Vec<RejectedChunk>,
}

impl DispatchReport {
    pub fn submitted(&self) -> usize {
        self.handles.len()
    }

    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Submits chunks to a [`JobScheduler`] with a fixed resource request.
pub struct Dispatcher {
    scheduler: Arc<dyn JobScheduler>,
    resources: ResourceSpec,
}

impl Dispatcher {
    pub fn new(scheduler: Arc<dyn JobScheduler>, resources: ResourceSpec) -> Self {
        Self {
            scheduler,
            resources,
        }
    }

    pub fn scheduler_name(&self) -> &str {
        self.scheduler.name()
    }

    pub fn resources(&self) -> &ResourceSpec {
        &self.resources
    }

    /// Splits `[0, total)` into `num_chunks` balanced ranges and submits one
    /// job per range.
    ///
    /// # Errors
    ///
    /// Only planning errors: zero chunks or an invalid resource request.
    /// Submission failures are recorded in the report.
    pub async fn dispatch(
        &self,
        total: usize,
        num_chunks: usize,
    ) -> Result<DispatchReport, DispatchError> {
        self.resources.validate()?;
        let chunks: Vec<ChunkSpec> = partition(total, num_chunks)?
            .into_iter()
            .enumerate()
            .map(|(i, range)| ChunkSpec::range(i, range.start, range.end))
            .collect();

        Ok(self.submit_all(chunks).await)
    }

    /// Submits an explicit index list, split into `num_chunks` balanced
    /// chunks. Used to resubmit indices that produced no artifact.
    pub async fn dispatch_indices(
        &self,
        indices: &[usize],
        num_chunks: usize,
    ) -> Result<DispatchReport, DispatchError> {
        self.resources.validate()?;
        let chunks: Vec<ChunkSpec> = split_indices(indices, num_chunks)?
            .into_iter()
            .enumerate()
            .map(|(i, list)| ChunkSpec::list(i, list))
            .collect();

        Ok(self.submit_all(chunks).await)
    }

    async fn submit_all(&self, chunks: Vec<ChunkSpec>) -> DispatchReport {
        let run_id = Uuid::new_v4().to_string();
        info!(
            run_id = %run_id,
            scheduler = self.scheduler.name(),
            chunks = chunks.len(),
            "Dispatching chunks"
        );

        let mut handles = Vec::with_capacity(chunks.len());
        let mut rejected = Vec::new();

        for chunk in chunks {
            match self
                .scheduler
                .submit(&run_id, &chunk, &self.resources)
                .await
            {
                Ok(handle) => {
                    info!(
                        chunk = chunk.chunk_index,
                        job_id = %handle.job_id,
                        status = %handle.status,
                        items = chunk.len(),
                        output_dir = %handle.output_dir.display(),
                        "Chunk submitted"
                    );
                    handles.push(handle);
                }
                Err(e) => {
                    error!(
                        chunk = chunk.chunk_index,
                        items = chunk.len(),
                        error = %e,
                        "Chunk submission failed; continuing with remaining chunks"
                    );
                    rejected.push(RejectedChunk {
                        chunk_index: chunk.chunk_index,
                        indices: chunk.indices,
                        error: e.to_string(),
                    });
                }
            }
        }

        DispatchReport {
            run_id,
            handles,
            rejected,
        }
    }
}
