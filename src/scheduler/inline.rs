//! In-process scheduler for `--partition local`.

use async_trait::async_trait;
use tracing::info;

use super::job::{ChunkSpec, JobHandle};
use super::resources::ResourceSpec;
use super::JobScheduler;
use crate::error::SchedulerError;
use crate::pipeline::{ChunkWorker, OutputLayout};

/// Runs each chunk synchronously on the calling task.
///
/// Job ids are `local-NNNN` by chunk index, so re-running a local dispatch
/// reuses the same job directories and resumes where it stopped.
pub struct InlineScheduler {
    worker: ChunkWorker,
    layout: OutputLayout,
}

impl InlineScheduler {
    pub fn new(worker: ChunkWorker, layout: OutputLayout) -> Self {
        Self { worker, layout }
    }

    pub fn job_id(chunk: &ChunkSpec) -> String {
        format!("local-{:04}", chunk.chunk_index)
    }
}

#[async_trait]
impl JobScheduler for InlineScheduler {
    fn name(&self) -> &str {
        "local"
    }

    async fn submit(
        &self,
        run_id: &str,
        chunk: &ChunkSpec,
        _resources: &ResourceSpec,
    ) -> Result<JobHandle, SchedulerError> {
        let job_id = Self::job_id(chunk);
        let output_dir = self.layout.job_dir(&job_id);
        info!(run_id, job_id = %job_id, items = chunk.len(), "Running chunk in-process");

        let report = self.worker.process(chunk, &output_dir).await?;
        Ok(JobHandle::completed(job_id, chunk.clone(), output_dir, report))
    }
}
