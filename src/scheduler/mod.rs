//! Chunk dispatch across cluster jobs.
//!
//! This module turns an index space into independent units of work and hands
//! each one to a job scheduler:
//!
//! - **partition**: balanced contiguous split of `[0, total)` into chunks
//! - **Dispatcher**: submits every chunk, isolating submission failures
//! - **JobScheduler**: the submission seam, with two backends
//!   - `SlurmScheduler`: renders a batch script and pipes it to `sbatch`
//!   - `InlineScheduler`: runs the chunk worker in-process (`--partition local`)
//! - **DispatchManifest**: durable record of chunk to job directory mapping
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!                 │  Dispatcher  │  partition(total, n)
//!                 └──────┬───────┘
//!                        │ submit(chunk, resources)
//!         ┌──────────────┼──────────────┐
//!         ▼              ▼              ▼
//!    ┌─────────┐    ┌─────────┐    ┌─────────┐
//!    │  job 1  │    │  job 2  │    │  job N  │   one process per chunk
//!    └────┬────┘    └────┬────┘    └────┬────┘
//!         ▼              ▼              ▼
//!    jobs/<id1>/     jobs/<id2>/     jobs/<idN>/     one artifact per item
//! ```
//!
//! Chunks share nothing but the read-only annotation file and the output
//! root. There is no ordering between jobs and no retry beyond what the
//! cluster scheduler itself provides.

pub mod dispatcher;
pub mod inline;
pub mod job;
pub mod manifest;
pub mod partition;
pub mod resources;
pub mod slurm;

use async_trait::async_trait;

use crate::error::SchedulerError;

pub use dispatcher::{DispatchReport, Dispatcher, RejectedChunk};
pub use inline::InlineScheduler;
pub use job::{ChunkIndices, ChunkSpec, JobHandle, JobStatus};
pub use manifest::{DispatchManifest, ManifestChunk};
pub use partition::{partition, split_indices};
pub use resources::{ResourceSpec, LOCAL_PARTITION};
pub use slurm::{SlurmScheduler, WorkerCommand};

/// Accepts one chunk plus a resource request and returns a handle.
///
/// Each call is independent. An error affects only the chunk it was
/// returned for.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Short backend name recorded in dispatch manifests.
    fn name(&self) -> &str;

    /// Submits `chunk` as part of dispatch `run_id`.
    async fn submit(
        &self,
        run_id: &str,
        chunk: &ChunkSpec,
        resources: &ResourceSpec,
    ) -> Result<JobHandle, SchedulerError>;
}
