//! Dispatch manifests: which job directory holds which chunk.
//!
//! One manifest is written per dispatch under `<output_dir>/dispatches/`.
//! Aggregation reads them to learn about job directories that should exist;
//! a chunk whose job never ran then shows up as a missing directory instead
//! of silently disappearing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use super::dispatcher::{DispatchReport, RejectedChunk};
use super::job::ChunkIndices;
use crate::artifact::write_atomic;
use crate::error::StorageError;
use crate::pipeline::OutputLayout;

/// One accepted chunk as recorded in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestChunk {
    pub chunk_index: usize,
    pub indices: ChunkIndices,
    pub job_id: String,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchManifest {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    /// Scheduler backend name.
    pub scheduler: String,
    /// Size of the annotation index at dispatch time.
    pub total_count: usize,
    pub chunks: Vec<ManifestChunk>,
    pub rejected: Vec<RejectedChunk>,
}

impl DispatchManifest {
    pub fn from_report(report: &DispatchReport, scheduler: &str, total_count: usize) -> Self {
        Self {
            run_id: report.run_id.clone(),
            created_at: Utc::now(),
            scheduler: scheduler.to_string(),
            total_count,
            chunks: report
                .handles
                .iter()
                .map(|h| ManifestChunk {
                    chunk_index: h.chunk.chunk_index,
                    indices: h.chunk.indices.clone(),
                    job_id: h.job_id.clone(),
                    output_dir: h.output_dir.clone(),
                })
                .collect(),
            rejected: report.rejected.clone(),
        }
    }

    pub fn path_in(layout: &OutputLayout, run_id: &str) -> PathBuf {
        layout.dispatches_dir().join(format!("{}.json", run_id))
    }

    /// Writes the manifest into the layout's dispatch directory.
    pub async fn save(&self, layout: &OutputLayout) -> Result<PathBuf, StorageError> {
        let path = Self::path_in(layout, &self.run_id);
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&path, &json).await?;
        Ok(path)
    }

    pub async fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Loads every manifest in `dir`, oldest first.
    ///
    /// A missing directory yields no manifests. Unreadable manifests are
    /// logged and skipped.
    pub async fn load_all(dir: &Path) -> Vec<Self> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut manifests = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to read dispatch directory");
                    break;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load(&path).await {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable dispatch manifest")
                }
            }
        }

        manifests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        manifests
    }

    /// Output directories of every accepted chunk.
    pub fn output_dirs(&self) -> impl Iterator<Item = &Path> {
        self.chunks.iter().map(|c| c.output_dir.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{ChunkSpec, JobHandle};
    use tempfile::TempDir;

    fn report() -> DispatchReport {
        DispatchReport {
            run_id: "run-a".to_string(),
            handles: vec![JobHandle::submitted(
                "4242",
                ChunkSpec::range(0, 0, 4),
                PathBuf::from("/out/jobs/4242"),
            )],
            rejected: vec![RejectedChunk {
                chunk_index: 1,
                indices: ChunkIndices::Range { start: 4, end: 7 },
                error: "sbatch: error: invalid partition".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_manifest_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let layout = OutputLayout::new(temp_dir.path());
        let manifest = DispatchManifest::from_report(&report(), "slurm", 10);

        let path = manifest.save(&layout).await.expect("save should succeed");
        assert_eq!(path, layout.dispatches_dir().join("run-a.json"));

        let loaded = DispatchManifest::load(&path).await.expect("load should succeed");
        assert_eq!(loaded, manifest);
        assert_eq!(
            loaded.output_dirs().collect::<Vec<_>>(),
            vec![Path::new("/out/jobs/4242")]
        );
    }

    #[tokio::test]
    async fn test_load_all_skips_corrupt() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let layout = OutputLayout::new(temp_dir.path());
        DispatchManifest::from_report(&report(), "slurm", 10)
            .save(&layout)
            .await
            .expect("save");
        std::fs::write(layout.dispatches_dir().join("broken.json"), b"{").expect("write");

        let manifests = DispatchManifest::load_all(&layout.dispatches_dir()).await;
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].run_id, "run-a");
    }

    #[tokio::test]
    async fn test_load_all_missing_dir() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let manifests = DispatchManifest::load_all(&temp_dir.path().join("nope")).await;
        assert!(manifests.is_empty());
    }
}
