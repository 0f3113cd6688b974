//! Chunk worker: runs the inference step over one chunk of indices.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::progress::{ChunkProgress, ItemOutcome};
use crate::artifact::ArtifactStore;
use crate::error::StorageError;
use crate::inference::InferenceStep;
use crate::scheduler::ChunkSpec;

/// Summary of one chunk execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReport {
    pub chunk_index: usize,
    /// Artifacts newly committed by this run.
    pub written: usize,
    /// Indices whose artifact was already present and left untouched.
    pub skipped_existing: usize,
    /// Indices that failed and have no artifact.
    pub failed: Vec<usize>,
    pub duration: Duration,
}

impl ChunkReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Processes chunks sequentially into an explicit output directory.
#[derive(Clone)]
pub struct ChunkWorker {
    step: InferenceStep,
    log_every: usize,
}

impl ChunkWorker {
    pub fn new(step: InferenceStep) -> Self {
        Self {
            step,
            log_every: 100,
        }
    }

    pub fn with_log_every(mut self, n: usize) -> Self {
        self.log_every = n;
        self
    }

    /// Runs every index of `chunk`, committing one artifact per success into
    /// `output_dir`.
    ///
    /// Indices whose artifact already exists are skipped, so re-running an
    /// interrupted chunk resumes it. A failing item is logged and skipped;
    /// it never stops the rest of the chunk.
    ///
    /// # Errors
    ///
    /// Only if `output_dir` cannot be created.
    pub async fn process(
        &self,
        chunk: &ChunkSpec,
        output_dir: &Path,
    ) -> Result<ChunkReport, StorageError> {
        let store = ArtifactStore::new(output_dir);
        store.ensure_directory().await?;

        info!(
            chunk = chunk.chunk_index,
            items = chunk.len(),
            output_dir = %output_dir.display(),
            "Starting chunk"
        );

        let mut progress = ChunkProgress::new(chunk.chunk_index, chunk.len(), self.log_every);
        let mut failed = Vec::new();

        for index in chunk.indices.iter() {
            let outcome = self.process_item(&store, index).await;
            if outcome == ItemOutcome::Failed {
                failed.push(index);
            }
            progress.record(outcome);
        }

        let snapshot = progress.snapshot();
        let report = ChunkReport {
            chunk_index: chunk.chunk_index,
            written: snapshot.written,
            skipped_existing: snapshot.skipped_existing,
            failed,
            duration: snapshot.elapsed,
        };

        if report.is_clean() {
            info!(
                chunk = report.chunk_index,
                written = report.written,
                skipped = report.skipped_existing,
                "Chunk finished"
            );
        } else {
            warn!(
                chunk = report.chunk_index,
                written = report.written,
                skipped = report.skipped_existing,
                failed = report.failed.len(),
                "Chunk finished with failed items; their artifacts are absent"
            );
        }

        Ok(report)
    }

    async fn process_item(&self, store: &ArtifactStore, index: usize) -> ItemOutcome {
        let image = match self.step.index().image(index) {
            Ok(image) => image,
            Err(e) => {
                warn!(index, error = %e, "Skipping item");
                return ItemOutcome::Failed;
            }
        };

        if store.exists(image).await {
            debug!(index, file_name = %image.file_name, "Artifact already present");
            return ItemOutcome::AlreadyPresent;
        }

        let artifact = match self.step.run(index).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(index, file_name = %image.file_name, error = %e, "Inference failed; skipping item");
                return ItemOutcome::Failed;
            }
        };

        match store.save(&artifact).await {
            Ok(_) => ItemOutcome::Written,
            Err(e) => {
                warn!(index, file_name = %image.file_name, error = %e, "Failed to write artifact; skipping item");
                ItemOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{AnnotationFile, AnnotationIndex, BoundingBox};
    use crate::error::InferenceError;
    use crate::inference::{ProposedRegion, Segmenter};
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Counts calls; fails on images whose width is listed in `fail_widths`.
    struct CountingSegmenter {
        calls: AtomicUsize,
        fail_widths: Vec<u32>,
    }

    #[async_trait]
    impl Segmenter for CountingSegmenter {
        async fn segment(&self, image: &RgbImage) -> Result<Vec<ProposedRegion>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (w, h) = image.dimensions();
            if self.fail_widths.contains(&w) {
                return Err(InferenceError::Model(format!("refusing width {}", w)));
            }
            Ok(vec![ProposedRegion::new(BoundingBox::new(
                0.0, 0.0, w as f64, h as f64,
            ))])
        }
    }

    /// Builds `n` images `img{i}.png` of width `i + 1` and a matching index.
    fn fixture(n: usize) -> (TempDir, Arc<AnnotationIndex>) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut images = Vec::new();
        let mut annotations = Vec::new();
        for i in 0..n {
            let name = format!("img{}.png", i);
            RgbImage::new(i as u32 + 1, 1)
                .save(temp_dir.path().join(&name))
                .expect("save png");
            images.push(serde_json::json!({"id": i, "file_name": name}));
            annotations.push(serde_json::json!({
                "image_id": i,
                "segments_info": [{"category_id": 1, "bbox": [0, 0, 1, 1]}]
            }));
        }
        let file: AnnotationFile = serde_json::from_value(serde_json::json!({
            "images": images,
            "annotations": annotations,
            "categories": [{"id": 1, "name": "thing"}]
        }))
        .expect("valid annotation file");
        let index = Arc::new(AnnotationIndex::from_file(file).expect("valid index"));
        (temp_dir, index)
    }

    fn worker(
        images: &TempDir,
        index: Arc<AnnotationIndex>,
        segmenter: Arc<CountingSegmenter>,
    ) -> ChunkWorker {
        ChunkWorker::new(InferenceStep::new(index, images.path(), segmenter)).with_log_every(2)
    }

    #[tokio::test]
    async fn test_process_writes_one_artifact_per_index() {
        let (images, index) = fixture(4);
        let out = TempDir::new().expect("Failed to create temp dir");
        let segmenter = Arc::new(CountingSegmenter {
            calls: AtomicUsize::new(0),
            fail_widths: vec![],
        });

        let report = worker(&images, index, segmenter)
            .process(&ChunkSpec::range(0, 1, 4), out.path())
            .await
            .expect("process should succeed");

        assert_eq!(report.written, 3);
        assert!(report.is_clean());
        assert!(!out.path().join("img0.json").exists());
        for i in 1..4 {
            assert!(out.path().join(format!("img{}.json", i)).exists());
        }
    }

    #[tokio::test]
    async fn test_item_failure_does_not_abort_chunk() {
        let (images, index) = fixture(4);
        let out = TempDir::new().expect("Failed to create temp dir");
        // Index 1 has width 2.
        let segmenter = Arc::new(CountingSegmenter {
            calls: AtomicUsize::new(0),
            fail_widths: vec![2],
        });
        // Index 2's image file is unreadable.
        std::fs::remove_file(images.path().join("img2.png")).expect("remove");

        let report = worker(&images, index, segmenter.clone())
            .process(&ChunkSpec::range(0, 0, 4), out.path())
            .await
            .expect("process should succeed");

        assert_eq!(report.written, 2);
        assert_eq!(report.failed, vec![1, 2]);
        assert!(out.path().join("img0.json").exists());
        assert!(!out.path().join("img1.json").exists());
        assert!(!out.path().join("img2.json").exists());
        assert!(out.path().join("img3.json").exists());
        assert_eq!(segmenter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_out_of_range_index_is_item_failure() {
        let (images, index) = fixture(2);
        let out = TempDir::new().expect("Failed to create temp dir");
        let segmenter = Arc::new(CountingSegmenter {
            calls: AtomicUsize::new(0),
            fail_widths: vec![],
        });

        let report = worker(&images, index, segmenter)
            .process(&ChunkSpec::list(0, vec![0, 7, 1]), out.path())
            .await
            .expect("process should succeed");

        assert_eq!(report.written, 2);
        assert_eq!(report.failed, vec![7]);
    }

    #[tokio::test]
    async fn test_rerun_resumes_without_rewriting() {
        let (images, index) = fixture(4);
        let out = TempDir::new().expect("Failed to create temp dir");

        // First attempt: index 2 fails.
        let first = Arc::new(CountingSegmenter {
            calls: AtomicUsize::new(0),
            fail_widths: vec![3],
        });
        let report = worker(&images, index.clone(), first)
            .process(&ChunkSpec::range(0, 0, 4), out.path())
            .await
            .expect("first run");
        assert_eq!(report.failed, vec![2]);

        let before = std::fs::read(out.path().join("img0.json")).expect("read");
        let mtime_before = std::fs::metadata(out.path().join("img0.json"))
            .and_then(|m| m.modified())
            .expect("mtime");

        // Second attempt only runs the missing index.
        let second = Arc::new(CountingSegmenter {
            calls: AtomicUsize::new(0),
            fail_widths: vec![],
        });
        let report = worker(&images, index, second.clone())
            .process(&ChunkSpec::range(0, 0, 4), out.path())
            .await
            .expect("second run");

        assert_eq!(report.written, 1);
        assert_eq!(report.skipped_existing, 3);
        assert!(report.is_clean());
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert!(out.path().join("img2.json").exists());

        let after = std::fs::read(out.path().join("img0.json")).expect("read");
        let mtime_after = std::fs::metadata(out.path().join("img0.json"))
            .and_then(|m| m.modified())
            .expect("mtime");
        assert_eq!(before, after);
        assert_eq!(mtime_before, mtime_after);
    }

    #[tokio::test]
    async fn test_uncreatable_output_dir_is_fatal() {
        let (images, index) = fixture(1);
        let out = TempDir::new().expect("Failed to create temp dir");
        let blocker = out.path().join("file");
        std::fs::write(&blocker, b"x").expect("write");
        let segmenter = Arc::new(CountingSegmenter {
            calls: AtomicUsize::new(0),
            fail_widths: vec![],
        });

        let result = worker(&images, index, segmenter)
            .process(&ChunkSpec::range(0, 0, 1), &blocker.join("sub"))
            .await;
        assert!(matches!(
            result,
            Err(StorageError::DirectoryCreationFailed { .. })
        ));
    }
}
