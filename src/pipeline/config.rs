//! Run configuration and on-disk layout.
//!
//! A run is rooted at one shared output directory:
//!
//! ```text
//! <output_dir>/
//!   jobs/<job_id>/<file_stem>.json   per-item artifacts, one directory per job
//!   chunks/<run_id>/chunk-NNNN.json  chunk assignments read by remote workers
//!   dispatches/<run_id>.json         chunk -> job directory manifests
//!   logs/<job_id>.out                scheduler stdout/stderr
//!   consolidated.json                aggregation output
//!   missing_indices.json             indices with no artifact after aggregation
//! ```

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Placeholder substituted with the scheduler job id at worker start-up.
pub const JOB_ID_PLACEHOLDER: &str = "%j";

/// Paths derived from the run's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parent of every job output directory.
    pub fn jobs_root(&self) -> PathBuf {
        self.root.join("jobs")
    }

    /// Output directory of one job.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_root().join(job_id)
    }

    /// Job directory template handed to remote workers.
    pub fn job_dir_template(&self) -> PathBuf {
        self.job_dir(JOB_ID_PLACEHOLDER)
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.root.join("chunks")
    }

    pub fn dispatches_dir(&self) -> PathBuf {
        self.root.join("dispatches")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn consolidated_path(&self) -> PathBuf {
        self.root.join("consolidated.json")
    }

    pub fn missing_report_path(&self) -> PathBuf {
        self.root.join("missing_indices.json")
    }
}

/// Inputs shared by the dispatcher and every chunk worker.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// COCO panoptic annotation file.
    pub annotation_path: PathBuf,
    /// Directory the annotation `file_name`s are relative to.
    pub image_root: PathBuf,
    /// Command line launching the segmentation model server.
    pub segmenter_command: String,
    /// Shared output directory for the run.
    pub output_dir: PathBuf,
    /// Emit a progress line every this many items inside a chunk.
    pub log_every: usize,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            annotation_path: PathBuf::from("annotations/panoptic_train2017.json"),
            image_root: PathBuf::from("train2017"),
            segmenter_command: "python -m sam_server".to_string(),
            output_dir: PathBuf::from("./sam-outputs"),
            log_every: 100,
        }
    }
}

impl ForgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_annotation_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.annotation_path = path.into();
        self
    }

    pub fn with_image_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_root = path.into();
        self
    }

    pub fn with_segmenter_command(mut self, command: impl Into<String>) -> Self {
        self.segmenter_command = command.into();
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    pub fn with_log_every(mut self, n: usize) -> Self {
        self.log_every = n;
        self
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(&self.output_dir)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.annotation_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "annotation_path cannot be empty".to_string(),
            ));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "output_dir cannot be empty".to_string(),
            ));
        }

        if self.segmenter_command.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "segmenter_command cannot be empty".to_string(),
            ));
        }

        if self.log_every == 0 {
            return Err(ConfigError::ValidationFailed(
                "log_every must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Substitutes the job id into a `--job-dir` template.
///
/// Templates without a placeholder are returned unchanged.
///
/// # Errors
///
/// Fails if the template contains the placeholder and no job id is known.
pub fn resolve_job_dir(template: &Path, job_id: Option<&str>) -> Result<PathBuf, ConfigError> {
    let raw = template.to_string_lossy();
    if !raw.contains(JOB_ID_PLACEHOLDER) {
        return Ok(template.to_path_buf());
    }

    match job_id {
        Some(id) if !id.trim().is_empty() => {
            Ok(PathBuf::from(raw.replace(JOB_ID_PLACEHOLDER, id.trim())))
        }
        _ => Err(ConfigError::InvalidValue {
            key: "job_dir".to_string(),
            message: format!(
                "'{}' contains {} but no scheduler job id is available",
                raw, JOB_ID_PLACEHOLDER
            ),
        }),
    }
}
