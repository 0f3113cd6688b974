//! Reconstructs the full result set from scattered job directories.
//!
//! Aggregation only reads. It can run while jobs are still writing and can
//! be repeated as often as needed; each pass reflects every artifact that
//! had been committed when its directory was listed.

pub mod missing;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::artifact::{write_atomic, ArtifactStore, InferenceArtifact};
use crate::error::StorageError;
use crate::pipeline::OutputLayout;
use crate::scheduler::DispatchManifest;

pub use missing::{missing_indices, MissingReport};

/// Image identifier (`file_name`) to artifact, in identifier order.
pub type Collection = BTreeMap<String, InferenceArtifact>;

/// Result of one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct AggregateReport {
    pub collection: Collection,
    /// Directories that were listed successfully.
    pub dirs_scanned: usize,
    /// Directories that did not exist or could not be listed.
    pub missing_directories: Vec<PathBuf>,
    /// Artifact files that could not be read or parsed.
    pub corrupt_files: Vec<PathBuf>,
    /// Identifiers seen more than once; the later file won.
    pub duplicates: usize,
}

/// Counters printed after aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateSummary {
    pub entries: usize,
    pub dirs_scanned: usize,
    pub missing_directories: usize,
    pub corrupt_files: usize,
    pub duplicates: usize,
}

impl AggregateReport {
    pub fn summary(&self) -> AggregateSummary {
        AggregateSummary {
            entries: self.collection.len(),
            dirs_scanned: self.dirs_scanned,
            missing_directories: self.missing_directories.len(),
            corrupt_files: self.corrupt_files.len(),
            duplicates: self.duplicates,
        }
    }
}

/// Merges every artifact found under `job_dirs` into one collection.
///
/// Never fails. A directory that does not exist is skipped without a
/// warning, since a job that never started leaves none. A file that cannot
/// be parsed is logged and skipped. When the same identifier appears twice
/// the later one, in directory then file-name order, replaces the earlier
/// and the duplicate is logged.
pub async fn aggregate<P: AsRef<Path>>(job_dirs: &[P]) -> AggregateReport {
    let mut report = AggregateReport::default();

    for dir in job_dirs {
        let dir = dir.as_ref();
        let store = ArtifactStore::new(dir);

        let paths = match store.list().await {
            Ok(paths) => paths,
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Job directory absent; skipping");
                report.missing_directories.push(dir.to_path_buf());
                continue;
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to list job directory; skipping");
                report.missing_directories.push(dir.to_path_buf());
                continue;
            }
        };
        report.dirs_scanned += 1;

        for path in paths {
            let artifact = match ArtifactStore::load(&path).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable artifact");
                    report.corrupt_files.push(path);
                    continue;
                }
            };

            let identifier = artifact.identifier().to_string();
            if report.collection.insert(identifier.clone(), artifact).is_some() {
                report.duplicates += 1;
                warn!(
                    identifier = %identifier,
                    path = %path.display(),
                    "Duplicate artifact; keeping the later one"
                );
            }
        }
    }

    info!(
        entries = report.collection.len(),
        dirs_scanned = report.dirs_scanned,
        missing_dirs = report.missing_directories.len(),
        corrupt = report.corrupt_files.len(),
        duplicates = report.duplicates,
        "Aggregation pass finished"
    );
    report
}

/// Lists the job directories belonging to a run rooted at `layout`.
///
/// Returns the union of every directory under `jobs/` and every output
/// directory recorded in a dispatch manifest, sorted. Recorded directories
/// that were never created are included so they are reported as missing.
pub async fn discover_job_dirs(layout: &OutputLayout) -> Vec<PathBuf> {
    let mut dirs = BTreeSet::new();

    let jobs_root = layout.jobs_root();
    match fs::read_dir(&jobs_root).await {
        Ok(mut entries) => loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                        dirs.insert(entry.path());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %jobs_root.display(), error = %e, "Failed to read jobs directory");
                    break;
                }
            }
        },
        Err(e) => debug!(dir = %jobs_root.display(), error = %e, "No jobs directory"),
    }

    for manifest in DispatchManifest::load_all(&layout.dispatches_dir()).await {
        dirs.extend(manifest.output_dirs().map(Path::to_path_buf));
    }

    dirs.into_iter().collect()
}

/// Writes the consolidated collection as one pretty-printed JSON object.
pub async fn write_collection(path: &Path, collection: &Collection) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(collection)?;
    write_atomic(path, &json).await?;
    info!(path = %path.display(), entries = collection.len(), "Wrote consolidated collection");
    Ok(())
}

/// Reads a consolidated collection written by [`write_collection`].
pub async fn load_collection(path: &Path) -> Result<Collection, StorageError> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
