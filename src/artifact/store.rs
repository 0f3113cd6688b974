//! File-backed storage for inference artifacts.
//!
//! Each job owns one directory. Artifacts are stored as pretty-printed JSON
//! named `<file_stem>.json`. Writes go to a hidden temporary file in the same
//! directory and are renamed into place only after the data is synced, so a
//! reader observes either no file or the complete artifact.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use super::InferenceArtifact;
use crate::annotations::ImageRecord;
use crate::error::StorageError;

/// Extension every committed artifact carries.
pub const ARTIFACT_EXTENSION: &str = "json";

/// Extension used for in-flight writes; never read back.
const TEMP_EXTENSION: &str = "tmp";

/// Artifact storage rooted at a single job output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store for `dir`. The directory is not touched until
    /// [`ArtifactStore::ensure_directory`] or the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the job output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the output directory (and parents) if it does not exist.
    pub async fn ensure_directory(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::DirectoryCreationFailed {
                path: self.dir.clone(),
                source,
            })
    }

    /// Path at which the artifact for `image` is stored.
    pub fn artifact_path(&self, image: &ImageRecord) -> PathBuf {
        self.dir
            .join(format!("{}.{}", image.file_stem(), ARTIFACT_EXTENSION))
    }

    /// Whether a committed artifact for `image` is already present.
    pub async fn exists(&self, image: &ImageRecord) -> bool {
        fs::try_exists(self.artifact_path(image))
            .await
            .unwrap_or(false)
    }

    /// Serializes and atomically commits `artifact`, returning its path.
    pub async fn save(&self, artifact: &InferenceArtifact) -> Result<PathBuf, StorageError> {
        let path = self.artifact_path(&artifact.image_metadata);
        let json = serde_json::to_vec_pretty(artifact)?;
        write_atomic(&path, &json).await?;
        debug!(path = %path.display(), bytes = json.len(), "Committed artifact");
        Ok(path)
    }

    /// Lists committed artifact files in this directory, sorted by name.
    ///
    /// Temporary files left behind by interrupted writes are excluded.
    pub async fn list(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            paths.push(path);
        }

        paths.sort();
        Ok(paths)
    }

    /// Counts committed artifacts in this directory.
    pub async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.list().await?.len())
    }

    /// Reads and parses one artifact file.
    pub async fn load(path: &Path) -> Result<InferenceArtifact, StorageError> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Writes `bytes` to `path` via a synced temporary sibling and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::InvalidFileName(path.display().to_string()))?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| StorageError::InvalidFileName(path.display().to_string()))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|source| StorageError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source,
        })?;

    let tmp = parent.join(format!(
        ".{}.{}.{}",
        file_name,
        Uuid::new_v4().simple(),
        TEMP_EXTENSION
    ));

    let result = async {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp)
            .await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp).await;
        return Err(StorageError::Io(e));
    }
    Ok(())
}
