//! Indices with no artifact after aggregation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use super::Collection;
use crate::annotations::AnnotationIndex;
use crate::artifact::write_atomic;
use crate::error::StorageError;

/// Which positions of the annotation index are absent from a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingReport {
    /// Size of the annotation index.
    pub expected: usize,
    /// Positions with an artifact.
    pub produced: usize,
    /// Positions without one, ascending.
    pub missing: Vec<usize>,
    /// `missing` folded into half-open `[start, end)` runs.
    pub missing_ranges: Vec<[usize; 2]>,
}

impl MissingReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub async fn save(&self, path: &Path) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json).await
    }

    pub async fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Compares `collection` against every position of `index`.
pub fn missing_indices(collection: &Collection, index: &AnnotationIndex) -> MissingReport {
    let missing: Vec<usize> = index
        .images()
        .enumerate()
        .filter(|(_, image)| !collection.contains_key(&image.file_name))
        .map(|(i, _)| i)
        .collect();

    MissingReport {
        expected: index.len(),
        produced: index.len() - missing.len(),
        missing_ranges: fold_ranges(&missing),
        missing,
    }
}

fn fold_ranges(sorted: &[usize]) -> Vec<[usize; 2]> {
    let mut ranges: Vec<[usize; 2]> = Vec::new();
    for &i in sorted {
        match ranges.last_mut() {
            Some(last) if last[1] == i => last[1] = i + 1,
            _ => ranges.push([i, i + 1]),
        }
    }
    ranges
}
