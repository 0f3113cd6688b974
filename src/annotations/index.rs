//! Random-access index over a COCO panoptic annotation file.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use super::types::{AnnotationFile, CocoAnnotation, GroundTruthRegion, ImageRecord};
use crate::error::AnnotationError;

/// Annotation file loaded once and held immutable for the whole run.
///
/// Position `i` in the index is the `i`-th entry of `images`, paired with the
/// `i`-th entry of `annotations`. Category names are resolved at load time, so
/// every lookup returns fully named ground-truth regions.
#[derive(Debug, Clone)]
pub struct AnnotationIndex {
    images: Vec<ImageRecord>,
    annotations: Vec<CocoAnnotation>,
    categories: HashMap<u64, String>,
}

impl AnnotationIndex {
    /// Loads and parses the annotation file at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, is not valid JSON of the expected shape,
    /// has misaligned `images`/`annotations` lists, names two images whose
    /// artifacts would collide, or references a category id that `categories`
    /// does not define.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnnotationError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AnnotationError::NotFound(path.to_path_buf())
            } else {
                AnnotationError::Io(e)
            }
        })?;

        let file: AnnotationFile =
            serde_json::from_slice(&bytes).map_err(|source| AnnotationError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let index = Self::from_file(file)?;
        info!(
            path = %path.display(),
            images = index.len(),
            categories = index.categories.len(),
            "Loaded annotation index"
        );
        Ok(index)
    }

    /// Builds an index from an already-parsed annotation file.
    pub fn from_file(file: AnnotationFile) -> Result<Self, AnnotationError> {
        if file.images.len() != file.annotations.len() {
            return Err(AnnotationError::LengthMismatch {
                images: file.images.len(),
                annotations: file.annotations.len(),
            });
        }

        let mut stems: HashMap<&str, &str> = HashMap::with_capacity(file.images.len());
        for image in &file.images {
            if let Some(first) = stems.insert(image.file_stem(), &image.file_name) {
                return Err(AnnotationError::DuplicateStem {
                    stem: image.file_stem().to_string(),
                    first: first.to_string(),
                    second: image.file_name.clone(),
                });
            }
        }

        let categories: HashMap<u64, String> = file
            .categories
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let mut annotations = Vec::with_capacity(file.annotations.len());
        for (image, raw) in file.images.iter().zip(file.annotations) {
            let mut segments_info = Vec::with_capacity(raw.segments_info.len());
            for segment in raw.segments_info {
                let category_name = categories
                    .get(&segment.category_id)
                    .cloned()
                    .ok_or_else(|| AnnotationError::UnknownCategory {
                        file_name: image.file_name.clone(),
                        category_id: segment.category_id,
                    })?;
                segments_info.push(GroundTruthRegion {
                    segment,
                    category_name,
                });
            }
            annotations.push(CocoAnnotation {
                segments_info,
                extra: raw.extra,
            });
        }

        Ok(Self {
            images: file.images,
            annotations,
            categories,
        })
    }

    /// Number of images in the index.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Returns the image record and named ground-truth regions at `index`.
    pub fn get(&self, index: usize) -> Result<(&ImageRecord, &CocoAnnotation), AnnotationError> {
        match (self.images.get(index), self.annotations.get(index)) {
            (Some(image), Some(annotation)) => Ok((image, annotation)),
            _ => Err(AnnotationError::OutOfRange {
                index,
                len: self.len(),
            }),
        }
    }

    /// Returns only the image record at `index`.
    pub fn image(&self, index: usize) -> Result<&ImageRecord, AnnotationError> {
        self.get(index).map(|(image, _)| image)
    }

    /// Looks up a category display name by id.
    pub fn category_name(&self, category_id: u64) -> Option<&str> {
        self.categories.get(&category_id).map(String::as_str)
    }

    /// Iterates over all image records in index order.
    pub fn images(&self) -> impl Iterator<Item = &ImageRecord> {
        self.images.iter()
    }
}
