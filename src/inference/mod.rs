//! Per-item inference: decode one image, run the segmentation model, merge
//! its proposals with the ground truth.
//!
//! The model sits behind the [`Segmenter`] trait so the pipeline can be driven
//! by the real model server ([`ProcessSegmenter`]) or by an in-memory fake.

pub mod decode;
pub mod process;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::annotations::{AnnotationIndex, BoundingBox};
use crate::artifact::InferenceArtifact;
use crate::error::InferenceError;

pub use decode::load_rgb;
pub use process::ProcessSegmenter;

/// One region proposed by the segmentation model.
///
/// `segmentation` is the mask encoding (COCO RLE for SAM) and is passed
/// through untouched. Other model keys land in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedRegion {
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProposedRegion {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            segmentation: None,
            extra: Map::new(),
        }
    }

    pub fn with_segmentation(mut self, segmentation: Value) -> Self {
        self.segmentation = Some(segmentation);
        self
    }
}

/// A segmentation model: RGB image in, region proposals out.
#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn segment(&self, image: &RgbImage) -> Result<Vec<ProposedRegion>, InferenceError>;
}

/// Runs the segmenter for a single annotation index.
///
/// Scoped to one item: errors are returned to the caller, never retried or
/// swallowed here.
#[derive(Clone)]
pub struct InferenceStep {
    index: Arc<AnnotationIndex>,
    image_root: PathBuf,
    segmenter: Arc<dyn Segmenter>,
}

impl InferenceStep {
    pub fn new(
        index: Arc<AnnotationIndex>,
        image_root: impl Into<PathBuf>,
        segmenter: Arc<dyn Segmenter>,
    ) -> Self {
        Self {
            index,
            image_root: image_root.into(),
            segmenter,
        }
    }

    pub fn index(&self) -> &AnnotationIndex {
        &self.index
    }

    pub fn image_root(&self) -> &Path {
        &self.image_root
    }

    /// Produces the artifact for `index`.
    ///
    /// # Errors
    ///
    /// `Annotation` if `index` is out of range, `ImageRead`/`ImageDecode` if
    /// the image cannot be loaded, `Model` if the segmenter fails.
    pub async fn run(&self, index: usize) -> Result<InferenceArtifact, InferenceError> {
        let (image, annotation) = self.index.get(index)?;
        let rgb = load_rgb(&self.image_root.join(&image.file_name)).await?;
        let sam_outputs = self.segmenter.segment(&rgb).await?;

        Ok(InferenceArtifact {
            image_metadata: image.clone(),
            coco_annotations: annotation.clone(),
            sam_outputs,
        })
    }
}
