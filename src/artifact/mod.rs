//! Inference artifacts: the durable per-image result of the inference phase.

pub mod store;

use serde::{Deserialize, Serialize};

use crate::annotations::{CocoAnnotation, ImageRecord};
use crate::inference::ProposedRegion;

pub use store::{write_atomic, ArtifactStore, ARTIFACT_EXTENSION};

/// Ground truth and model proposals for one image.
///
/// Written exactly once per processed index and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceArtifact {
    pub image_metadata: ImageRecord,
    pub coco_annotations: CocoAnnotation,
    pub sam_outputs: Vec<ProposedRegion>,
}

impl InferenceArtifact {
    /// Identifier under which this artifact is consolidated.
    pub fn identifier(&self) -> &str {
        &self.image_metadata.file_name
    }
}
