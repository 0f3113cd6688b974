//! COCO panoptic annotation loading.
//!
//! The annotation file is parsed once per process into an [`AnnotationIndex`],
//! which resolves category names up front and then serves pure lookups by
//! integer position.

pub mod index;
pub mod types;

pub use index::AnnotationIndex;
pub use types::{
    AnnotationFile, BoundingBox, Category, CocoAnnotation, GroundTruthRegion, ImageRecord,
    RawAnnotation, SegmentInfo,
};
