//! COCO panoptic annotation types.
//!
//! Only the keys this crate reads are typed; every other key is carried in an
//! `extra` map so records round-trip into artifacts without loss.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Axis-aligned box `[x, y, width, height]` in COCO convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundingBox(pub [f64; 4]);

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self([x, y, width, height])
    }
}

impl fmt::Display for BoundingBox {
    /// Formats as `[x, y, w, h]`; integral coordinates are printed without a
    /// fractional part so panoptic boxes read `[5, 6, 7, 8]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if v.fract() == 0.0 && v.abs() < 1e15 {
                write!(f, "{}", *v as i64)?;
            } else {
                write!(f, "{}", v)?;
            }
        }
        write!(f, "]")
    }
}

/// Metadata for one image in the annotation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageRecord {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            id: None,
            file_name: file_name.into(),
            width: None,
            height: None,
            extra: Map::new(),
        }
    }

    /// File name without its extension, used to name the artifact file.
    pub fn file_stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }
}

/// One ground-truth segment as it appears in the annotation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub category_id: u64,
    pub bbox: BoundingBox,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A ground-truth segment with its category name attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRegion {
    #[serde(flatten)]
    pub segment: SegmentInfo,
    pub category_name: String,
}

impl GroundTruthRegion {
    pub fn bbox(&self) -> BoundingBox {
        self.segment.bbox
    }
}

/// Per-image annotation entry before category resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAnnotation {
    #[serde(default)]
    pub segments_info: Vec<SegmentInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-image annotation entry with every segment named.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub segments_info: Vec<GroundTruthRegion>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
}

/// Top-level layout of a COCO panoptic annotation file.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationFile {
    pub images: Vec<ImageRecord>,
    pub annotations: Vec<RawAnnotation>,
    pub categories: Vec<Category>,
}
