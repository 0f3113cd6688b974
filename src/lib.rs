//! sam-forge: distributed segmentation inference and "where is X" dataset
//! construction over COCO panoptic annotations.
//!
//! The inference phase splits the annotation index into chunks, runs one
//! cluster job per chunk and writes one artifact file per image. The
//! collation phase merges those files and renders conversation records.

// Core modules
pub mod aggregate;
pub mod annotations;
pub mod artifact;
pub mod cli;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod scheduler;
pub mod template;

// Re-export commonly used error types
pub use error::{
    AnnotationError, ConfigError, DispatchError, InferenceError, SchedulerError, StorageError,
    TemplateError,
};
