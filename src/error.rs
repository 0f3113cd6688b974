//! Error types for sam-forge operations.
//!
//! Defines error types for all major subsystems:
//! - Annotation loading and lookup
//! - Per-item inference (image decoding, segmentation model)
//! - Artifact storage on the shared filesystem
//! - Job submission and chunk dispatch
//! - Conversation templating
//! - Configuration validation

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or querying the annotation index.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Annotation file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse annotation file '{path}': {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Annotation file has {images} images but {annotations} annotation entries")]
    LengthMismatch { images: usize, annotations: usize },

    #[error("Segment in '{file_name}' references unknown category id {category_id}")]
    UnknownCategory { file_name: String, category_id: u64 },

    #[error("Images '{first}' and '{second}' share the artifact name '{stem}'")]
    DuplicateStem {
        stem: String,
        first: String,
        second: String,
    },

    #[error("Index {index} out of range for annotation index of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Item-level errors raised by the inference step.
///
/// These never abort a chunk; the worker logs them and moves on.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Annotation lookup failed: {0}")]
    Annotation(#[from] AnnotationError),

    #[error("Failed to read image '{path}': {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image '{path}': {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Segmentation model failed: {0}")]
    Model(String),

    #[error("Image decode task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors that can occur during artifact storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to create output directory {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact file name: {0}")]
    InvalidFileName(String),
}

/// Errors returned by a job scheduler when a single submission fails.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler rejected submission of chunk {chunk}: {reason}")]
    Rejected { chunk: usize, reason: String },

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse job id from scheduler output: {0:?}")]
    UnparsableJobId(String),

    #[error("Failed to render job script: {0}")]
    Template(#[from] tera::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that prevent a dispatch from being planned at all.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Number of chunks must be at least 1")]
    ZeroChunks,

    #[error("Invalid resource specification: {0}")]
    InvalidResources(#[from] ConfigError),
}

/// Errors that can occur during conversation templating.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Tera template rendering error: {0}")]
    Tera(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}
