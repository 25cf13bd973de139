//! Error handling module for ReelStitch

use thiserror::Error;

use crate::domain::errors::{BuildError, MergeError, ProbeError, SourceError, StoreError};

/// Main error type for ReelStitch operations
#[derive(Error, Debug)]
pub enum ComposerError {
    /// Invalid time, duration or progress argument
    #[error("Invalid time value: {value}. Expected seconds with up to 6 decimals")]
    InvalidTimeFormat { value: String },

    /// Configuration rejected by validation
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Another build already owns the project and could not be unwound
    #[error("Project '{project}' is busy")]
    ProjectBusy { project: String },

    /// Single segment probe error
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Aggregate build error
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Merge primitive error outside of a build
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Artifact storage error outside of a build
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Segment listing error
    #[error(transparent)]
    Source(#[from] SourceError),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Config file parse error
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Config serialization error
    #[error("Failed to serialize TOML config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for ReelStitch operations
pub type ComposerResult<T> = std::result::Result<T, ComposerError>;
