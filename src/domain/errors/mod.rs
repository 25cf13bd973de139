// Domain errors - Error types for the domain layer

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::model::Tick;

/// Failure classification for a single segment probe.
///
/// Probes never retry; the kind says where the failure happened.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeError {
    /// Reference missing or unreadable at open time
    #[error("segment not found: {reference}")]
    NotFound { reference: String },

    /// I/O or codec failure while reading metadata
    #[error("segment unreadable: {reference}: {message}")]
    Unreadable { reference: String, message: String },

    /// Duration or dimensions non-positive or absent
    #[error("invalid metadata for {reference}: {detail}")]
    InvalidMetadata { reference: String, detail: String },
}

impl ProbeError {
    /// Short machine-friendly kind name, used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::NotFound { .. } => "not_found",
            ProbeError::Unreadable { .. } => "unreadable",
            ProbeError::InvalidMetadata { .. } => "invalid_metadata",
        }
    }
}

/// Raised by a merge primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("merge tool failed: {0}")]
    Tool(String),

    #[error("merge I/O failure: {0}")]
    Io(String),

    #[error("merge input rejected: {0}")]
    InvalidInput(String),
}

/// Raised by the temp-artifact storage primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("failed to create artifact '{label}': {message}")]
    Create { label: String, message: String },

    #[error("failed to delete artifact {location}: {message}")]
    Delete { location: String, message: String },
}

/// Failure to list a project's segments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("segment source failed for project '{project}': {message}")]
pub struct SourceError {
    pub project: String,
    pub message: String,
}

/// Warning attached to a build that dropped more than half of its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialBuildWarning {
    pub skipped: usize,
    pub total: usize,
}

impl fmt::Display for PartialBuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} segments were dropped from the composition",
            self.skipped, self.total
        )
    }
}

/// Aggregate build outcome errors.
///
/// Per-segment failures never surface here; they are recovered inside the
/// builder and reported through the build report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Every input segment was skipped or failed probing
    #[error("no valid segments: {skipped} of {total} segments could not be used")]
    NoValidSegments { skipped: usize, total: usize },

    /// Only produced by `Composition::into_strict`
    #[error("partial build: {0}")]
    PartialBuildWarning(PartialBuildWarning),

    /// Cooperative cancellation; not retryable
    #[error("build cancelled")]
    Cancelled,

    /// The merge or storage primitive failed on an aggregate step
    #[error("merge primitive failed during {stage}: {message}")]
    MergePrimitiveFailed { stage: String, message: String },
}

impl BuildError {
    pub(crate) fn merge_failed(stage: impl Into<String>, err: impl fmt::Display) -> Self {
        BuildError::MergePrimitiveFailed {
            stage: stage.into(),
            message: err.to_string(),
        }
    }

    /// Whether the host should block playback for this outcome
    pub fn blocks_playback(&self) -> bool {
        !matches!(self, BuildError::PartialBuildWarning(_))
    }
}

/// Non-blocking timeline irregularity detected during or after a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineAnomaly {
    /// Void between `range[after_index]` and the next range
    Gap { after_index: usize, gap: Tick },
    /// Next range starts before `range[after_index]` ends
    Overlap { after_index: usize, overlap: Tick },
    /// Merge primitive reported a different total than the range table
    DurationMismatch { expected: Tick, reported: Tick },
}

impl fmt::Display for TimelineAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineAnomaly::Gap { after_index, gap } => {
                write!(f, "gap of {} ticks after range {}", gap, after_index)
            }
            TimelineAnomaly::Overlap {
                after_index,
                overlap,
            } => write!(f, "overlap of {} ticks after range {}", overlap, after_index),
            TimelineAnomaly::DurationMismatch { expected, reported } => write!(
                f,
                "artifact reports {} ticks, range table totals {}",
                reported, expected
            ),
        }
    }
}
