//! ReelStitch Segment Composition Library
//!
//! Composes ordered short video segments into one artifact while keeping a
//! drift-free, gapless time-range table, bounding the resources a build may
//! hold, and mapping playback positions back to segments.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod planner;
pub mod playback;
pub mod ports;
pub mod probe;
pub mod utils;

// Re-export commonly used types
pub use domain::errors::{BuildError, MergeError, ProbeError, StoreError, TimelineAnomaly};
pub use domain::model::{
    Composition, CompositionArtifact, MergeStrategy, ProbeResult, Segment, SegmentTimeRange, Tick,
    TimeRangeTable,
};
pub use domain::rules::TimeRangeCalculator;
pub use engine::{BuilderConfig, CompositionBuilder, ProgressCallback};
pub use error::{ComposerError, ComposerResult};
pub use playback::PlaybackPositionSync;
pub use probe::DurationProbe;
pub use utils::ResourceBudgetManager;
