// Domain models - Core types and data structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::domain::errors::{BuildError, PartialBuildWarning, ProbeError, TimelineAnomaly};

/// Integer timeline unit. One tick is one microsecond.
pub type Tick = i64;

pub const TICKS_PER_SECOND: Tick = 1_000_000;
pub const TICKS_PER_MILLISECOND: Tick = 1_000;

/// Opaque identifier assigned to a segment by its source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque reference to segment content (a path or URI, interpreted by adapters only)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A short video unit with a declared playback order.
///
/// Owned by the caller; the composition core only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub order: u32,
    pub content: ContentRef,
    /// Duration declared by the segment source, if any
    pub duration_hint: Option<Tick>,
    /// Absent until probed
    pub probed_duration: Option<Tick>,
}

impl Segment {
    pub fn new(id: impl Into<String>, order: u32, content: impl Into<String>) -> Self {
        Self {
            id: SegmentId::new(id),
            order,
            content: ContentRef::new(content),
            duration_hint: None,
            probed_duration: None,
        }
    }

    pub fn with_duration_hint(mut self, hint: Tick) -> Self {
        self.duration_hint = Some(hint);
        self
    }

    pub fn with_probed_duration(mut self, duration: Tick) -> Self {
        self.probed_duration = Some(duration);
        self
    }
}

/// Sort segments by declared order and renumber them densely `0..n-1`.
///
/// Duplicate orders keep their input position relative to each other.
pub fn normalize_order(segments: &[Segment]) -> Vec<Segment> {
    normalize_order_indexed(segments)
        .into_iter()
        .map(|(_, segment)| segment)
        .collect()
}

/// Like [`normalize_order`], keeping each segment's position in the input
pub fn normalize_order_indexed(segments: &[Segment]) -> Vec<(usize, Segment)> {
    let mut indexed: Vec<(usize, &Segment)> = segments.iter().enumerate().collect();
    indexed.sort_by_key(|(position, segment)| (segment.order, *position));

    for pair in indexed.windows(2) {
        if pair[0].1.order == pair[1].1.order {
            warn!(
                order = pair[0].1.order,
                first = %pair[0].1.id,
                second = %pair[1].1.id,
                "duplicate segment order, keeping input position"
            );
        }
    }

    indexed
        .into_iter()
        .enumerate()
        .map(|(dense, (position, segment))| {
            let mut segment = segment.clone();
            segment.order = dense as u32;
            (position, segment)
        })
        .collect()
}

/// Display rotation of a segment, in clockwise degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalize raw degrees (negative values and multiples of 360 allowed)
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Whether width and height swap on display
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Validated probe output. `duration` is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration: Tick,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
}

impl MediaMetadata {
    /// Dimensions as shown to the viewer, after rotation
    pub fn display_dimensions(&self) -> (u32, u32) {
        if self.rotation.is_quarter_turn() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// Unvalidated values as reported by a probing primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawMetadata {
    pub duration: Option<Tick>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub rotation: Option<i32>,
}

/// Why a segment was not probed at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyReference,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyReference => write!(f, "empty content reference"),
            SkipReason::Cancelled => write!(f, "probe cancelled"),
        }
    }
}

/// Outcome of probing one segment. Consumed immediately, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Success(MediaMetadata),
    Skipped { reason: SkipReason },
    Failed(ProbeError),
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeResult::Success(_))
    }

    pub fn duration(&self) -> Option<Tick> {
        match self {
            ProbeResult::Success(meta) => Some(meta.duration),
            _ => None,
        }
    }

    /// Human readable reason for a non-successful probe
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            ProbeResult::Success(_) => None,
            ProbeResult::Skipped { reason } => Some(format!("skipped: {}", reason)),
            ProbeResult::Failed(err) => Some(format!("{}: {}", err.kind(), err)),
        }
    }
}

/// One segment's slot on the composed timeline. `end = start + duration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentTimeRange {
    /// Position among included segments, `0..m-1`
    pub index: usize,
    /// Identifier of the source segment
    pub segment_id: SegmentId,
    pub start: Tick,
    pub duration: Tick,
}

impl SegmentTimeRange {
    pub fn end(&self) -> Tick {
        self.start + self.duration
    }

    /// Half-open containment: `start <= tick < end`
    pub fn contains(&self, tick: Tick) -> bool {
        self.start <= tick && tick < self.end()
    }
}

/// Sorted, gapless range list plus its total duration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRangeTable {
    pub ranges: Vec<SegmentTimeRange>,
    pub total: Tick,
}

impl TimeRangeTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn as_slice(&self) -> &[SegmentTimeRange] {
        &self.ranges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SegmentTimeRange> {
        self.ranges.iter()
    }
}

/// Identifier of an artifact created through the storage primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub u64);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "artifact#{}", self.0)
    }
}

/// Whether an artifact is a batch/level output or the composition result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    Intermediate,
    Final,
}

/// Storage-level handle to an artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub id: ArtifactId,
    pub location: String,
    pub role: ArtifactRole,
}

/// Concrete form of a composed artifact. Owned by the merge collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRepresentation {
    /// Reference to the ordered sources, resolved at playback time
    Lazy,
    /// Written out as a playable/exportable file
    Materialized,
}

/// The merged result of an ordered segment sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionArtifact {
    pub handle: ArtifactHandle,
    pub representation: ArtifactRepresentation,
    pub time_ranges: Arc<TimeRangeTable>,
    /// Duration as reported by the merge primitive, when it reports one
    pub reported_duration: Option<Tick>,
}

impl CompositionArtifact {
    pub fn time_ranges(&self) -> &TimeRangeTable {
        &self.time_ranges
    }

    pub fn total_duration(&self) -> Tick {
        self.time_ranges.total
    }

    pub fn segment_count(&self) -> usize {
        self.time_ranges.len()
    }

    pub fn is_lazy(&self) -> bool {
        self.representation == ArtifactRepresentation::Lazy
    }
}

/// An ordered, bounded-size subset of segments merged together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeBatch {
    pub index: usize,
    pub segments: Vec<Segment>,
}

impl MergeBatch {
    /// Chunk an ordered list into batches of at most `size` segments
    pub fn chunk(segments: &[Segment], size: usize) -> Vec<MergeBatch> {
        segments
            .chunks(size.max(1))
            .enumerate()
            .map(|(index, chunk)| MergeBatch {
                index,
                segments: chunk.to_vec(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Merge strategy tier, selected by segment count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Probe everything, merge once
    Direct,
    /// Fixed-size batches, one final merge over the batch outputs
    Batched { batch_size: usize },
    /// Small leaf batches, then binary pairwise reduction
    Hierarchical { leaf_batch_size: usize },
}

impl MergeStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            MergeStrategy::Direct => "direct",
            MergeStrategy::Batched { .. } => "batched",
            MergeStrategy::Hierarchical { .. } => "hierarchical",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Direct => write!(f, "direct"),
            MergeStrategy::Batched { batch_size } => write!(f, "batched(B={})", batch_size),
            MergeStrategy::Hierarchical { leaf_batch_size } => {
                write!(f, "hierarchical(leaf={})", leaf_batch_size)
            }
        }
    }
}

/// A segment dropped from the composition, with its position in the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSegment {
    pub original_index: usize,
    pub segment_id: SegmentId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildStatus {
    Complete,
    Partial { warning: PartialBuildWarning },
}

/// What happened during a build, besides the artifact itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub strategy: MergeStrategy,
    pub input_count: usize,
    pub included_count: usize,
    pub skipped: Vec<SkippedSegment>,
    pub status: BuildStatus,
    pub anomalies: Vec<TimelineAnomaly>,
    pub peak_live_intermediates: usize,
    pub reclaim_cycles: usize,
}

impl BuildReport {
    pub fn is_partial(&self) -> bool {
        matches!(self.status, BuildStatus::Partial { .. })
    }
}

/// Successful (possibly partial) build result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    pub artifact: CompositionArtifact,
    pub report: BuildReport,
}

impl Composition {
    /// Treat a partial build as an error, for hosts that refuse dropped segments
    pub fn into_strict(self) -> Result<CompositionArtifact, BuildError> {
        match self.report.status {
            BuildStatus::Complete => Ok(self.artifact),
            BuildStatus::Partial { warning } => Err(BuildError::PartialBuildWarning(warning)),
        }
    }
}

#[cfg(test)]
mod tests;
