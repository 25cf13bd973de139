//! Playback position to segment index mapping
//!
//! Every function here is pure and clamps instead of failing: positions
//! before the start map to the first segment, positions at or past the end
//! map to the last one, and an empty range list maps to index 0 / tick 0.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::domain::model::{SegmentTimeRange, Tick, TimeRangeTable};

pub mod cursor;

pub use cursor::{ActiveSegmentTracker, PlaybackCursor, SegmentChange};

const PPM: i128 = 1_000_000;

/// Index `i` with `range[i].start <= position < range[i].end`, clamped.
///
/// Binary search, O(log n).
pub fn segment_index_for_position(ranges: &[SegmentTimeRange], position: Tick) -> usize {
    let Some(last) = ranges.len().checked_sub(1) else {
        return 0;
    };
    if position < 0 {
        return 0;
    }
    ranges.partition_point(|r| r.end() <= position).min(last)
}

/// Start tick of segment `index`; indices past the end clamp to the last segment
pub fn position_for_segment(ranges: &[SegmentTimeRange], index: usize) -> Tick {
    match ranges.get(index).or_else(|| ranges.last()) {
        Some(range) => range.start,
        None => 0,
    }
}

/// Tick at fraction `progress` of the total duration.
///
/// `progress` is clamped to `[0, 1]` (NaN counts as 0) and converted to parts
/// per million before any tick arithmetic.
pub fn position_for_progress(ranges: &[SegmentTimeRange], progress: f64) -> Tick {
    let total = total_duration(ranges);
    let ppm = if progress.is_nan() {
        0
    } else {
        (progress.clamp(0.0, 1.0) * PPM as f64).round() as i128
    };
    (i128::from(total) * ppm / PPM) as Tick
}

/// Segment index at fraction `progress` of the timeline
pub fn segment_index_for_progress(ranges: &[SegmentTimeRange], progress: f64) -> usize {
    segment_index_for_position(ranges, position_for_progress(ranges, progress))
}

fn total_duration(ranges: &[SegmentTimeRange]) -> Tick {
    ranges.last().map_or(0, SegmentTimeRange::end)
}

/// Range list of the currently loaded composition.
///
/// Queries read an `Arc` snapshot, so a concurrent `load` never tears a
/// lookup; the list itself is never mutated in place.
#[derive(Debug, Default)]
pub struct PlaybackPositionSync {
    table: RwLock<Arc<TimeRangeTable>>,
}

impl PlaybackPositionSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: Arc<TimeRangeTable>) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Swap in a new range list, returning the previous one
    pub fn load(&self, table: Arc<TimeRangeTable>) -> Arc<TimeRangeTable> {
        std::mem::replace(&mut *self.table.write(), table)
    }

    pub fn clear(&self) {
        self.load(Arc::new(TimeRangeTable::empty()));
    }

    pub fn snapshot(&self) -> Arc<TimeRangeTable> {
        Arc::clone(&self.table.read())
    }

    pub fn total_duration(&self) -> Tick {
        self.snapshot().total
    }

    pub fn segment_index_for_position(&self, position: Tick) -> usize {
        segment_index_for_position(self.snapshot().as_slice(), position)
    }

    pub fn position_for_segment(&self, index: usize) -> Tick {
        position_for_segment(self.snapshot().as_slice(), index)
    }

    pub fn position_for_progress(&self, progress: f64) -> Tick {
        position_for_progress(self.snapshot().as_slice(), progress)
    }

    pub fn segment_index_for_progress(&self, progress: f64) -> usize {
        segment_index_for_progress(self.snapshot().as_slice(), progress)
    }

    /// The range active at `position`, if any composition is loaded
    pub fn segment_at(&self, position: Tick) -> Option<SegmentTimeRange> {
        let table = self.snapshot();
        let index = segment_index_for_position(table.as_slice(), position);
        table.ranges.get(index).cloned()
    }
}
