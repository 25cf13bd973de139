//! Forward-scanning cursor and active segment tracking for playback polling

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::model::{SegmentId, SegmentTimeRange, Tick, TimeRangeTable};
use crate::playback::{segment_index_for_position, PlaybackPositionSync};

/// Ranges checked ahead of the current one before falling back to binary search
const FORWARD_SCAN: usize = 4;

/// Locates segments for a mostly non-decreasing position stream.
///
/// Steady playback stays in the current range or moves one ahead, which is
/// O(1). Seeks backwards or far ahead fall back to binary search. Results
/// always equal [`segment_index_for_position`].
#[derive(Debug, Clone, Default)]
pub struct PlaybackCursor {
    index: usize,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn locate(&mut self, ranges: &[SegmentTimeRange], position: Tick) -> usize {
        if ranges.is_empty() {
            self.index = 0;
            return 0;
        }
        if self.index >= ranges.len() {
            self.index = 0;
        }

        let found = (self.index..ranges.len().min(self.index + FORWARD_SCAN + 1))
            .find(|&i| ranges[i].contains(position))
            .unwrap_or_else(|| segment_index_for_position(ranges, position));
        self.index = found;
        found
    }
}

/// Reported when the active segment changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentChange {
    pub previous: Option<usize>,
    pub current: usize,
    pub segment_id: SegmentId,
    pub start: Tick,
}

/// Turns polled positions into segment change events.
///
/// Picks up a newly loaded composition on the next poll.
pub struct ActiveSegmentTracker {
    sync: Arc<PlaybackPositionSync>,
    table: Arc<TimeRangeTable>,
    cursor: PlaybackCursor,
    active: Option<usize>,
}

impl ActiveSegmentTracker {
    pub fn new(sync: Arc<PlaybackPositionSync>) -> Self {
        let table = sync.snapshot();
        Self {
            sync,
            table,
            cursor: PlaybackCursor::new(),
            active: None,
        }
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Locate `position`; `Some` only when the active segment changed
    pub fn poll(&mut self, position: Tick) -> Option<SegmentChange> {
        let latest = self.sync.snapshot();
        if !Arc::ptr_eq(&latest, &self.table) {
            debug!(segments = latest.len(), "composition reloaded");
            self.table = latest;
            self.cursor.reset();
            self.active = None;
        }

        if self.table.is_empty() {
            return None;
        }
        let current = self.cursor.locate(self.table.as_slice(), position);
        if self.active == Some(current) {
            return None;
        }

        let range = &self.table.ranges[current];
        let change = SegmentChange {
            previous: self.active,
            current,
            segment_id: range.segment_id.clone(),
            start: range.start,
        };
        self.active = Some(current);
        Some(change)
    }

    /// Poll `position` every `interval` until `cancel` fires
    pub async fn run(
        mut self,
        interval: Duration,
        position: impl Fn() -> Tick,
        mut on_change: impl FnMut(SegmentChange),
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(change) = self.poll(position()) {
                        on_change(change);
                    }
                }
            }
        }
    }
}
