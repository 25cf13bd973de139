// Domain rules - Timeline arithmetic and consistency checks

use crate::domain::errors::TimelineAnomaly;
use crate::domain::model::*;

/// Turns probed durations into a gapless, drift-free range list.
///
/// Pure: no I/O, no logging, deterministic for equal input.
pub struct TimeRangeCalculator;

impl TimeRangeCalculator {
    /// Sequential scan with an integer running offset.
    ///
    /// Input must be in playback order. Non-positive durations cannot come
    /// from a successful probe and are excluded like failed segments; the
    /// surviving ranges are numbered `0..m-1` with no gap left behind.
    pub fn calculate<I>(durations: I) -> TimeRangeTable
    where
        I: IntoIterator<Item = (SegmentId, Tick)>,
    {
        let mut offset: Tick = 0;
        let mut ranges = Vec::new();

        for (segment_id, duration) in durations {
            if duration <= 0 {
                continue;
            }
            ranges.push(SegmentTimeRange {
                index: ranges.len(),
                segment_id,
                start: offset,
                duration,
            });
            offset = offset.saturating_add(duration);
        }

        TimeRangeTable {
            ranges,
            total: offset,
        }
    }

    /// Same as [`calculate`](Self::calculate), taking probe results directly.
    /// `Skipped` and `Failed` entries are excluded entirely.
    pub fn calculate_from_probes<'a, I>(probes: I) -> TimeRangeTable
    where
        I: IntoIterator<Item = (&'a SegmentId, &'a ProbeResult)>,
    {
        Self::calculate(
            probes
                .into_iter()
                .filter_map(|(id, result)| result.duration().map(|d| (id.clone(), d))),
        )
    }

    /// Compare adjacent ranges and report voids and overlaps.
    ///
    /// A list produced by `calculate` never yields anomalies; this guards
    /// lists that crossed a collaborator boundary.
    pub fn detect_anomalies(ranges: &[SegmentTimeRange]) -> Vec<TimelineAnomaly> {
        ranges
            .windows(2)
            .filter_map(|pair| {
                let (current, next) = (&pair[0], &pair[1]);
                let delta = next.start - current.end();
                if delta > 0 {
                    Some(TimelineAnomaly::Gap {
                        after_index: current.index,
                        gap: delta,
                    })
                } else if delta < 0 {
                    Some(TimelineAnomaly::Overlap {
                        after_index: current.index,
                        overlap: -delta,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Check a duration reported by the merge primitive against the table
    pub fn check_reported_duration(
        table: &TimeRangeTable,
        reported: Option<Tick>,
    ) -> Option<TimelineAnomaly> {
        match reported {
            Some(reported) if reported != table.total => Some(TimelineAnomaly::DurationMismatch {
                expected: table.total,
                reported,
            }),
            _ => None,
        }
    }

    /// Whether a range list satisfies the gapless invariant from tick zero
    pub fn is_gapless(ranges: &[SegmentTimeRange]) -> bool {
        match ranges.first() {
            None => true,
            Some(first) => first.start == 0 && ranges.windows(2).all(|p| p[0].end() == p[1].start),
        }
    }
}

#[cfg(test)]
mod tests;
