// Unit tests for timeline rules

use super::*;
use crate::domain::errors::ProbeError;

fn ids(n: usize) -> Vec<SegmentId> {
    (0..n).map(|i| SegmentId::new(format!("seg-{}", i))).collect()
}

fn pairs(durations: &[Tick]) -> Vec<(SegmentId, Tick)> {
    ids(durations.len()).into_iter().zip(durations.iter().copied()).collect()
}

fn bounds(table: &TimeRangeTable) -> Vec<(Tick, Tick)> {
    table.iter().map(|r| (r.start, r.end())).collect()
}

#[test]
fn test_three_uneven_segments() {
    let table = TimeRangeCalculator::calculate(pairs(&[1000, 950, 1020]));

    assert_eq!(bounds(&table), vec![(0, 1000), (1000, 1950), (1950, 2970)]);
    assert_eq!(table.total, 2970);
}

#[test]
fn test_gapless_and_total_for_many_durations() {
    let durations: Vec<Tick> = (0..137).map(|i| 900 + (i * 37) % 250).collect();
    let table = TimeRangeCalculator::calculate(pairs(&durations));

    assert_eq!(table.ranges[0].start, 0);
    for pair in table.ranges.windows(2) {
        assert_eq!(pair[0].end(), pair[1].start);
    }
    assert_eq!(table.total, durations.iter().sum::<Tick>());
    assert!(TimeRangeCalculator::is_gapless(table.as_slice()));
}

#[test]
fn test_empty_input() {
    let table = TimeRangeCalculator::calculate(Vec::new());
    assert!(table.is_empty());
    assert_eq!(table.total, 0);
}

#[test]
fn test_non_positive_durations_are_excluded() {
    let table = TimeRangeCalculator::calculate(pairs(&[1000, 0, -5, 1000]));

    assert_eq!(table.len(), 2);
    assert_eq!(table.ranges[1].index, 1);
    assert_eq!(table.ranges[1].segment_id.as_str(), "seg-3");
    assert_eq!(bounds(&table), vec![(0, 1000), (1000, 2000)]);
}

#[test]
fn test_failed_probe_is_excluded_without_gap() {
    let ids = ids(5);
    let meta = |d| {
        ProbeResult::Success(MediaMetadata {
            duration: d,
            width: 1080,
            height: 1920,
            rotation: Rotation::Deg0,
        })
    };
    let results = vec![
        meta(1000),
        meta(1000),
        ProbeResult::Failed(ProbeError::Unreadable {
            reference: "seg-2".into(),
            message: "truncated moov".into(),
        }),
        meta(1000),
        meta(1000),
    ];

    let table = TimeRangeCalculator::calculate_from_probes(ids.iter().zip(results.iter()));

    assert_eq!(table.len(), 4);
    assert_eq!(table.total, 4000);
    let kept: Vec<&str> = table.iter().map(|r| r.segment_id.as_str()).collect();
    assert_eq!(kept, vec!["seg-0", "seg-1", "seg-3", "seg-4"]);
    let indices: Vec<usize> = table.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[test]
fn test_skip_matches_absent_segment() {
    let with_failure = TimeRangeCalculator::calculate(vec![
        (SegmentId::new("a"), 800),
        (SegmentId::new("b"), -1),
        (SegmentId::new("c"), 1200),
    ]);
    let without = TimeRangeCalculator::calculate(vec![
        (SegmentId::new("a"), 800),
        (SegmentId::new("c"), 1200),
    ]);
    assert_eq!(with_failure, without);
}

#[test]
fn test_deterministic() {
    let a = TimeRangeCalculator::calculate(pairs(&[333, 334, 333]));
    let b = TimeRangeCalculator::calculate(pairs(&[333, 334, 333]));
    assert_eq!(a, b);
}

#[test]
fn test_detect_gap_and_overlap() {
    let ranges = vec![
        SegmentTimeRange {
            index: 0,
            segment_id: SegmentId::new("a"),
            start: 0,
            duration: 1000,
        },
        SegmentTimeRange {
            index: 1,
            segment_id: SegmentId::new("b"),
            start: 1040,
            duration: 1000,
        },
        SegmentTimeRange {
            index: 2,
            segment_id: SegmentId::new("c"),
            start: 2000,
            duration: 1000,
        },
    ];

    let anomalies = TimeRangeCalculator::detect_anomalies(&ranges);
    assert_eq!(
        anomalies,
        vec![
            TimelineAnomaly::Gap {
                after_index: 0,
                gap: 40
            },
            TimelineAnomaly::Overlap {
                after_index: 1,
                overlap: 40
            },
        ]
    );
    assert!(!TimeRangeCalculator::is_gapless(&ranges));
}

#[test]
fn test_reported_duration_mismatch() {
    let table = TimeRangeCalculator::calculate(pairs(&[1000, 1000]));
    assert_eq!(
        TimeRangeCalculator::check_reported_duration(&table, Some(2000)),
        None
    );
    assert_eq!(TimeRangeCalculator::check_reported_duration(&table, None), None);
    assert_eq!(
        TimeRangeCalculator::check_reported_duration(&table, Some(2033)),
        Some(TimelineAnomaly::DurationMismatch {
            expected: 2000,
            reported: 2033
        })
    );
}
