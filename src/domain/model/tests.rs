// Unit tests for domain models

use super::*;

fn segment(id: &str, order: u32) -> Segment {
    Segment::new(id, order, format!("/clips/{}.mp4", id))
}

#[test]
fn test_normalize_order_sorts_and_renumbers() {
    let input = vec![segment("c", 40), segment("a", 3), segment("b", 17)];
    let normalized = normalize_order(&input);

    let ids: Vec<&str> = normalized.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    let orders: Vec<u32> = normalized.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[test]
fn test_normalize_order_duplicates_keep_input_position() {
    let input = vec![segment("x", 1), segment("y", 0), segment("z", 1)];
    let normalized = normalize_order(&input);

    let ids: Vec<&str> = normalized.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["y", "x", "z"]);
}

#[test]
fn test_normalize_order_indexed_keeps_input_position() {
    let input = vec![segment("c", 40), segment("a", 3), segment("b", 17)];
    let positions: Vec<usize> = normalize_order_indexed(&input)
        .into_iter()
        .map(|(position, _)| position)
        .collect();
    assert_eq!(positions, vec![1, 2, 0]);
}

#[test]
fn test_normalize_order_does_not_touch_input() {
    let input = vec![segment("b", 9), segment("a", 2)];
    let _ = normalize_order(&input);
    assert_eq!(input[0].order, 9);
}

#[test]
fn test_rotation_from_degrees() {
    assert_eq!(Rotation::from_degrees(0), Some(Rotation::Deg0));
    assert_eq!(Rotation::from_degrees(90), Some(Rotation::Deg90));
    assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
    assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
    assert_eq!(Rotation::from_degrees(45), None);
}

#[test]
fn test_display_dimensions_swap_on_quarter_turn() {
    let meta = MediaMetadata {
        duration: 1_000_000,
        width: 1920,
        height: 1080,
        rotation: Rotation::Deg90,
    };
    assert_eq!(meta.display_dimensions(), (1080, 1920));

    let upright = MediaMetadata {
        rotation: Rotation::Deg180,
        ..meta
    };
    assert_eq!(upright.display_dimensions(), (1920, 1080));
}

#[test]
fn test_time_range_end_and_contains() {
    let range = SegmentTimeRange {
        index: 0,
        segment_id: SegmentId::new("a"),
        start: 1000,
        duration: 950,
    };
    assert_eq!(range.end(), 1950);
    assert!(range.contains(1000));
    assert!(range.contains(1949));
    assert!(!range.contains(1950));
    assert!(!range.contains(999));
}

#[test]
fn test_merge_batch_chunking() {
    let segments: Vec<Segment> = (0..23).map(|i| segment(&format!("s{}", i), i)).collect();
    let batches = MergeBatch::chunk(&segments, 10);

    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![10, 10, 3]);
    assert_eq!(batches[2].index, 2);
    assert_eq!(batches[2].segments[0].id.as_str(), "s20");
}

#[test]
fn test_merge_batch_zero_size_treated_as_one() {
    let segments = vec![segment("a", 0), segment("b", 1)];
    assert_eq!(MergeBatch::chunk(&segments, 0).len(), 2);
}

#[test]
fn test_probe_result_failure_reason() {
    let failed = ProbeResult::Failed(ProbeError::NotFound {
        reference: "/missing.mp4".to_string(),
    });
    let reason = failed.failure_reason().unwrap();
    assert!(reason.starts_with("not_found"));

    let skipped = ProbeResult::Skipped {
        reason: SkipReason::EmptyReference,
    };
    assert_eq!(skipped.duration(), None);
    assert!(skipped.failure_reason().unwrap().contains("empty content reference"));
}

#[test]
fn test_strategy_display() {
    assert_eq!(MergeStrategy::Direct.to_string(), "direct");
    assert_eq!(
        MergeStrategy::Batched { batch_size: 10 }.to_string(),
        "batched(B=10)"
    );
    assert_eq!(
        MergeStrategy::Hierarchical { leaf_batch_size: 5 }.name(),
        "hierarchical"
    );
}
