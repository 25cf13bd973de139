//! Integration tests for composition building against instrumented adapters

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reelstitch::adapters::in_memory::seed_segments;
use reelstitch::adapters::{InMemoryArtifactStore, InMemoryMerge, InMemoryProbe, InMemorySegmentSource};
use reelstitch::app::ComposeInteractor;
use reelstitch::domain::errors::TimelineAnomaly;
use reelstitch::domain::model::{ArtifactRole, MergeStrategy, Segment};
use reelstitch::engine::NoProgress;
use reelstitch::planner::{StrategyConfig, StrategyMode};
use reelstitch::ports::{ArtifactStorePort, MergePort, ProbePort, SegmentSource};
use reelstitch::utils::{BudgetConfig, HostCapability};
use reelstitch::*;
use tokio_util::sync::CancellationToken;

const GIB: u64 = 1024 * 1024 * 1024;

/// Test utilities for building against in-memory adapters
mod test_utils {
    use super::*;

    pub struct Harness {
        pub probe: Arc<InMemoryProbe>,
        pub store: Arc<InMemoryArtifactStore>,
        pub merge: Arc<InMemoryMerge>,
        pub budget: Arc<ResourceBudgetManager>,
        pub builder: Arc<CompositionBuilder>,
    }

    pub fn standard_host() -> HostCapability {
        HostCapability {
            cpu_count: 4,
            total_memory_bytes: Some(8 * GIB),
            available_memory_bytes: Some(2 * GIB),
            open_file_limit: Some(1024),
        }
    }

    pub fn test_budget() -> BudgetConfig {
        BudgetConfig {
            reclaim_pause_ms: 0,
            adaptive: false,
            ..BudgetConfig::default()
        }
    }

    pub fn harness_with(
        mode: StrategyMode,
        budget: BudgetConfig,
        probe: InMemoryProbe,
        store: InMemoryArtifactStore,
        configure_merge: impl FnOnce(InMemoryMerge) -> InMemoryMerge,
    ) -> Harness {
        let probe = Arc::new(probe);
        let store = Arc::new(store);
        let merge = Arc::new(configure_merge(InMemoryMerge::new(Arc::clone(&store))));
        let budget = Arc::new(ResourceBudgetManager::with_capability(budget, standard_host()));
        let builder = Arc::new(CompositionBuilder::new(
            Arc::clone(&probe) as Arc<dyn ProbePort>,
            Arc::clone(&merge) as Arc<dyn MergePort>,
            Arc::clone(&store) as Arc<dyn ArtifactStorePort>,
            Arc::clone(&budget),
            BuilderConfig {
                strategy: StrategyConfig { mode },
                ..BuilderConfig::default()
            },
        ));
        Harness {
            probe,
            store,
            merge,
            budget,
            builder,
        }
    }

    pub fn harness(mode: StrategyMode) -> Harness {
        harness_with(
            mode,
            test_budget(),
            InMemoryProbe::new(),
            InMemoryArtifactStore::new(),
            |merge| merge,
        )
    }

    pub fn spans(table: &TimeRangeTable) -> Vec<(Tick, Tick)> {
        table.iter().map(|r| (r.start, r.end())).collect()
    }

    pub async fn build(h: &Harness, segments: &[Segment]) -> Result<Composition, BuildError> {
        h.builder
            .build(segments, &NoProgress, &CancellationToken::new())
            .await
    }

    /// Nothing but the final artifact may be alive after a build
    pub fn assert_clean(h: &Harness) {
        assert_eq!(h.store.live_intermediates(), 0, "live intermediates");
        assert_eq!(h.probe.open_sessions(), 0, "open probe sessions");
        assert_eq!(h.budget.open_probes(), 0, "open probe leases");
        assert_eq!(h.budget.live_intermediates(), 0, "intermediate leases");
    }
}

use test_utils::*;

#[tokio::test]
async fn test_three_segments_are_laid_out_back_to_back() {
    let h = harness(StrategyMode::Auto);
    let segments = seed_segments(&h.probe, &[1000, 950, 1020], &[]);

    let composition = build(&h, &segments).await.unwrap();
    let table = composition.artifact.time_ranges();

    assert_eq!(spans(table), vec![(0, 1000), (1000, 1950), (1950, 2970)]);
    assert_eq!(table.total, 2970);
    assert_eq!(composition.report.strategy, MergeStrategy::Direct);
    assert!(composition.report.anomalies.is_empty());
    assert_eq!(h.merge.merge_calls(), 1);
    assert_clean(&h);
}

#[tokio::test]
async fn test_batched_build_matches_direct_build() {
    let batched = harness(StrategyMode::Auto);
    let segments = seed_segments(&batched.probe, &[1000; 23], &[]);

    assert_eq!(batched.builder.plan(23).batch_sizes, vec![10, 10, 3]);
    let composition = build(&batched, &segments).await.unwrap();
    assert_eq!(
        composition.report.strategy,
        MergeStrategy::Batched { batch_size: 10 }
    );
    assert_eq!(composition.artifact.total_duration(), 23_000);
    assert_eq!(batched.store.created(ArtifactRole::Intermediate), 3);
    assert_eq!(batched.merge.merge_calls(), 4);
    assert_clean(&batched);

    let direct = harness(StrategyMode::Direct);
    let same = seed_segments(&direct.probe, &[1000; 23], &[]);
    let reference = build(&direct, &same).await.unwrap();
    assert_eq!(composition.artifact.time_ranges, reference.artifact.time_ranges);
}

#[tokio::test]
async fn test_failed_segment_is_dropped_and_rest_close_ranks() {
    let h = harness(StrategyMode::Auto);
    let segments = seed_segments(&h.probe, &[1000; 5], &[2]);

    let composition = build(&h, &segments).await.unwrap();
    let table = composition.artifact.time_ranges();

    assert_eq!(spans(table), vec![(0, 1000), (1000, 2000), (2000, 3000), (3000, 4000)]);
    let ids: Vec<&str> = table.iter().map(|r| r.segment_id.as_str()).collect();
    assert_eq!(ids, vec!["seg-0000", "seg-0001", "seg-0003", "seg-0004"]);
    assert_eq!(composition.report.skipped.len(), 1);
    assert_eq!(composition.report.skipped[0].original_index, 2);
    assert!(!composition.report.is_partial());
    assert_clean(&h);
}

#[tokio::test]
async fn test_batch_size_never_changes_the_ranges() {
    let durations: Vec<Tick> = (0..37).map(|i| 900 + (i * 37) % 250).collect();
    let direct = harness(StrategyMode::Direct);
    let segments = seed_segments(&direct.probe, &durations, &[4, 19]);
    let reference = build(&direct, &segments).await.unwrap();

    for batch_size in [1, 5, 10, durations.len()] {
        for mode in [StrategyMode::Batched, StrategyMode::Hierarchical] {
            let budget = BudgetConfig {
                batch_size: Some(batch_size),
                leaf_batch_size: Some(batch_size),
                ..test_budget()
            };
            let h = harness_with(
                mode,
                budget,
                InMemoryProbe::new(),
                InMemoryArtifactStore::new(),
                |merge| merge,
            );
            let segments = seed_segments(&h.probe, &durations, &[4, 19]);
            let composition = build(&h, &segments).await.unwrap();

            assert_eq!(
                composition.artifact.time_ranges, reference.artifact.time_ranges,
                "{} with batch size {}",
                mode, batch_size
            );
            assert_eq!(composition.report.skipped, reference.report.skipped);
            assert_clean(&h);
        }
    }
}

#[tokio::test]
async fn test_repeated_builds_are_equal() {
    let h = harness(StrategyMode::Auto);
    let segments = seed_segments(&h.probe, &[1200, 800, 1000, 1000, 333], &[]);

    let first = build(&h, &segments).await.unwrap();
    let second = build(&h, &segments).await.unwrap();
    assert_eq!(first.artifact.time_ranges, second.artifact.time_ranges);
    assert_eq!(first.report, second.report);
}

#[tokio::test]
async fn test_unsorted_input_is_built_in_declared_order() {
    let h = harness(StrategyMode::Auto);
    let mut segments = seed_segments(&h.probe, &[100, 200, 300], &[]);
    segments.reverse();

    let composition = build(&h, &segments).await.unwrap();
    let table = composition.artifact.time_ranges();
    assert_eq!(table.ranges[0].segment_id.as_str(), "seg-0000");
    assert_eq!(spans(table), vec![(0, 100), (100, 300), (300, 600)]);
}

#[tokio::test]
async fn test_final_artifact_follows_range_order() {
    for mode in [
        StrategyMode::Direct,
        StrategyMode::Batched,
        StrategyMode::Hierarchical,
    ] {
        for count in [1usize, 2, 7, 23, 61, 137] {
            let h = harness(mode);
            let failing: Vec<usize> = (0..count).filter(|i| i % 7 == 3).collect();
            let mut segments = seed_segments(&h.probe, &vec![1000; count], &failing);
            segments.reverse();

            let composition = build(&h, &segments).await.unwrap();
            let expected: Vec<_> = composition
                .artifact
                .time_ranges()
                .iter()
                .map(|range| {
                    segments
                        .iter()
                        .find(|s| s.id == range.segment_id)
                        .map(|s| s.content.clone())
                        .unwrap()
                })
                .collect();
            let stored = h.store.get(composition.artifact.handle.id).unwrap();

            assert_eq!(stored.contents, expected, "{} with {} segments", mode, count);
            assert_eq!(expected.len(), count - failing.len());
            assert_clean(&h);
        }
    }
}

#[tokio::test]
async fn test_hierarchical_keeps_intermediates_logarithmic() {
    let h = harness(StrategyMode::Auto);
    let segments = seed_segments(&h.probe, &vec![1000; 200], &[]);

    let composition = build(&h, &segments).await.unwrap();
    assert_eq!(
        composition.report.strategy,
        MergeStrategy::Hierarchical { leaf_batch_size: 5 }
    );
    assert_eq!(composition.artifact.total_duration(), 200_000);
    // 40 leaves: one artifact per binary level plus the pair being merged
    assert!(h.store.peak_live_intermediates() <= 8);
    assert!(composition.report.peak_live_intermediates <= 8);
    assert!(composition.report.reclaim_cycles >= 4);
    assert_clean(&h);
}

#[tokio::test]
async fn test_progress_ends_with_total_exactly_once() {
    let h = harness(StrategyMode::Batched);
    let segments = seed_segments(&h.probe, &[1000; 12], &[7]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let progress = move |processed: usize, total: usize| sink.lock().push((processed, total));

    build_with_progress(&h, &segments, &progress).await;

    let calls = calls.lock();
    assert_eq!(calls.last(), Some(&(12, 12)));
    assert_eq!(calls.iter().filter(|c| **c == (12, 12)).count(), 1);
    assert!(calls.windows(2).all(|w| w[0].0 <= w[1].0));
}

async fn build_with_progress(
    h: &Harness,
    segments: &[Segment],
    progress: &dyn ProgressCallback,
) -> Composition {
    h.builder
        .build(segments, progress, &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_mostly_failed_build_is_partial() {
    let h = harness(StrategyMode::Auto);
    let segments = seed_segments(&h.probe, &[1000; 5], &[0, 1, 3]);

    let composition = build(&h, &segments).await.unwrap();
    assert!(composition.report.is_partial());
    assert_eq!(composition.artifact.total_duration(), 2000);

    match composition.into_strict() {
        Err(BuildError::PartialBuildWarning(warning)) => {
            assert_eq!((warning.skipped, warning.total), (3, 5));
        }
        other => panic!("expected partial warning, got {:?}", other),
    }
}

#[tokio::test]
async fn test_all_failed_is_no_valid_segments() {
    for mode in [StrategyMode::Direct, StrategyMode::Batched, StrategyMode::Hierarchical] {
        let h = harness(mode);
        let segments = seed_segments(&h.probe, &[1000; 3], &[0, 1, 2]);

        let err = build(&h, &segments).await.unwrap_err();
        assert_eq!(err, BuildError::NoValidSegments { skipped: 3, total: 3 });
        assert_eq!(h.store.live_count(), 0);
        assert_clean(&h);
    }
}

#[tokio::test]
async fn test_empty_reference_is_skipped() {
    let h = harness(StrategyMode::Auto);
    let mut segments = seed_segments(&h.probe, &[1000; 3], &[]);
    segments[1].content = reelstitch::domain::model::ContentRef::new("  ");

    let composition = build(&h, &segments).await.unwrap();
    assert_eq!(composition.artifact.segment_count(), 2);
    assert!(composition.report.skipped[0].reason.contains("empty"));
}

#[tokio::test]
async fn test_merge_failure_deletes_everything() {
    for fail_on in 1..=4 {
        let h = harness_with(
            StrategyMode::Batched,
            test_budget(),
            InMemoryProbe::new(),
            InMemoryArtifactStore::new(),
            |merge| merge.failing_on_call(fail_on),
        );
        let segments = seed_segments(&h.probe, &[1000; 23], &[]);

        let err = build(&h, &segments).await.unwrap_err();
        assert!(
            matches!(err, BuildError::MergePrimitiveFailed { .. }),
            "call {}: {:?}",
            fail_on,
            err
        );
        assert_eq!(h.store.live_count(), 0, "call {}", fail_on);
        assert_clean(&h);
    }
}

#[tokio::test]
async fn test_store_failure_is_merge_primitive_failure() {
    let h = harness_with(
        StrategyMode::Hierarchical,
        test_budget(),
        InMemoryProbe::new(),
        InMemoryArtifactStore::new().failing_after(3),
        |merge| merge,
    );
    let segments = seed_segments(&h.probe, &[1000; 30], &[]);

    let err = build(&h, &segments).await.unwrap_err();
    assert!(matches!(err, BuildError::MergePrimitiveFailed { .. }));
    assert_eq!(h.store.live_count(), 0);
}

#[tokio::test]
async fn test_reported_duration_mismatch_is_an_anomaly() {
    let h = harness_with(
        StrategyMode::Direct,
        test_budget(),
        InMemoryProbe::new(),
        InMemoryArtifactStore::new(),
        |merge| merge.with_reported_skew(40),
    );
    let segments = seed_segments(&h.probe, &[1000, 1000], &[]);

    let composition = build(&h, &segments).await.unwrap();
    assert_eq!(
        composition.report.anomalies,
        vec![TimelineAnomaly::DurationMismatch {
            expected: 2000,
            reported: 2040
        }]
    );
    assert!(composition.into_strict().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_at_any_point_leaves_nothing_behind() {
    for mode in [StrategyMode::Direct, StrategyMode::Batched, StrategyMode::Hierarchical] {
        for cancel_after_ms in [0u64, 5, 15, 35, 70, 120, 200, 320] {
            let h = harness_with(
                mode,
                test_budget(),
                InMemoryProbe::new().with_delay(Duration::from_millis(10)),
                InMemoryArtifactStore::new(),
                |merge| merge.with_delay(Duration::from_millis(20)),
            );
            let segments = seed_segments(&h.probe, &vec![1000; 60], &[]);
            let cancel = CancellationToken::new();

            let builder = Arc::clone(&h.builder);
            let token = cancel.clone();
            let task =
                tokio::spawn(async move { builder.build(&segments, &NoProgress, &token).await });

            tokio::time::sleep(Duration::from_millis(cancel_after_ms)).await;
            cancel.cancel();
            let result = task.await.unwrap();

            match result {
                Err(BuildError::Cancelled) => assert_eq!(h.store.live_count(), 0),
                Ok(_) => assert_eq!(h.store.live_count(), 1),
                Err(other) => panic!("{} after {}ms: {:?}", mode, cancel_after_ms, other),
            }
            assert_clean(&h);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_dropped_build_still_cleans_up() {
    let h = harness_with(
        StrategyMode::Hierarchical,
        test_budget(),
        InMemoryProbe::new().with_delay(Duration::from_millis(10)),
        InMemoryArtifactStore::new(),
        |merge| merge.with_delay(Duration::from_millis(20)),
    );
    let segments = seed_segments(&h.probe, &vec![1000; 60], &[]);

    let builder = Arc::clone(&h.builder);
    let task = tokio::spawn(async move {
        builder
            .build(&segments, &NoProgress, &CancellationToken::new())
            .await
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(h.store.created(ArtifactRole::Intermediate) > 0);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_clean(&h);
}

fn interactor(h: &Harness, project: &str, segments: Vec<Segment>) -> ComposeInteractor {
    let source = InMemorySegmentSource::new();
    source.insert(project, segments);
    ComposeInteractor::new(
        Arc::clone(&h.builder),
        Arc::new(source) as Arc<dyn SegmentSource>,
    )
}

#[tokio::test(start_paused = true)]
async fn test_new_build_cancels_the_running_one() {
    let h = harness_with(
        StrategyMode::Auto,
        test_budget(),
        InMemoryProbe::new().with_delay(Duration::from_millis(10)),
        InMemoryArtifactStore::new(),
        |merge| merge,
    );
    let slow = seed_segments(&h.probe, &vec![1000; 40], &[]);
    let fast: Vec<Segment> = slow.iter().take(3).cloned().collect();
    let interactor = interactor(&h, "trip", slow.clone());

    let first = interactor.compose_segments("trip", &slow, &NoProgress);
    let second = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(interactor.is_building("trip"));
        interactor.compose_segments("trip", &fast, &NoProgress).await
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap_err(), BuildError::Cancelled);
    let second = second.unwrap();
    assert_eq!(second.artifact.total_duration(), 3000);
    assert!(!interactor.is_building("trip"));
    assert_eq!(interactor.playback("trip").total_duration(), 3000);
    assert_eq!(h.store.live_count(), 1);
    assert_clean(&h);
}

#[tokio::test(start_paused = true)]
async fn test_queued_request_superseded_before_start() {
    let h = harness_with(
        StrategyMode::Auto,
        test_budget(),
        InMemoryProbe::new().with_delay(Duration::from_millis(10)),
        InMemoryArtifactStore::new(),
        |merge| merge,
    );
    let segments = seed_segments(&h.probe, &vec![1000; 30], &[]);
    let interactor = interactor(&h, "trip", segments.clone());

    let delayed = |ms: u64| {
        let interactor = &interactor;
        let segments = &segments;
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            interactor.compose_segments("trip", segments, &NoProgress).await
        }
    };
    let (a, b, c) = tokio::join!(delayed(0), delayed(10), delayed(20));

    assert_eq!(a.unwrap_err(), BuildError::Cancelled);
    assert_eq!(b.unwrap_err(), BuildError::Cancelled);
    assert_eq!(c.unwrap().artifact.segment_count(), 30);
    assert_clean(&h);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_request_frees_the_project() {
    let h = harness_with(
        StrategyMode::Auto,
        test_budget(),
        InMemoryProbe::new().with_delay(Duration::from_millis(10)),
        InMemoryArtifactStore::new(),
        |merge| merge,
    );
    let segments = seed_segments(&h.probe, &vec![1000; 30], &[]);
    let interactor = interactor(&h, "trip", segments.clone());

    let timed_out = tokio::time::timeout(
        Duration::from_millis(25),
        interactor.compose_segments("trip", &segments, &NoProgress),
    )
    .await;
    assert!(timed_out.is_err());
    assert!(!interactor.is_building("trip"));
    assert!(!interactor.cancel("trip"));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_clean(&h);

    let rebuilt = interactor
        .compose_segments("trip", &segments, &NoProgress)
        .await
        .unwrap();
    assert_eq!(rebuilt.artifact.segment_count(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_by_project() {
    let h = harness_with(
        StrategyMode::Auto,
        test_budget(),
        InMemoryProbe::new().with_delay(Duration::from_millis(10)),
        InMemoryArtifactStore::new(),
        |merge| merge,
    );
    let segments = seed_segments(&h.probe, &vec![1000; 30], &[]);
    let interactor = interactor(&h, "trip", segments);
    assert!(!interactor.cancel("trip"));

    let build = interactor.compose("trip", &NoProgress);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(!interactor.cancel("other"));
        interactor.cancel("trip")
    };
    let (result, cancelled) = tokio::join!(build, cancel);

    assert!(cancelled);
    assert!(matches!(
        result,
        Err(ComposerError::Build(BuildError::Cancelled))
    ));
    assert_eq!(h.store.live_count(), 0);
    assert_eq!(interactor.playback("trip").total_duration(), 0);
}

#[tokio::test]
async fn test_compose_loads_playback_mapping() {
    let h = harness(StrategyMode::Auto);
    let segments = seed_segments(&h.probe, &[1000, 950, 1020], &[]);
    let interactor = interactor(&h, "trip", segments);

    let composition = interactor.compose("trip", &NoProgress).await.unwrap();
    let ranges = interactor.get_time_ranges(&composition.artifact);
    let sync = interactor.playback("trip");

    assert_eq!(ranges.total, 2970);
    assert_eq!(sync.segment_index_for_position(1950), 2);
    assert_eq!(sync.position_for_segment(1), 1000);
    assert_eq!(sync.segment_index_for_position(-10), 0);
    assert_eq!(sync.segment_index_for_position(10_000), 2);

    let err = interactor.compose("missing", &NoProgress).await.unwrap_err();
    assert!(matches!(err, ComposerError::Source(_)));
}

#[test]
fn test_build_future_is_send() {
    fn assert_send<T: Send>(_: &T) {}

    let h = harness(StrategyMode::Hierarchical);
    let segments = seed_segments(&h.probe, &vec![1000; 60], &[]);
    let cancel = CancellationToken::new();
    let build = h.builder.build(&segments, &NoProgress, &cancel);
    assert_send(&build);
}
