//! Composition building across the direct, batched and hierarchical tiers

use futures::stream::{self, StreamExt};
use std::mem;
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::domain::errors::{BuildError, PartialBuildWarning};
use crate::domain::model::*;
use crate::domain::rules::TimeRangeCalculator;
use crate::engine::intermediates::IntermediateTracker;
use crate::engine::progress::ProgressCallback;
use crate::engine::BuilderConfig;
use crate::planner::{CompositionPlan, StrategyPlanner};
use crate::ports::{ArtifactStorePort, MergeOutcome, MergePort, MergeSource, ProbePort};
use crate::probe::DurationProbe;
use crate::utils::resource_budget::{BudgetThresholds, ResourceBudgetManager};

/// Orchestrates probing and merging for one ordered segment list.
///
/// The tier is chosen per build from the segment count and the budget's
/// current thresholds. Every tier produces the same time-range table for
/// the same input; only resource usage differs.
pub struct CompositionBuilder {
    probe: DurationProbe,
    merge: Arc<dyn MergePort>,
    store: Arc<dyn ArtifactStorePort>,
    budget: Arc<ResourceBudgetManager>,
    planner: StrategyPlanner,
    config: BuilderConfig,
}

impl CompositionBuilder {
    pub fn new(
        probe: Arc<dyn ProbePort>,
        merge: Arc<dyn MergePort>,
        store: Arc<dyn ArtifactStorePort>,
        budget: Arc<ResourceBudgetManager>,
        config: BuilderConfig,
    ) -> Self {
        Self {
            probe: DurationProbe::new(probe, Arc::clone(&budget)),
            merge,
            store,
            budget,
            planner: StrategyPlanner::new(config.strategy),
            config,
        }
    }

    pub fn budget(&self) -> &Arc<ResourceBudgetManager> {
        &self.budget
    }

    pub fn probe(&self) -> &DurationProbe {
        &self.probe
    }

    /// Describe the build `segment_count` segments would get right now
    pub fn plan(&self, segment_count: usize) -> CompositionPlan {
        self.planner.plan(segment_count, &self.budget.thresholds())
    }

    /// Build a composition from `segments`.
    ///
    /// Per-segment failures are skipped and reported; only an empty result,
    /// a merge/storage failure or cancellation is an error. Every artifact
    /// created along the way, the final one included on error, is deleted
    /// before this returns.
    pub async fn build(
        &self,
        segments: &[Segment],
        progress: &dyn ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<Composition, BuildError> {
        let thresholds = self.budget.thresholds();
        let strategy = self.planner.select(segments.len(), &thresholds);
        let span = info_span!("build", strategy = %strategy, segments = segments.len());

        async move {
            info!("composition build started");
            let (origins, ordered): (Vec<usize>, Vec<Segment>) =
                normalize_order_indexed(segments).into_iter().unzip();

            let mut run = BuildRun {
                builder: self,
                thresholds,
                segments: ordered,
                origins,
                cancel,
                progress,
                processed: 0,
                included: Vec::new(),
                skipped: Vec::new(),
                reclaim_cycles: 0,
                batches_since_reclaim: 0,
                tracker: IntermediateTracker::new(Arc::clone(&self.store), Arc::clone(&self.budget)),
            };

            let result = match run.execute(strategy).await {
                Ok(output) => run.finish(strategy, output).await,
                Err(err) => Err(err),
            };

            let leaked = run.tracker.drain().await;
            if leaked > 0 {
                error!(leaked, "artifacts could not be deleted");
            }

            match &result {
                Ok(composition) => info!(
                    included = composition.report.included_count,
                    skipped = composition.report.skipped.len(),
                    total_ticks = composition.artifact.total_duration(),
                    partial = composition.report.is_partial(),
                    "composition build finished"
                ),
                Err(BuildError::Cancelled) => info!("composition build cancelled"),
                Err(err) => warn!(error = %err, "composition build failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// State of one build in flight
struct BuildRun<'a> {
    builder: &'a CompositionBuilder,
    thresholds: BudgetThresholds,
    segments: Vec<Segment>,
    /// Input position of `segments[i]`
    origins: Vec<usize>,
    cancel: &'a CancellationToken,
    progress: &'a dyn ProgressCallback,
    processed: usize,
    included: Vec<(SegmentId, Tick)>,
    skipped: Vec<SkippedSegment>,
    reclaim_cycles: usize,
    batches_since_reclaim: usize,
    tracker: IntermediateTracker,
}

impl<'a> BuildRun<'a> {
    fn total(&self) -> usize {
        self.segments.len()
    }

    async fn execute(
        &mut self,
        strategy: MergeStrategy,
    ) -> Result<(ArtifactHandle, MergeOutcome), BuildError> {
        self.check_cancelled()?;
        match strategy {
            MergeStrategy::Direct => self.run_direct().await,
            MergeStrategy::Batched { batch_size } => self.run_batched(batch_size.max(1)).await,
            MergeStrategy::Hierarchical { leaf_batch_size } => {
                self.run_hierarchical(leaf_batch_size.max(1)).await
            }
        }
    }

    async fn run_direct(&mut self) -> Result<(ArtifactHandle, MergeOutcome), BuildError> {
        let builder = self.builder;
        let label = builder.config.final_label.as_str();
        let mut sources = Vec::new();
        for batch in MergeBatch::chunk(&self.segments, self.total().max(1)) {
            sources = self.probe_batch(&batch, 0).await?;
        }
        if sources.is_empty() {
            return Err(self.no_valid_segments());
        }
        self.merge_into(sources, ArtifactRole::Final, label, "direct merge")
            .await
    }

    async fn run_batched(
        &mut self,
        batch_size: usize,
    ) -> Result<(ArtifactHandle, MergeOutcome), BuildError> {
        let builder = self.builder;
        let label = builder.config.final_label.as_str();
        let mut outputs = Vec::new();

        for batch in MergeBatch::chunk(&self.segments, batch_size) {
            let sources = self.probe_batch(&batch, batch.index * batch_size).await?;
            if sources.is_empty() {
                debug!(batch = batch.index, "every segment in batch skipped");
                continue;
            }
            let (output, _) = self
                .merge_into(
                    sources,
                    ArtifactRole::Intermediate,
                    &format!("batch-{}", batch.index),
                    "batch merge",
                )
                .await?;
            outputs.push(output);
            self.after_batch(self.thresholds.reclaim_every_batched).await?;
        }

        if outputs.is_empty() {
            return Err(self.no_valid_segments());
        }
        let sources = outputs.into_iter().map(MergeSource::Artifact).collect();
        self.merge_into(sources, ArtifactRole::Final, label, "final merge")
            .await
    }

    /// Leaf batches feed a binary-counter stack: two artifacts of the same
    /// level are merged into one of the next level, so at most one artifact
    /// per level is alive.
    async fn run_hierarchical(
        &mut self,
        leaf_batch_size: usize,
    ) -> Result<(ArtifactHandle, MergeOutcome), BuildError> {
        let batches = MergeBatch::chunk(&self.segments, leaf_batch_size);
        let last_batch = batches.len().saturating_sub(1);
        let mut stack: Vec<(u32, ArtifactHandle)> = Vec::new();

        for batch in &batches {
            let sources = self.probe_batch(batch, batch.index * leaf_batch_size).await?;
            if sources.is_empty() {
                debug!(batch = batch.index, "every segment in leaf batch skipped");
                continue;
            }
            let (leaf, _) = self
                .merge_into(
                    sources,
                    ArtifactRole::Intermediate,
                    &format!("leaf-{}", batch.index),
                    "leaf merge",
                )
                .await?;

            let mut node = (0u32, leaf);
            // The last leaf is left for the collapse so the final merge
            // writes the result directly
            while batch.index < last_batch && stack.last().map(|(level, _)| *level) == Some(node.0)
            {
                let Some((level, left)) = stack.pop() else {
                    break;
                };
                let (merged, _) = self
                    .merge_into(
                        vec![MergeSource::Artifact(left), MergeSource::Artifact(node.1)],
                        ArtifactRole::Intermediate,
                        &format!("level-{}", level + 1),
                        "pair merge",
                    )
                    .await?;
                debug!(level = level + 1, live = self.tracker.live_intermediates(), "levels merged");
                node = (level + 1, merged);
            }
            stack.push(node);
            self.after_batch(self.thresholds.reclaim_every_hierarchical)
                .await?;
        }

        self.collapse(stack).await
    }

    /// Pair-merge the remaining stack from the top until one artifact is
    /// left; the last merge writes the final artifact
    async fn collapse(
        &mut self,
        mut stack: Vec<(u32, ArtifactHandle)>,
    ) -> Result<(ArtifactHandle, MergeOutcome), BuildError> {
        let builder = self.builder;
        let label = builder.config.final_label.as_str();
        loop {
            let Some((_, right)) = stack.pop() else {
                return Err(self.no_valid_segments());
            };
            let Some((level, left)) = stack.pop() else {
                return self
                    .merge_into(
                        vec![MergeSource::Artifact(right)],
                        ArtifactRole::Final,
                        label,
                        "final merge",
                    )
                    .await;
            };

            let sources = vec![MergeSource::Artifact(left), MergeSource::Artifact(right)];
            if stack.is_empty() {
                return self
                    .merge_into(sources, ArtifactRole::Final, label, "final merge")
                    .await;
            }
            let (merged, _) = self
                .merge_into(
                    sources,
                    ArtifactRole::Intermediate,
                    &format!("collapse-{}", level + 1),
                    "collapse merge",
                )
                .await?;
            stack.push((level + 1, merged));
        }
    }

    /// Probe one batch with bounded parallelism, in order.
    ///
    /// Successful segments become merge sources; the rest are recorded as
    /// skipped with their input position.
    async fn probe_batch(
        &mut self,
        batch: &MergeBatch,
        first_position: usize,
    ) -> Result<Vec<MergeSource>, BuildError> {
        self.check_cancelled()?;
        // Owned futures keep the build future Send
        let probes: Vec<_> = batch
            .segments
            .iter()
            .cloned()
            .enumerate()
            .map(|(offset, segment)| {
                let probe = self.builder.probe.clone();
                let cancel = self.cancel.clone();
                async move { (offset, probe.probe_cancellable(&segment, &cancel).await) }
            })
            .collect();

        let mut results =
            pin!(stream::iter(probes).buffered(self.thresholds.probe_parallelism.max(1)));

        let mut sources = Vec::with_capacity(batch.len());
        while let Some((offset, result)) = results.next().await {
            self.check_cancelled()?;
            let segment = &batch.segments[offset];
            let original_index = self.origins[first_position + offset];

            match result {
                ProbeResult::Success(metadata) => {
                    self.included.push((segment.id.clone(), metadata.duration));
                    sources.push(MergeSource::Segment {
                        content: segment.content.clone(),
                        duration: metadata.duration,
                    });
                }
                other => {
                    let reason = other.failure_reason().unwrap_or_default();
                    warn!(
                        segment_index = original_index,
                        segment_id = %segment.id,
                        batch = batch.index,
                        reason = %reason,
                        "segment skipped"
                    );
                    self.skipped.push(SkippedSegment {
                        original_index,
                        segment_id: segment.id.clone(),
                        reason,
                    });
                }
            }
            self.advance();
        }
        Ok(sources)
    }

    /// Create the output, merge `sources` into it, then delete every
    /// intermediate the merge consumed
    async fn merge_into(
        &mut self,
        sources: Vec<MergeSource>,
        role: ArtifactRole,
        label: &str,
        stage: &str,
    ) -> Result<(ArtifactHandle, MergeOutcome), BuildError> {
        self.check_cancelled()?;
        let output = self
            .tracker
            .create(role, label)
            .await
            .map_err(|err| BuildError::merge_failed(stage, err))?;

        let builder = self.builder;
        let merge = builder.merge.as_ref();
        let cancel = self.cancel;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BuildError::Cancelled),
            result = merge.merge(&sources, &output) => {
                result.map_err(|err| BuildError::merge_failed(stage, err))?
            }
        };
        debug!(
            stage,
            artifact = %output.id,
            inputs = sources.len(),
            "merged"
        );

        for source in &sources {
            if let MergeSource::Artifact(folded) = source {
                self.tracker.discard(folded.id).await;
            }
        }
        Ok((output, outcome))
    }

    /// Count finished batches and run a reclaim cycle every `every` batches,
    /// or right away when the budget asks to throttle
    async fn after_batch(&mut self, every: usize) -> Result<(), BuildError> {
        self.batches_since_reclaim += 1;
        let builder = self.builder;
        let budget = builder.budget.as_ref();
        let throttle = budget.should_throttle();
        if self.batches_since_reclaim < every && !throttle {
            return Ok(());
        }

        self.batches_since_reclaim = 0;
        self.reclaim_cycles += 1;
        debug!(
            cycle = self.reclaim_cycles,
            throttle,
            live = self.tracker.live_intermediates(),
            "reclaim cycle"
        );

        let cancel = self.cancel;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BuildError::Cancelled),
            _ = budget.request_reclaim() => Ok(()),
        }
    }

    async fn finish(
        &mut self,
        strategy: MergeStrategy,
        (handle, mut outcome): (ArtifactHandle, MergeOutcome),
    ) -> Result<Composition, BuildError> {
        if self.builder.config.materialize {
            self.check_cancelled()?;
            let builder = self.builder;
            let merge = builder.merge.as_ref();
            let cancel = self.cancel;
            let materialized = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
                result = merge.materialize(&handle) => {
                    result.map_err(|err| BuildError::merge_failed("materialize", err))?
                }
            };
            outcome = MergeOutcome {
                representation: materialized.representation,
                duration: materialized.duration.or(outcome.duration),
            };
        }
        self.check_cancelled()?;

        let table = TimeRangeCalculator::calculate(mem::take(&mut self.included));
        let mut anomalies = TimeRangeCalculator::detect_anomalies(table.as_slice());
        anomalies.extend(TimeRangeCalculator::check_reported_duration(
            &table,
            outcome.duration,
        ));
        for anomaly in &anomalies {
            warn!(anomaly = %anomaly, "timeline anomaly");
        }

        let total = self.total();
        let skipped = mem::take(&mut self.skipped);
        let status = if skipped.len() * 2 > total {
            let warning = PartialBuildWarning {
                skipped: skipped.len(),
                total,
            };
            warn!(skipped = warning.skipped, total, "{}", warning);
            BuildStatus::Partial { warning }
        } else {
            BuildStatus::Complete
        };

        let handle = self.tracker.release(handle.id).unwrap_or(handle);
        self.progress.on_progress(total, total);

        Ok(Composition {
            artifact: CompositionArtifact {
                handle,
                representation: outcome.representation,
                reported_duration: outcome.duration,
                time_ranges: Arc::new(table),
            },
            report: BuildReport {
                strategy,
                input_count: total,
                included_count: total - skipped.len(),
                skipped,
                status,
                anomalies,
                peak_live_intermediates: self.tracker.peak_intermediates(),
                reclaim_cycles: self.reclaim_cycles,
            },
        })
    }

    /// Report progress for one more processed segment. The `(total, total)`
    /// call is held back until the composition is complete.
    fn advance(&mut self) {
        self.processed += 1;
        if self.processed < self.total() {
            self.progress.on_progress(self.processed, self.total());
        }
    }

    fn check_cancelled(&self) -> Result<(), BuildError> {
        if self.cancel.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn no_valid_segments(&self) -> BuildError {
        BuildError::NoValidSegments {
            skipped: self.skipped.len(),
            total: self.total(),
        }
    }
}
