//! Strategy selection by segment count

use tracing::debug;

use crate::domain::model::MergeStrategy;
use crate::planner::{CompositionPlan, StrategyConfig, StrategyMode};
use crate::utils::resource_budget::BudgetThresholds;

/// Strategy planner for choosing the merge tier
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyPlanner {
    config: StrategyConfig,
}

impl StrategyPlanner {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Select the tier for `segment_count` segments.
    ///
    /// Auto mode: `n <= direct_max` is direct, `n <= batched_max` is
    /// batched, anything larger is hierarchical.
    pub fn select(&self, segment_count: usize, thresholds: &BudgetThresholds) -> MergeStrategy {
        let batched = MergeStrategy::Batched {
            batch_size: thresholds.batch_size,
        };
        let hierarchical = MergeStrategy::Hierarchical {
            leaf_batch_size: thresholds.leaf_batch_size,
        };

        let strategy = match self.config.mode {
            StrategyMode::Direct => MergeStrategy::Direct,
            StrategyMode::Batched => batched,
            StrategyMode::Hierarchical => hierarchical,
            StrategyMode::Auto if segment_count <= thresholds.direct_max => MergeStrategy::Direct,
            StrategyMode::Auto if segment_count <= thresholds.batched_max => batched,
            StrategyMode::Auto => hierarchical,
        };

        debug!(
            segments = segment_count,
            mode = %self.config.mode,
            strategy = %strategy,
            "strategy selected"
        );
        strategy
    }

    /// Select a tier and describe the build it implies, assuming every
    /// segment probes successfully
    pub fn plan(&self, segment_count: usize, thresholds: &BudgetThresholds) -> CompositionPlan {
        let strategy = self.select(segment_count, thresholds);
        let batch_sizes = |size: usize| -> Vec<usize> {
            let size = size.max(1);
            (0..segment_count)
                .step_by(size)
                .map(|start| size.min(segment_count - start))
                .collect()
        };

        match strategy {
            MergeStrategy::Direct => CompositionPlan {
                strategy,
                segment_count,
                batch_sizes: if segment_count == 0 { Vec::new() } else { vec![segment_count] },
                reclaim_every: 0,
                max_live_intermediates: 0,
                merge_calls: usize::from(segment_count > 0),
            },
            MergeStrategy::Batched { batch_size } => {
                let sizes = batch_sizes(batch_size);
                let batches = sizes.len();
                CompositionPlan {
                    strategy,
                    segment_count,
                    batch_sizes: sizes,
                    reclaim_every: thresholds.reclaim_every_batched,
                    max_live_intermediates: batches,
                    merge_calls: if batches == 0 { 0 } else { batches + 1 },
                }
            }
            MergeStrategy::Hierarchical { leaf_batch_size } => {
                let sizes = batch_sizes(leaf_batch_size);
                let (merge_calls, peak) = simulate_reduction(sizes.len());
                CompositionPlan {
                    strategy,
                    segment_count,
                    batch_sizes: sizes,
                    reclaim_every: thresholds.reclaim_every_hierarchical,
                    max_live_intermediates: peak,
                    merge_calls,
                }
            }
        }
    }
}

/// Replay the binary-counter reduction over `leaves` leaf artifacts.
///
/// Returns `(merge calls, peak live intermediates)` with the same
/// create-before-delete accounting the builder uses.
pub(crate) fn simulate_reduction(leaves: usize) -> (usize, usize) {
    if leaves == 0 {
        return (0, 0);
    }

    let mut stack: Vec<u32> = Vec::new();
    let mut live = 0usize;
    let mut peak = 0usize;
    let mut calls = 0usize;

    for leaf in 0..leaves {
        calls += 1;
        live += 1;
        peak = peak.max(live);
        let mut level = 0u32;
        // The last leaf goes straight to the collapse
        while leaf + 1 < leaves && stack.last() == Some(&level) {
            stack.pop();
            calls += 1;
            live += 1;
            peak = peak.max(live);
            live -= 2;
            level += 1;
        }
        stack.push(level);
    }

    // Collapse: pair-merge from the top; the last merge writes the final
    // artifact, which is not an intermediate
    while stack.len() > 2 {
        stack.pop();
        let left = stack.pop().unwrap_or(0);
        calls += 1;
        live += 1;
        peak = peak.max(live);
        live -= 2;
        stack.push(left + 1);
    }
    calls += 1;

    (calls, peak)
}
