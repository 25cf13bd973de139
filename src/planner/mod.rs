//! Merge strategy planning

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::model::MergeStrategy;

pub mod strategy;

pub use strategy::StrategyPlanner;

/// Strategy selection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    /// Pick by segment count against the budget thresholds
    #[default]
    Auto,
    Direct,
    Batched,
    Hierarchical,
}

impl FromStr for StrategyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(StrategyMode::Auto),
            "direct" => Ok(StrategyMode::Direct),
            "batched" => Ok(StrategyMode::Batched),
            "hierarchical" => Ok(StrategyMode::Hierarchical),
            other => Err(format!("unknown strategy mode '{}'", other)),
        }
    }
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyMode::Auto => "auto",
            StrategyMode::Direct => "direct",
            StrategyMode::Batched => "batched",
            StrategyMode::Hierarchical => "hierarchical",
        };
        f.write_str(name)
    }
}

/// `[strategy]` configuration section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub mode: StrategyMode,
}

/// Precomputed shape of a build, without touching any media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionPlan {
    pub strategy: MergeStrategy,
    pub segment_count: usize,
    /// Segment count of each first-level batch
    pub batch_sizes: Vec<usize>,
    /// Batches between reclaim cycles; zero when the tier never reclaims
    pub reclaim_every: usize,
    /// Upper bound on intermediates alive at once
    pub max_live_intermediates: usize,
    /// Number of merge primitive calls, final merge included
    pub merge_calls: usize,
}
