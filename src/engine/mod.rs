//! Composition engine: tiered merging with bounded intermediates

use serde::{Deserialize, Serialize};

use crate::planner::StrategyConfig;

pub mod builder;
pub mod intermediates;
pub mod progress;

pub use builder::CompositionBuilder;
pub use intermediates::IntermediateTracker;
pub use progress::{NoProgress, ProgressCallback, ProgressInfo, ProgressPhase, ProgressTracker};

/// Builder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub strategy: StrategyConfig,
    /// Run the merge primitive's materialize step on the final artifact
    pub materialize: bool,
    /// Label passed to the store for the final artifact
    pub final_label: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyConfig::default(),
            materialize: false,
            final_label: "composition".to_string(),
        }
    }
}
