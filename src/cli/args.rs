//! Command-line argument definitions

use clap::{ArgGroup, Args};
use std::path::PathBuf;

use crate::planner::StrategyMode;

/// Strategy overrides shared by building commands
#[derive(Args, Debug, Clone, Default)]
pub struct StrategyArgs {
    /// Merge strategy (auto, direct, batched, hierarchical)
    #[arg(long)]
    pub strategy: Option<StrategyMode>,

    /// Batch size of the batched tier
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Leaf batch size of the hierarchical tier
    #[arg(long)]
    pub leaf_batch_size: Option<usize>,
}

/// Arguments for the compose command
#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Directory holding the clips, composed in file name order
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Output file path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Scratch directory parent for intermediates
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Remux the result for progressive playback
    #[arg(long)]
    pub faststart: bool,

    /// Fail when more than half of the segments were dropped
    #[arg(long)]
    pub strict: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub strategy: StrategyArgs,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Segment file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Comma separated durations, in ticks or seconds with an `s` suffix
    #[arg(long)]
    pub durations: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub strategy: StrategyArgs,
}

/// Arguments for the locate command
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("query").required(true).args(["position", "progress", "segment"])))]
pub struct LocateArgs {
    /// Comma separated durations, in ticks or seconds with an `s` suffix
    #[arg(long)]
    pub durations: String,

    /// Playback position, in ticks or seconds with an `s` suffix
    #[arg(long, allow_hyphen_values = true)]
    pub position: Option<String>,

    /// Progress fraction, 0.0 to 1.0
    #[arg(long, allow_hyphen_values = true)]
    pub progress: Option<f64>,

    /// Segment index
    #[arg(long)]
    pub segment: Option<usize>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the capability command
#[derive(Args, Debug)]
pub struct CapabilityArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the simulate command
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of segments
    #[arg(short, long)]
    pub count: usize,

    /// Duration of every segment, in ticks or seconds with an `s` suffix
    #[arg(long, default_value = "1000000")]
    pub duration: String,

    /// Comma separated indices of segments that fail probing
    #[arg(long)]
    pub fail: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub strategy: StrategyArgs,
}
