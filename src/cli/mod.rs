//! CLI module for ReelStitch
//!
//! Command-line argument parsing and command execution.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::utils::{LogFormat, LogLevel};

pub mod args;
pub mod commands;

pub use args::{CapabilityArgs, ComposeArgs, LocateArgs, PlanArgs, ProbeArgs, SimulateArgs};

/// ReelStitch segment composer
///
/// Stitches short video segments into one composition with a drift-free
/// timeline, and maps playback positions back to segments.
#[derive(Parser, Debug)]
#[command(name = "reelstitch")]
#[command(about = "ReelStitch - ordered segment composition with drift-free timelines")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (default: reelstitch.toml, then config/reelstitch.toml)
    #[arg(long, global = true, env = "REELSTITCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compose every clip of a directory into one file
    Compose(ComposeArgs),
    /// Probe one segment file
    Probe(ProbeArgs),
    /// Show the time ranges and strategy for a list of durations
    Plan(PlanArgs),
    /// Map a position, progress fraction or segment index on a timeline
    Locate(LocateArgs),
    /// Show sampled host capability and derived thresholds
    Capability(CapabilityArgs),
    /// Run a build against in-memory segments and print its report
    Simulate(SimulateArgs),
}
