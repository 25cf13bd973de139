//! Command implementations

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::in_memory::seed_segments;
use crate::adapters::{
    ComposerConfig, FfprobeAdapter, InMemoryArtifactStore, InMemoryMerge, InMemoryProbe,
};
use crate::app::{AppContainer, DefaultAppContainer};
use crate::cli::args::{
    CapabilityArgs, ComposeArgs, LocateArgs, PlanArgs, ProbeArgs, SimulateArgs,
};
use crate::domain::errors::BuildError;
use crate::domain::model::*;
use crate::domain::rules::TimeRangeCalculator;
use crate::engine::{CompositionBuilder, ProgressPhase, ProgressTracker};
use crate::planner::{CompositionPlan, StrategyPlanner};
use crate::playback::{self, PlaybackPositionSync};
use crate::ports::{ArtifactStorePort, MergePort, ProbePort};
use crate::probe::DurationProbe;
use crate::utils::time::{parse_tick_arg, parse_tick_list};
use crate::utils::{format_ticks, BudgetThresholds, HostCapability, ResourceBudgetManager};

/// Execute the compose command
pub async fn compose(args: ComposeArgs, config: &ComposerConfig) -> Result<()> {
    info!(dir = %args.dir.display(), output = %args.output.display(), "starting compose");

    let container =
        DefaultAppContainer::from_config(config).context("Failed to set up composition")?;
    let interactor = container.compose_interactor();

    let on_interrupt = Arc::clone(&interactor);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling build");
            on_interrupt.cancel_all();
        }
    });

    let tracker = ProgressTracker::new();
    let result = interactor.compose(".", &tracker).await;
    interrupt.abort();

    let composition = match result {
        Ok(composition) => {
            tracker.finish(ProgressPhase::Complete);
            composition
        }
        Err(err) => {
            let phase = match &err {
                crate::error::ComposerError::Build(BuildError::Cancelled) => ProgressPhase::Cancelled,
                _ => ProgressPhase::Failed,
            };
            tracker.finish(phase);
            return Err(err).context("Composition failed");
        }
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&composition)
                .context("Failed to serialize composition to JSON")?
        );
    } else {
        display_composition(&composition);
    }

    if args.strict {
        composition
            .into_strict()
            .context("Composition dropped too many segments")?;
    }
    info!("compose completed");
    Ok(())
}

/// Execute the probe command
pub async fn probe(args: ProbeArgs, config: &ComposerConfig) -> Result<()> {
    let budget = Arc::new(ResourceBudgetManager::new(config.budget.clone()));
    let port = Arc::new(FfprobeAdapter::new(&config.probe)) as Arc<dyn ProbePort>;
    let probe = DurationProbe::new(port, budget);

    let content = ContentRef::new(args.input.to_string_lossy().to_string());
    let metadata = probe
        .inspect(&content)
        .await
        .with_context(|| format!("Failed to probe {}", args.input.display()))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?
        );
    } else {
        let (width, height) = metadata.display_dimensions();
        println!("Segment Information");
        println!("===================");
        println!("File: {}", content);
        println!("Duration: {} ({} ticks)", format_ticks(metadata.duration), metadata.duration);
        println!("Coded Size: {}x{}", metadata.width, metadata.height);
        println!("Rotation: {} degrees", metadata.rotation.degrees());
        println!("Display Size: {}x{}", width, height);
    }
    Ok(())
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    plan: &'a CompositionPlan,
    ranges: &'a TimeRangeTable,
}

/// Execute the plan command
pub async fn plan(args: PlanArgs, config: &ComposerConfig) -> Result<()> {
    let table = table_from_arg(&args.durations)?;
    let budget = ResourceBudgetManager::new(config.budget.clone());
    let plan = StrategyPlanner::new(config.strategy).plan(table.len(), &budget.thresholds());

    if args.json {
        let output = PlanOutput {
            plan: &plan,
            ranges: &table,
        };
        println!("{}", serde_json::to_string_pretty(&output).context("Failed to serialize plan")?);
    } else {
        println!("Composition Plan");
        println!("================");
        println!("Strategy: {}", plan.strategy);
        println!("Segments: {}", plan.segment_count);
        if !plan.batch_sizes.is_empty() {
            let sizes: Vec<String> = plan.batch_sizes.iter().map(|s| s.to_string()).collect();
            println!("Batches: [{}]", sizes.join(", "));
        }
        println!("Merge Calls: {}", plan.merge_calls);
        println!("Max Live Intermediates: {}", plan.max_live_intermediates);
        println!();
        display_ranges(&table);
    }
    Ok(())
}

#[derive(Serialize)]
struct LocateOutput {
    index: usize,
    position: Tick,
    range: Option<SegmentTimeRange>,
}

/// Execute the locate command
pub async fn locate(args: LocateArgs) -> Result<()> {
    let table = table_from_arg(&args.durations)?;
    let sync = PlaybackPositionSync::with_table(Arc::new(table));
    let ranges = sync.snapshot();

    let (index, position) = if let Some(position) = &args.position {
        let position = parse_tick_arg(position)?;
        (playback::segment_index_for_position(ranges.as_slice(), position), position)
    } else if let Some(progress) = args.progress {
        let position = playback::position_for_progress(ranges.as_slice(), progress);
        (playback::segment_index_for_position(ranges.as_slice(), position), position)
    } else if let Some(segment) = args.segment {
        let position = playback::position_for_segment(ranges.as_slice(), segment);
        (playback::segment_index_for_position(ranges.as_slice(), position), position)
    } else {
        anyhow::bail!("one of --position, --progress or --segment is required");
    };

    let output = LocateOutput {
        index,
        position,
        range: ranges.ranges.get(index).cloned(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&output).context("Failed to serialize result")?);
    } else {
        match &output.range {
            Some(range) => println!(
                "segment {} ({}) at {}: range {} - {}",
                output.index,
                range.segment_id,
                format_ticks(output.position),
                format_ticks(range.start),
                format_ticks(range.end())
            ),
            None => println!("segment 0 at 00:00.000: empty timeline"),
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct CapabilityOutput<'a> {
    capability: &'a HostCapability,
    thresholds: &'a BudgetThresholds,
}

/// Execute the capability command
pub async fn capability(args: CapabilityArgs, config: &ComposerConfig) -> Result<()> {
    let budget = ResourceBudgetManager::new(config.budget.clone());
    let capability = budget.capability();
    let thresholds = budget.thresholds();

    if args.json {
        let output = CapabilityOutput {
            capability: &capability,
            thresholds: &thresholds,
        };
        println!("{}", serde_json::to_string_pretty(&output).context("Failed to serialize capability")?);
        return Ok(());
    }

    let mib = |bytes: Option<u64>| {
        bytes
            .map(|b| format!("{} MiB", b / (1024 * 1024)))
            .unwrap_or_else(|| "unknown".to_string())
    };
    println!("Host Capability");
    println!("===============");
    println!("CPUs: {}", capability.cpu_count);
    println!("Total Memory: {}", mib(capability.total_memory_bytes));
    println!("Available Memory: {}", mib(capability.available_memory_bytes));
    println!(
        "Open File Limit: {}",
        capability
            .open_file_limit
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!();
    println!("Thresholds ({:?})", thresholds.host_class);
    println!("  direct up to {} segments", thresholds.direct_max);
    println!(
        "  batched up to {} segments, batch size {}, reclaim every {}",
        thresholds.batched_max, thresholds.batch_size, thresholds.reclaim_every_batched
    );
    println!(
        "  hierarchical leaf size {}, reclaim every {}",
        thresholds.leaf_batch_size, thresholds.reclaim_every_hierarchical
    );
    println!(
        "  probe parallelism {}, handle ceiling {}, intermediate ceiling {}",
        thresholds.probe_parallelism, thresholds.handle_ceiling, thresholds.intermediate_ceiling
    );
    Ok(())
}

#[derive(Serialize)]
struct SimulateOutput<'a> {
    report: &'a BuildReport,
    total: Tick,
    merge_calls: usize,
    intermediates_created: usize,
    peak_live_intermediates: usize,
}

/// Execute the simulate command
pub async fn simulate(args: SimulateArgs, config: &ComposerConfig) -> Result<()> {
    let duration = parse_tick_arg(&args.duration)?;
    let failing: Vec<usize> = match &args.fail {
        Some(list) => list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse::<usize>())
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("Invalid --fail list '{}'", list))?,
        None => Vec::new(),
    };

    let probe = Arc::new(InMemoryProbe::new());
    let segments = seed_segments(&probe, &vec![duration; args.count], &failing);
    let store = Arc::new(InMemoryArtifactStore::new());
    let merge = Arc::new(InMemoryMerge::new(Arc::clone(&store)));
    let budget = Arc::new(ResourceBudgetManager::new(config.budget.clone()));
    let builder = CompositionBuilder::new(
        Arc::clone(&probe) as Arc<dyn ProbePort>,
        Arc::clone(&merge) as Arc<dyn MergePort>,
        Arc::clone(&store) as Arc<dyn ArtifactStorePort>,
        budget,
        config.builder_config(),
    );

    let tracker = ProgressTracker::new();
    let composition = builder
        .build(&segments, &tracker, &CancellationToken::new())
        .await
        .context("Simulated build failed")?;
    tracker.finish(ProgressPhase::Complete);

    let output = SimulateOutput {
        report: &composition.report,
        total: composition.artifact.total_duration(),
        merge_calls: merge.merge_calls(),
        intermediates_created: store.created(ArtifactRole::Intermediate),
        peak_live_intermediates: store.peak_live_intermediates(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output).context("Failed to serialize report")?);
    } else {
        println!("Simulation Report");
        println!("=================");
        println!("Strategy: {}", output.report.strategy);
        println!(
            "Included: {} of {}",
            output.report.included_count, output.report.input_count
        );
        for skipped in &output.report.skipped {
            println!("  skipped #{} {}: {}", skipped.original_index, skipped.segment_id, skipped.reason);
        }
        println!("Total: {} ({} ticks)", format_ticks(output.total), output.total);
        println!("Merge Calls: {}", output.merge_calls);
        println!("Intermediates Created: {}", output.intermediates_created);
        println!("Peak Live Intermediates: {}", output.peak_live_intermediates);
        println!("Reclaim Cycles: {}", output.report.reclaim_cycles);
        if output.report.is_partial() {
            println!("Status: partial");
        } else {
            println!("Status: complete");
        }
    }
    Ok(())
}

fn table_from_arg(durations: &str) -> Result<TimeRangeTable> {
    let durations = parse_tick_list(durations)?;
    if let Some(bad) = durations.iter().find(|d| **d <= 0) {
        anyhow::bail!("Durations must be positive, got {}", bad);
    }
    Ok(TimeRangeCalculator::calculate(
        durations
            .into_iter()
            .enumerate()
            .map(|(i, d)| (SegmentId::new(format!("seg-{}", i)), d)),
    ))
}

/// Display time ranges in human-readable format
fn display_ranges(table: &TimeRangeTable) {
    println!("Time Ranges:");
    for range in table.iter() {
        println!(
            "  {:>4}  {:<20} {} - {}",
            range.index,
            range.segment_id.as_str(),
            format_ticks(range.start),
            format_ticks(range.end())
        );
    }
    println!("Total: {} ({} ticks)", format_ticks(table.total), table.total);
}

/// Display a composition in human-readable format
fn display_composition(composition: &Composition) {
    let report = &composition.report;
    println!("Composition");
    println!("===========");
    println!("Artifact: {}", composition.artifact.handle.location);
    println!("Strategy: {}", report.strategy);
    println!("Included: {} of {}", report.included_count, report.input_count);
    if report.is_partial() {
        println!("Warning: more than half of the segments were dropped");
    }
    for skipped in &report.skipped {
        println!("  skipped #{} {}: {}", skipped.original_index, skipped.segment_id, skipped.reason);
    }
    for anomaly in &report.anomalies {
        println!("  anomaly: {}", anomaly);
    }
    println!();
    display_ranges(composition.artifact.time_ranges());
}
