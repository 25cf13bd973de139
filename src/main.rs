//! ReelStitch CLI
//!
//! # Usage
//!
//! ```bash
//! reelstitch compose --dir clips/ --output story.mp4
//! reelstitch plan --durations 1.0s,0.95s,1.02s
//! reelstitch locate --durations 1000,950,1020 --position 1500
//! reelstitch simulate --count 120 --fail 3,17
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use reelstitch::cli::{commands, Cli, Commands};
use reelstitch::config_initialization::resolve_configuration;
use reelstitch::utils::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = resolve_configuration(&cli).context("Failed to load configuration")?;
    init_logging(&resolved.config.logging);

    match &resolved.file {
        Some(path) => info!(path = %path.display(), "configuration file loaded"),
        None => debug!("no configuration file, using defaults"),
    }
    debug!(
        env_overrides = resolved.env_overrides,
        cli_overrides = resolved.cli_overrides,
        "configuration resolved"
    );

    let config = resolved.config;
    match cli.command {
        Commands::Compose(args) => commands::compose(args, &config).await?,
        Commands::Probe(args) => commands::probe(args, &config).await?,
        Commands::Plan(args) => commands::plan(args, &config).await?,
        Commands::Locate(args) => commands::locate(args).await?,
        Commands::Capability(args) => commands::capability(args, &config).await?,
        Commands::Simulate(args) => commands::simulate(args, &config).await?,
    }
    Ok(())
}
