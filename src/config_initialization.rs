//! Configuration initialization and hierarchy management

use std::path::{Path, PathBuf};

use crate::adapters::ComposerConfig;
use crate::cli::args::StrategyArgs;
use crate::cli::{Cli, Commands};
use crate::error::{ComposerError, ComposerResult};

/// Config files searched, in order, when `--config` is not given
pub const CONFIG_CANDIDATES: &[&str] = &["reelstitch.toml", "config/reelstitch.toml"];

/// Effective configuration and where its values came from
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: ComposerConfig,
    pub file: Option<PathBuf>,
    pub env_overrides: usize,
    pub cli_overrides: usize,
}

/// Resolve configuration with precedence CLI > Env > File > Defaults
pub fn resolve_configuration(cli: &Cli) -> ComposerResult<ResolvedConfig> {
    let cwd = std::env::current_dir()?;
    resolve_with(cli, &cwd, |key| std::env::var(key).ok())
}

/// [`resolve_configuration`] with an explicit base directory and
/// environment lookup
pub fn resolve_with(
    cli: &Cli,
    base: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ComposerResult<ResolvedConfig> {
    let file = match &cli.config {
        Some(path) => {
            if !path.is_file() {
                return Err(ComposerError::InvalidConfig {
                    message: format!("config file does not exist: {}", path.display()),
                });
            }
            Some(path.clone())
        }
        None => find_config_file(base),
    };

    let mut config = match &file {
        Some(path) => ComposerConfig::from_file(path)?,
        None => ComposerConfig::default(),
    };
    let env_overrides = config.apply_env(env)?;
    let cli_overrides = apply_cli_overrides(&mut config, cli);
    config.validate()?;

    Ok(ResolvedConfig {
        config,
        file,
        env_overrides,
        cli_overrides,
    })
}

/// First existing candidate config file under `base`
pub fn find_config_file(base: &Path) -> Option<PathBuf> {
    CONFIG_CANDIDATES
        .iter()
        .map(|candidate| base.join(candidate))
        .find(|path| path.is_file())
}

fn apply_strategy_args(config: &mut ComposerConfig, args: &StrategyArgs) -> usize {
    let mut applied = 0;
    if let Some(mode) = args.strategy {
        config.strategy.mode = mode;
        applied += 1;
    }
    if let Some(size) = args.batch_size {
        config.budget.batch_size = Some(size);
        applied += 1;
    }
    if let Some(size) = args.leaf_batch_size {
        config.budget.leaf_batch_size = Some(size);
        applied += 1;
    }
    applied
}

/// Apply CLI argument overrides to configuration
fn apply_cli_overrides(config: &mut ComposerConfig, cli: &Cli) -> usize {
    let mut applied = 0;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
        applied += 1;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
        applied += 1;
    }

    match &cli.command {
        Commands::Compose(args) => {
            config.source.root = args.dir.clone();
            config.merge.output = Some(args.output.clone());
            applied += 2;
            if let Some(dir) = &args.work_dir {
                config.merge.work_dir = Some(dir.clone());
                applied += 1;
            }
            if args.faststart {
                config.merge.materialize = true;
                applied += 1;
            }
            applied += apply_strategy_args(config, &args.strategy);
        }
        Commands::Plan(args) => applied += apply_strategy_args(config, &args.strategy),
        Commands::Simulate(args) => applied += apply_strategy_args(config, &args.strategy),
        Commands::Probe(_) | Commands::Locate(_) | Commands::Capability(_) => {}
    }
    applied
}
