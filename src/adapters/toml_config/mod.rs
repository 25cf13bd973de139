// TOML config adapter - Typed configuration file with environment overrides

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::adapters::exec_ffmpeg::MergeConfig;
use crate::adapters::fs_source::DEFAULT_EXTENSIONS;
use crate::adapters::probe_ffprobe::ProbeConfig;
use crate::engine::BuilderConfig;
use crate::error::{ComposerError, ComposerResult};
use crate::planner::StrategyConfig;
use crate::utils::{BudgetConfig, LoggingConfig};

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "REELSTITCH_";

/// `[source]` configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory holding one sub-directory of clips per project
    pub root: PathBuf,
    /// File extensions treated as segments
    pub extensions: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub strategy: StrategyConfig,
    pub budget: BudgetConfig,
    pub probe: ProbeConfig,
    pub merge: MergeConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
}

impl ComposerConfig {
    pub fn from_toml_str(content: &str) -> ComposerResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ComposerResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load and validate a config file
    pub fn from_file(path: &Path) -> ComposerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> ComposerResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Builder settings carried by this config
    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            strategy: self.strategy,
            materialize: self.merge.materialize,
            ..BuilderConfig::default()
        }
    }

    /// Apply `REELSTITCH_*` overrides read through `lookup`. Returns the
    /// number of overrides applied.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ComposerResult<usize> {
        let mut applied = 0;
        let mut var = |suffix: &str| {
            let value = lookup(&format!("{}{}", ENV_PREFIX, suffix))?;
            debug!(variable = %format!("{}{}", ENV_PREFIX, suffix), value = %value, "environment override");
            applied += 1;
            Some(value)
        };

        if let Some(v) = var("STRATEGY") {
            self.strategy.mode = parse_env("STRATEGY", &v)?;
        }
        if let Some(v) = var("DIRECT_MAX") {
            self.budget.direct_max = Some(parse_env("DIRECT_MAX", &v)?);
        }
        if let Some(v) = var("BATCHED_MAX") {
            self.budget.batched_max = Some(parse_env("BATCHED_MAX", &v)?);
        }
        if let Some(v) = var("BATCH_SIZE") {
            self.budget.batch_size = Some(parse_env("BATCH_SIZE", &v)?);
        }
        if let Some(v) = var("LEAF_BATCH_SIZE") {
            self.budget.leaf_batch_size = Some(parse_env("LEAF_BATCH_SIZE", &v)?);
        }
        if let Some(v) = var("PROBE_PARALLELISM") {
            self.budget.probe_parallelism = Some(parse_env("PROBE_PARALLELISM", &v)?);
        }
        if let Some(v) = var("RECLAIM_PAUSE_MS") {
            self.budget.reclaim_pause_ms = parse_env("RECLAIM_PAUSE_MS", &v)?;
        }
        if let Some(v) = var("ADAPTIVE") {
            self.budget.adaptive = parse_env("ADAPTIVE", &v)?;
        }
        if let Some(v) = var("FFPROBE") {
            self.probe.ffprobe_path = PathBuf::from(v);
        }
        if let Some(v) = var("FFMPEG") {
            self.merge.ffmpeg_path = PathBuf::from(v);
        }
        if let Some(v) = var("WORK_DIR") {
            self.merge.work_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("SOURCE_ROOT") {
            self.source.root = PathBuf::from(v);
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.logging.level = parse_env("LOG_LEVEL", &v)?;
        }
        if let Some(v) = var("LOG_FORMAT") {
            self.logging.format = parse_env("LOG_FORMAT", &v)?;
        }

        Ok(applied)
    }

    /// Reject values that would make every build fail
    pub fn validate(&self) -> ComposerResult<()> {
        let budget = &self.budget;
        let pinned = [
            ("budget.direct_max", budget.direct_max),
            ("budget.batched_max", budget.batched_max),
            ("budget.batch_size", budget.batch_size),
            ("budget.leaf_batch_size", budget.leaf_batch_size),
            ("budget.reclaim_every_batched", budget.reclaim_every_batched),
            ("budget.reclaim_every_hierarchical", budget.reclaim_every_hierarchical),
            ("budget.handle_ceiling", budget.handle_ceiling),
            ("budget.intermediate_ceiling", budget.intermediate_ceiling),
            ("budget.probe_parallelism", budget.probe_parallelism),
        ];
        for (key, value) in pinned {
            if value == Some(0) {
                return invalid(format!("{} must be at least 1", key));
            }
        }
        if let (Some(direct), Some(batched)) = (budget.direct_max, budget.batched_max) {
            if batched < direct {
                return invalid(format!(
                    "budget.batched_max ({}) must not be below budget.direct_max ({})",
                    batched, direct
                ));
            }
        }
        if self.probe.timeout_secs == 0 {
            return invalid("probe.timeout_secs must be at least 1".to_string());
        }
        if self.merge.timeout_secs == 0 {
            return invalid("merge.timeout_secs must be at least 1".to_string());
        }
        if self.merge.extension.trim().is_empty() {
            return invalid("merge.extension must not be empty".to_string());
        }
        if self.source.extensions.is_empty() {
            return invalid("source.extensions must not be empty".to_string());
        }
        Ok(())
    }
}

fn invalid(message: String) -> ComposerResult<()> {
    Err(ComposerError::InvalidConfig { message })
}

fn parse_env<T>(suffix: &str, value: &str) -> ComposerResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ComposerError::InvalidConfig {
            message: format!("{}{}='{}': {}", ENV_PREFIX, suffix, value, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::StrategyMode;
    use crate::utils::{LogFormat, LogLevel};
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ComposerConfig::from_toml_str(
            r#"
            [strategy]
            mode = "hierarchical"

            [budget]
            leaf_batch_size = 8

            [merge]
            output = "out/story.mp4"
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy.mode, StrategyMode::Hierarchical);
        assert_eq!(config.budget.leaf_batch_size, Some(8));
        assert_eq!(config.budget.batch_size, None);
        assert_eq!(config.budget.reclaim_pause_ms, 50);
        assert_eq!(config.merge.output, Some(PathBuf::from("out/story.mp4")));
        assert_eq!(config.probe, ProbeConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reelstitch.toml");
        let mut config = ComposerConfig::default();
        config.budget.batch_size = Some(12);
        config.logging.format = LogFormat::Json;

        config.save(&path).unwrap();
        let loaded = ComposerConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<String, String> = [
            ("REELSTITCH_STRATEGY", "batched"),
            ("REELSTITCH_BATCH_SIZE", "7"),
            ("REELSTITCH_LOG_LEVEL", "debug"),
            ("REELSTITCH_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut config = ComposerConfig::default();
        let applied = config.apply_env(|key| vars.get(key).cloned()).unwrap();

        assert_eq!(applied, 4);
        assert_eq!(config.strategy.mode, StrategyMode::Batched);
        assert_eq!(config.budget.batch_size, Some(7));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.merge.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = ComposerConfig::default();
        let err = config
            .apply_env(|key| (key == "REELSTITCH_BATCH_SIZE").then(|| "ten".to_string()))
            .unwrap_err();
        assert!(matches!(err, ComposerError::InvalidConfig { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_and_inverted_tiers() {
        let mut config = ComposerConfig::default();
        config.budget.batch_size = Some(0);
        assert!(config.validate().is_err());

        let mut config = ComposerConfig::default();
        config.budget.direct_max = Some(40);
        config.budget.batched_max = Some(30);
        assert!(config.validate().is_err());

        let mut config = ComposerConfig::default();
        config.probe.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let err = ComposerConfig::from_toml_str("[budget\nbatch_size = 3").unwrap_err();
        assert!(matches!(err, ComposerError::TomlParse(_)));
    }
}
