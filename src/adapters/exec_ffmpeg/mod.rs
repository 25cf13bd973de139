//! FFmpeg concat adapter
//!
//! Merges with the concat demuxer in stream copy mode. Each call writes a
//! manifest next to the output, runs ffmpeg once and removes the manifest
//! again, whatever the outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::probe_ffprobe::FfprobeAdapter;
use crate::adapters::tool::ToolCommand;
use crate::domain::errors::MergeError;
use crate::domain::model::{
    ArtifactHandle, ArtifactRepresentation, ArtifactRole, ContentRef, Tick,
};
use crate::ports::{MergeOutcome, MergePort, MergeSource, ProbePort};

/// `[merge]` configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// ffmpeg binary, looked up on `PATH` when not absolute
    pub ffmpeg_path: PathBuf,
    /// Upper bound for one ffmpeg run
    pub timeout_secs: u64,
    /// Remux the final artifact for progressive playback
    pub materialize: bool,
    /// Probe the final artifact and report its real duration
    pub verify_duration: bool,
    /// Where the final artifact is written; a temp location when unset
    pub output: Option<PathBuf>,
    /// Parent for the intermediate scratch directory; system temp when unset
    pub work_dir: Option<PathBuf>,
    /// Container extension for artifacts
    pub extension: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            timeout_secs: 600,
            materialize: false,
            verify_duration: true,
            output: None,
            work_dir: None,
            extension: "mp4".to_string(),
        }
    }
}

/// FFmpeg concat-demuxer merge adapter
pub struct FfmpegConcatAdapter {
    ffmpeg_path: PathBuf,
    timeout: Duration,
    verifier: Option<FfprobeAdapter>,
}

impl FfmpegConcatAdapter {
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            verifier: None,
        }
    }

    /// Probe final outputs with `verifier` instead of trusting summed durations
    pub fn with_verifier(mut self, verifier: FfprobeAdapter) -> Self {
        self.verifier = Some(verifier);
        self
    }

    async fn measured_duration(&self, output: &ArtifactHandle) -> Option<Tick> {
        let verifier = self.verifier.as_ref()?;
        let content = ContentRef::new(output.location.clone());
        let measured = async {
            let mut session = verifier.open(&content).await?;
            session.read_metadata().await
        }
        .await;
        match measured {
            Ok(raw) => raw.duration,
            Err(err) => {
                warn!(location = %output.location, error = %err, "could not verify merged duration");
                None
            }
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<(), MergeError> {
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone(), self.timeout);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);
        cmd.args(args);
        cmd.execute().await.map(|_| ()).map_err(MergeError::Tool)
    }
}

/// Removes the manifest file on drop
struct ManifestGuard(PathBuf);

impl Drop for ManifestGuard {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.0) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.0.display(), error = %err, "failed to remove concat manifest");
            }
        }
    }
}

/// Render a concat demuxer manifest for `paths`
pub fn concat_manifest<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    paths
        .into_iter()
        .map(|path| format!("file '{}'\n", path.replace('\'', r"'\''")))
        .collect()
}

/// Absolute manifest entry for `source`.
///
/// The concat demuxer resolves relative entries against the manifest's
/// directory, not the working directory.
fn source_path(source: &MergeSource) -> Result<String, MergeError> {
    let path = match source {
        MergeSource::Segment { content, .. } => content.as_str(),
        MergeSource::Artifact(handle) => handle.location.as_str(),
    };
    std::path::absolute(path)
        .map(|absolute| absolute.to_string_lossy().to_string())
        .map_err(|e| MergeError::Io(format!("{}: {}", path, e)))
}

/// Sum of the source durations, known only when every source is a segment
fn segment_duration(sources: &[MergeSource]) -> Option<Tick> {
    sources
        .iter()
        .map(|source| match source {
            MergeSource::Segment { duration, .. } => Some(*duration),
            MergeSource::Artifact(_) => None,
        })
        .sum()
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[async_trait]
impl MergePort for FfmpegConcatAdapter {
    async fn merge(
        &self,
        sources: &[MergeSource],
        output: &ArtifactHandle,
    ) -> Result<MergeOutcome, MergeError> {
        if sources.is_empty() {
            return Err(MergeError::InvalidInput("no sources to merge".to_string()));
        }

        let output_path = PathBuf::from(&output.location);
        let manifest_path = sibling(&output_path, ".concat.txt");
        let entries = sources
            .iter()
            .map(source_path)
            .collect::<Result<Vec<_>, _>>()?;
        let manifest = concat_manifest(entries.iter().map(String::as_str));
        tokio::fs::write(&manifest_path, manifest)
            .await
            .map_err(|e| MergeError::Io(format!("{}: {}", manifest_path.display(), e)))?;
        let _guard = ManifestGuard(manifest_path.clone());

        debug!(
            sources = sources.len(),
            output = %output.location,
            "running concat merge"
        );
        self.run(vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            manifest_path.to_string_lossy().to_string(),
            "-c".into(),
            "copy".into(),
            output.location.clone(),
        ])
        .await?;

        let summed = segment_duration(sources);

        let duration = match output.role {
            ArtifactRole::Final => self.measured_duration(output).await.or(summed),
            ArtifactRole::Intermediate => summed,
        };
        Ok(MergeOutcome {
            representation: ArtifactRepresentation::Materialized,
            duration,
        })
    }

    async fn materialize(&self, artifact: &ArtifactHandle) -> Result<MergeOutcome, MergeError> {
        let path = PathBuf::from(&artifact.location);
        let staged = sibling(&path, ".faststart");
        let format = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".to_string());

        let result = self
            .run(vec![
                "-i".into(),
                artifact.location.clone(),
                "-c".into(),
                "copy".into(),
                "-movflags".into(),
                "+faststart".into(),
                "-f".into(),
                format,
                staged.to_string_lossy().to_string(),
            ])
            .await;
        if let Err(err) = result {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(err);
        }

        tokio::fs::rename(&staged, &path)
            .await
            .map_err(|e| MergeError::Io(format!("{}: {}", path.display(), e)))?;
        Ok(MergeOutcome {
            representation: ArtifactRepresentation::Materialized,
            duration: None,
        })
    }
}
