//! FFprobe adapter for segment probing
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format
//! -show_streams` and maps the JSON into [`RawMetadata`]. Validation of the
//! values happens in the probe module, not here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::adapters::tool::ToolCommand;
use crate::domain::errors::ProbeError;
use crate::domain::model::{ContentRef, RawMetadata};
use crate::ports::{ProbePort, ProbeSession};
use crate::utils::time::parse_decimal_seconds;

/// `[probe]` configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// ffprobe binary, looked up on `PATH` when not absolute
    pub ffprobe_path: PathBuf,
    /// Upper bound for one ffprobe run
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: PathBuf::from("ffprobe"),
            timeout_secs: 30,
        }
    }
}

/// FFprobe-based probe adapter
#[derive(Debug, Clone)]
pub struct FfprobeAdapter {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeAdapter {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            ffprobe_path: config.ffprobe_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl ProbePort for FfprobeAdapter {
    async fn open(&self, content: &ContentRef) -> Result<Box<dyn ProbeSession>, ProbeError> {
        let path = PathBuf::from(content.as_str());
        let not_found = || ProbeError::NotFound {
            reference: content.to_string(),
        };
        let metadata = tokio::fs::metadata(&path).await.map_err(|_| not_found())?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        Ok(Box::new(FfprobeSession {
            path,
            ffprobe_path: self.ffprobe_path.clone(),
            timeout: self.timeout,
        }))
    }
}

/// One pending ffprobe run; the child process is tied to the read future
struct FfprobeSession {
    path: PathBuf,
    ffprobe_path: PathBuf,
    timeout: Duration,
}

#[async_trait]
impl ProbeSession for FfprobeSession {
    async fn read_metadata(&mut self) -> Result<RawMetadata, ProbeError> {
        let reference = self.path.to_string_lossy().to_string();
        let unreadable = |message: String| ProbeError::Unreadable {
            reference: reference.clone(),
            message,
        };

        let mut cmd = ToolCommand::new(self.ffprobe_path.clone(), self.timeout);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(reference.as_str());

        let output = cmd.execute().await.map_err(unreadable)?;
        parse_ffprobe_json(&output.stdout).map_err(unreadable)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    duration: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    side_data_type: Option<String>,
    rotation: Option<serde_json::Value>,
}

/// Map ffprobe JSON output to raw metadata.
///
/// Duration comes from the container, falling back to the first video
/// stream. Rotation comes from the legacy `rotate` tag (clockwise) or the
/// display matrix side data (counter-clockwise, so negated).
pub fn parse_ffprobe_json(json: &str) -> Result<RawMetadata, String> {
    let output: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| format!("ffprobe JSON parse error: {}", e))?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| "no video stream".to_string())?;

    let duration = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_decimal_seconds)
        .or_else(|| video.duration.as_deref().and_then(parse_decimal_seconds));

    let rotation = video
        .tags
        .rotate
        .as_deref()
        .and_then(|r| r.trim().parse::<i32>().ok())
        .or_else(|| {
            video
                .side_data_list
                .iter()
                .filter(|sd| sd.side_data_type.as_deref() == Some("Display Matrix"))
                .find_map(|sd| sd.rotation.as_ref().and_then(json_degrees))
                .map(|ccw| -ccw)
        });

    Ok(RawMetadata {
        duration,
        width: video.width,
        height: video.height,
        rotation,
    })
}

fn json_degrees(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .or_else(|| n.as_f64().map(|v| v.round() as i32)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
