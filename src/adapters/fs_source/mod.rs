// Directory segment source - a project is a directory of clips

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::domain::errors::SourceError;
use crate::domain::model::Segment;
use crate::ports::SegmentSource;

/// Extensions picked up when none are configured
pub const DEFAULT_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "mkv", "webm"];

/// Lists the media files of `root/<project>`, ordered by file name.
///
/// An empty or `.` project name means `root` itself.
#[derive(Debug, Clone)]
pub struct DirectorySegmentSource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirectorySegmentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn with_extensions(mut self, extensions: &[String]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_ascii_lowercase()).collect();
        self
    }

    fn project_dir(&self, project: &str) -> PathBuf {
        match project.trim() {
            "" | "." => self.root.clone(),
            name => self.root.join(name),
        }
    }
}

/// Collect matching files directly under `dir`, sorted by file name
pub fn list_segments(dir: &Path, extensions: &[String]) -> Result<Vec<Segment>, String> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| e.to_string())?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_ascii_lowercase();
                extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(files
        .into_iter()
        .enumerate()
        .map(|(order, path)| {
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("segment-{}", order));
            Segment::new(id, order as u32, path.to_string_lossy().to_string())
        })
        .collect())
}

#[async_trait]
impl SegmentSource for DirectorySegmentSource {
    async fn segments(&self, project: &str) -> Result<Vec<Segment>, SourceError> {
        let dir = self.project_dir(project);
        let extensions = self.extensions.clone();
        let error = |message: String| SourceError {
            project: project.to_string(),
            message,
        };

        if !tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(error(format!("{} is not a directory", dir.display())));
        }

        tokio::task::spawn_blocking(move || list_segments(&dir, &extensions))
            .await
            .map_err(|e| error(e.to_string()))?
            .map_err(error)
    }
}
