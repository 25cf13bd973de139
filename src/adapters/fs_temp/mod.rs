// Temp-directory artifact store - intermediates live in a scratch directory
// that disappears with the store, finals go to the configured output path

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;
use tracing::debug;

use crate::domain::errors::StoreError;
use crate::domain::model::{ArtifactHandle, ArtifactId, ArtifactRole};
use crate::ports::ArtifactStorePort;

/// Filesystem artifact store
pub struct TempArtifactStore {
    scratch: TempDir,
    output: Option<PathBuf>,
    extension: String,
    next_id: AtomicU64,
}

impl TempArtifactStore {
    /// Create the scratch directory under `work_dir`, or the system temp dir
    pub fn new(
        work_dir: Option<&Path>,
        output: Option<PathBuf>,
        extension: impl Into<String>,
    ) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("reelstitch-");
        let scratch = match work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %scratch.path().display(), "created scratch directory");

        Ok(Self {
            scratch,
            output,
            extension: extension.into(),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    fn location(&self, id: ArtifactId, role: ArtifactRole, label: &str) -> PathBuf {
        match (role, &self.output) {
            (ArtifactRole::Final, Some(output)) => output.clone(),
            _ => self
                .scratch
                .path()
                .join(format!("{:05}-{}.{}", id.0, sanitize_label(label), self.extension)),
        }
    }
}

/// Keep labels safe for use as file names
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ArtifactStorePort for TempArtifactStore {
    async fn create(&self, role: ArtifactRole, label: &str) -> Result<ArtifactHandle, StoreError> {
        let id = ArtifactId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let path = self.location(id, role, label);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Create {
                    label: label.to_string(),
                    message: format!("{}: {}", parent.display(), e),
                })?;
        }

        Ok(ArtifactHandle {
            id,
            location: path.to_string_lossy().to_string(),
            role,
        })
    }

    async fn delete(&self, artifact: &ArtifactHandle) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&artifact.location).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Delete {
                location: artifact.location.clone(),
                message: e.to_string(),
            }),
        }
    }
}
