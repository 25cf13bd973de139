// Ports - Interface definitions (contracts) for composition collaborators

use async_trait::async_trait;

use crate::domain::errors::*;
use crate::domain::model::*;

/// Port for opening a probing resource on one content reference.
///
/// `open` fails with `ProbeError::NotFound` when the reference is missing or
/// unreadable at open time. The returned session owns the underlying
/// resource and must release it in `Drop`, so release happens on every exit
/// path including cancellation of the awaiting future.
#[async_trait]
pub trait ProbePort: Send + Sync {
    async fn open(&self, content: &ContentRef) -> Result<Box<dyn ProbeSession>, ProbeError>;
}

/// An open probing resource
#[async_trait]
pub trait ProbeSession: Send {
    /// Read raw metadata. I/O or codec failures map to `ProbeError::Unreadable`.
    async fn read_metadata(&mut self) -> Result<RawMetadata, ProbeError>;
}

/// One input of a merge call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeSource {
    /// A probed segment, appended as-is
    Segment { content: ContentRef, duration: Tick },
    /// A prior artifact produced by an earlier merge
    Artifact(ArtifactHandle),
}

impl MergeSource {
    pub fn describe(&self) -> String {
        match self {
            MergeSource::Segment { content, .. } => content.to_string(),
            MergeSource::Artifact(handle) => handle.location.clone(),
        }
    }
}

/// Result of a merge or materialize call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub representation: ArtifactRepresentation,
    /// Duration of the output, when the primitive can tell
    pub duration: Option<Tick>,
}

/// Port for the merge primitive
#[async_trait]
pub trait MergePort: Send + Sync {
    /// Append `sources` in order into `output`, which was created empty by
    /// the artifact store.
    async fn merge(
        &self,
        sources: &[MergeSource],
        output: &ArtifactHandle,
    ) -> Result<MergeOutcome, MergeError>;

    /// Turn an artifact into its final playable/exportable form
    async fn materialize(&self, artifact: &ArtifactHandle) -> Result<MergeOutcome, MergeError>;
}

/// Port for intermediate and final artifact storage
#[async_trait]
pub trait ArtifactStorePort: Send + Sync {
    async fn create(&self, role: ArtifactRole, label: &str) -> Result<ArtifactHandle, StoreError>;

    /// Deleting an artifact that no longer exists is not an error
    async fn delete(&self, artifact: &ArtifactHandle) -> Result<(), StoreError>;
}

/// Port for the segment source of a project
#[async_trait]
pub trait SegmentSource: Send + Sync {
    async fn segments(&self, project: &str) -> Result<Vec<Segment>, SourceError>;
}
