//! Per-segment media probing

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::errors::ProbeError;
use crate::domain::model::{ContentRef, MediaMetadata, ProbeResult, Segment, SkipReason};
use crate::ports::ProbePort;
use crate::utils::resource_budget::ResourceBudgetManager;

pub mod validator;

pub use validator::MetadataValidator;

/// Extracts duration, dimensions and rotation for one segment.
///
/// Holds no long-lived state. Each call opens a session through the probe
/// port, reads it once and releases it. The session and the budget lease
/// are both scoped to the call future, so dropping that future (for example
/// on cancellation) releases them too. No retries.
#[derive(Clone)]
pub struct DurationProbe {
    port: Arc<dyn ProbePort>,
    budget: Arc<ResourceBudgetManager>,
}

impl DurationProbe {
    pub fn new(port: Arc<dyn ProbePort>, budget: Arc<ResourceBudgetManager>) -> Self {
        Self { port, budget }
    }

    /// Probe one segment. Never fails; failures are carried in the result.
    pub async fn probe(&self, segment: &Segment) -> ProbeResult {
        if segment.content.is_blank() {
            return ProbeResult::Skipped {
                reason: SkipReason::EmptyReference,
            };
        }

        match self.inspect(&segment.content).await {
            Ok(metadata) => ProbeResult::Success(metadata),
            Err(err) => {
                debug!(segment_id = %segment.id, kind = err.kind(), "probe failed");
                ProbeResult::Failed(err)
            }
        }
    }

    /// Like [`probe`](Self::probe), yielding `Skipped{Cancelled}` as soon as
    /// `cancel` fires
    pub async fn probe_cancellable(
        &self,
        segment: &Segment,
        cancel: &CancellationToken,
    ) -> ProbeResult {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ProbeResult::Skipped { reason: SkipReason::Cancelled },
            result = self.probe(segment) => result,
        }
    }

    /// Open, read and validate one content reference
    pub async fn inspect(&self, content: &ContentRef) -> Result<MediaMetadata, ProbeError> {
        let _lease = self.budget.acquire_probe();
        let raw = {
            let mut session = self.port.open(content).await?;
            session.read_metadata().await?
        };
        MetadataValidator::validate(content, &raw)
    }
}
