//! Ownership of artifacts created during one build

use std::mem;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::domain::errors::StoreError;
use crate::domain::model::{ArtifactHandle, ArtifactId, ArtifactRole};
use crate::ports::ArtifactStorePort;
use crate::utils::resource_budget::{IntermediateLease, ResourceBudgetManager};

struct TrackedArtifact {
    handle: ArtifactHandle,
    _lease: Option<IntermediateLease>,
}

/// Owns every artifact a build created until it is folded, released to the
/// caller, or deleted.
///
/// `drain` is the cooperative cleanup path. If the tracker is dropped with
/// artifacts still live (the build future itself was dropped), deletion is
/// spawned on the current runtime.
pub struct IntermediateTracker {
    store: Arc<dyn ArtifactStorePort>,
    budget: Arc<ResourceBudgetManager>,
    live: Vec<TrackedArtifact>,
    peak_intermediates: usize,
}

impl IntermediateTracker {
    pub fn new(store: Arc<dyn ArtifactStorePort>, budget: Arc<ResourceBudgetManager>) -> Self {
        Self {
            store,
            budget,
            live: Vec::new(),
            peak_intermediates: 0,
        }
    }

    /// Create an artifact through the store and take ownership of it
    pub async fn create(
        &mut self,
        role: ArtifactRole,
        label: &str,
    ) -> Result<ArtifactHandle, StoreError> {
        let handle = self.store.create(role, label).await?;
        let lease = match role {
            ArtifactRole::Intermediate => Some(self.budget.track_intermediate()),
            ArtifactRole::Final => None,
        };
        self.live.push(TrackedArtifact {
            handle: handle.clone(),
            _lease: lease,
        });
        self.peak_intermediates = self.peak_intermediates.max(self.live_intermediates());
        debug!(artifact = %handle.id, ?role, location = %handle.location, "artifact created");
        Ok(handle)
    }

    /// Delete an artifact that has been folded into its parent.
    ///
    /// On failure the artifact stays tracked so `drain` retries it.
    pub async fn discard(&mut self, id: ArtifactId) {
        let Some(position) = self.live.iter().position(|t| t.handle.id == id) else {
            return;
        };
        match self.store.delete(&self.live[position].handle).await {
            Ok(()) => {
                let tracked = self.live.remove(position);
                debug!(artifact = %tracked.handle.id, "artifact deleted");
            }
            Err(err) => warn!(artifact = %id, error = %err, "failed to delete artifact, will retry"),
        }
    }

    /// Stop tracking an artifact and hand it to the caller
    pub fn release(&mut self, id: ArtifactId) -> Option<ArtifactHandle> {
        let position = self.live.iter().position(|t| t.handle.id == id)?;
        Some(self.live.remove(position).handle)
    }

    /// Delete everything still tracked. Returns how many deletions failed.
    pub async fn drain(&mut self) -> usize {
        let mut failed = 0;
        for tracked in mem::take(&mut self.live) {
            if let Err(err) = self.store.delete(&tracked.handle).await {
                error!(artifact = %tracked.handle.id, error = %err, "artifact leaked during cleanup");
                failed += 1;
            }
        }
        failed
    }

    pub fn live_intermediates(&self) -> usize {
        self.live
            .iter()
            .filter(|t| t.handle.role == ArtifactRole::Intermediate)
            .count()
    }

    pub fn peak_intermediates(&self) -> usize {
        self.peak_intermediates
    }
}

impl Drop for IntermediateTracker {
    fn drop(&mut self) {
        if self.live.is_empty() {
            return;
        }
        let orphans = mem::take(&mut self.live);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(count = orphans.len(), "build dropped mid-flight, scheduling artifact cleanup");
                let store = Arc::clone(&self.store);
                runtime.spawn(async move {
                    for tracked in orphans {
                        if let Err(err) = store.delete(&tracked.handle).await {
                            error!(artifact = %tracked.handle.id, error = %err, "artifact leaked");
                        }
                    }
                });
            }
            Err(_) => error!(
                count = orphans.len(),
                "no runtime available, intermediate artifacts leaked"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryArtifactStore;
    use crate::utils::resource_budget::{BudgetConfig, HostCapability};

    fn parts() -> (Arc<InMemoryArtifactStore>, Arc<ResourceBudgetManager>) {
        let budget = ResourceBudgetManager::with_capability(
            BudgetConfig::default(),
            HostCapability {
                cpu_count: 4,
                total_memory_bytes: None,
                available_memory_bytes: None,
                open_file_limit: None,
            },
        );
        (Arc::new(InMemoryArtifactStore::new()), Arc::new(budget))
    }

    #[tokio::test]
    async fn test_discard_and_peak() {
        let (store, budget) = parts();
        let mut tracker = IntermediateTracker::new(store.clone(), budget.clone());

        let a = tracker.create(ArtifactRole::Intermediate, "a").await.unwrap();
        let b = tracker.create(ArtifactRole::Intermediate, "b").await.unwrap();
        assert_eq!(budget.live_intermediates(), 2);

        tracker.discard(a.id).await;
        tracker.discard(b.id).await;

        assert_eq!(tracker.live_intermediates(), 0);
        assert_eq!(tracker.peak_intermediates(), 2);
        assert_eq!(budget.live_intermediates(), 0);
        assert_eq!(store.live_intermediates(), 0);
    }

    #[tokio::test]
    async fn test_release_keeps_final_artifact() {
        let (store, budget) = parts();
        let mut tracker = IntermediateTracker::new(store.clone(), budget);

        let out = tracker.create(ArtifactRole::Final, "out").await.unwrap();
        let released = tracker.release(out.id);
        assert_eq!(released, Some(out));
        assert_eq!(tracker.drain().await, 0);
        assert_eq!(store.live_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_schedules_cleanup() {
        let (store, budget) = parts();
        {
            let mut tracker = IntermediateTracker::new(store.clone(), budget.clone());
            tracker.create(ArtifactRole::Intermediate, "x").await.unwrap();
            tracker.create(ArtifactRole::Final, "y").await.unwrap();
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.live_count(), 0);
        assert_eq!(budget.live_intermediates(), 0);
    }
}
