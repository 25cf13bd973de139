// In-memory adapters - Instrumented probe, merge and store collaborators

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

#[derive(Debug, Clone)]
enum ProbeEntry {
    Raw(RawMetadata),
    Unreadable(String),
}

#[derive(Debug, Default)]
struct SessionCounters {
    opened: AtomicUsize,
    released: AtomicUsize,
}

/// Probe port backed by a reference-to-metadata table.
///
/// Counts opened and released sessions so tests can assert that no probe
/// resource outlives its call.
#[derive(Debug, Default)]
pub struct InMemoryProbe {
    entries: Mutex<HashMap<String, ProbeEntry>>,
    counters: Arc<SessionCounters>,
    delay: Duration,
}

impl InMemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every metadata read
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Register a portrait 1080x1920 segment of `duration` ticks
    pub fn insert_segment(&self, reference: &str, duration: Tick) {
        self.insert_raw(
            reference,
            RawMetadata {
                duration: Some(duration),
                width: Some(1080),
                height: Some(1920),
                rotation: Some(0),
            },
        );
    }

    pub fn insert_raw(&self, reference: &str, raw: RawMetadata) {
        self.entries
            .lock()
            .insert(reference.to_string(), ProbeEntry::Raw(raw));
    }

    /// Register a reference that opens but fails to read
    pub fn insert_unreadable(&self, reference: &str, message: &str) {
        self.entries
            .lock()
            .insert(reference.to_string(), ProbeEntry::Unreadable(message.to_string()));
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet released
    pub fn open_sessions(&self) -> usize {
        self.opened() - self.counters.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbePort for InMemoryProbe {
    async fn open(&self, content: &ContentRef) -> Result<Box<dyn ProbeSession>, ProbeError> {
        let entry = self
            .entries
            .lock()
            .get(content.as_str())
            .cloned()
            .ok_or_else(|| ProbeError::NotFound {
                reference: content.to_string(),
            })?;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryProbeSession {
            reference: content.to_string(),
            entry,
            delay: self.delay,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct InMemoryProbeSession {
    reference: String,
    entry: ProbeEntry,
    delay: Duration,
    counters: Arc<SessionCounters>,
}

#[async_trait]
impl ProbeSession for InMemoryProbeSession {
    async fn read_metadata(&mut self) -> Result<RawMetadata, ProbeError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.entry {
            ProbeEntry::Raw(raw) => Ok(*raw),
            ProbeEntry::Unreadable(message) => Err(ProbeError::Unreadable {
                reference: self.reference.clone(),
                message: message.clone(),
            }),
        }
    }
}

impl Drop for InMemoryProbeSession {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Contents of one stored artifact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Segment references in playback order
    pub contents: Vec<ContentRef>,
    pub duration: Tick,
    pub written: bool,
}

#[derive(Debug, Default)]
struct StoreCounters {
    created_intermediate: usize,
    created_final: usize,
    deleted_intermediate: usize,
    deleted_final: usize,
    peak_live_intermediates: usize,
}

/// Artifact store keeping artifacts in a map, with create/delete counters
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: Mutex<HashMap<ArtifactId, (ArtifactHandle, StoredArtifact)>>,
    counters: Mutex<StoreCounters>,
    next_id: AtomicU64,
    fail_create_after: Option<usize>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `create` after the first `count` succeed
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_create_after = Some(count);
        self
    }

    pub fn live_count(&self) -> usize {
        self.artifacts.lock().len()
    }

    pub fn live_intermediates(&self) -> usize {
        self.artifacts
            .lock()
            .values()
            .filter(|(handle, _)| handle.role == ArtifactRole::Intermediate)
            .count()
    }

    pub fn created(&self, role: ArtifactRole) -> usize {
        let counters = self.counters.lock();
        match role {
            ArtifactRole::Intermediate => counters.created_intermediate,
            ArtifactRole::Final => counters.created_final,
        }
    }

    pub fn deleted(&self, role: ArtifactRole) -> usize {
        let counters = self.counters.lock();
        match role {
            ArtifactRole::Intermediate => counters.deleted_intermediate,
            ArtifactRole::Final => counters.deleted_final,
        }
    }

    pub fn peak_live_intermediates(&self) -> usize {
        self.counters.lock().peak_live_intermediates
    }

    pub fn get(&self, id: ArtifactId) -> Option<StoredArtifact> {
        self.artifacts.lock().get(&id).map(|(_, stored)| stored.clone())
    }

    fn write(&self, id: ArtifactId, stored: StoredArtifact) -> bool {
        match self.artifacts.lock().get_mut(&id) {
            Some(entry) => {
                entry.1 = stored;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ArtifactStorePort for InMemoryArtifactStore {
    async fn create(&self, role: ArtifactRole, label: &str) -> Result<ArtifactHandle, StoreError> {
        let created = self.created(ArtifactRole::Intermediate) + self.created(ArtifactRole::Final);
        if self.fail_create_after.is_some_and(|limit| created >= limit) {
            return Err(StoreError::Create {
                label: label.to_string(),
                message: "storage quota exhausted".to_string(),
            });
        }

        let id = ArtifactId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let role_name = match role {
            ArtifactRole::Intermediate => "intermediate",
            ArtifactRole::Final => "final",
        };
        let handle = ArtifactHandle {
            id,
            location: format!("mem://{}/{}-{}", role_name, id.0, label),
            role,
        };

        let mut artifacts = self.artifacts.lock();
        artifacts.insert(id, (handle.clone(), StoredArtifact::default()));
        let live_intermediates = artifacts
            .values()
            .filter(|(h, _)| h.role == ArtifactRole::Intermediate)
            .count();
        drop(artifacts);

        let mut counters = self.counters.lock();
        match role {
            ArtifactRole::Intermediate => counters.created_intermediate += 1,
            ArtifactRole::Final => counters.created_final += 1,
        }
        counters.peak_live_intermediates = counters.peak_live_intermediates.max(live_intermediates);
        Ok(handle)
    }

    async fn delete(&self, artifact: &ArtifactHandle) -> Result<(), StoreError> {
        if self.artifacts.lock().remove(&artifact.id).is_some() {
            let mut counters = self.counters.lock();
            match artifact.role {
                ArtifactRole::Intermediate => counters.deleted_intermediate += 1,
                ArtifactRole::Final => counters.deleted_final += 1,
            }
        }
        Ok(())
    }
}

/// Merge port that concatenates reference lists inside the in-memory store.
///
/// Merging from an artifact that was already deleted is rejected, so a
/// builder that folds out of order fails loudly.
#[derive(Debug)]
pub struct InMemoryMerge {
    store: Arc<InMemoryArtifactStore>,
    representation: ArtifactRepresentation,
    merge_calls: AtomicUsize,
    fail_on_call: Option<usize>,
    delay: Duration,
    reported_skew: Tick,
}

impl InMemoryMerge {
    pub fn new(store: Arc<InMemoryArtifactStore>) -> Self {
        Self {
            store,
            representation: ArtifactRepresentation::Lazy,
            merge_calls: AtomicUsize::new(0),
            fail_on_call: None,
            delay: Duration::ZERO,
            reported_skew: 0,
        }
    }

    /// Fail the `call`-th merge (1-based)
    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Sleep this long inside every merge
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Add `skew` ticks to every reported duration
    pub fn with_reported_skew(mut self, skew: Tick) -> Self {
        self.reported_skew = skew;
        self
    }

    pub fn merge_calls(&self) -> usize {
        self.merge_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MergePort for InMemoryMerge {
    async fn merge(
        &self,
        sources: &[MergeSource],
        output: &ArtifactHandle,
    ) -> Result<MergeOutcome, MergeError> {
        let call = self.merge_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on_call == Some(call) {
            return Err(MergeError::Tool(format!("injected failure on merge {}", call)));
        }
        if sources.is_empty() {
            return Err(MergeError::InvalidInput("no merge sources".to_string()));
        }

        let mut merged = StoredArtifact::default();
        for source in sources {
            match source {
                MergeSource::Segment { content, duration } => {
                    merged.contents.push(content.clone());
                    merged.duration += duration;
                }
                MergeSource::Artifact(handle) => {
                    let stored = self.store.get(handle.id).ok_or_else(|| {
                        MergeError::InvalidInput(format!("{} no longer exists", handle.location))
                    })?;
                    if !stored.written {
                        return Err(MergeError::InvalidInput(format!(
                            "{} was never written",
                            handle.location
                        )));
                    }
                    merged.contents.extend(stored.contents);
                    merged.duration += stored.duration;
                }
            }
        }
        merged.written = true;

        let duration = merged.duration + self.reported_skew;
        if !self.store.write(output.id, merged) {
            return Err(MergeError::Io(format!("{} does not exist", output.location)));
        }
        Ok(MergeOutcome {
            representation: self.representation,
            duration: Some(duration),
        })
    }

    async fn materialize(&self, artifact: &ArtifactHandle) -> Result<MergeOutcome, MergeError> {
        let stored = self
            .store
            .get(artifact.id)
            .ok_or_else(|| MergeError::InvalidInput(format!("{} missing", artifact.location)))?;
        Ok(MergeOutcome {
            representation: ArtifactRepresentation::Materialized,
            duration: Some(stored.duration + self.reported_skew),
        })
    }
}

/// Segment source serving fixed lists per project
#[derive(Debug, Default)]
pub struct InMemorySegmentSource {
    projects: Mutex<HashMap<String, Vec<Segment>>>,
}

impl InMemorySegmentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, project: &str, segments: Vec<Segment>) {
        self.projects.lock().insert(project.to_string(), segments);
    }
}

#[async_trait]
impl SegmentSource for InMemorySegmentSource {
    async fn segments(&self, project: &str) -> Result<Vec<Segment>, SourceError> {
        self.projects
            .lock()
            .get(project)
            .cloned()
            .ok_or_else(|| SourceError {
                project: project.to_string(),
                message: "unknown project".to_string(),
            })
    }
}

/// Register `durations.len()` segments with `probe`; indices in `failing`
/// are registered as unreadable
pub fn seed_segments(probe: &InMemoryProbe, durations: &[Tick], failing: &[usize]) -> Vec<Segment> {
    durations
        .iter()
        .enumerate()
        .map(|(i, &duration)| {
            let reference = format!("mem://segments/{:04}.mp4", i);
            if failing.contains(&i) {
                probe.insert_unreadable(&reference, "corrupt sample table");
            } else {
                probe.insert_segment(&reference, duration);
            }
            Segment::new(format!("seg-{:04}", i), i as u32, reference).with_duration_hint(duration)
        })
        .collect()
}
