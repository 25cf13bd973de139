// Compose interactor - One active build per project, playback loading

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::errors::BuildError;
use crate::domain::model::*;
use crate::engine::{CompositionBuilder, ProgressCallback};
use crate::error::ComposerResult;
use crate::playback::PlaybackPositionSync;
use crate::ports::SegmentSource;

/// Per-project build slot
struct ProjectSlot {
    /// Held for the whole build, so a successor waits until cleanup is done
    gate: tokio::sync::Mutex<()>,
    /// Generation and token of the most recent request
    active: Mutex<Option<(u64, CancellationToken)>>,
    playback: Arc<PlaybackPositionSync>,
}

impl ProjectSlot {
    fn new() -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
            playback: Arc::new(PlaybackPositionSync::new()),
        }
    }
}

/// Clears the slot's active entry when its request ends, dropped futures included
struct ActiveBuild {
    slot: Arc<ProjectSlot>,
    generation: u64,
}

impl Drop for ActiveBuild {
    fn drop(&mut self) {
        let mut active = self.slot.active.lock();
        if active.as_ref().is_some_and(|(g, _)| *g == self.generation) {
            *active = None;
        }
    }
}

/// Interactor for the compose use case
pub struct ComposeInteractor {
    builder: Arc<CompositionBuilder>,
    source: Arc<dyn SegmentSource>,
    projects: Mutex<HashMap<String, Arc<ProjectSlot>>>,
    generation: Mutex<u64>,
}

impl ComposeInteractor {
    pub fn new(builder: Arc<CompositionBuilder>, source: Arc<dyn SegmentSource>) -> Self {
        Self {
            builder,
            source,
            projects: Mutex::new(HashMap::new()),
            generation: Mutex::new(0),
        }
    }

    pub fn builder(&self) -> &Arc<CompositionBuilder> {
        &self.builder
    }

    fn slot(&self, project: &str) -> Arc<ProjectSlot> {
        Arc::clone(
            self.projects
                .lock()
                .entry(project.to_string())
                .or_insert_with(|| Arc::new(ProjectSlot::new())),
        )
    }

    /// List the project's segments through the segment source, then build
    pub async fn compose(
        &self,
        project: &str,
        progress: &dyn ProgressCallback,
    ) -> ComposerResult<Composition> {
        let segments = self.source.segments(project).await?;
        info!(project, segments = segments.len(), "segments listed");
        Ok(self.compose_segments(project, &segments, progress).await?)
    }

    /// Build `segments` for `project`.
    ///
    /// Any build already running for the project is cancelled and fully
    /// unwound before this one starts. A request superseded while waiting
    /// returns `BuildError::Cancelled` without building.
    pub async fn compose_segments(
        &self,
        project: &str,
        segments: &[Segment],
        progress: &dyn ProgressCallback,
    ) -> Result<Composition, BuildError> {
        let slot = self.slot(project);
        let token = CancellationToken::new();
        let generation = {
            let mut counter = self.generation.lock();
            *counter += 1;
            *counter
        };

        if let Some((_, previous)) = slot.active.lock().replace((generation, token.clone())) {
            debug!(project, "cancelling in-flight build");
            previous.cancel();
        }
        let active = ActiveBuild {
            slot: Arc::clone(&slot),
            generation,
        };

        let result = {
            let _gate = slot.gate.lock().await;
            if token.is_cancelled() {
                Err(BuildError::Cancelled)
            } else {
                self.builder.build(segments, progress, &token).await
            }
        };
        drop(active);

        if let Ok(composition) = &result {
            slot.playback
                .load(Arc::clone(&composition.artifact.time_ranges));
            debug!(project, ranges = composition.artifact.segment_count(), "playback table loaded");
        }
        result
    }

    /// Cancel the in-flight build of `project`. Returns whether one was running.
    pub fn cancel(&self, project: &str) -> bool {
        let slot = match self.projects.lock().get(project) {
            Some(slot) => Arc::clone(slot),
            None => return false,
        };
        let active = slot.active.lock();
        match active.as_ref() {
            Some((_, token)) => {
                info!(project, "build cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight build
    pub fn cancel_all(&self) {
        let slots: Vec<Arc<ProjectSlot>> = self.projects.lock().values().cloned().collect();
        for slot in slots {
            if let Some((_, token)) = slot.active.lock().as_ref() {
                token.cancel();
            }
        }
    }

    pub fn is_building(&self, project: &str) -> bool {
        self.projects
            .lock()
            .get(project)
            .is_some_and(|slot| slot.active.lock().is_some())
    }

    /// Time ranges of a built artifact
    pub fn get_time_ranges(&self, artifact: &CompositionArtifact) -> Arc<TimeRangeTable> {
        Arc::clone(&artifact.time_ranges)
    }

    /// Position mapping for the composition last loaded into `project`
    pub fn playback(&self, project: &str) -> Arc<PlaybackPositionSync> {
        Arc::clone(&self.slot(project).playback)
    }
}
