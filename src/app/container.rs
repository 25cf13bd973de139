use std::sync::Arc;

use crate::adapters::{
    ComposerConfig, DirectorySegmentSource, FfmpegConcatAdapter, FfprobeAdapter,
    TempArtifactStore,
};
use crate::app::compose_interactor::ComposeInteractor;
use crate::engine::CompositionBuilder;
use crate::error::ComposerResult;
use crate::ports::{ArtifactStorePort, MergePort, ProbePort, SegmentSource};
use crate::utils::ResourceBudgetManager;

pub trait AppContainer: Send + Sync {
    fn compose_interactor(&self) -> Arc<ComposeInteractor>;
    fn budget(&self) -> Arc<ResourceBudgetManager>;
}

pub struct DefaultAppContainer {
    compose_interactor: Arc<ComposeInteractor>,
    budget: Arc<ResourceBudgetManager>,
}

impl DefaultAppContainer {
    /// Wire the ffprobe/ffmpeg adapters, the temp store and the budget
    pub fn from_config(config: &ComposerConfig) -> ComposerResult<Self> {
        config.validate()?;

        let budget = Arc::new(ResourceBudgetManager::new(config.budget.clone()));
        let ffprobe = FfprobeAdapter::new(&config.probe);
        let mut merge = FfmpegConcatAdapter::new(&config.merge);
        if config.merge.verify_duration {
            merge = merge.with_verifier(ffprobe.clone());
        }
        let store = TempArtifactStore::new(
            config.merge.work_dir.as_deref(),
            config.merge.output.clone(),
            config.merge.extension.clone(),
        )?;
        let source = DirectorySegmentSource::new(config.source.root.clone())
            .with_extensions(&config.source.extensions);

        let builder = Arc::new(CompositionBuilder::new(
            Arc::new(ffprobe) as Arc<dyn ProbePort>,
            Arc::new(merge) as Arc<dyn MergePort>,
            Arc::new(store) as Arc<dyn ArtifactStorePort>,
            Arc::clone(&budget),
            config.builder_config(),
        ));

        Ok(Self {
            compose_interactor: Arc::new(ComposeInteractor::new(
                builder,
                Arc::new(source) as Arc<dyn SegmentSource>,
            )),
            budget,
        })
    }
}

impl AppContainer for DefaultAppContainer {
    fn compose_interactor(&self) -> Arc<ComposeInteractor> {
        Arc::clone(&self.compose_interactor)
    }

    fn budget(&self) -> Arc<ResourceBudgetManager> {
        Arc::clone(&self.budget)
    }
}
