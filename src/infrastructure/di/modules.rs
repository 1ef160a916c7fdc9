//! Service wiring module
//!
//! Wires the application services over the resolved provider container
//! through a shaku module, so the `find_code` facade resolves as an
//! interface and tests can override it with a double via
//! `with_component_override`.

use std::sync::Arc;

use shaku::module;
use tokio_util::sync::CancellationToken;

use crate::application::context::{ContextEngine, ContextEngineParameters};
use crate::application::indexer::Indexer;
use crate::application::search::SearchPipeline;
use crate::domain::chunking::Chunker;
use crate::domain::error::Result;
use crate::domain::grammar::GrammarRegistry;
use crate::infrastructure::checkpoint::CheckpointStore;
use crate::infrastructure::di::ProviderContainer;
use crate::infrastructure::manifest::ManifestStore;

module! {
    // Application services over the provider container
    pub EngineModule {
        components = [ContextEngine],
        providers = []
    }
}

/// The wired engine plus direct handles for flows that need the concrete
/// services (watch mode, reconciliation)
pub struct EngineParts {
    pub module: EngineModule,
    pub indexer: Arc<Indexer>,
    pub search: Arc<SearchPipeline>,
}

/// Wire manifest, checkpoint, chunker, and the pipelines over a built
/// provider container.
pub fn build_engine(container: &ProviderContainer, cancel: CancellationToken) -> Result<EngineParts> {
    let settings = container.settings().clone();
    std::fs::create_dir_all(settings.state_dir())?;

    let manifest = Arc::new(ManifestStore::load_or_create(
        settings.manifest_path(),
        &settings.project_root,
    )?);
    let checkpoints = Arc::new(CheckpointStore::new(settings.checkpoint_path()));

    let registry = Arc::new(GrammarRegistry::with_rules(
        settings.chunker.grammar_rules.clone(),
    ));
    let mut chunker_config = settings.chunker.chunker_config();
    // The governor's token cap never exceeds the embedder's input limit
    chunker_config.max_tokens = chunker_config
        .max_tokens
        .min(container.embedding().capabilities().max_input_tokens);
    let chunker = Arc::new(Chunker::new(registry, chunker_config));

    let indexer = Arc::new(Indexer::new(
        settings.clone(),
        chunker,
        manifest.clone(),
        checkpoints,
        container.embedding(),
        container.sparse(),
        container.vector_store(),
        container.breakers(),
        cancel,
    ));
    let search = Arc::new(SearchPipeline::new(
        settings,
        container.embedding(),
        container.sparse(),
        container.reranking(),
        container.vector_store(),
        manifest,
        container.breakers(),
    ));

    let module = EngineModule::builder()
        .with_component_parameters::<ContextEngine>(ContextEngineParameters {
            search: search.clone(),
            indexer: indexer.clone(),
        })
        .build();

    Ok(EngineParts {
        module,
        indexer,
        search,
    })
}
