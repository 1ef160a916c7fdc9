//! Shared test fixtures: an engine over a temp project with deterministic
//! providers and a shareable in-memory vector store.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use codescout::adapters::providers::vector_store::InMemoryVectorStore;
use codescout::domain::ports::VectorStoreProvider;
use codescout::infrastructure::config::{Settings, SparseEmbeddingSettings};
use codescout::infrastructure::di::modules::{build_engine, EngineParts};
use codescout::infrastructure::di::{ContainerBuilder, ProviderContainer};

/// Settings for a test project: null dense embedder, BM25 sparse, fast
/// retries.
pub fn test_settings(root: &Path, model: &str, dimensions: usize) -> Settings {
    let mut settings = Settings {
        project_root: root.to_path_buf(),
        ..Settings::default()
    };
    settings.provider.embedding.model = model.to_string();
    settings.provider.embedding.dimensions = Some(dimensions);
    settings.provider.sparse_embedding = Some(SparseEmbeddingSettings::default());
    settings.indexer.max_retries = 0;
    settings.indexer.retry_base_ms = 1;
    settings.indexer.provider_timeout_secs = 5;
    settings
}

/// Build a container + engine over an externally shared vector store, so
/// tests can rebuild the engine (config changes) against surviving data.
pub async fn engine_over(
    settings: Settings,
    store: Arc<dyn VectorStoreProvider>,
) -> (ProviderContainer, EngineParts) {
    let container = ContainerBuilder::new(settings)
        .with_vector_store(store)
        .build()
        .await
        .expect("container builds");
    let parts = build_engine(&container, CancellationToken::new()).expect("engine builds");
    (container, parts)
}

/// A fresh shareable in-memory store
pub fn shared_store() -> Arc<InMemoryVectorStore> {
    Arc::new(InMemoryVectorStore::new())
}

/// Write a file under the project root, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}
