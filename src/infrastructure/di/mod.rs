//! Provider container
//!
//! Registers named factories for each capability interface and resolves
//! the configured providers at startup. Resolution caches singletons (the
//! container holds one instance per capability); per-call instances come
//! from `fresh_*`. Tests substitute doubles through the builder's
//! override hooks. Startup runs each provider's capability probe and
//! never hides initialization failures; shutdown calls close hooks in
//! reverse registration order.

pub mod modules;

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::providers::embedding::{HttpEmbeddingProvider, NullEmbeddingProvider};
use crate::adapters::providers::reranking::{HttpRerankingProvider, NullRerankingProvider};
use crate::adapters::providers::sparse::Bm25SparseEmbedder;
use crate::adapters::providers::vector_store::{FilesystemVectorStore, InMemoryVectorStore};
use crate::domain::error::{Error, Result};
use crate::domain::ports::{
    EmbeddingProvider, RerankingProvider, SparseEmbeddingProvider, VectorStoreProvider,
};
use crate::infrastructure::config::Settings;
use crate::infrastructure::resilience::CircuitBreakerRegistry;

type Factory<T> = Arc<dyn Fn(&Settings) -> Result<Arc<T>> + Send + Sync>;

/// Named factories per capability interface
pub struct ProviderFactories {
    embedding: HashMap<String, Factory<dyn EmbeddingProvider>>,
    sparse: HashMap<String, Factory<dyn SparseEmbeddingProvider>>,
    reranking: HashMap<String, Factory<dyn RerankingProvider>>,
    vector_store: HashMap<String, Factory<dyn VectorStoreProvider>>,
}

impl ProviderFactories {
    /// The built-in provider registry
    pub fn builtin() -> Self {
        let mut factories = Self {
            embedding: HashMap::new(),
            sparse: HashMap::new(),
            reranking: HashMap::new(),
            vector_store: HashMap::new(),
        };

        factories.register_embedding("null", |settings| {
            Ok(Arc::new(NullEmbeddingProvider::new(
                settings.provider.embedding.model.clone(),
                settings.provider.embedding.dimensions.unwrap_or(384),
            )))
        });
        factories.register_embedding("openai-compatible", |settings| {
            Ok(Arc::new(HttpEmbeddingProvider::new(
                &settings.provider.embedding,
            )?))
        });

        factories.register_sparse("bm25", |settings| {
            let sparse_settings = settings
                .provider
                .sparse_embedding
                .clone()
                .unwrap_or_default();
            Ok(Arc::new(Bm25SparseEmbedder::new(&sparse_settings)))
        });

        factories.register_reranking("null", |settings| {
            let model = settings
                .provider
                .reranking
                .as_ref()
                .map(|r| r.model.clone())
                .unwrap_or_else(|| "null-rerank".to_string());
            Ok(Arc::new(NullRerankingProvider::new(model)))
        });
        factories.register_reranking("openai-compatible", |settings| {
            let reranking = settings.provider.reranking.as_ref().ok_or_else(|| {
                Error::configuration("provider.reranking section is required for HTTP reranking")
            })?;
            Ok(Arc::new(HttpRerankingProvider::new(reranking)?))
        });

        factories.register_vector_store("in-memory", |_| Ok(Arc::new(InMemoryVectorStore::new())));
        factories.register_vector_store("filesystem", |settings| {
            let root = settings
                .provider
                .vector_store
                .path
                .clone()
                .unwrap_or_else(|| settings.state_dir().join("vectors"));
            Ok(Arc::new(FilesystemVectorStore::new(root)))
        });

        factories
    }

    pub fn register_embedding<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Settings) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync + 'static,
    {
        self.embedding.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_sparse<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Settings) -> Result<Arc<dyn SparseEmbeddingProvider>> + Send + Sync + 'static,
    {
        self.sparse.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_reranking<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Settings) -> Result<Arc<dyn RerankingProvider>> + Send + Sync + 'static,
    {
        self.reranking.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_vector_store<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Settings) -> Result<Arc<dyn VectorStoreProvider>> + Send + Sync + 'static,
    {
        self.vector_store.insert(name.to_string(), Arc::new(factory));
    }

    fn resolve<T: ?Sized>(
        kind: &str,
        map: &HashMap<String, Factory<T>>,
        name: &str,
        settings: &Settings,
    ) -> Result<Arc<T>> {
        let factory = map.get(name).ok_or_else(|| {
            let mut known: Vec<&str> = map.keys().map(String::as_str).collect();
            known.sort();
            Error::configuration(format!(
                "unknown {kind} provider '{name}'; known providers: {}",
                known.join(", ")
            ))
        })?;
        factory(settings)
    }
}

impl Default for ProviderFactories {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Builds the container, with override hooks for tests
pub struct ContainerBuilder {
    settings: Settings,
    factories: ProviderFactories,
    embedding_override: Option<Arc<dyn EmbeddingProvider>>,
    sparse_override: Option<Arc<dyn SparseEmbeddingProvider>>,
    reranking_override: Option<Arc<dyn RerankingProvider>>,
    store_override: Option<Arc<dyn VectorStoreProvider>>,
    run_probes: bool,
}

impl ContainerBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            factories: ProviderFactories::builtin(),
            embedding_override: None,
            sparse_override: None,
            reranking_override: None,
            store_override: None,
            run_probes: true,
        }
    }

    /// Register an extra named factory set before resolution
    pub fn with_factories(mut self, factories: ProviderFactories) -> Self {
        self.factories = factories;
        self
    }

    /// Substitute the dense embedder (test hook)
    pub fn with_embedding(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_override = Some(provider);
        self
    }

    /// Substitute the sparse embedder (test hook)
    pub fn with_sparse(mut self, provider: Arc<dyn SparseEmbeddingProvider>) -> Self {
        self.sparse_override = Some(provider);
        self
    }

    /// Substitute the reranker (test hook)
    pub fn with_reranking(mut self, provider: Arc<dyn RerankingProvider>) -> Self {
        self.reranking_override = Some(provider);
        self
    }

    /// Substitute the vector store (test hook)
    pub fn with_vector_store(mut self, provider: Arc<dyn VectorStoreProvider>) -> Self {
        self.store_override = Some(provider);
        self
    }

    /// Skip startup probes, for offline construction in tests
    pub fn without_probes(mut self) -> Self {
        self.run_probes = false;
        self
    }

    /// Resolve all configured providers and run their capability probes
    pub async fn build(self) -> Result<ProviderContainer> {
        self.settings.ensure_valid()?;
        let settings = Arc::new(self.settings);

        let embedding = match self.embedding_override {
            Some(provider) => provider,
            None => ProviderFactories::resolve(
                "embedding",
                &self.factories.embedding,
                &settings.provider.embedding.provider,
                &settings,
            )?,
        };

        let sparse = match self.sparse_override {
            Some(provider) => Some(provider),
            None => match &settings.provider.sparse_embedding {
                Some(sparse_settings) => Some(ProviderFactories::resolve(
                    "sparse embedding",
                    &self.factories.sparse,
                    &sparse_settings.provider,
                    &settings,
                )?),
                None => None,
            },
        };

        let reranking = match self.reranking_override {
            Some(provider) => Some(provider),
            None => match &settings.provider.reranking {
                Some(reranking_settings) => Some(ProviderFactories::resolve(
                    "reranking",
                    &self.factories.reranking,
                    &reranking_settings.provider,
                    &settings,
                )?),
                None => None,
            },
        };

        let vector_store = match self.store_override {
            Some(provider) => provider,
            None => ProviderFactories::resolve(
                "vector store",
                &self.factories.vector_store,
                &settings.provider.vector_store.provider,
                &settings,
            )?,
        };

        if self.run_probes {
            vector_store.ensure_client().await?;
            embedding.health_check().await?;
            if let Some(sparse) = &sparse {
                sparse.health_check().await?;
            }
            if let Some(reranking) = &reranking {
                reranking.health_check().await?;
            }
        }

        tracing::info!(
            embedding = embedding.provider_name(),
            model = embedding.model_name(),
            sparse = sparse.as_ref().map(|s| s.provider_name()).unwrap_or("-"),
            reranking = reranking.as_ref().map(|r| r.provider_name()).unwrap_or("-"),
            vector_store = vector_store.provider_name(),
            "provider container ready"
        );

        Ok(ProviderContainer {
            settings,
            factories: self.factories,
            embedding,
            sparse,
            reranking,
            vector_store,
            breakers: Arc::new(CircuitBreakerRegistry::default()),
        })
    }
}

/// The resolved provider set; singletons cached for the process lifetime
pub struct ProviderContainer {
    settings: Arc<Settings>,
    factories: ProviderFactories,
    embedding: Arc<dyn EmbeddingProvider>,
    sparse: Option<Arc<dyn SparseEmbeddingProvider>>,
    reranking: Option<Arc<dyn RerankingProvider>>,
    vector_store: Arc<dyn VectorStoreProvider>,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl std::fmt::Debug for ProviderContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContainer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ProviderContainer {
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn embedding(&self) -> Arc<dyn EmbeddingProvider> {
        self.embedding.clone()
    }

    pub fn sparse(&self) -> Option<Arc<dyn SparseEmbeddingProvider>> {
        self.sparse.clone()
    }

    pub fn reranking(&self) -> Option<Arc<dyn RerankingProvider>> {
        self.reranking.clone()
    }

    pub fn vector_store(&self) -> Arc<dyn VectorStoreProvider> {
        self.vector_store.clone()
    }

    pub fn breakers(&self) -> Arc<CircuitBreakerRegistry> {
        self.breakers.clone()
    }

    /// A fresh, uncached embedder instance
    pub fn fresh_embedding(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        ProviderFactories::resolve(
            "embedding",
            &self.factories.embedding,
            &self.settings.provider.embedding.provider,
            &self.settings,
        )
    }

    /// Close providers in reverse registration order
    pub async fn shutdown(&self) {
        if let Err(err) = self.vector_store.close().await {
            tracing::warn!(%err, "vector store close failed");
        }
        if let Some(reranking) = &self.reranking {
            if let Err(err) = reranking.close().await {
                tracing::warn!(%err, "reranker close failed");
            }
        }
        if let Some(sparse) = &self.sparse {
            if let Err(err) = sparse.close().await {
                tracing::warn!(%err, "sparse embedder close failed");
            }
        }
        if let Err(err) = self.embedding.close().await {
            tracing::warn!(%err, "embedder close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_settings_resolve_null_and_in_memory() {
        let container = ContainerBuilder::new(Settings::default())
            .build()
            .await
            .unwrap();
        assert_eq!(container.embedding().provider_name(), "null");
        assert_eq!(container.vector_store().provider_name(), "in-memory");
        assert!(container.reranking().is_none());
        container.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_provider_names_fail_with_configuration() {
        let mut settings = Settings::default();
        settings.provider.embedding.provider = "martian".to_string();
        let err = ContainerBuilder::new(settings).build().await.unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("martian"));
    }

    #[tokio::test]
    async fn overrides_substitute_doubles() {
        let double = Arc::new(NullEmbeddingProvider::new("double", 16));
        let container = ContainerBuilder::new(Settings::default())
            .with_embedding(double.clone())
            .build()
            .await
            .unwrap();
        assert_eq!(container.embedding().capabilities().dimensions, 16);
        assert_eq!(container.embedding().model_name(), "double");
    }

    #[tokio::test]
    async fn sparse_resolves_when_configured() {
        let mut settings = Settings::default();
        settings.provider.sparse_embedding =
            Some(crate::infrastructure::config::SparseEmbeddingSettings::default());
        let container = ContainerBuilder::new(settings).build().await.unwrap();
        assert_eq!(container.sparse().unwrap().provider_name(), "bm25");
    }

    #[tokio::test]
    async fn fresh_instances_are_not_the_cached_singleton() {
        let container = ContainerBuilder::new(Settings::default())
            .build()
            .await
            .unwrap();
        let cached = container.embedding();
        let fresh = container.fresh_embedding().unwrap();
        assert!(!Arc::ptr_eq(&cached, &fresh));
    }
}
