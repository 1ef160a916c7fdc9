//! Configuration surface
//!
//! A hierarchical settings tree with one section per subsystem, loaded from
//! an optional TOML file layered under `CODESCOUT_`-prefixed environment
//! variables. Unknown options fail at startup with a configuration error;
//! settings are read once at container build time and never mutated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::chunking::{ChunkStrategy, ChunkerConfig};
use crate::domain::error::{Error, Result};
use crate::domain::grammar::LanguageRules;
use crate::infrastructure::manifest::ModelsInUse;

/// Root settings tree
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Project to index; defaults to the current directory
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// State directory for manifest and checkpoint; defaults to
    /// `<project_root>/.codescout`
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    #[validate(nested)]
    pub indexer: IndexerSettings,

    #[serde(default)]
    pub chunker: ChunkerSettings,

    #[validate(nested)]
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub watcher: WatcherSettings,

    #[serde(default)]
    #[validate(nested)]
    pub search: SearchSettings,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

/// `indexer` section
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct IndexerSettings {
    /// Include globs; empty means every discoverable file
    pub include: Vec<String>,
    /// Exclude globs, applied on top of gitignore rules
    pub exclude: Vec<String>,
    /// Chunking worker count; 0 means one per physical core
    pub chunking_workers: usize,
    /// Embedding/upsert worker count
    #[validate(range(min = 1, max = 64))]
    pub embedding_workers: usize,
    /// Capacity of the bounded channels between pipeline stages
    #[validate(range(min = 1))]
    pub channel_capacity: usize,
    /// Errors per phase logged at warning level; the rest log at debug
    pub max_warned_errors: usize,
    /// Chunk ids sampled for startup reconciliation
    pub reconcile_sample: usize,
    /// Missing-point ratio above which the collection is inconsistent
    #[validate(range(min = 0.0, max = 1.0))]
    pub reconcile_missing_threshold: f32,
    /// Retry attempts for provider calls
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub retry_base_ms: u64,
    /// Per-call provider timeout in seconds
    pub provider_timeout_secs: u64,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            chunking_workers: 0,
            embedding_workers: 4,
            channel_capacity: 64,
            max_warned_errors: 5,
            reconcile_sample: 64,
            reconcile_missing_threshold: 0.01,
            max_retries: 3,
            retry_base_ms: 250,
            provider_timeout_secs: 30,
        }
    }
}

impl IndexerSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn effective_chunking_workers(&self) -> usize {
        if self.chunking_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.chunking_workers
        }
    }
}

/// `chunker` section: the governor envelope plus optional grammar rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkerSettings {
    /// Strategy dispatch mode: `auto`, `ast`, or `delimiter`
    pub strategy: ChunkStrategy,
    /// Minimum lines per chunk
    pub min_lines: u32,
    /// Maximum estimated tokens per chunk
    pub max_tokens: usize,
    /// Overlap carried across governor splits, in estimated tokens
    pub overlap_tokens: usize,
    /// Index unmapped languages with the C-style family as a last resort
    pub index_unmapped: bool,
    /// Per-language classification rule overrides
    pub grammar_rules: Vec<LanguageRules>,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        let config = ChunkerConfig::default();
        Self {
            strategy: config.strategy,
            min_lines: config.min_lines,
            max_tokens: config.max_tokens,
            overlap_tokens: config.overlap_tokens,
            index_unmapped: config.index_unmapped,
            grammar_rules: Vec::new(),
        }
    }
}

impl ChunkerSettings {
    /// The domain-layer chunker configuration this section describes
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            strategy: self.strategy,
            min_lines: self.min_lines,
            max_tokens: self.max_tokens,
            overlap_tokens: self.overlap_tokens,
            index_unmapped: self.index_unmapped,
        }
    }
}

/// `provider` section
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
    #[validate(nested)]
    pub embedding: EmbeddingSettings,
    pub sparse_embedding: Option<SparseEmbeddingSettings>,
    pub reranking: Option<RerankingSettings>,
    #[validate(nested)]
    pub vector_store: VectorStoreSettings,
}

/// `provider.embedding` section
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingSettings {
    /// Provider name resolved through the container factories
    #[validate(length(min = 1))]
    pub provider: String,
    /// Model identifier
    #[validate(length(min = 1))]
    pub model: String,
    /// API key for remote providers
    pub api_key: Option<String>,
    /// Endpoint override for remote providers
    pub base_url: Option<String>,
    /// Expected output dimensionality
    pub dimensions: Option<usize>,
    /// Documents per embedding call
    #[validate(range(min = 1, max = 2048))]
    pub batch_size: usize,
    /// Input limit in estimated tokens; bounds the chunk governor
    pub max_input_tokens: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "null".to_string(),
            model: "null-embedding".to_string(),
            api_key: None,
            base_url: None,
            dimensions: Some(384),
            batch_size: 32,
            max_input_tokens: 8192,
        }
    }
}

/// `provider.sparse_embedding` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SparseEmbeddingSettings {
    pub provider: String,
    pub model: String,
    /// BM25 term-frequency saturation
    pub k1: f32,
    /// BM25 length normalization
    pub b: f32,
    /// Assumed average document length in tokens
    pub avgdl: f32,
}

impl Default for SparseEmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "bm25".to_string(),
            model: "bm25-code".to_string(),
            k1: 0.9,
            b: 0.4,
            avgdl: 256.0,
        }
    }
}

/// `provider.reranking` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RerankingSettings {
    pub provider: String,
    pub model: String,
    /// Candidates sent to the reranker
    pub top_n: usize,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl Default for RerankingSettings {
    fn default() -> Self {
        Self {
            provider: "null".to_string(),
            model: "null-rerank".to_string(),
            top_n: 20,
            api_key: None,
            base_url: None,
        }
    }
}

/// `provider.vector_store` section
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct VectorStoreSettings {
    #[validate(length(min = 1))]
    pub provider: String,
    /// Server address for remote backends
    pub url: Option<String>,
    /// Storage directory for the filesystem backend
    pub path: Option<PathBuf>,
    /// Collection name; one collection per project
    #[validate(length(min = 1))]
    pub collection: String,
    /// Points per upsert call
    #[validate(range(min = 1))]
    pub batch_size: usize,
    /// Named vector for dense embeddings
    pub dense_vector_name: String,
    /// Named vector for sparse embeddings
    pub sparse_vector_name: String,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            provider: "in-memory".to_string(),
            url: None,
            path: None,
            collection: "codescout".to_string(),
            batch_size: 64,
            dense_vector_name: "dense".to_string(),
            sparse_vector_name: "sparse".to_string(),
        }
    }
}

/// `watcher` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherSettings {
    pub enabled: bool,
    /// Per-path event coalescing window in milliseconds
    pub debounce_ms: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 400,
        }
    }
}

impl WatcherSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// `search` section: retrieval defaults, overridable per request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSettings {
    /// Dense weight in hybrid fusion
    #[validate(range(min = 0.0, max = 1.0))]
    pub alpha: f32,
    /// Over-fetch multiplier for the per-modality top-k
    #[validate(range(min = 1))]
    pub overfetch_factor: usize,
    /// Merged candidates forwarded to the reranker
    pub rerank_candidates: usize,
    /// Result count before budgeting
    pub default_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            overfetch_factor: 3,
            rerank_candidates: 20,
            default_limit: 10,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            state_dir: None,
            indexer: IndexerSettings::default(),
            chunker: ChunkerSettings::default(),
            provider: ProviderSettings::default(),
            watcher: WatcherSettings::default(),
            search: SearchSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file layered under environment
    /// variables (`CODESCOUT_INDEXER__EMBEDDING_WORKERS=8` style).
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CODESCOUT")
                .separator("__")
                .try_parsing(true),
        );
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.ensure_valid()?;
        Ok(settings)
    }

    /// Validate invariants beyond what deserialization can express
    pub fn ensure_valid(&self) -> Result<()> {
        Validate::validate(self)
            .map_err(|err| Error::configuration(format!("invalid settings: {err}")))?;
        if self.chunker.min_lines == 0 {
            return Err(Error::configuration("chunker.min_lines must be at least 1"));
        }
        if self.chunker.max_tokens == 0 {
            return Err(Error::configuration("chunker.max_tokens must be positive"));
        }
        Ok(())
    }

    /// State directory holding the manifest and checkpoint
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.project_root.join(".codescout"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir().join("manifest.json")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.state_dir().join("checkpoint.json")
    }

    /// Models currently configured, as compared against manifest entries
    pub fn models_in_use(&self) -> ModelsInUse {
        ModelsInUse {
            dense_provider: self.provider.embedding.provider.clone(),
            dense_model: self.provider.embedding.model.clone(),
            sparse_provider: self
                .provider
                .sparse_embedding
                .as_ref()
                .map(|s| s.provider.clone()),
            sparse_model: self
                .provider
                .sparse_embedding
                .as_ref()
                .map(|s| s.model.clone()),
        }
    }

    /// Collection name for this project
    pub fn collection(&self) -> &str {
        &self.provider.vector_store.collection
    }

    /// Project name recorded in collection metadata
    pub fn project_name(&self) -> String {
        self.project_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.ensure_valid().is_ok());
        assert_eq!(settings.provider.vector_store.collection, "codescout");
        assert_eq!(settings.watcher.debounce_ms, 400);
        assert_eq!(settings.search.alpha, 0.5);
    }

    #[test]
    fn unknown_options_fail_deserialization() {
        let toml = "unknown_section = true\n";
        let result: std::result::Result<Settings, _> = toml::from_str(toml);
        assert!(result.is_err());

        let nested = "[indexer]\nno_such_option = 3\n";
        let result: std::result::Result<Settings, _> = toml::from_str(nested);
        assert!(result.is_err());
    }

    #[test]
    fn sections_deserialize_from_toml() {
        let toml = r#"
project_root = "/tmp/project"

[indexer]
embedding_workers = 8
exclude = ["target/**"]

[chunker]
min_lines = 2
max_tokens = 256

[provider.embedding]
provider = "openai-compatible"
model = "text-embedding-3-small"
dimensions = 1536

[provider.sparse_embedding]
provider = "bm25"
model = "bm25-code"

[provider.vector_store]
provider = "filesystem"
collection = "myproj"

[watcher]
debounce_ms = 300

[search]
alpha = 0.7
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert!(settings.ensure_valid().is_ok());
        assert_eq!(settings.indexer.embedding_workers, 8);
        assert_eq!(settings.chunker.max_tokens, 256);
        assert_eq!(settings.provider.embedding.model, "text-embedding-3-small");
        assert_eq!(settings.collection(), "myproj");
        assert_eq!(settings.search.alpha, 0.7);
        let models = settings.models_in_use();
        assert_eq!(models.sparse_model.as_deref(), Some("bm25-code"));
    }

    #[test]
    fn invalid_alpha_fails_validation() {
        let settings = Settings {
            search: SearchSettings {
                alpha: 1.5,
                ..SearchSettings::default()
            },
            ..Settings::default()
        };
        let err = settings.ensure_valid().unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn state_dir_defaults_under_the_project_root() {
        let settings = Settings {
            project_root: PathBuf::from("/work/repo"),
            ..Settings::default()
        };
        assert_eq!(
            settings.manifest_path(),
            PathBuf::from("/work/repo/.codescout/manifest.json")
        );
    }
}
