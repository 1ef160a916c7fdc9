//! Hybrid retrieval pipeline
//!
//! Query → embed (dense + sparse) → filtered vector searches → score
//! fusion → filesystem liveness check → optional rerank → intent
//! weighting → token budgeting.
//!
//! Degradations are non-fatal: a dense embedder outage falls back to
//! sparse-only search, a reranker failure keeps the fusion order, and an
//! absent collection yields an empty result. Every degradation is
//! reported through the response's warning list.
//!
//! Ordering contract: the reranker orders the candidate shortlist, then
//! the intent multiplier scales scores per semantic category. Intent is
//! applied after rerank.

pub mod budget;
pub mod fusion;
pub mod intent;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::error::{Error, Result};
use crate::domain::filter::Filter;
use crate::domain::ports::{
    EmbeddingProvider, RerankingProvider, SparseEmbeddingProvider, VectorStoreProvider,
};
use crate::domain::types::{
    payload, CodeMatch, ComponentScores, Language, MatchKind, SearchQuery, SemanticCategory,
    SparseVector,
};
use crate::infrastructure::config::Settings;
use crate::infrastructure::manifest::ManifestStore;
use crate::infrastructure::resilience::{call_with_retry, CircuitBreakerRegistry, RetryPolicy};

use fusion::Candidate;

/// Warning codes carried on degraded responses
pub const WARN_SPARSE_ONLY: &str = "sparse_only_fallback";
pub const WARN_DENSE_ONLY: &str = "dense_only_no_sparse_configured";
pub const WARN_QUERY_EMBED_FAILED: &str = "query_embedding_failed";
pub const WARN_RERANK_FAILED: &str = "rerank_failed";
pub const WARN_COLLECTION_MISSING: &str = "collection_not_found";

/// Result of one retrieval run
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub matches: Vec<CodeMatch>,
    pub warnings: Vec<String>,
}

/// The retrieval pipeline
pub struct SearchPipeline {
    settings: Arc<Settings>,
    embedding: Arc<dyn EmbeddingProvider>,
    sparse: Option<Arc<dyn SparseEmbeddingProvider>>,
    reranking: Option<Arc<dyn RerankingProvider>>,
    store: Arc<dyn VectorStoreProvider>,
    manifest: Arc<ManifestStore>,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl SearchPipeline {
    pub fn new(
        settings: Arc<Settings>,
        embedding: Arc<dyn EmbeddingProvider>,
        sparse: Option<Arc<dyn SparseEmbeddingProvider>>,
        reranking: Option<Arc<dyn RerankingProvider>>,
        store: Arc<dyn VectorStoreProvider>,
        manifest: Arc<ManifestStore>,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self {
            settings,
            embedding,
            sparse,
            reranking,
            store,
            manifest,
            breakers,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.settings.indexer.max_retries,
            base_delay: std::time::Duration::from_millis(self.settings.indexer.retry_base_ms),
            max_delay: std::time::Duration::from_secs(10),
        }
    }

    /// Run the full pipeline for one query
    pub async fn search(&self, query: SearchQuery) -> Result<SearchOutcome> {
        let mut warnings = Vec::new();
        let filter = compose_filter(query.filter.clone(), query.focus_languages.as_deref())?;

        // 1. Embed the query; dense failure degrades to sparse-only
        let dense_vector = match self.embed_query_dense(&query.text).await {
            Ok(vector) => Some(vector),
            Err(err) => {
                tracing::warn!(%err, "dense query embedding unavailable");
                None
            }
        };
        let sparse_vector = match &self.sparse {
            Some(_) => match self.embed_query_sparse(&query.text).await {
                Ok(vector) => Some(vector),
                Err(err) => {
                    tracing::warn!(%err, "sparse query embedding unavailable");
                    None
                }
            },
            None => None,
        };

        match (&dense_vector, &sparse_vector) {
            (None, None) => {
                warnings.push(WARN_QUERY_EMBED_FAILED.to_string());
                return Ok(SearchOutcome {
                    matches: Vec::new(),
                    warnings,
                });
            }
            (None, Some(_)) => warnings.push(WARN_SPARSE_ONLY.to_string()),
            (Some(_), None) if self.sparse.is_some() => {
                warnings.push(WARN_DENSE_ONLY.to_string())
            }
            _ => {}
        }

        // 2 + 3. Filtered top-k per modality, over-fetched for fusion
        let limit = self.settings.search.default_limit * self.settings.search.overfetch_factor;
        let collection = self.settings.collection();
        let (dense_hits, sparse_hits) = tokio::join!(
            self.run_dense_search(collection, dense_vector.as_deref(), filter.as_ref(), limit),
            self.run_sparse_search(collection, sparse_vector.as_ref(), filter.as_ref(), limit),
        );
        let dense_hits = match dense_hits {
            Ok(hits) => hits,
            Err(Error::CollectionNotFound { .. }) => {
                warnings.push(WARN_COLLECTION_MISSING.to_string());
                return Ok(SearchOutcome {
                    matches: Vec::new(),
                    warnings,
                });
            }
            Err(err) => return Err(err),
        };
        let sparse_hits = match sparse_hits {
            Ok(hits) => hits,
            Err(Error::CollectionNotFound { .. }) => Vec::new(),
            Err(err) => return Err(err),
        };

        // 4. Fuse. In sparse-only fallback the combined score equals the
        // sparse score; dense-only symmetrically.
        let alpha = match (&dense_vector, &sparse_vector) {
            (Some(_), Some(_)) => query.alpha.unwrap_or(self.settings.search.alpha),
            (Some(_), None) => 1.0,
            (None, _) => 0.0,
        };
        let candidates = fusion::merge(dense_hits, sparse_hits, alpha);

        // 5. Drop results that no longer reflect the filesystem
        let (mut candidates, contents) = self.liveness_filter(candidates).await;

        // 6. Optional rerank over the merged shortlist
        let mut rerank_scores: HashMap<uuid::Uuid, f32> = HashMap::new();
        if let Some(reranker) = &self.reranking {
            let top_k = self.settings.search.rerank_candidates.min(candidates.len());
            if top_k > 0 {
                let documents: Vec<String> = candidates[..top_k]
                    .iter()
                    .map(|candidate| contents.get(&candidate.id).cloned().unwrap_or_default())
                    .collect();
                let breaker = self.breakers.get(reranker.provider_name());
                let outcome = call_with_retry(
                    reranker.provider_name(),
                    &breaker,
                    &self.retry_policy(),
                    self.settings.indexer.provider_timeout(),
                    || {
                        reranker.rerank(
                            &query.text,
                            &documents,
                            self.settings.search.rerank_candidates,
                        )
                    },
                )
                .await;
                match outcome {
                    Ok(ranked) => {
                        for (index, score) in ranked {
                            if let Some(candidate) = candidates.get(index) {
                                rerank_scores.insert(candidate.id, score);
                            }
                        }
                        // Reranked candidates order first, by rerank score
                        candidates.sort_by(|a, b| {
                            let ra = rerank_scores.get(&a.id);
                            let rb = rerank_scores.get(&b.id);
                            match (ra, rb) {
                                (Some(x), Some(y)) => {
                                    y.partial_cmp(x).unwrap_or(std::cmp::Ordering::Equal)
                                }
                                (Some(_), None) => std::cmp::Ordering::Less,
                                (None, Some(_)) => std::cmp::Ordering::Greater,
                                (None, None) => b
                                    .combined
                                    .partial_cmp(&a.combined)
                                    .unwrap_or(std::cmp::Ordering::Equal),
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(%err, "reranker unavailable, keeping fusion order");
                        warnings.push(WARN_RERANK_FAILED.to_string());
                    }
                }
            }
        }

        // 7. Intent weighting, applied after rerank
        let mut matches: Vec<CodeMatch> = candidates
            .into_iter()
            .map(|candidate| {
                let rerank = rerank_scores.get(&candidate.id).copied();
                let category = category_of(&candidate);
                let base = rerank.unwrap_or(candidate.combined);
                let weighted = base * intent::multiplier(query.intent, category);
                let content = contents.get(&candidate.id).cloned().unwrap_or_default();
                build_match(candidate, rerank, weighted, content)
            })
            .collect();
        matches.sort_by(|a, b| {
            b.scores
                .combined
                .partial_cmp(&a.scores.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        // 8. Token budgeting
        let matches = budget::apply_budget(matches, query.token_budget);
        Ok(SearchOutcome { matches, warnings })
    }

    async fn embed_query_dense(&self, text: &str) -> Result<Vec<f32>> {
        let breaker = self.breakers.get(self.embedding.provider_name());
        call_with_retry(
            self.embedding.provider_name(),
            &breaker,
            &self.retry_policy(),
            self.settings.indexer.provider_timeout(),
            || self.embedding.embed_query(text),
        )
        .await
    }

    async fn embed_query_sparse(&self, text: &str) -> Result<SparseVector> {
        let sparse = self
            .sparse
            .as_ref()
            .ok_or_else(|| Error::validation("no sparse embedder configured"))?;
        let breaker = self.breakers.get(sparse.provider_name());
        call_with_retry(
            sparse.provider_name(),
            &breaker,
            &self.retry_policy(),
            self.settings.indexer.provider_timeout(),
            || sparse.embed_query(text),
        )
        .await
    }

    async fn run_dense_search(
        &self,
        collection: &str,
        vector: Option<&[f32]>,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<crate::domain::ports::ScoredPoint>> {
        match vector {
            Some(vector) => {
                self.store
                    .search_dense(collection, vector, filter, limit)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    async fn run_sparse_search(
        &self,
        collection: &str,
        vector: Option<&SparseVector>,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<crate::domain::ports::ScoredPoint>> {
        match vector {
            Some(vector) => {
                self.store
                    .search_sparse(collection, vector, filter, limit)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Drop candidates whose file is gone, unrecorded, or stale, and read
    /// fragment contents from the live files.
    async fn liveness_filter(
        &self,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<uuid::Uuid, String>) {
        let manifest = self.manifest.read().await;
        let mut file_cache: HashMap<String, Option<Vec<String>>> = HashMap::new();
        let mut contents = HashMap::new();
        let mut live = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let Some(path) = candidate
                .payload
                .get(payload::FILE_PATH)
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                continue;
            };
            let Some(entry) = manifest.files.get(&path) else {
                continue;
            };
            if !entry.chunk_ids.contains(&candidate.id) {
                // The manifest superseded this chunk
                continue;
            }

            let lines = file_cache.entry(path.clone()).or_insert_with(|| {
                let absolute = self.settings.project_root.join(&path);
                std::fs::read_to_string(&absolute)
                    .ok()
                    .filter(|content| {
                        blake3::hash(content.as_bytes()).to_hex().to_string()
                            == entry.content_hash
                    })
                    .map(|content| content.lines().map(str::to_string).collect())
            });
            let Some(lines) = lines.as_deref() else {
                // Missing on disk or edited since the manifest was written
                continue;
            };

            let start = candidate
                .payload
                .get(payload::LINE_START)
                .and_then(Value::as_u64)
                .unwrap_or(1)
                .max(1) as usize;
            let end = candidate
                .payload
                .get(payload::LINE_END)
                .and_then(Value::as_u64)
                .unwrap_or(start as u64) as usize;
            let end = end.min(lines.len());
            if start > end {
                continue;
            }
            contents.insert(candidate.id, lines[start - 1..end].join("\n"));
            live.push(candidate);
        }
        (live, contents)
    }
}

/// Combine the user filter with a focus-language restriction
fn compose_filter(
    user: Option<Filter>,
    focus_languages: Option<&[Language]>,
) -> Result<Option<Filter>> {
    let language_filter = focus_languages.filter(|l| !l.is_empty()).map(|languages| {
        Filter::In {
            field: payload::LANGUAGE.to_string(),
            values: languages
                .iter()
                .map(|language| Value::String(language.as_str().to_string()))
                .collect(),
        }
    });
    let filter = match (user, language_filter) {
        (Some(user), Some(languages)) => Some(Filter::And(vec![user, languages])),
        (Some(user), None) => Some(user),
        (None, Some(languages)) => Some(languages),
        (None, None) => None,
    };
    if let Some(filter) = &filter {
        filter.validate_fields()?;
    }
    Ok(filter)
}

fn category_of(candidate: &Candidate) -> Option<SemanticCategory> {
    candidate
        .payload
        .get(payload::SEMANTIC_CATEGORY)
        .and_then(Value::as_str)
        .and_then(|name| match name {
            "definition" => Some(SemanticCategory::Definition),
            "declaration" => Some(SemanticCategory::Declaration),
            "invocation" => Some(SemanticCategory::Invocation),
            "control_flow" => Some(SemanticCategory::ControlFlow),
            "literal" => Some(SemanticCategory::Literal),
            "import" => Some(SemanticCategory::Import),
            "comment" => Some(SemanticCategory::Comment),
            "module" => Some(SemanticCategory::Module),
            _ => None,
        })
}

fn build_match(
    candidate: Candidate,
    rerank: Option<f32>,
    weighted: f32,
    content: String,
) -> CodeMatch {
    let file_path = candidate
        .payload
        .get(payload::FILE_PATH)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let line_start = candidate
        .payload
        .get(payload::LINE_START)
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;
    let line_end = candidate
        .payload
        .get(payload::LINE_END)
        .and_then(Value::as_u64)
        .unwrap_or(line_start as u64) as u32;
    let language = candidate
        .payload
        .get(payload::LANGUAGE)
        .and_then(Value::as_str)
        .and_then(|name| name.parse().ok());
    let content_hash = candidate
        .payload
        .get(payload::CONTENT_HASH)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let match_kind = match (candidate.dense.is_some(), candidate.sparse.is_some()) {
        (true, true) => MatchKind::Hybrid,
        (true, false) => MatchKind::DenseOnly,
        _ => MatchKind::SparseOnly,
    };
    let related_symbols = related_symbols(&content);

    CodeMatch {
        chunk_id: candidate.id,
        file_path,
        line_start,
        line_end,
        content,
        scores: ComponentScores {
            dense: candidate.dense,
            sparse: candidate.sparse,
            rerank,
            combined: weighted,
        },
        match_kind,
        related_symbols,
        language,
        content_hash,
    }
}

/// Identifier-like tokens from the fragment, for the related-symbols list
fn related_symbols(content: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "let", "mut", "pub", "use", "for", "while", "return", "self", "def", "class", "function",
        "const", "var", "import", "from", "this", "new", "true", "false", "None", "null",
    ];
    let mut symbols = Vec::new();
    let mut current = String::new();
    for c in content.chars().chain(std::iter::once(' ')) {
        if c.is_alphanumeric() || c == '_' {
            current.push(c);
        } else if !current.is_empty() {
            let token = std::mem::take(&mut current);
            if token.len() >= 3
                && !token.chars().next().is_some_and(|c| c.is_ascii_digit())
                && !STOPWORDS.contains(&token.as_str())
                && !symbols.contains(&token)
            {
                symbols.push(token);
                if symbols.len() >= 5 {
                    break;
                }
            }
        }
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_filter_rejects_unknown_fields() {
        let err = compose_filter(Some(Filter::eq("nope", 1)), None).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn compose_filter_adds_language_restriction() {
        let filter = compose_filter(
            Some(Filter::path_prefix("src/")),
            Some(&[Language::Rust, Language::Go]),
        )
        .unwrap()
        .unwrap();
        match filter {
            Filter::And(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn related_symbols_skips_stopwords_and_short_tokens() {
        let symbols = related_symbols("pub fn authenticate(token: &str) -> bool { token.len() }");
        assert!(symbols.contains(&"authenticate".to_string()));
        assert!(symbols.contains(&"token".to_string()));
        assert!(!symbols.contains(&"pub".to_string()));
        assert!(symbols.len() <= 5);
    }
}
