//! Retrieval pipeline scenarios over an indexed temp project
//!
//! Hybrid ranking, filter validation, sparse-only fallback under a dense
//! outage, empty-store behavior, intent weighting, and token budgeting.

mod common;

use std::sync::Arc;

use async_trait::async_trait;

use codescout::domain::error::{Error, Result};
use codescout::domain::filter::Filter;
use codescout::domain::ports::{EmbeddingCapabilities, EmbeddingProvider};
use codescout::domain::types::{Language, MatchKind, QueryIntent, SearchQuery};
use codescout::infrastructure::di::modules::build_engine;
use codescout::infrastructure::di::ContainerBuilder;
use tokio_util::sync::CancellationToken;

use common::{engine_over, shared_store, test_settings, write_file};

const AUTH_PY: &str = r#"def authenticate_token(token):
    """Validate a bearer token and return its claims."""
    claims = parse_token(token)
    if claims is None:
        raise ValueError("invalid token")
    return claims


def parse_token(token):
    parts = token.split(".")
    if len(parts) != 3:
        return None
    return decode_claims(parts[1])
"#;

const RENDER_PY: &str = r#"def render_page(template, context):
    """Render an HTML template with the given context."""
    html = template.format(**context)
    return html
"#;

fn seed_project(root: &std::path::Path) {
    write_file(root, "auth.py", AUTH_PY);
    write_file(root, "render.py", RENDER_PY);
}

#[tokio::test]
async fn hybrid_query_ranks_the_relevant_file_first() {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());

    let store = shared_store();
    let (_container, parts) =
        engine_over(test_settings(dir.path(), "model-a", 64), store.clone()).await;
    parts.indexer.index_full().await.unwrap();

    // Weight fusion toward the sparse side so lexical overlap decides the
    // winner deterministically under the pseudo-random test embedder
    let mut query = SearchQuery::new("parse authentication token");
    query.alpha = Some(0.2);
    let outcome = parts.search.search(query).await.unwrap();

    assert!(!outcome.matches.is_empty());
    let top = &outcome.matches[0];
    assert_eq!(top.file_path, "auth.py");
    assert_eq!(top.match_kind, MatchKind::Hybrid);
    assert!(top.scores.sparse.is_some());
    assert!(top.scores.dense.is_some());
    assert!(top.scores.combined > 0.0);
    assert!(top.line_start >= 1);
    assert!(!top.content.is_empty());
    // Provenance content comes from the live file
    assert!(AUTH_PY.contains(top.content.lines().next().unwrap()));
}

#[tokio::test]
async fn focus_languages_restrict_the_search_space() {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());
    write_file(
        dir.path(),
        "auth.rs",
        "pub fn authenticate_token(token: &str) -> bool {\n    token.split('.').count() == 3\n}\n",
    );

    let store = shared_store();
    let (_container, parts) =
        engine_over(test_settings(dir.path(), "model-a", 64), store.clone()).await;
    parts.indexer.index_full().await.unwrap();

    let mut query = SearchQuery::new("authenticate token");
    query.focus_languages = Some(vec![Language::Rust]);
    let outcome = parts.search.search(query).await.unwrap();
    assert!(!outcome.matches.is_empty());
    assert!(outcome.matches.iter().all(|m| m.file_path.ends_with(".rs")));
}

#[tokio::test]
async fn unknown_filter_fields_fail_with_validation() {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());

    let store = shared_store();
    let (_container, parts) =
        engine_over(test_settings(dir.path(), "model-a", 64), store.clone()).await;
    parts.indexer.index_full().await.unwrap();

    let mut query = SearchQuery::new("token");
    query.filter = Some(Filter::eq("geo_region", "eu"));
    let err = parts.search.search(query).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn empty_store_returns_an_empty_list_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = shared_store();
    let (_container, parts) =
        engine_over(test_settings(dir.path(), "model-a", 64), store.clone()).await;

    let outcome = parts
        .search
        .search(SearchQuery::new("anything at all"))
        .await
        .unwrap();
    assert!(outcome.matches.is_empty());
}

/// Dense embedder whose indexing worked but whose query side is down
struct FlakyDenseEmbedder {
    inner: codescout::adapters::providers::embedding::NullEmbeddingProvider,
}

#[async_trait]
impl EmbeddingProvider for FlakyDenseEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_documents(texts).await
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::provider_unavailable("flaky", "dense endpoint down"))
    }

    fn capabilities(&self) -> EmbeddingCapabilities {
        self.inner.capabilities()
    }

    fn provider_name(&self) -> &str {
        "flaky"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn dense_outage_falls_back_to_sparse_only() {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());

    let store = shared_store();
    let flaky = Arc::new(FlakyDenseEmbedder {
        inner: codescout::adapters::providers::embedding::NullEmbeddingProvider::new(
            "model-a", 64,
        ),
    });
    let container = ContainerBuilder::new(test_settings(dir.path(), "model-a", 64))
        .with_embedding(flaky)
        .with_vector_store(store.clone())
        .without_probes()
        .build()
        .await
        .unwrap();
    let parts = build_engine(&container, CancellationToken::new()).unwrap();
    parts.indexer.index_full().await.unwrap();

    let outcome = parts
        .search
        .search(SearchQuery::new("parse authentication token"))
        .await
        .unwrap();

    assert!(outcome
        .warnings
        .iter()
        .any(|w| w == "sparse_only_fallback"));
    assert!(!outcome.matches.is_empty());
    for m in &outcome.matches {
        assert_eq!(m.match_kind, MatchKind::SparseOnly);
        assert!(m.scores.dense.is_none());
        assert!(m.scores.sparse.unwrap() > 0.0);
        assert!(m.scores.combined > 0.0);
    }
}

#[tokio::test]
async fn stale_results_are_dropped_by_the_liveness_check() {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());

    let store = shared_store();
    let (_container, parts) =
        engine_over(test_settings(dir.path(), "model-a", 64), store.clone()).await;
    parts.indexer.index_full().await.unwrap();

    // Edit the file after indexing, without telling the indexer
    write_file(dir.path(), "auth.py", "def something_else():\n    return 0\n");

    let outcome = parts
        .search
        .search(SearchQuery::new("parse authentication token"))
        .await
        .unwrap();
    assert!(outcome.matches.iter().all(|m| m.file_path != "auth.py"));
}

#[tokio::test]
async fn token_budget_truncates_the_result_list() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..6 {
        write_file(
            dir.path(),
            &format!("tok_{i}.py"),
            &format!("def token_handler_{i}(token):\n    return token + \"{i}\"\n"),
        );
    }

    let store = shared_store();
    let (_container, parts) =
        engine_over(test_settings(dir.path(), "model-a", 64), store.clone()).await;
    parts.indexer.index_full().await.unwrap();

    let mut generous = SearchQuery::new("token handler");
    generous.token_budget = 100_000;
    let all = parts.search.search(generous).await.unwrap();

    let mut tight = SearchQuery::new("token handler");
    tight.token_budget = 15;
    let few = parts.search.search(tight).await.unwrap();

    assert!(few.matches.len() < all.matches.len());
    assert!(!few.matches.is_empty());
}

#[tokio::test]
async fn intent_is_a_ranking_hint_not_a_search_space_change() {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());

    let store = shared_store();
    let (_container, parts) =
        engine_over(test_settings(dir.path(), "model-a", 64), store.clone()).await;
    parts.indexer.index_full().await.unwrap();

    let neutral = parts
        .search
        .search(SearchQuery::new("authenticate token"))
        .await
        .unwrap();
    let mut debugging_query = SearchQuery::new("authenticate token");
    debugging_query.intent = Some(QueryIntent::Debugging);
    let debugging = parts.search.search(debugging_query).await.unwrap();

    // Same candidates either way; only weights differ
    let ids = |outcome: &codescout::application::search::SearchOutcome| {
        let mut ids: Vec<_> = outcome.matches.iter().map(|m| m.chunk_id).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&neutral), ids(&debugging));
}
