//! The `find_code` facade
//!
//! Single surface exposed to external collaborators (RPC façades, CLI
//! front-ends): one search operation plus project indexing. Wired through
//! the DI module so tests can substitute the whole service.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::indexer::{Indexer, RunSummary};
use crate::application::search::{SearchOutcome, SearchPipeline};
use crate::domain::error::Result;
use crate::domain::types::{FindCodeResponse, Language, QueryIntent, SearchQuery};

/// Default result budget when the caller does not pass one
const DEFAULT_TOKEN_LIMIT: usize = 8_000;

/// Core service contract for external collaborators
#[async_trait]
pub trait ContextServiceInterface: shaku::Interface {
    /// Natural-language code search with ranked, provenance-carrying
    /// matches
    async fn find_code(
        &self,
        query_text: &str,
        intent: Option<QueryIntent>,
        focus_languages: Option<Vec<Language>>,
        token_limit: Option<usize>,
    ) -> Result<FindCodeResponse>;

    /// Full index run over the configured project
    async fn index_project(&self) -> Result<RunSummary>;
}

/// Facade over the indexing and retrieval pipelines
#[derive(shaku::Component)]
#[shaku(interface = ContextServiceInterface)]
pub struct ContextEngine {
    search: Arc<SearchPipeline>,
    indexer: Arc<Indexer>,
}

impl ContextEngine {
    pub fn new(search: Arc<SearchPipeline>, indexer: Arc<Indexer>) -> Self {
        Self { search, indexer }
    }

    /// The underlying indexer, for watch mode and reconciliation
    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    fn summarize(query_text: &str, outcome: &SearchOutcome) -> String {
        let files: HashSet<&str> = outcome
            .matches
            .iter()
            .map(|m| m.file_path.as_str())
            .collect();
        format!(
            "{} matches across {} files for \"{}\"",
            outcome.matches.len(),
            files.len(),
            query_text
        )
    }
}

#[async_trait]
impl ContextServiceInterface for ContextEngine {
    async fn find_code(
        &self,
        query_text: &str,
        intent: Option<QueryIntent>,
        focus_languages: Option<Vec<Language>>,
        token_limit: Option<usize>,
    ) -> Result<FindCodeResponse> {
        let query = SearchQuery {
            text: query_text.to_string(),
            intent,
            filter: None,
            token_budget: token_limit.unwrap_or(DEFAULT_TOKEN_LIMIT),
            focus_languages,
            alpha: None,
        };
        let outcome = self.search.search(query).await?;
        let summary = Self::summarize(query_text, &outcome);
        Ok(FindCodeResponse {
            matches: outcome.matches,
            summary,
            warnings: outcome.warnings,
        })
    }

    async fn index_project(&self) -> Result<RunSummary> {
        self.indexer.index_full().await
    }
}
