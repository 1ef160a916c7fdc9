//! HTTP reranking provider
//!
//! Talks to endpoints implementing the common `/rerank` contract (Cohere,
//! Jina, vLLM). Error mapping mirrors the HTTP embedding provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::{Error, Result};
use crate::domain::ports::{RerankingCapabilities, RerankingProvider};
use crate::infrastructure::config::RerankingSettings;

const PROVIDER_NAME: &str = "openai-compatible";

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankRecord>,
}

#[derive(Debug, Deserialize)]
struct RerankRecord {
    index: usize,
    relevance_score: f32,
}

pub struct HttpRerankingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpRerankingProvider {
    pub fn new(settings: &RerankingSettings) -> Result<Self> {
        let base_url = settings
            .base_url
            .clone()
            .ok_or_else(|| {
                Error::configuration("provider.reranking.base_url is required for HTTP reranking")
            })?
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl RerankingProvider for HttpRerankingProvider {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f32)>> {
        let body = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n,
        };
        let mut request = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            Error::provider_unavailable(PROVIDER_NAME, format!("transport error: {err}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status.is_server_error()
            {
                Error::provider_unavailable(PROVIDER_NAME, format!("rerank failed {status}: {detail}"))
            } else {
                Error::provider_fatal(PROVIDER_NAME, format!("rerank failed {status}: {detail}"))
            });
        }

        let parsed: RerankResponse = response.json().await.map_err(|err| {
            Error::provider_unavailable(PROVIDER_NAME, format!("malformed response: {err}"))
        })?;
        Ok(parsed
            .results
            .into_iter()
            .map(|record| (record.index, record.relevance_score))
            .collect())
    }

    fn capabilities(&self) -> RerankingCapabilities {
        RerankingCapabilities {
            model: self.model.clone(),
            max_documents: 1000,
        }
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
