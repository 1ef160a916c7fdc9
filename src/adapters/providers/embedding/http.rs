//! OpenAI-compatible HTTP embedding provider
//!
//! Talks to any endpoint implementing the `/embeddings` contract (OpenAI,
//! Ollama's compatibility layer, vLLM, LM Studio, …). HTTP status codes map
//! onto the closed error kinds: 429 and 5xx are transient, auth failures
//! and oversized inputs are fatal for the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::{Error, Result};
use crate::domain::ports::{EmbeddingCapabilities, EmbeddingProvider};
use crate::infrastructure::config::EmbeddingSettings;

const PROVIDER_NAME: &str = "openai-compatible";

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRecord>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRecord {
    index: usize,
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    max_input_tokens: usize,
    batch_size: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let base_url = settings
            .base_url
            .clone()
            .ok_or_else(|| {
                Error::configuration("provider.embedding.base_url is required for HTTP embedding")
            })?
            .trim_end_matches('/')
            .to_string();
        let dimensions = settings.dimensions.ok_or_else(|| {
            Error::configuration("provider.embedding.dimensions is required for HTTP embedding")
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            dimensions,
            max_input_tokens: settings.max_input_tokens,
            batch_size: settings.batch_size,
        })
    }

    async fn request(&self, input: &[String], input_type: Option<&str>) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingsRequest {
            model: &self.model,
            input,
            input_type,
        };
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
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
            return Err(classify_status(status, &detail));
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|err| {
            Error::provider_unavailable(PROVIDER_NAME, format!("malformed response: {err}"))
        })?;
        let mut records = parsed.data;
        records.sort_by_key(|record| record.index);
        let vectors: Vec<Vec<f32>> = records.into_iter().map(|record| record.embedding).collect();
        if vectors.len() != input.len() {
            return Err(Error::provider_unavailable(
                PROVIDER_NAME,
                format!(
                    "expected {} embeddings, received {}",
                    input.len(),
                    vectors.len()
                ),
            ));
        }
        Ok(vectors)
    }
}

fn classify_status(status: reqwest::StatusCode, detail: &str) -> Error {
    use reqwest::StatusCode;
    if status == StatusCode::TOO_MANY_REQUESTS {
        Error::provider_unavailable(PROVIDER_NAME, format!("rate limited: {detail}"))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Error::provider_fatal(PROVIDER_NAME, format!("authentication failed: {detail}"))
    } else if status == StatusCode::PAYLOAD_TOO_LARGE {
        Error::provider_fatal(PROVIDER_NAME, format!("input too large: {detail}"))
    } else if status.is_server_error() {
        Error::provider_unavailable(PROVIDER_NAME, format!("server error {status}: {detail}"))
    } else {
        Error::provider_fatal(PROVIDER_NAME, format!("request failed {status}: {detail}"))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts, None).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.request(&[text.to_string()], Some("query")).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider_unavailable(PROVIDER_NAME, "empty embedding response"))
    }

    fn capabilities(&self) -> EmbeddingCapabilities {
        EmbeddingCapabilities {
            model: self.model.clone(),
            dimensions: self.dimensions,
            max_input_tokens: self.max_input_tokens,
            supports_sparse: false,
            preferred_batch: self.batch_size,
        }
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
