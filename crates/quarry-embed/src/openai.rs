use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, l2_normalize};

/// Embedding provider backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dim: usize,
    max_batch_texts: usize,
    max_batch_tokens: usize,
}

impl fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dim", &self.dim)
            .finish_non_exhaustive()
    }
}

impl Clone for OpenAiEmbedder {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            dim: self.dim,
            max_batch_texts: self.max_batch_texts,
            max_batch_tokens: self.max_batch_tokens,
        }
    }
}

impl OpenAiEmbedder {
    #[must_use]
    pub fn new(api_key: String, mut base_url: String, model: String, dim: usize) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
            dim,
            max_batch_texts: 64,
            max_batch_tokens: 64_000,
        }
    }

    async fn send_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbedError::RateLimited);
        }

        if !status.is_success() {
            tracing::error!("embedding API error {status}: {text}");
            return Err(EmbedError::Other(format!(
                "embedding request failed (status {status})"
            )));
        }

        let resp: EmbeddingResponse = serde_json::from_str(&text)?;
        if resp.data.is_empty() {
            return Err(EmbedError::EmptyResponse { provider: "openai" });
        }

        let mut vectors = Vec::with_capacity(resp.data.len());
        for item in resp.data {
            let mut vector = item.embedding;
            if vector.len() != self.dim {
                return Err(EmbedError::Dimension {
                    expected: self.dim,
                    got: vector.len(),
                });
            }
            l2_normalize(&mut vector);
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(&[text.to_owned()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or(EmbedError::EmptyResponse { provider: "openai" })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.send_request(texts).await {
            Err(EmbedError::RateLimited) => {
                tracing::warn!("embedding API rate limited, retrying in 1s");
                tokio::time::sleep(Duration::from_secs(1)).await;
                self.send_request(texts).await
            }
            other => other,
        }
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_batch_texts(&self) -> usize {
        self.max_batch_texts
    }

    fn max_batch_tokens(&self) -> Option<usize> {
        Some(self.max_batch_tokens)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
