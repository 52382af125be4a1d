use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::AppError,
    utils::http::{ensure_success, join_url},
};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedReply {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct EmbedBatchRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedBatchReply {
    embeddings: Vec<Vec<f32>>,
}

/// Client for the external embedding service.
#[derive(Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: Url,
}

impl EmbeddingClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let url = join_url(&self.base_url, "embed")?;
        let response = self.http.post(url).json(&EmbedRequest { text }).send().await?;

        let reply: EmbedReply = ensure_success(response, "embedding service")
            .await?
            .json()
            .await?;
        Ok(reply.embedding)
    }

    /// Batched variant; the reply is index-aligned with the request.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = join_url(&self.base_url, "embed/batch")?;
        let response = self
            .http
            .post(url)
            .json(&EmbedBatchRequest { texts })
            .send()
            .await?;

        let reply: EmbedBatchReply = ensure_success(response, "embedding service")
            .await?
            .json()
            .await?;

        if reply.embeddings.len() != texts.len() {
            return Err(AppError::EnrichmentFailed(format!(
                "embedding service returned {} vectors for {} texts",
                reply.embeddings.len(),
                texts.len()
            )));
        }
        Ok(reply.embeddings)
    }

    pub async fn health(&self) -> Result<(), AppError> {
        let url = join_url(&self.base_url, "health")?;
        let response = self.http.get(url).send().await?;
        ensure_success(response, "embedding service").await?;
        Ok(())
    }
}
