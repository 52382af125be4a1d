use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::AppError,
    utils::http::{ensure_success, join_url},
};

#[derive(Debug, Serialize)]
struct ChunkRequest<'a> {
    text: &'a str,
    chunk_length: usize,
    overlap: usize,
}

#[derive(Debug, Deserialize)]
struct ChunkReply {
    chunks: Vec<String>,
}

/// Client for the external text chunking service.
#[derive(Clone)]
pub struct ChunkingClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ChunkingClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Splits `text` into ordered chunks of roughly `chunk_length`
    /// characters with `overlap` characters shared between neighbors.
    pub async fn chunk(
        &self,
        text: &str,
        chunk_length: usize,
        overlap: usize,
    ) -> Result<Vec<String>, AppError> {
        let url = join_url(&self.base_url, "chunk")?;
        let response = self
            .http
            .post(url)
            .json(&ChunkRequest {
                text,
                chunk_length,
                overlap,
            })
            .send()
            .await?;

        let reply: ChunkReply = ensure_success(response, "chunking service")
            .await?
            .json()
            .await?;
        Ok(reply.chunks)
    }

    pub async fn health(&self) -> Result<(), AppError> {
        let url = join_url(&self.base_url, "health")?;
        let response = self.http.get(url).send().await?;
        ensure_success(response, "chunking service").await?;
        Ok(())
    }
}
