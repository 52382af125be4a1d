use async_trait::async_trait;

use common::{
    error::AppError,
    utils::{chunking::ChunkingClient, embedding::EmbeddingClient},
};

/// External calls the enrichment engine depends on, kept behind a trait so
/// the engine and coordinator can be tested against scripted fakes.
#[async_trait]
pub trait EnrichmentServices: Send + Sync {
    async fn chunk_text(
        &self,
        text: &str,
        chunk_length: usize,
        overlap: usize,
    ) -> Result<Vec<String>, AppError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;

    /// Index-aligned with the input slice.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Production wiring over the chunking and embedding HTTP services.
pub struct DefaultEnrichmentServices {
    chunker: ChunkingClient,
    embedder: EmbeddingClient,
}

impl DefaultEnrichmentServices {
    pub fn new(chunker: ChunkingClient, embedder: EmbeddingClient) -> Self {
        Self { chunker, embedder }
    }
}

#[async_trait]
impl EnrichmentServices for DefaultEnrichmentServices {
    async fn chunk_text(
        &self,
        text: &str,
        chunk_length: usize,
        overlap: usize,
    ) -> Result<Vec<String>, AppError> {
        self.chunker.chunk(text, chunk_length, overlap).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.embedder.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        self.embedder.embed_batch(texts).await
    }

    async fn health_check(&self) -> Result<(), AppError> {
        tokio::try_join!(self.chunker.health(), self.embedder.health())?;
        Ok(())
    }
}
