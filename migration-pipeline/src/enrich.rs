use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use common::{
    error::AppError,
    types::{
        chunk_document::ChunkDocument,
        crawl_run::CrawlRun,
        document::{Document, CREATED_DATE_FIELD},
        vector_spec::VectorFieldSpec,
    },
    utils::retry::RetryPolicy,
};

use crate::services::EnrichmentServices;

/// One inline field that could not be enriched. The document is still
/// written; the failure only affects progress accounting.
#[derive(Debug)]
pub struct FieldFailure {
    pub field: String,
    pub error: AppError,
}

/// Computes vectors for configured fields, either attached inline to the
/// primary document or materialized as derived chunk documents.
pub struct EnrichmentEngine {
    services: Arc<dyn EnrichmentServices>,
    specs: Vec<VectorFieldSpec>,
    retry: RetryPolicy,
    inline_char_limit: usize,
    embed_batch_size: usize,
    primary_collection: String,
}

impl EnrichmentEngine {
    pub fn new(
        services: Arc<dyn EnrichmentServices>,
        specs: Vec<VectorFieldSpec>,
        retry: RetryPolicy,
        inline_char_limit: usize,
        embed_batch_size: usize,
        primary_collection: impl Into<String>,
    ) -> Self {
        Self {
            services,
            specs,
            retry,
            inline_char_limit,
            embed_batch_size: embed_batch_size.max(1),
            primary_collection: primary_collection.into(),
        }
    }

    pub fn inline_specs(&self) -> impl Iterator<Item = &VectorFieldSpec> {
        self.specs.iter().filter(|spec| !spec.chunked)
    }

    pub fn chunked_specs(&self) -> impl Iterator<Item = &VectorFieldSpec> {
        self.specs.iter().filter(|spec| spec.chunked)
    }

    pub fn has_chunked_specs(&self) -> bool {
        self.chunked_specs().next().is_some()
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.services.health_check().await
    }

    /// Attaches an inline vector for every non-chunked spec whose field is
    /// present on the document. Failures are collected per field; the
    /// document keeps the vectors that did succeed.
    pub async fn enrich_inline(&self, doc: &mut Document) -> Vec<FieldFailure> {
        let mut failures = Vec::new();
        for spec in self.inline_specs() {
            let Some(text) = doc.field_text(&spec.field) else {
                continue;
            };
            let text = truncate_chars(&text, self.inline_char_limit);

            match self.retry.run(|| self.services.embed(text)).await {
                Ok(vector) => doc.set(&spec.target_vector_field(), json!(vector)),
                Err(error) => {
                    warn!(
                        doc_id = doc.id().unwrap_or("<missing>"),
                        field = %spec.field,
                        %error,
                        "inline enrichment failed"
                    );
                    failures.push(FieldFailure {
                        field: spec.field.clone(),
                        error,
                    });
                }
            }
        }
        failures
    }

    /// Derives the chunk documents for one document under one chunked spec.
    ///
    /// An absent field yields no chunks and no error. Any service failure
    /// fails the whole field; partial chunk sets are never emitted.
    pub async fn chunk_field(
        &self,
        doc: &Document,
        spec: &VectorFieldSpec,
        run: &CrawlRun,
    ) -> Result<Vec<ChunkDocument>, AppError> {
        let Some(text) = doc.field_text(&spec.field) else {
            return Ok(Vec::new());
        };
        let Some(parent_id) = doc.id() else {
            return Err(AppError::EnrichmentFailed(
                "document without an 'id' field cannot produce chunks".into(),
            ));
        };

        let chunks = self
            .retry
            .run(|| {
                self.services
                    .chunk_text(&text, spec.chunk_length, spec.chunk_overlap)
            })
            .await?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.embed_batch_size) {
            let embedded = self.retry.run(|| self.services.embed_batch(batch)).await?;
            vectors.extend(embedded);
        }

        let date_created = doc.field_text(CREATED_DATE_FIELD).unwrap_or_default();
        Ok(chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(sequence, (chunk, vector))| {
                ChunkDocument::new(
                    parent_id,
                    chunk,
                    sequence,
                    vector,
                    &spec.field,
                    &run.id,
                    &date_created,
                    &self.primary_collection,
                )
            })
            .collect())
    }
}

/// Cuts `text` at a character boundary after `limit` characters. A zero
/// limit disables truncation.
fn truncate_chars(text: &str, limit: usize) -> &str {
    if limit == 0 {
        return text;
    }
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
