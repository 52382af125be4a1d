use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use common::{error::AppError, storage::source::SourceStore, types::document::Document};

/// One fetched page, already parsed out of the select envelope.
#[derive(Debug)]
pub struct RawPage {
    pub documents: Vec<Document>,
    pub num_found: i64,
    pub start: i64,
}

impl RawPage {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Reads pages of documents from the source collection.
pub struct SourceReader {
    store: Arc<dyn SourceStore>,
    collection: String,
    page_size: usize,
}

impl SourceReader {
    pub fn new(store: Arc<dyn SourceStore>, collection: impl Into<String>, page_size: usize) -> Self {
        Self {
            store,
            collection: collection.into(),
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetches page `page` (zero-based). Offsets are `page * page_size`; the
    /// page past the last full one comes back short or empty.
    pub async fn fetch(&self, page: i64) -> Result<RawPage, AppError> {
        let start = page * self.page_size as i64;
        let body = self
            .store
            .select(&self.collection, start, self.page_size)
            .await?;
        let page = parse_envelope(body)?;
        debug!(
            collection = %self.collection,
            start,
            docs = page.documents.len(),
            num_found = page.num_found,
            "fetched source page"
        );
        Ok(page)
    }

    /// Asks the source for its document count without transferring documents.
    pub async fn total(&self) -> Result<i64, AppError> {
        let body = self.store.select(&self.collection, 0, 0).await?;
        Ok(parse_envelope(body)?.num_found)
    }
}

fn parse_envelope(body: Value) -> Result<RawPage, AppError> {
    let response = body
        .get("response")
        .ok_or_else(|| AppError::MalformedResponse("select reply missing 'response'".into()))?;
    let num_found = response
        .get("numFound")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::MalformedResponse("select reply missing 'numFound'".into()))?;
    let start = response.get("start").and_then(Value::as_i64).unwrap_or(0);
    let docs = response
        .get("docs")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::MalformedResponse("select reply missing 'docs'".into()))?;

    let documents = docs
        .iter()
        .cloned()
        .map(Document::from_value)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawPage {
        documents,
        num_found,
        start,
    })
}
