use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// Zero-padding width of the chunk sequence number inside `doc_id`.
const CHUNK_SEQUENCE_WIDTH: usize = 7;

/// Derived document representing one text chunk of a parent field plus its
/// embedding. Created by the enrichment engine, consumed only by the
/// destination writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDocument {
    pub doc_id: String,
    pub parent_id: String,
    pub chunk: String,
    pub chunk_number: usize,
    pub vector: Vec<f32>,
    pub parent_field_name: String,
    pub crawl_id: String,
    pub date_created: String,
    pub parent_collection: String,
}

impl ChunkDocument {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent_id: &str,
        chunk: String,
        chunk_number: usize,
        vector: Vec<f32>,
        parent_field_name: &str,
        crawl_id: &str,
        date_created: &str,
        parent_collection: &str,
    ) -> Self {
        Self {
            doc_id: format!("{parent_id}#{chunk_number:0width$}", width = CHUNK_SEQUENCE_WIDTH),
            parent_id: parent_id.to_string(),
            chunk,
            chunk_number,
            vector,
            parent_field_name: parent_field_name.to_string(),
            crawl_id: crawl_id.to_string(),
            date_created: date_created.to_string(),
            parent_collection: parent_collection.to_string(),
        }
    }

    pub fn to_value(&self) -> Result<Value, AppError> {
        serde_json::to_value(self).map_err(AppError::from)
    }
}
