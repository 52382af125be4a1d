use serde::{Deserialize, Serialize};

/// Similarity function of a dense vector field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    Euclidean,
    DotProduct,
    #[default]
    Cosine,
}

impl Similarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Similarity::Euclidean => "euclidean",
            Similarity::DotProduct => "dot_product",
            Similarity::Cosine => "cosine",
        }
    }

    /// Unrecognized input falls back to cosine rather than failing; the
    /// schema provisioner relies on this when creating field types.
    pub fn parse_lenient(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "euclidean" => Similarity::Euclidean,
            "dot_product" => Similarity::DotProduct,
            _ => Similarity::Cosine,
        }
    }
}

/// Parameters used when a destination collection has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionParams {
    #[serde(default)]
    pub config_name: Option<String>,
    #[serde(default = "default_shards")]
    pub num_shards: u32,
    #[serde(default = "default_replicas")]
    pub replication_factor: u32,
}

impl Default for CollectionParams {
    fn default() -> Self {
        Self {
            config_name: None,
            num_shards: default_shards(),
            replication_factor: default_replicas(),
        }
    }
}

fn default_shards() -> u32 {
    1
}

fn default_replicas() -> u32 {
    1
}

fn default_chunk_length() -> usize {
    300
}

fn default_chunk_overlap() -> usize {
    30
}

/// Configuration of one source field that receives vector enrichment.
///
/// Loaded once at configuration time and read-only during a run; one spec
/// per configured field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorFieldSpec {
    /// Source field carrying the text.
    pub field: String,
    /// Chunked fields produce derived chunk documents; non-chunked fields
    /// get their embedding attached inline.
    #[serde(default)]
    pub chunked: bool,
    #[serde(default = "default_chunk_length")]
    pub chunk_length: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Embedding model expected to back this field. Informational: the
    /// embedding service selects its model through its own configuration.
    pub model: String,
    /// Destination collection for the derived chunk documents.
    pub collection: String,
    /// Target vector field name; `<field>_vector` when unset.
    #[serde(default)]
    pub vector_field: Option<String>,
    /// Verified against the destination schema only when set.
    #[serde(default)]
    pub similarity: Option<String>,
    #[serde(default)]
    pub hnsw_max_connections: Option<u32>,
    #[serde(default)]
    pub hnsw_beam_width: Option<u32>,
    #[serde(default)]
    pub collection_params: CollectionParams,
}

impl VectorFieldSpec {
    pub fn target_vector_field(&self) -> String {
        self.vector_field
            .clone()
            .unwrap_or_else(|| format!("{}_vector", self.field))
    }

    pub fn similarity_or_default(&self) -> Similarity {
        self.similarity
            .as_deref()
            .map_or(Similarity::Cosine, Similarity::parse_lenient)
    }
}
