use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::types::vector_spec::{CollectionParams, VectorFieldSpec};

/// One migration job: which source collection moves into which destination
/// collection, and which fields receive vector enrichment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub source_collection: String,
    pub destination_collection: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Expected total document count. `-1` means unknown; unset means the
    /// source store is asked before planning.
    #[serde(default)]
    pub expected_total: Option<i64>,
    #[serde(default)]
    pub vector_fields: Vec<VectorFieldSpec>,
    /// Creation parameters applied when the destination collection has to
    /// be created.
    #[serde(default)]
    pub collection_params: CollectionParams,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_retry_attempts")]
    pub attempts: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub source_address: String,
    pub destination_address: String,
    pub chunker_address: String,
    pub embedder_address: String,
    pub http_port: u16,
    /// Dimensionality the embedding service produces; the destination
    /// schema is validated against this before any write.
    pub embedding_dimension: usize,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    #[serde(default = "default_inline_char_limit")]
    pub inline_char_limit: usize,
    #[serde(default = "default_page_workers")]
    pub page_workers: usize,
    #[serde(default = "default_listener_buffer")]
    pub listener_buffer: usize,
    #[serde(default = "default_enrich_concurrency")]
    pub enrich_concurrency: usize,
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
    #[serde(default)]
    pub retry: RetrySettings,
    pub job: MigrationJob,
    #[serde(default)]
    pub named_jobs: HashMap<String, MigrationJob>,
}

pub fn default_page_size() -> usize {
    100
}

fn default_retry_attempts() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2_000
}

fn default_embed_batch_size() -> usize {
    20
}

fn default_inline_char_limit() -> usize {
    12_000
}

fn default_page_workers() -> usize {
    4
}

fn default_listener_buffer() -> usize {
    8
}

fn default_enrich_concurrency() -> usize {
    8
}

fn default_write_batch_size() -> usize {
    100
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
