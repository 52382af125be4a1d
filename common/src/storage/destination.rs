use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::{
    error::AppError,
    types::vector_spec::CollectionParams,
    utils::http::{ensure_success, join_url},
};

/// Destination schema class backing dense vector fields.
pub const DENSE_VECTOR_CLASS: &str = "solr.DenseVectorField";

/// Typed view of a destination field type. Replaces the free-form
/// attribute maps the schema API speaks natively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTypeDef {
    pub name: String,
    pub class: String,
    #[serde(rename = "vectorDimension", skip_serializing_if = "Option::is_none")]
    pub vector_dimension: Option<usize>,
    #[serde(rename = "similarityFunction", skip_serializing_if = "Option::is_none")]
    pub similarity_function: Option<String>,
    #[serde(rename = "hnswMaxConnections", skip_serializing_if = "Option::is_none")]
    pub hnsw_max_connections: Option<u32>,
    #[serde(rename = "hnswBeamWidth", skip_serializing_if = "Option::is_none")]
    pub hnsw_beam_width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default = "default_true")]
    pub indexed: bool,
    #[serde(default = "default_true")]
    pub stored: bool,
}

fn default_true() -> bool {
    true
}

/// Full surface the migration needs from the destination store. Kept as a
/// trait so the writer, schema validator, and coordinator can be exercised
/// against in-memory fakes.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool, AppError>;
    async fn create_collection(&self, name: &str, params: &CollectionParams)
        -> Result<(), AppError>;
    async fn get_field_type(
        &self,
        collection: &str,
        name: &str,
    ) -> Result<Option<FieldTypeDef>, AppError>;
    async fn add_field_type(&self, collection: &str, def: &FieldTypeDef) -> Result<(), AppError>;
    async fn get_field(&self, collection: &str, name: &str) -> Result<Option<FieldDef>, AppError>;
    async fn add_field(&self, collection: &str, def: &FieldDef) -> Result<(), AppError>;
    async fn add_documents(&self, collection: &str, docs: &[Value]) -> Result<(), AppError>;
    async fn commit(&self, collection: &str) -> Result<(), AppError>;
    async fn ping(&self, collection: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SolrDestinationClient {
    http: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct CollectionsReply {
    collections: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FieldTypeEnvelope {
    #[serde(rename = "fieldType")]
    field_type: FieldTypeDef,
}

#[derive(Debug, Deserialize)]
struct FieldEnvelope {
    field: FieldDef,
}

impl SolrDestinationClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    async fn schema_mutation(&self, collection: &str, body: Value) -> Result<(), AppError> {
        let url = join_url(&self.base_url, &format!("{collection}/schema"))?;
        let response = self.http.post(url).json(&body).send().await?;
        ensure_success(response, "destination schema API").await?;
        Ok(())
    }
}

#[async_trait]
impl DestinationStore for SolrDestinationClient {
    async fn collection_exists(&self, name: &str) -> Result<bool, AppError> {
        let url = join_url(&self.base_url, "admin/collections")?;
        let response = self
            .http
            .get(url)
            .query(&[("action", "LIST"), ("wt", "json")])
            .send()
            .await?;
        let reply: CollectionsReply = ensure_success(response, "destination admin API")
            .await?
            .json()
            .await?;
        Ok(reply.collections.iter().any(|c| c == name))
    }

    async fn create_collection(
        &self,
        name: &str,
        params: &CollectionParams,
    ) -> Result<(), AppError> {
        let url = join_url(&self.base_url, "admin/collections")?;
        let mut query = vec![
            ("action", "CREATE".to_string()),
            ("name", name.to_string()),
            ("numShards", params.num_shards.to_string()),
            ("replicationFactor", params.replication_factor.to_string()),
        ];
        if let Some(config_name) = &params.config_name {
            query.push(("collection.configName", config_name.clone()));
        }

        let response = self.http.get(url).query(&query).send().await?;
        ensure_success(response, "destination admin API").await?;
        Ok(())
    }

    async fn get_field_type(
        &self,
        collection: &str,
        name: &str,
    ) -> Result<Option<FieldTypeDef>, AppError> {
        let url = join_url(&self.base_url, &format!("{collection}/schema/fieldtypes/{name}"))?;
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: FieldTypeEnvelope = ensure_success(response, "destination schema API")
            .await?
            .json()
            .await?;
        Ok(Some(envelope.field_type))
    }

    async fn add_field_type(&self, collection: &str, def: &FieldTypeDef) -> Result<(), AppError> {
        self.schema_mutation(collection, json!({ "add-field-type": def }))
            .await
    }

    async fn get_field(&self, collection: &str, name: &str) -> Result<Option<FieldDef>, AppError> {
        let url = join_url(&self.base_url, &format!("{collection}/schema/fields/{name}"))?;
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: FieldEnvelope = ensure_success(response, "destination schema API")
            .await?
            .json()
            .await?;
        Ok(Some(envelope.field))
    }

    async fn add_field(&self, collection: &str, def: &FieldDef) -> Result<(), AppError> {
        self.schema_mutation(collection, json!({ "add-field": def })).await
    }

    async fn add_documents(&self, collection: &str, docs: &[Value]) -> Result<(), AppError> {
        let url = join_url(&self.base_url, &format!("{collection}/update"))?;
        let response = self.http.post(url).json(&docs).send().await?;
        ensure_success(response, "destination update API").await?;
        Ok(())
    }

    async fn commit(&self, collection: &str) -> Result<(), AppError> {
        let url = join_url(&self.base_url, &format!("{collection}/update"))?;
        let response = self
            .http
            .post(url)
            .query(&[("commit", "true")])
            .json(&json!([]))
            .send()
            .await?;
        ensure_success(response, "destination update API").await?;
        Ok(())
    }

    async fn ping(&self, collection: &str) -> Result<(), AppError> {
        let url = join_url(&self.base_url, &format!("{collection}/admin/ping"))?;
        let response = self.http.get(url).send().await?;
        ensure_success(response, "destination ping").await?;
        Ok(())
    }
}
