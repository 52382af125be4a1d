//! Scripted fakes shared by the unit tests in this crate.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use common::{
    error::AppError,
    storage::{
        destination::{DestinationStore, FieldDef, FieldTypeDef},
        source::SourceStore,
    },
    types::vector_spec::CollectionParams,
};

use crate::services::EnrichmentServices;

enum SourceScript {
    /// Same docs for every request.
    Fixed { num_found: i64, docs: Vec<Value> },
    /// Raw body, returned verbatim.
    Raw(Value),
    /// Full corpus; requests slice it like a real paged store.
    Corpus(Vec<Value>),
}

pub(crate) struct ScriptedSource {
    script: SourceScript,
    requests: Mutex<Vec<(i64, usize)>>,
    /// start offset -> remaining transient failures to inject.
    failures: Mutex<HashMap<i64, usize>>,
    delay: Option<std::time::Duration>,
}

impl ScriptedSource {
    pub(crate) fn with_docs(num_found: i64, docs: Vec<Value>) -> Self {
        Self::new(SourceScript::Fixed { num_found, docs })
    }

    pub(crate) fn with_body(body: Value) -> Self {
        Self::new(SourceScript::Raw(body))
    }

    pub(crate) fn corpus(docs: Vec<Value>) -> Self {
        Self::new(SourceScript::Corpus(docs))
    }

    fn new(script: SourceScript) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delay: None,
        }
    }

    /// Makes every select call take at least `millis`.
    pub(crate) fn delayed(mut self, millis: u64) -> Self {
        self.delay = Some(std::time::Duration::from_millis(millis));
        self
    }

    pub(crate) async fn fail_at(&self, start: i64, times: usize) {
        self.failures.lock().await.insert(start, times);
    }

    pub(crate) async fn requests(&self) -> Vec<(i64, usize)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl SourceStore for ScriptedSource {
    async fn select(&self, _collection: &str, start: i64, rows: usize) -> Result<Value, AppError> {
        self.requests.lock().await.push((start, rows));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures.lock().await;
            if let Some(remaining) = failures.get_mut(&start) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::SourceUnavailable("injected outage".into()));
                }
            }
        }

        match &self.script {
            SourceScript::Raw(body) => Ok(body.clone()),
            SourceScript::Fixed { num_found, docs } => {
                let docs = if rows == 0 { Vec::new() } else { docs.clone() };
                Ok(json!({"response": {"numFound": num_found, "start": start, "docs": docs}}))
            }
            SourceScript::Corpus(docs) => {
                let total = docs.len();
                let from = usize::try_from(start.max(0)).unwrap_or(0).min(total);
                let to = from.saturating_add(rows).min(total);
                Ok(json!({
                    "response": {
                        "numFound": total,
                        "start": start,
                        "docs": docs[from..to].to_vec(),
                    }
                }))
            }
        }
    }
}

/// Enrichment fake: chunks deterministically, embeds by text length, and can
/// be told to fail on texts containing a marker.
pub(crate) struct RecordingServices {
    pub(crate) chunk_calls: Mutex<Vec<(String, usize, usize)>>,
    pub(crate) embed_calls: Mutex<Vec<String>>,
    pub(crate) batch_calls: Mutex<Vec<Vec<String>>>,
    pub(crate) healthy: bool,
    pub(crate) fail_marker: Option<String>,
    /// Remaining embedding calls to fail with a transient error.
    pub(crate) embed_outages: Mutex<usize>,
}

impl RecordingServices {
    pub(crate) fn new() -> Self {
        Self {
            chunk_calls: Mutex::new(Vec::new()),
            embed_calls: Mutex::new(Vec::new()),
            batch_calls: Mutex::new(Vec::new()),
            healthy: true,
            fail_marker: None,
            embed_outages: Mutex::new(0),
        }
    }

    /// Makes the next `times` embedding calls fail transiently.
    pub(crate) async fn fail_embeds_transiently(&self, times: usize) {
        *self.embed_outages.lock().await = times;
    }

    pub(crate) fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    pub(crate) fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::new()
        }
    }

    async fn take_outage(&self) -> Result<(), AppError> {
        let mut remaining = self.embed_outages.lock().await;
        if *remaining > 0 {
            *remaining -= 1;
            return Err(AppError::ServiceUnavailable("injected embed outage".into()));
        }
        Ok(())
    }

    fn check(&self, text: &str) -> Result<(), AppError> {
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker) {
                return Err(AppError::EnrichmentFailed(format!(
                    "injected failure for '{marker}'"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EnrichmentServices for RecordingServices {
    async fn chunk_text(
        &self,
        text: &str,
        chunk_length: usize,
        overlap: usize,
    ) -> Result<Vec<String>, AppError> {
        self.chunk_calls
            .lock()
            .await
            .push((text.to_string(), chunk_length, overlap));
        self.check(text)?;

        let chars: Vec<char> = text.chars().collect();
        let step = chunk_length.max(1);
        Ok(chars
            .chunks(step)
            .map(|piece| piece.iter().collect())
            .collect())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.embed_calls.lock().await.push(text.to_string());
        self.take_outage().await?;
        self.check(text)?;
        Ok(vec![text.chars().count() as f32, 1.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        self.batch_calls.lock().await.push(texts.to_vec());
        self.take_outage().await?;
        for text in texts {
            self.check(text)?;
        }
        Ok(texts
            .iter()
            .map(|text| vec![text.chars().count() as f32, 1.0])
            .collect())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if self.healthy {
            Ok(())
        } else {
            Err(AppError::ServiceUnavailable("enrichment services down".into()))
        }
    }
}

/// In-memory destination that records every write and schema mutation.
pub(crate) struct RecordingDestination {
    pub(crate) collections: Mutex<HashSet<String>>,
    /// Parameters each collection was created with, keyed by name.
    pub(crate) created_with: Mutex<HashMap<String, CollectionParams>>,
    pub(crate) field_types: Mutex<HashMap<(String, String), FieldTypeDef>>,
    pub(crate) fields: Mutex<HashMap<(String, String), FieldDef>>,
    pub(crate) documents: Mutex<HashMap<String, Vec<Value>>>,
    pub(crate) commits: Mutex<Vec<String>>,
    /// collection -> remaining transient add_documents failures to inject.
    pub(crate) write_failures: Mutex<HashMap<String, usize>>,
    pub(crate) mutation_count: Mutex<usize>,
}

impl RecordingDestination {
    pub(crate) fn new() -> Self {
        Self {
            collections: Mutex::new(HashSet::new()),
            created_with: Mutex::new(HashMap::new()),
            field_types: Mutex::new(HashMap::new()),
            fields: Mutex::new(HashMap::new()),
            documents: Mutex::new(HashMap::new()),
            commits: Mutex::new(Vec::new()),
            write_failures: Mutex::new(HashMap::new()),
            mutation_count: Mutex::new(0),
        }
    }

    pub(crate) async fn with_collections(names: &[&str]) -> Self {
        let dest = Self::new();
        {
            let mut collections = dest.collections.lock().await;
            for name in names {
                collections.insert((*name).to_string());
            }
        }
        dest
    }

    pub(crate) async fn fail_writes(&self, collection: &str, times: usize) {
        self.write_failures
            .lock()
            .await
            .insert(collection.to_string(), times);
    }

    pub(crate) async fn written(&self, collection: &str) -> Vec<Value> {
        self.documents
            .lock()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) async fn creation_params(&self, collection: &str) -> Option<CollectionParams> {
        self.created_with.lock().await.get(collection).cloned()
    }

    pub(crate) async fn mutations(&self) -> usize {
        *self.mutation_count.lock().await
    }

    async fn bump_mutations(&self) {
        *self.mutation_count.lock().await += 1;
    }
}

#[async_trait]
impl DestinationStore for RecordingDestination {
    async fn collection_exists(&self, name: &str) -> Result<bool, AppError> {
        Ok(self.collections.lock().await.contains(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        params: &CollectionParams,
    ) -> Result<(), AppError> {
        self.bump_mutations().await;
        self.collections.lock().await.insert(name.to_string());
        self.created_with
            .lock()
            .await
            .insert(name.to_string(), params.clone());
        Ok(())
    }

    async fn get_field_type(
        &self,
        collection: &str,
        name: &str,
    ) -> Result<Option<FieldTypeDef>, AppError> {
        Ok(self
            .field_types
            .lock()
            .await
            .get(&(collection.to_string(), name.to_string()))
            .cloned())
    }

    async fn add_field_type(&self, collection: &str, def: &FieldTypeDef) -> Result<(), AppError> {
        self.bump_mutations().await;
        self.field_types
            .lock()
            .await
            .insert((collection.to_string(), def.name.clone()), def.clone());
        Ok(())
    }

    async fn get_field(&self, collection: &str, name: &str) -> Result<Option<FieldDef>, AppError> {
        Ok(self
            .fields
            .lock()
            .await
            .get(&(collection.to_string(), name.to_string()))
            .cloned())
    }

    async fn add_field(&self, collection: &str, def: &FieldDef) -> Result<(), AppError> {
        self.bump_mutations().await;
        self.fields
            .lock()
            .await
            .insert((collection.to_string(), def.name.clone()), def.clone());
        Ok(())
    }

    async fn add_documents(&self, collection: &str, docs: &[Value]) -> Result<(), AppError> {
        {
            let mut failures = self.write_failures.lock().await;
            if let Some(remaining) = failures.get_mut(collection) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::ServiceUnavailable("injected write outage".into()));
                }
            }
        }

        self.documents
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .extend(docs.iter().cloned());
        Ok(())
    }

    async fn commit(&self, collection: &str) -> Result<(), AppError> {
        self.commits.lock().await.push(collection.to_string());
        Ok(())
    }

    async fn ping(&self, _collection: &str) -> Result<(), AppError> {
        Ok(())
    }
}
