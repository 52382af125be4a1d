use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error};

use common::{error::AppError, storage::destination::DestinationStore, utils::retry::RetryPolicy};

/// Outcome of draining every per-collection buffer.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub written: usize,
    pub failed: usize,
    pub errors: Vec<AppError>,
}

/// Batching writer in front of the destination store.
///
/// Documents are buffered per collection and written once a buffer reaches
/// the batch size. Writes are retried per the policy; an exhausted retry
/// surfaces as [`AppError::WriteFailed`] carrying the batch size so callers
/// can account for the lost documents.
pub struct DestinationWriter {
    store: Arc<dyn DestinationStore>,
    retry: RetryPolicy,
    batch_size: usize,
    buffers: Mutex<HashMap<String, Vec<Value>>>,
}

impl DestinationWriter {
    pub fn new(store: Arc<dyn DestinationStore>, retry: RetryPolicy, batch_size: usize) -> Self {
        Self {
            store,
            retry,
            batch_size: batch_size.max(1),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Writes a batch immediately, bypassing the buffer.
    pub async fn add_documents(&self, collection: &str, docs: &[Value]) -> Result<(), AppError> {
        if docs.is_empty() {
            return Ok(());
        }
        self.write_batch(collection, docs).await
    }

    /// Buffers a single document; see [`Self::enqueue`].
    pub async fn add_document(&self, collection: &str, doc: Value) -> Result<usize, AppError> {
        self.enqueue(collection, vec![doc]).await
    }

    /// Buffers documents, writing the collection's buffer once it reaches
    /// the batch size. Returns how many documents this call flushed.
    pub async fn enqueue(&self, collection: &str, docs: Vec<Value>) -> Result<usize, AppError> {
        // The buffer lock is never held across the write.
        let batch = {
            let mut buffers = self.buffers.lock().await;
            let buffer = buffers.entry(collection.to_string()).or_default();
            buffer.extend(docs);
            if buffer.len() < self.batch_size {
                return Ok(0);
            }
            std::mem::take(buffer)
        };

        let written = batch.len();
        self.write_batch(collection, &batch).await?;
        Ok(written)
    }

    /// Drains one collection's buffer. Returns how many documents went out.
    pub async fn flush(&self, collection: &str) -> Result<usize, AppError> {
        let batch = self
            .buffers
            .lock()
            .await
            .remove(collection)
            .unwrap_or_default();
        if batch.is_empty() {
            return Ok(0);
        }

        let written = batch.len();
        self.write_batch(collection, &batch).await?;
        Ok(written)
    }

    /// Drains every buffer. A failing collection does not stop the others.
    pub async fn flush_all(&self) -> FlushReport {
        let drained: Vec<(String, Vec<Value>)> =
            self.buffers.lock().await.drain().collect();

        let mut report = FlushReport::default();
        for (collection, batch) in drained {
            if batch.is_empty() {
                continue;
            }
            match self.write_batch(&collection, &batch).await {
                Ok(()) => report.written += batch.len(),
                Err(err) => {
                    error!(%collection, %err, "final flush failed");
                    report.failed += batch.len();
                    report.errors.push(err);
                }
            }
        }
        report
    }

    pub async fn commit(&self, collection: &str) -> Result<(), AppError> {
        self.retry.run(|| self.store.commit(collection)).await
    }

    async fn write_batch(&self, collection: &str, docs: &[Value]) -> Result<(), AppError> {
        self.retry
            .run(|| self.store.add_documents(collection, docs))
            .await
            .map_err(|err| AppError::WriteFailed {
                collection: collection.to_string(),
                docs: docs.len(),
                message: err.to_string(),
            })?;
        debug!(collection, docs = docs.len(), "wrote batch");
        Ok(())
    }
}
