use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use common::{
    error::AppError,
    storage::{destination::DestinationStore, source::SourceStore},
    types::{
        chunk_document::ChunkDocument,
        crawl_run::CrawlRun,
        document::{Document, CREATED_DATE_FIELD},
    },
    utils::{
        config::{AppConfig, MigrationJob},
        retry::RetryPolicy,
    },
};

use crate::{
    enrich::EnrichmentEngine,
    planner::{plan_pages, UNKNOWN_TOTAL},
    progress::{ProgressTracker, Track, TrackState},
    reader::SourceReader,
    schema::SchemaValidator,
    services::EnrichmentServices,
    writer::DestinationWriter,
};

/// Tunables the coordinator needs beyond the job itself.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub embedding_dimension: usize,
    pub embed_batch_size: usize,
    pub inline_char_limit: usize,
    pub page_workers: usize,
    pub listener_buffer: usize,
    pub enrich_concurrency: usize,
    pub write_batch_size: usize,
    pub retry: RetryPolicy,
}

impl From<&AppConfig> for CoordinatorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            embedding_dimension: config.embedding_dimension,
            embed_batch_size: config.embed_batch_size,
            inline_char_limit: config.inline_char_limit,
            page_workers: config.page_workers,
            listener_buffer: config.listener_buffer,
            enrich_concurrency: config.enrich_concurrency,
            write_batch_size: config.write_batch_size,
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

/// Owns a migration run end to end: single-flight admission, schema
/// validation, page dispatch, document fan-out, and finalization.
#[derive(Clone)]
pub struct MigrationCoordinator {
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
    services: Arc<dyn EnrichmentServices>,
    tracker: Arc<ProgressTracker>,
    run_guard: Arc<Semaphore>,
    settings: CoordinatorSettings,
}

impl MigrationCoordinator {
    pub fn new(
        source: Arc<dyn SourceStore>,
        destination: Arc<dyn DestinationStore>,
        services: Arc<dyn EnrichmentServices>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            source,
            destination,
            services,
            tracker: Arc::new(ProgressTracker::default()),
            run_guard: Arc::new(Semaphore::new(1)),
            settings,
        }
    }

    pub fn tracker(&self) -> Arc<ProgressTracker> {
        self.tracker.clone()
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.services.health_check().await
    }

    /// Admits a run and returns its id immediately; the work happens on a
    /// spawned task. A second start while a run is active is rejected, not
    /// queued.
    pub async fn start_run(&self, job: MigrationJob) -> Result<String, AppError> {
        let permit = self
            .run_guard
            .clone()
            .try_acquire_owned()
            .map_err(|_| AppError::ConcurrentRunRejected)?;

        self.services.health_check().await?;

        self.tracker.reset();
        let run_id = CrawlRun::generate_id();
        self.tracker.start_tracking(&run_id)?;
        info!(%run_id, source = %job.source_collection, "migration run accepted");

        let coordinator = self.clone();
        let spawned_id = run_id.clone();
        tokio::spawn(async move {
            let _permit = permit;
            coordinator.execute(spawned_id, job).await;
        });

        Ok(run_id)
    }

    async fn execute(&self, run_id: String, job: MigrationJob) {
        match self.run_inner(&run_id, &job).await {
            Ok(()) => {
                info!(%run_id, "migration run complete");
                self.tracker
                    .force_finalize(TrackState::Completed, "run complete");
            }
            Err(err) => {
                error!(%run_id, %err, "migration run failed");
                self.tracker.force_finalize(TrackState::Failed, &err.to_string());
            }
        }
    }

    async fn run_inner(&self, run_id: &str, job: &MigrationJob) -> Result<(), AppError> {
        let validator = SchemaValidator::new(self.destination.clone(), self.settings.embedding_dimension);
        let resolved_specs = validator.ensure_all(job).await?;

        let reader = Arc::new(SourceReader::new(
            self.source.clone(),
            job.source_collection.clone(),
            job.page_size,
        ));

        let expected_total = match job.expected_total {
            Some(total) => total.max(UNKNOWN_TOTAL),
            None => reader.total().await?,
        };
        let run = Arc::new(CrawlRun::new(
            run_id,
            expected_total,
            plan_pages(expected_total, job.page_size),
        ));
        if run.total_is_known() {
            self.tracker
                .set_found_total(Track::Main, run.expected_total as u64);
        }

        let engine = Arc::new(EnrichmentEngine::new(
            self.services.clone(),
            resolved_specs,
            self.settings.retry.clone(),
            self.settings.inline_char_limit,
            self.settings.embed_batch_size,
            job.destination_collection.clone(),
        ));
        let writer = Arc::new(DestinationWriter::new(
            self.destination.clone(),
            self.settings.retry.clone(),
            self.settings.write_batch_size,
        ));

        let chunk_collections: BTreeSet<String> = engine
            .chunked_specs()
            .map(|spec| spec.collection.clone())
            .collect();

        let buffer = self.settings.listener_buffer.max(1);
        let (export_tx, export_rx) = mpsc::channel::<Document>(buffer);
        let export_handle = tokio::spawn(export_listener(
            export_rx,
            engine.clone(),
            writer.clone(),
            self.tracker.clone(),
            job.destination_collection.clone(),
            self.settings.enrich_concurrency,
        ));

        let (chunk_tx, chunk_handle) = if engine.has_chunked_specs() {
            let (tx, rx) = mpsc::channel::<Document>(buffer);
            let handle = tokio::spawn(chunk_listener(
                rx,
                engine.clone(),
                writer.clone(),
                self.tracker.clone(),
                run.clone(),
                self.settings.enrich_concurrency,
            ));
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        let paging = if run.total_is_known() {
            self.dispatch_pages(&reader, &run, job, export_tx, chunk_tx).await
        } else {
            self.page_sequentially(&reader, export_tx, chunk_tx).await
        };

        // Listeners drain whatever the pages managed to send before the
        // paging outcome is allowed to fail the run.
        export_handle.await?;
        if let Some(handle) = chunk_handle {
            handle.await?;
        }
        paging?;

        let report = writer.flush_all().await;

        writer.commit(&job.destination_collection).await?;
        for collection in &chunk_collections {
            writer.commit(collection).await?;
        }

        if report.failed > 0 {
            return Err(AppError::Internal(format!(
                "final flush lost {} document(s)",
                report.failed
            )));
        }
        Ok(())
    }

    /// Known-total path: one task per page, bounded by the worker count.
    /// A failed page is charged against MAIN for the documents it was
    /// expected to hold; the other pages keep going.
    async fn dispatch_pages(
        &self,
        reader: &Arc<SourceReader>,
        run: &Arc<CrawlRun>,
        job: &MigrationJob,
        export_tx: mpsc::Sender<Document>,
        chunk_tx: Option<mpsc::Sender<Document>>,
    ) -> Result<(), AppError> {
        let worker_slots = Arc::new(Semaphore::new(self.settings.page_workers.max(1)));
        let mut handles = Vec::with_capacity(run.pages as usize);

        for page in 0..run.pages {
            let permit = worker_slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| AppError::Internal("page worker semaphore closed".into()))?;
            let reader = reader.clone();
            let export_tx = export_tx.clone();
            let chunk_tx = chunk_tx.clone();
            let tracker = self.tracker.clone();
            let retry = self.settings.retry.clone();
            let expected = expected_docs(page, run.expected_total, job.page_size);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                match retry.run(|| reader.fetch(page)).await {
                    Ok(raw) => {
                        fan_out(raw.documents, &export_tx, chunk_tx.as_ref(), &tracker).await;
                    }
                    Err(err) => {
                        warn!(page, %err, "page fetch failed after retries");
                        tracker.add_failed(Track::Main, expected);
                    }
                }
            });
            handles.push((page, handle));
        }
        drop(export_tx);
        drop(chunk_tx);

        for (page, handle) in handles {
            if let Err(join_err) = handle.await {
                error!(page, %join_err, "page task aborted");
                self.tracker
                    .add_failed(Track::Main, expected_docs(page, run.expected_total, job.page_size));
            }
        }
        Ok(())
    }

    /// Unknown-total path: pages are fetched in order until one comes back
    /// short or empty. A fetch failure here aborts the run since there is
    /// no way to know how much was missed.
    async fn page_sequentially(
        &self,
        reader: &Arc<SourceReader>,
        export_tx: mpsc::Sender<Document>,
        chunk_tx: Option<mpsc::Sender<Document>>,
    ) -> Result<(), AppError> {
        let mut page = 0;
        loop {
            let raw = self.settings.retry.run(|| reader.fetch(page)).await?;
            let fetched = raw.documents.len();
            self.tracker.add_found(Track::Main, fetched as u64);
            fan_out(raw.documents, &export_tx, chunk_tx.as_ref(), &self.tracker).await;

            if fetched < reader.page_size() {
                return Ok(());
            }
            page += 1;
        }
    }
}

fn expected_docs(page: i64, total: i64, page_size: usize) -> u64 {
    let remaining = total - page * page_size as i64;
    remaining.clamp(0, page_size as i64) as u64
}

async fn fan_out(
    documents: Vec<Document>,
    export_tx: &mpsc::Sender<Document>,
    chunk_tx: Option<&mpsc::Sender<Document>>,
    tracker: &ProgressTracker,
) {
    for doc in documents {
        let for_chunks = chunk_tx.map(|_| doc.clone());
        if export_tx.send(doc).await.is_err() {
            tracker.add_failed(Track::Main, 1);
            continue;
        }
        if let (Some(tx), Some(doc)) = (chunk_tx, for_chunks) {
            // A closed chunk listener surfaces through VECTOR counts
            // staying behind; the primary export is unaffected.
            let _ = tx.send(doc).await;
        }
    }
}

/// Consumes fetched documents: normalizes the creation date, attaches
/// inline vectors, and hands the document to the writer. Owns all
/// MAIN-track accounting for successfully fetched documents.
async fn export_listener(
    rx: mpsc::Receiver<Document>,
    engine: Arc<EnrichmentEngine>,
    writer: Arc<DestinationWriter>,
    tracker: Arc<ProgressTracker>,
    collection: String,
    concurrency: usize,
) {
    let documents = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|doc| (doc, rx))
    });

    documents
        .for_each_concurrent(concurrency.max(1), |mut doc| {
            let engine = &engine;
            let writer = &writer;
            let tracker = &tracker;
            let collection = &collection;
            async move {
                doc.normalize_created_date(CREATED_DATE_FIELD);
                let failures = engine.enrich_inline(&mut doc).await;
                let enrich_failed = !failures.is_empty();

                match writer.add_document(collection, doc.into_value()).await {
                    Ok(_) if enrich_failed => tracker.add_failed(Track::Main, 1),
                    Ok(_) => tracker.add_processed(Track::Main, 1),
                    Err(err) => {
                        warn!(%err, "primary document write failed");
                        tracker.add_failed(Track::Main, 1);
                    }
                }
            }
        })
        .await;
}

/// Consumes fetched documents and produces chunk documents for every
/// chunked spec. One (document, field) pair is one VECTOR-track unit.
async fn chunk_listener(
    rx: mpsc::Receiver<Document>,
    engine: Arc<EnrichmentEngine>,
    writer: Arc<DestinationWriter>,
    tracker: Arc<ProgressTracker>,
    run: Arc<CrawlRun>,
    concurrency: usize,
) {
    let documents = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|doc| (doc, rx))
    });

    documents
        .for_each_concurrent(concurrency.max(1), |doc| {
            let engine = &engine;
            let writer = &writer;
            let tracker = &tracker;
            let run = &run;
            async move {
                for spec in engine.chunked_specs() {
                    if !doc.has_field(&spec.field) {
                        continue;
                    }
                    tracker.add_found(Track::Vector, 1);

                    let chunks = match engine.chunk_field(&doc, spec, run).await {
                        Ok(chunks) => chunks,
                        Err(err) => {
                            warn!(
                                doc_id = doc.id().unwrap_or("<missing>"),
                                field = %spec.field,
                                %err,
                                "chunk enrichment failed"
                            );
                            tracker.add_failed(Track::Vector, 1);
                            continue;
                        }
                    };

                    let values: Result<Vec<_>, _> =
                        chunks.iter().map(ChunkDocument::to_value).collect();
                    let outcome = match values {
                        Ok(values) => writer.enqueue(&spec.collection, values).await.map(|_| ()),
                        Err(err) => Err(err),
                    };
                    match outcome {
                        Ok(()) => tracker.add_processed(Track::Vector, 1),
                        Err(err) => {
                            warn!(field = %spec.field, %err, "chunk write failed");
                            tracker.add_failed(Track::Vector, 1);
                        }
                    }
                }
            }
        })
        .await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::testing::{RecordingDestination, RecordingServices, ScriptedSource};

    use super::*;

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            embedding_dimension: 2,
            embed_batch_size: 4,
            inline_char_limit: 0,
            page_workers: 4,
            listener_buffer: 8,
            enrich_concurrency: 4,
            write_batch_size: 10,
            retry: RetryPolicy::new(3, 1, 5),
        }
    }

    fn job(page_size: usize, specs: serde_json::Value) -> MigrationJob {
        serde_json::from_value(json!({
            "source_collection": "archive",
            "destination_collection": "pages",
            "page_size": page_size,
            "vector_fields": specs,
        }))
        .expect("valid job")
    }

    fn corpus(total: usize) -> Vec<serde_json::Value> {
        (0..total)
            .map(|n| {
                json!({
                    "id": format!("doc-{n}"),
                    "title": format!("title {n}"),
                    "body": "0123456789",
                    "date_created": 1588327200123i64,
                })
            })
            .collect()
    }

    fn coordinator(
        source: Arc<ScriptedSource>,
        destination: Arc<RecordingDestination>,
        services: Arc<RecordingServices>,
    ) -> Arc<MigrationCoordinator> {
        Arc::new(MigrationCoordinator::new(
            source,
            destination,
            services,
            settings(),
        ))
    }

    async fn wait_for_run(tracker: &ProgressTracker) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if tracker.status(Track::Main).state.is_terminal()
                    && tracker.status(Track::Vector).state.is_terminal()
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("run should reach a terminal state");
    }

    #[tokio::test]
    async fn full_run_migrates_every_page() {
        let source = Arc::new(ScriptedSource::corpus(corpus(250)));
        let destination = Arc::new(RecordingDestination::new());
        let services = Arc::new(RecordingServices::new());
        let coordinator = coordinator(source, destination.clone(), services);

        let job = job(
            100,
            json!([
                {"field": "title", "model": "mini", "collection": "pages"},
                {"field": "body", "chunked": true, "chunk_length": 4, "model": "mini",
                 "collection": "body_chunks"},
            ]),
        );
        coordinator.start_run(job).await.expect("accepted");
        wait_for_run(&coordinator.tracker()).await;

        let main = coordinator.tracker().status(Track::Main);
        assert_eq!(main.state, TrackState::Completed);
        assert_eq!(main.found, 250);
        assert_eq!(main.processed, 250);
        assert_eq!(main.failed, 0);

        let vector = coordinator.tracker().status(Track::Vector);
        assert_eq!(vector.state, TrackState::Completed);
        assert_eq!(vector.processed, 250);

        let written = destination.written("pages").await;
        assert_eq!(written.len(), 250);
        assert!(written.iter().all(|doc| doc.get("title_vector").is_some()));
        // Epoch millis normalized to the canonical format.
        assert!(written
            .iter()
            .all(|doc| doc["date_created"] == json!("2020-05-01T10:00:00.123Z")));

        // Ten-char body with chunk length four gives three chunks per doc.
        let chunks = destination.written("body_chunks").await;
        assert_eq!(chunks.len(), 750);
        assert!(chunks.iter().any(|c| c["doc_id"] == json!("doc-0#0000002")));

        let commits = destination.commits.lock().await.clone();
        assert!(commits.contains(&"pages".to_string()));
        assert!(commits.contains(&"body_chunks".to_string()));
    }

    #[tokio::test]
    async fn concurrent_starts_are_rejected_not_queued() {
        let source = Arc::new(ScriptedSource::corpus(corpus(20)).delayed(100));
        let destination = Arc::new(RecordingDestination::new());
        let services = Arc::new(RecordingServices::new());
        let coordinator = coordinator(source, destination, services);
        let job = job(10, json!([]));

        coordinator.start_run(job.clone()).await.expect("first run");
        let err = coordinator
            .start_run(job.clone())
            .await
            .expect_err("second start while active");
        assert!(matches!(err, AppError::ConcurrentRunRejected));

        wait_for_run(&coordinator.tracker()).await;
        // The permit is released once the run finishes.
        coordinator.start_run(job).await.expect("next run");
        wait_for_run(&coordinator.tracker()).await;
    }

    #[tokio::test]
    async fn unhealthy_services_reject_the_run_up_front() {
        let source = Arc::new(ScriptedSource::corpus(corpus(5)));
        let destination = Arc::new(RecordingDestination::new());
        let services = Arc::new(RecordingServices::unhealthy());
        let coordinator = coordinator(source, destination, services);

        let err = coordinator
            .start_run(job(10, json!([])))
            .await
            .expect_err("services down");
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
        assert_eq!(
            coordinator.tracker().status(Track::Main).state,
            TrackState::NotStarted
        );
    }

    #[tokio::test]
    async fn transient_source_outage_is_retried() {
        let source = Arc::new(ScriptedSource::corpus(corpus(250)));
        source.fail_at(100, 1).await;
        let destination = Arc::new(RecordingDestination::new());
        let services = Arc::new(RecordingServices::new());
        let coordinator = coordinator(source, destination.clone(), services);

        coordinator.start_run(job(100, json!([]))).await.expect("accepted");
        wait_for_run(&coordinator.tracker()).await;

        let main = coordinator.tracker().status(Track::Main);
        assert_eq!(main.state, TrackState::Completed);
        assert_eq!(main.processed, 250);
        assert_eq!(destination.written("pages").await.len(), 250);
    }

    #[tokio::test]
    async fn persistent_page_failure_is_charged_to_that_page_only() {
        let source = Arc::new(ScriptedSource::corpus(corpus(250)));
        source.fail_at(100, 10).await;
        let destination = Arc::new(RecordingDestination::new());
        let services = Arc::new(RecordingServices::new());
        let coordinator = coordinator(source, destination.clone(), services);

        coordinator.start_run(job(100, json!([]))).await.expect("accepted");
        wait_for_run(&coordinator.tracker()).await;

        let main = coordinator.tracker().status(Track::Main);
        assert_eq!(main.state, TrackState::Completed);
        assert_eq!(main.found, 250);
        assert_eq!(main.processed, 150);
        assert_eq!(main.failed, 100);
        assert_eq!(destination.written("pages").await.len(), 150);
    }

    #[tokio::test]
    async fn unknown_total_pages_sequentially_until_short_page() {
        let source = Arc::new(ScriptedSource::corpus(corpus(25)));
        let destination = Arc::new(RecordingDestination::new());
        let services = Arc::new(RecordingServices::new());
        let coordinator = coordinator(source.clone(), destination.clone(), services);

        let mut job = job(10, json!([]));
        job.expected_total = Some(-1);
        coordinator.start_run(job).await.expect("accepted");
        wait_for_run(&coordinator.tracker()).await;

        let main = coordinator.tracker().status(Track::Main);
        assert_eq!(main.state, TrackState::Completed);
        assert_eq!(main.found, 25);
        assert_eq!(main.processed, 25);
        assert_eq!(destination.written("pages").await.len(), 25);

        // Strictly ordered offsets, ending on the short page.
        assert_eq!(source.requests().await, vec![(0, 10), (10, 10), (20, 10)]);
    }

    #[tokio::test]
    async fn failed_inline_enrichment_still_writes_the_document() {
        let docs = vec![
            json!({"id": "doc-0", "title": "fine"}),
            json!({"id": "doc-1", "title": "bad apple"}),
        ];
        let source = Arc::new(ScriptedSource::corpus(docs));
        let destination = Arc::new(RecordingDestination::new());
        let services = Arc::new(RecordingServices::failing_on("bad"));
        let coordinator = coordinator(source, destination.clone(), services);

        let job = job(10, json!([{"field": "title", "model": "mini", "collection": "pages"}]));
        coordinator.start_run(job).await.expect("accepted");
        wait_for_run(&coordinator.tracker()).await;

        let main = coordinator.tracker().status(Track::Main);
        assert_eq!(main.processed, 1);
        assert_eq!(main.failed, 1);
        assert_eq!(main.state, TrackState::Completed);

        // Both documents land; only one carries a vector.
        let written = destination.written("pages").await;
        assert_eq!(written.len(), 2);
        let vectors = written
            .iter()
            .filter(|doc| doc.get("title_vector").is_some())
            .count();
        assert_eq!(vectors, 1);
    }
}
