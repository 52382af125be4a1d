use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use common::utils::config::{AppConfig, MigrationJob};
use migration_pipeline::coordinator::MigrationCoordinator;

/// Shared state for the job-control API.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<MigrationCoordinator>,
    pub config: AppConfig,
    /// Named job registry, seeded from configuration and extendable at
    /// runtime via the configs endpoint. Not persisted across restarts.
    jobs: Arc<RwLock<HashMap<String, MigrationJob>>>,
}

impl ApiState {
    pub fn new(coordinator: Arc<MigrationCoordinator>, config: AppConfig) -> Self {
        let jobs = Arc::new(RwLock::new(config.named_jobs.clone()));
        Self {
            coordinator,
            config,
            jobs,
        }
    }

    pub async fn resolve_job(&self, name: &str) -> Option<MigrationJob> {
        self.jobs.read().await.get(name).cloned()
    }

    pub async fn register_job(&self, name: String, job: MigrationJob) {
        self.jobs.write().await.insert(name, job);
    }
}
