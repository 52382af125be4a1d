use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::{error::AppError, utils::http::join_url};

/// Paged read access to the source document store.
///
/// Implementations return the raw response body; envelope parsing is the
/// source reader's job so malformed responses are diagnosed in one place.
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn select(&self, collection: &str, start: i64, rows: usize) -> Result<Value, AppError>;
}

#[derive(Clone)]
pub struct SolrSourceClient {
    http: reqwest::Client,
    base_url: Url,
}

impl SolrSourceClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl SourceStore for SolrSourceClient {
    async fn select(&self, collection: &str, start: i64, rows: usize) -> Result<Value, AppError> {
        let url = join_url(&self.base_url, &format!("{collection}/select"))?;
        let response = self
            .http
            .get(url)
            .query(&[
                ("q", "*:*".to_string()),
                ("wt", "json".to_string()),
                ("start", start.to_string()),
                ("rows", rows.to_string()),
            ])
            .send()
            .await
            .map_err(|err| AppError::SourceUnavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SourceUnavailable(format!(
                "source returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|err| AppError::MalformedResponse(format!("source response not JSON: {err}")))
    }
}
