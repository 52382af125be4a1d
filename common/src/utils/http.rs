use reqwest::Response;
use url::Url;

use crate::error::AppError;

/// Maps a non-success response into the retryable/non-retryable split:
/// 5xx becomes a transient [`AppError::ServiceUnavailable`], anything else
/// a terminal [`AppError::Validation`].
pub(crate) async fn ensure_success(response: Response, what: &str) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        Err(AppError::ServiceUnavailable(format!(
            "{what} returned {status}: {body}"
        )))
    } else {
        Err(AppError::Validation(format!(
            "{what} rejected request with {status}: {body}"
        )))
    }
}

pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url, AppError> {
    base.join(path)
        .map_err(|err| AppError::Internal(format!("invalid URL '{base}{path}': {err}")))
}
