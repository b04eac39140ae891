use std::time::Duration;

use reqwest::Client;
use sift_core::error::AppError;

pub(crate) const USER_AGENT: &str = "Sift/0.1 (news aggregation)";

pub(crate) fn build_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::HttpError(e.to_string()))
}

pub(crate) fn transport_error(e: reqwest::Error, timeout: Duration) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout.as_millis() as u64)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::HttpError(e.to_string())
    }
}

/// Read the body of a failed response for an error message, capped so a
/// whole HTML error page does not end up in the logs.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    body.chars().take(300).collect()
}
