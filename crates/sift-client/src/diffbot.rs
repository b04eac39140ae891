//! Hosted article extraction via the Diffbot Article API (v3).

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use sift_core::error::{AppError, ExtractionFailureReason};
use sift_core::models::ExtractedArticle;
use sift_core::traits::ContentExtractor;
use url::Url;

use crate::http::{build_client, error_body, transport_error};

const DEFAULT_BASE_URL: &str = "https://api.diffbot.com/v3";
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3500);

#[derive(Clone)]
pub struct DiffbotExtractor {
    client: Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl DiffbotExtractor {
    pub fn new(token: &str) -> Result<Self, AppError> {
        Self::build(token, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(self, base_url: &str) -> Result<Self, AppError> {
        Self::build(&self.token, base_url, self.timeout)
    }

    /// Soft timeout: passed to Diffbot and used as the HTTP client timeout.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.token, &self.base_url, timeout)
    }

    fn build(token: &str, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout,
        })
    }
}

// ---- Diffbot API types ----

#[derive(Deserialize)]
struct ArticleResponse {
    #[serde(default)]
    objects: Vec<ArticleObject>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorCode")]
    error_code: Option<u16>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticleObject {
    #[serde(default)]
    text: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    estimated_date: Option<String>,
    #[serde(default)]
    site_name: Option<String>,
}

impl ContentExtractor for DiffbotExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedArticle, AppError> {
        let timeout_ms = self.timeout.as_millis().to_string();
        let endpoint = Url::parse_with_params(
            &format!("{}/article", self.base_url),
            [
                ("token", self.token.as_str()),
                ("url", url),
                ("timeout", timeout_ms.as_str()),
            ],
        )
        .map_err(|e| AppError::HttpError(format!("Invalid Diffbot URL: {e}")))?;

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "Diffbot HTTP {}: {}",
                status.as_u16(),
                error_body(response).await
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read Diffbot response: {e}")))?;
        parse_article(url, &body)
    }
}

pub(crate) fn parse_article(url: &str, body: &str) -> Result<ExtractedArticle, AppError> {
    let response: ArticleResponse = serde_json::from_str(body)?;

    if let Some(message) = response.error {
        let reason = match response.error_code {
            Some(401 | 402 | 403) => ExtractionFailureReason::Paywall,
            Some(code) if message.to_lowercase().contains("timeout") || code == 504 => {
                ExtractionFailureReason::Timeout
            }
            _ => ExtractionFailureReason::Error,
        };
        tracing::debug!(%url, code = ?response.error_code, %message, "Diffbot returned an error");
        return Err(AppError::ExtractionFailure {
            url: url.to_string(),
            reason,
        });
    }

    let object = response
        .objects
        .into_iter()
        .find(|o| !o.text.trim().is_empty())
        .ok_or_else(|| AppError::ExtractionFailure {
            url: url.to_string(),
            reason: ExtractionFailureReason::NoText,
        })?;

    let mut article = ExtractedArticle::new(object.text);
    article.title = object.title;
    article.author = object.author.filter(|a| !a.trim().is_empty());
    article.published_at = object
        .date
        .or(object.estimated_date)
        .as_deref()
        .and_then(parse_diffbot_date);
    article.site_name = object.site_name;
    Ok(article)
}

/// Diffbot dates are RFC 2822 ("Tue, 04 Mar 2026 10:15:00 GMT"); accept
/// RFC 3339 too.
fn parse_diffbot_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
