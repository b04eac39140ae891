//! Neural (embedding) search over the Exa index.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sift_core::error::AppError;
use sift_core::models::{ArticleRecord, Origin, ProviderQuery};
use sift_core::text::{host_of, looks_live};
use sift_core::traits::SearchProvider;

use crate::http::{build_client, error_body, transport_error};
use crate::providers::{SNIPPET_CHARS, clip};

const PROVIDER_NAME: &str = "exa";
const DEFAULT_BASE_URL: &str = "https://api.exa.ai";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ExaProvider {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl ExaProvider {
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::build(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(self, base_url: &str) -> Result<Self, AppError> {
        Self::build(&self.api_key, base_url, self.timeout)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.api_key, &self.base_url, timeout)
    }

    fn build(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
        })
    }

    async fn fetch(&self, query: &ProviderQuery) -> Result<Vec<ArticleRecord>, AppError> {
        let url = format!("{}/search", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&build_request(query))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(AppError::ProviderError {
                provider: PROVIDER_NAME.to_string(),
                message: format!("HTTP {}: {body}", status.as_u16()),
            });
        }

        let body = response.text().await.map_err(|e| AppError::ProviderError {
            provider: PROVIDER_NAME.to_string(),
            message: format!("Failed to read response: {e}"),
        })?;
        parse_results(&body)
    }
}

impl SearchProvider for ExaProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn search<'a>(
        &'a self,
        query: &'a ProviderQuery,
    ) -> BoxFuture<'a, Result<Vec<ArticleRecord>, AppError>> {
        Box::pin(self.fetch(query))
    }
}

// ---- Exa API types ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: String,
    #[serde(rename = "type")]
    search_type: &'static str,
    category: &'static str,
    num_results: usize,
    start_published_date: String,
    end_published_date: String,
    contents: Contents,
}

#[derive(Serialize)]
struct Contents {
    text: TextOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextOptions {
    max_characters: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    score: Option<f32>,
}

fn build_request(query: &ProviderQuery) -> SearchRequest {
    let mut text = query.facet.query.clone();
    if let Some(country) = &query.facet.country {
        text.push_str(&format!(" ({country})"));
    }
    SearchRequest {
        query: text,
        search_type: "neural",
        category: "news",
        num_results: query.limit,
        start_published_date: query.from.to_rfc3339(),
        end_published_date: query.to.to_rfc3339(),
        contents: Contents {
            text: TextOptions {
                max_characters: SNIPPET_CHARS,
            },
        },
    }
}

pub(crate) fn parse_results(body: &str) -> Result<Vec<ArticleRecord>, AppError> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response.results.into_iter().filter_map(to_record).collect())
}

fn to_record(result: ExaResult) -> Option<ArticleRecord> {
    let title = result.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
    let source_domain = host_of(&result.url)?;
    let is_live = looks_live(&title, &result.url);

    Some(ArticleRecord {
        title,
        source_domain,
        source_tier: Default::default(),
        source_region: None,
        paywall: Default::default(),
        article_type: Default::default(),
        snippet: clip(result.text.as_deref().unwrap_or_default(), SNIPPET_CHARS),
        author: result.author.filter(|a| !a.trim().is_empty()),
        published_at: result
            .published_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc)),
        word_count: None,
        origin: Origin::Neural {
            provider: PROVIDER_NAME.to_string(),
            relevance: result.score,
        },
        is_live,
        extraction: None,
        url: result.url,
    })
}
