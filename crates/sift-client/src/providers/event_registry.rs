//! Wire-service search over the Event Registry article index.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sift_core::error::AppError;
use sift_core::models::{ArticleRecord, ArticleType, Origin, ProviderQuery};
use sift_core::text::{host_of, looks_live};
use sift_core::traits::SearchProvider;

use crate::http::{build_client, error_body, transport_error};
use crate::providers::{SNIPPET_CHARS, clip};

const PROVIDER_NAME: &str = "event-registry";
const DEFAULT_BASE_URL: &str = "https://eventregistry.org/api/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct EventRegistryProvider {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl EventRegistryProvider {
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

    fn provider_error(&self, message: impl Into<String>) -> AppError {
        AppError::ProviderError {
            provider: PROVIDER_NAME.to_string(),
            message: message.into(),
        }
    }

    async fn fetch(&self, query: &ProviderQuery) -> Result<Vec<ArticleRecord>, AppError> {
        let url = format!("{}/article/getArticles", self.base_url);
        let request = build_request(query, &self.api_key);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(self.provider_error(format!("HTTP {}: {body}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.provider_error(format!("Failed to read response: {e}")))?;
        parse_articles(&body)
    }
}

impl SearchProvider for EventRegistryProvider {
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

// ---- Event Registry API types ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArticlesRequest {
    action: &'static str,
    keyword: String,
    keyword_loc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    category_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_location_uri: Option<String>,
    date_start: String,
    date_end: String,
    lang: &'static str,
    data_type: Vec<&'static str>,
    is_duplicate_filter: &'static str,
    result_type: &'static str,
    articles_page: u32,
    articles_count: usize,
    articles_sort_by: &'static str,
    include_article_event_uri: bool,
    include_article_authors: bool,
    api_key: String,
}

#[derive(Deserialize)]
struct ArticlesResponse {
    #[serde(default)]
    articles: Option<ArticlesPage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ArticlesPage {
    #[serde(default)]
    results: Vec<ErArticle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErArticle {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    date_time_pub: Option<String>,
    #[serde(default)]
    date_time: Option<String>,
    #[serde(default)]
    source: Option<ErSource>,
    #[serde(default)]
    authors: Vec<ErAuthor>,
    #[serde(default)]
    event_uri: Option<String>,
    #[serde(default)]
    is_duplicate: bool,
    #[serde(default)]
    data_type: Option<String>,
}

#[derive(Deserialize)]
struct ErSource {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Deserialize)]
struct ErAuthor {
    #[serde(default)]
    name: Option<String>,
}

fn build_request(query: &ProviderQuery, api_key: &str) -> ArticlesRequest {
    ArticlesRequest {
        action: "getArticles",
        keyword: query.facet.query.clone(),
        keyword_loc: "body,title",
        category_uri: query.facet.category.as_ref().map(|c| format!("news/{c}")),
        source_location_uri: query
            .facet
            .country
            .as_ref()
            .map(|c| format!("http://en.wikipedia.org/wiki/{}", c.replace(' ', "_"))),
        date_start: query.from.format("%Y-%m-%d").to_string(),
        date_end: query.to.format("%Y-%m-%d").to_string(),
        lang: "eng",
        data_type: vec!["news", "blog"],
        is_duplicate_filter: "skipDuplicates",
        result_type: "articles",
        articles_page: 1,
        articles_count: query.limit,
        articles_sort_by: "rel",
        include_article_event_uri: true,
        include_article_authors: true,
        api_key: api_key.to_string(),
    }
}

pub(crate) fn parse_articles(body: &str) -> Result<Vec<ArticleRecord>, AppError> {
    let response: ArticlesResponse = serde_json::from_str(body)?;
    if let Some(message) = response.error {
        return Err(AppError::ProviderError {
            provider: PROVIDER_NAME.to_string(),
            message,
        });
    }

    let records = response
        .articles
        .map(|page| page.results)
        .unwrap_or_default()
        .into_iter()
        .filter(|a| !a.is_duplicate && !a.title.trim().is_empty())
        .filter_map(to_record)
        .collect();
    Ok(records)
}

fn to_record(article: ErArticle) -> Option<ArticleRecord> {
    let source_domain = article
        .source
        .and_then(|s| s.uri)
        .filter(|u| !u.is_empty())
        .or_else(|| host_of(&article.url))?;
    let article_type = match article.data_type.as_deref() {
        Some("blog") => ArticleType::Blog,
        Some("pr") => ArticleType::PressRelease,
        _ => ArticleType::News,
    };
    let is_live = looks_live(&article.title, &article.url);

    Some(ArticleRecord {
        title: article.title.trim().to_string(),
        url: article.url,
        source_domain,
        source_tier: Default::default(),
        source_region: None,
        paywall: Default::default(),
        article_type,
        snippet: clip(&article.body, SNIPPET_CHARS),
        author: article.authors.into_iter().find_map(|a| a.name),
        published_at: article
            .date_time_pub
            .or(article.date_time)
            .as_deref()
            .and_then(parse_er_datetime),
        word_count: None,
        origin: Origin::Wire {
            provider: PROVIDER_NAME.to_string(),
            event_id: article.event_uri,
        },
        is_live,
        extraction: None,
    })
}

/// Event Registry sends `2026-03-04T10:15:00Z`, occasionally without the zone.
fn parse_er_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|n| n.and_utc()))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sift_core::models::Facet;

    fn query() -> ProviderQuery {
        let mut facet = Facet::new("senate budget");
        facet.category = Some("Politics".into());
        facet.country = Some("United States".into());
        ProviderQuery {
            facet,
            from: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap(),
            limit: 10,
        }
    }

    #[test]
    fn test_request_carries_window_and_facet_filters() {
        let json = serde_json::to_value(build_request(&query(), "key")).unwrap();
        assert_eq!(json["keyword"], "senate budget");
        assert_eq!(json["dateStart"], "2026-03-01");
        assert_eq!(json["dateEnd"], "2026-03-08");
        assert_eq!(json["articlesCount"], 10);
        assert_eq!(json["categoryUri"], "news/Politics");
        assert_eq!(
            json["sourceLocationUri"],
            "http://en.wikipedia.org/wiki/United_States"
        );
        assert_eq!(json["apiKey"], "key");
    }

    #[test]
    fn test_request_omits_absent_filters() {
        let mut q = query();
        q.facet.category = None;
        q.facet.country = None;
        let json = serde_json::to_value(build_request(&q, "key")).unwrap();
        assert!(json.get("categoryUri").is_none());
        assert!(json.get("sourceLocationUri").is_none());
    }

    #[test]
    fn test_parses_results_into_wire_records() {
        let body = r#"{"articles":{"results":[
            {"uri":"1","url":"https://www.reuters.com/world/senate-budget","title":"Senate passes budget ",
             "body":"WASHINGTON (Reuters) - The Senate passed...","dateTimePub":"2026-03-04T10:15:00Z",
             "source":{"uri":"reuters.com","title":"Reuters"},"authors":[{"name":"Jane Reporter"}],
             "eventUri":"eng-123","isDuplicate":false,"dataType":"news"},
            {"uri":"2","url":"https://blog.example.org/p","title":"Budget thoughts","body":"...",
             "dateTime":"2026-03-04T11:00:00","source":{"uri":""},"dataType":"blog"},
            {"uri":"3","url":"https://copy.example.com/x","title":"Senate passes budget","isDuplicate":true}
        ]}}"#;
        let records = parse_articles(body).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.title, "Senate passes budget");
        assert_eq!(first.source_domain, "reuters.com");
        assert_eq!(first.author.as_deref(), Some("Jane Reporter"));
        assert_eq!(
            first.origin,
            Origin::Wire {
                provider: "event-registry".into(),
                event_id: Some("eng-123".into())
            }
        );
        assert!(first.published_at.is_some());

        let second = &records[1];
        assert_eq!(second.source_domain, "blog.example.org");
        assert_eq!(second.article_type, ArticleType::Blog);
        assert!(second.published_at.is_some());
    }

    #[test]
    fn test_live_blog_urls_flagged() {
        let body = r#"{"articles":{"results":[
            {"uri":"1","url":"https://www.theguardian.com/us-news/live/2026/mar/04/senate-budget-vote",
             "title":"Senate budget vote","body":"Follow along...","dataType":"news"},
            {"uri":"2","url":"https://www.reuters.com/world/senate-budget","title":"Senate passes budget",
             "body":"WASHINGTON (Reuters)","dataType":"news"}
        ]}}"#;
        let records = parse_articles(body).unwrap();
        assert!(records[0].is_live);
        assert!(!records[1].is_live);
    }

    #[test]
    fn test_api_error_is_provider_error() {
        let err = parse_articles(r#"{"error":"Invalid API key"}"#).unwrap_err();
        assert!(matches!(err, AppError::ProviderError { .. }));
    }

    #[test]
    fn test_missing_articles_is_empty() {
        assert!(parse_articles("{}").unwrap().is_empty());
    }
}
