//! Fallback extractor: fetch the page ourselves and keep the readable part.

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use sift_core::error::{AppError, ExtractionFailureReason};
use sift_core::models::ExtractedArticle;
use sift_core::traits::ContentExtractor;

use crate::cleaner::HtmdCleaner;
use crate::fetcher::ReqwestFetcher;

/// Pages shorter than this that mention a subscription wall are paywalled.
const PAYWALL_MAX_CHARS: usize = 600;

const PAYWALL_MARKERS: &[&str] = &[
    "paywall",
    "subscribe to continue",
    "subscribers only",
    "subscriber-only",
    "to continue reading",
    "already a subscriber",
];

/// Containers tried in order for the article body.
const BODY_SELECTORS: &[&str] = &["article", "main", "[role=main]", "body"];

#[derive(Clone)]
pub struct ReadableExtractor {
    fetcher: ReqwestFetcher,
    cleaner: HtmdCleaner,
}

impl ReadableExtractor {
    pub fn new(fetcher: ReqwestFetcher) -> Self {
        Self {
            fetcher,
            cleaner: HtmdCleaner::new(),
        }
    }
}

impl ContentExtractor for ReadableExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedArticle, AppError> {
        let html = self.fetcher.fetch(url).await?;
        let page = parse_page(&html, &self.cleaner)?;
        classify_page(url, page)
    }
}

/// Fields read from one HTML document.
#[derive(Debug, Default)]
pub(crate) struct ParsedPage {
    pub text: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub site_name: Option<String>,
    pub paywall_marked: bool,
}

pub(crate) fn parse_page(html: &str, cleaner: &HtmdCleaner) -> Result<ParsedPage, AppError> {
    let doc = Html::parse_document(html);

    let body_html = BODY_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| doc.select(&sel).next().map(|el| el.html()))
        .unwrap_or_else(|| html.to_string());
    let text = cleaner.clean(&body_html)?;

    let lowered = html.to_lowercase();
    Ok(ParsedPage {
        title: meta(&doc, "property", "og:title").or_else(|| first_text(&doc, "title")),
        author: meta(&doc, "name", "author").or_else(|| meta(&doc, "property", "article:author")),
        published_at: meta(&doc, "property", "article:published_time")
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|d| d.with_timezone(&Utc)),
        site_name: meta(&doc, "property", "og:site_name"),
        paywall_marked: PAYWALL_MARKERS.iter().any(|m| lowered.contains(m)),
        text,
    })
}

fn classify_page(url: &str, page: ParsedPage) -> Result<ExtractedArticle, AppError> {
    let chars = page.text.chars().count();
    if page.paywall_marked && chars < PAYWALL_MAX_CHARS {
        return Err(AppError::ExtractionFailure {
            url: url.to_string(),
            reason: ExtractionFailureReason::Paywall,
        });
    }
    if chars == 0 {
        return Err(AppError::ExtractionFailure {
            url: url.to_string(),
            reason: ExtractionFailureReason::NoText,
        });
    }

    let mut article = ExtractedArticle::new(page.text);
    article.title = page.title;
    article.author = page.author;
    article.published_at = page.published_at;
    article.site_name = page.site_name;
    Ok(article)
}

fn meta(doc: &Html, attr: &str, key: &str) -> Option<String> {
    let sel = Selector::parse(&format!("meta[{attr}=\"{key}\"]")).ok()?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let text: String = doc.select(&sel).next()?.text().collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
