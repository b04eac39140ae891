use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Reliability ledger vocabulary
// ---------------------------------------------------------------------------

/// Result classification of one search or extraction attempt against a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    Paywall,
    Timeout,
    NoText,
    Junk,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Paywall => "paywall",
            Outcome::Timeout => "timeout",
            Outcome::NoText => "no-text",
            Outcome::Junk => "junk",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(Outcome::Success),
            "paywall" => Ok(Outcome::Paywall),
            "timeout" => Ok(Outcome::Timeout),
            "no-text" | "notext" => Ok(Outcome::NoText),
            "junk" => Ok(Outcome::Junk),
            _ => Err(format!("Unknown outcome: {s}")),
        }
    }
}

/// Derived reliability status of a source domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Probation,
    Blocked,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Active => "active",
            SourceStatus::Probation => "probation",
            SourceStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SourceStatus::Active),
            "probation" => Ok(SourceStatus::Probation),
            "blocked" => Ok(SourceStatus::Blocked),
            _ => Err(format!("Unknown source status: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

/// Editorial tier of an outlet (1 = wire services and papers of record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    Tier1,
    Tier2,
    Tier3,
    #[default]
    Unknown,
}

impl SourceTier {
    pub fn from_number(n: u8) -> Self {
        match n {
            1 => SourceTier::Tier1,
            2 => SourceTier::Tier2,
            3 => SourceTier::Tier3,
            _ => SourceTier::Unknown,
        }
    }

    /// Score contribution: tier 1 → +3, tier 2 → +2, tier 3 → +1, unknown → 0.
    pub fn weight(&self) -> f64 {
        match self {
            SourceTier::Tier1 => 3.0,
            SourceTier::Tier2 => 2.0,
            SourceTier::Tier3 => 1.0,
            SourceTier::Unknown => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaywallStatus {
    #[default]
    Free,
    Metered,
    Hard,
}

impl PaywallStatus {
    /// Score contribution: free → +2, metered → +1, hard → 0.
    pub fn weight(&self) -> f64 {
        match self {
            PaywallStatus::Free => 2.0,
            PaywallStatus::Metered => 1.0,
            PaywallStatus::Hard => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArticleType {
    #[default]
    News,
    Opinion,
    Analysis,
    PressRelease,
    Blog,
}

/// Which upstream search produced a record, with provider-specific facts
/// normalised at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Origin {
    /// Keyword search over a wire-service / news index.
    Wire {
        provider: String,
        #[serde(default)]
        event_id: Option<String>,
    },
    /// Embedding-based search.
    Neural {
        provider: String,
        #[serde(default)]
        relevance: Option<f32>,
    },
}

impl Origin {
    pub fn provider(&self) -> &str {
        match self {
            Origin::Wire { provider, .. } | Origin::Neural { provider, .. } => provider,
        }
    }

    pub fn is_neural(&self) -> bool {
        matches!(self, Origin::Neural { .. })
    }
}

/// Article body and metadata produced by a content extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedArticle {
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub site_name: Option<String>,
    /// SHA-256 of the whitespace-normalised body.
    pub content_hash: String,
}

impl ExtractedArticle {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        Self {
            content_hash: compute_hash(&normalized),
            text,
            title: None,
            author: None,
            published_at: None,
            site_name: None,
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn word_count(&self) -> u32 {
        self.text.split_whitespace().count() as u32
    }
}

/// A candidate news item, normalised from a provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    pub title: String,
    pub url: String,
    pub source_domain: String,
    #[serde(default)]
    pub source_tier: SourceTier,
    #[serde(default)]
    pub source_region: Option<String>,
    #[serde(default)]
    pub paywall: PaywallStatus,
    #[serde(default)]
    pub article_type: ArticleType,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub word_count: Option<u32>,
    pub origin: Origin,
    /// Live-blog page. Set by the provider adapters and carried to the
    /// summarizer in the candidate payload.
    #[serde(default)]
    pub is_live: bool,
    /// Extraction payload, carried untouched to the summarizer.
    #[serde(default)]
    pub extraction: Option<ExtractedArticle>,
}

impl ArticleRecord {
    /// Length of the best available body: extracted text or provider snippet.
    pub fn content_chars(&self) -> usize {
        let snippet = self.snippet.chars().count();
        self.extraction
            .as_ref()
            .map(|e| e.char_count().max(snippet))
            .unwrap_or(snippet)
    }

    /// Backfill snippet, author, date and word count from an extraction.
    /// Fields the provider already supplied are left alone.
    pub fn apply_extraction(&mut self, article: ExtractedArticle) {
        if self.snippet.trim().is_empty() {
            self.snippet = article.text.chars().take(600).collect();
        }
        if self.author.is_none() {
            self.author = article.author.clone();
        }
        if self.published_at.is_none() {
            self.published_at = article.published_at;
        }
        if self.word_count.is_none() {
            self.word_count = Some(article.word_count());
        }
        self.extraction = Some(article);
    }
}

// ---------------------------------------------------------------------------
// Query classification
// ---------------------------------------------------------------------------

/// Selection strategy chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Broad "what's happening" sweep across many topics.
    Survey,
    /// Several angles on one theme.
    Thematic,
    /// One story from as many independent outlets as possible.
    Deep,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Survey => "survey",
            SearchMode::Thematic => "thematic",
            SearchMode::Deep => "deep",
        }
    }

    /// Maximum articles per canonical outlet in the first selection pass.
    pub fn outlet_cap(&self) -> usize {
        match self {
            SearchMode::Survey => 1,
            SearchMode::Thematic => 2,
            SearchMode::Deep => 1,
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "survey" => Ok(SearchMode::Survey),
            "thematic" => Ok(SearchMode::Thematic),
            "deep" => Ok(SearchMode::Deep),
            _ => Err(format!("Unknown search mode: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recency {
    Breaking,
    Recent,
    General,
}

impl Recency {
    /// Search window: breaking → 2 days, recent → 7 days, general → 30 days.
    pub fn window_days(&self) -> i64 {
        match self {
            Recency::Breaking => 2,
            Recency::Recent => 7,
            Recency::General => 30,
        }
    }
}

impl FromStr for Recency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "breaking" => Ok(Recency::Breaking),
            "recent" => Ok(Recency::Recent),
            "general" => Ok(Recency::General),
            _ => Err(format!("Unknown recency: {s}")),
        }
    }
}

/// One sub-query handed to every provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Facet {
    pub query: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Facet {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            category: None,
            country: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub mode: SearchMode,
    pub recency: Recency,
    pub facets: Vec<Facet>,
}

/// What a provider is asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQuery {
    pub facet: Facet,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: usize,
}

// ---------------------------------------------------------------------------
// Output shapes
// ---------------------------------------------------------------------------

/// Articles that cover the same story, grouped for the summarizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleCluster {
    pub keywords: BTreeSet<String>,
    /// Indices into the selected article list.
    pub members: Vec<usize>,
}

/// Verified, domain-tagged payload produced by an enrichment hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentData {
    pub hook: String,
    pub domain: String,
    pub verified: bool,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Per-request context handed to every hook.
#[derive(Debug, Clone)]
pub struct EnrichmentContext {
    pub request_id: Uuid,
    pub timeout: Duration,
    pub geo: Option<GeoPoint>,
}

impl EnrichmentContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timeout,
            geo: None,
        }
    }

    pub fn with_geo(mut self, geo: GeoPoint) -> Self {
        self.geo = Some(geo);
        self
    }
}

/// Domain-agnostic result record handed to the merge/render stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    /// Search domain tag ("news", "places", "movies", ...).
    pub domain: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub enrichment: Option<EnrichmentData>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            domain: domain.into(),
            verified: false,
            score: None,
            enrichment: None,
        }
    }
}

/// Final output of one news search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub request_id: Uuid,
    pub mode: SearchMode,
    pub candidates: Vec<Candidate>,
    pub clusters: Vec<ArticleCluster>,
}

impl SearchResult {
    pub fn empty(request_id: Uuid, mode: SearchMode) -> Self {
        Self {
            request_id,
            mode,
            candidates: Vec::new(),
            clusters: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_consistency() {
        let h1 = compute_hash("hello world");
        let h2 = compute_hash("hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_extracted_hash_ignores_whitespace_layout() {
        let a = ExtractedArticle::new("The senate  passed\nthe bill.");
        let b = ExtractedArticle::new("The senate passed the bill.");
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_outcome_serializes_kebab_case() {
        let json = serde_json::to_string(&Outcome::NoText).unwrap();
        assert_eq!(json, "\"no-text\"");
        assert_eq!("no-text".parse::<Outcome>().unwrap(), Outcome::NoText);
    }

    #[test]
    fn test_apply_extraction_only_backfills() {
        let mut record = ArticleRecord {
            title: "Senate passes budget".into(),
            url: "https://example.com/a".into(),
            source_domain: "example.com".into(),
            source_tier: SourceTier::Tier2,
            source_region: None,
            paywall: PaywallStatus::Free,
            article_type: ArticleType::News,
            snippet: "Provider snippet".into(),
            author: Some("Provider Author".into()),
            published_at: None,
            word_count: None,
            origin: Origin::Wire {
                provider: "wire".into(),
                event_id: None,
            },
            is_live: false,
            extraction: None,
        };
        let mut extracted = ExtractedArticle::new("Full body text of the article.");
        extracted.author = Some("Extracted Author".into());
        extracted.published_at = Some(Utc::now());

        record.apply_extraction(extracted);

        assert_eq!(record.snippet, "Provider snippet");
        assert_eq!(record.author.as_deref(), Some("Provider Author"));
        assert!(record.published_at.is_some());
        assert_eq!(record.word_count, Some(6));
        assert!(record.extraction.is_some());
    }

    #[test]
    fn test_recency_windows() {
        assert_eq!(Recency::Breaking.window_days(), 2);
        assert_eq!(Recency::Recent.window_days(), 7);
        assert_eq!(Recency::General.window_days(), 30);
    }
}
