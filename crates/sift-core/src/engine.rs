use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use tracing::Instrument;
use uuid::Uuid;

use crate::batch::{BatchConfig, run_paced};
use crate::classify::classify;
use crate::cluster::cluster_articles;
use crate::config::EngineConfig;
use crate::dedup::deduplicate;
use crate::discovery::DiscoveryQueue;
use crate::extraction_cache::{CacheLookup, ExtractionCache};
use crate::models::{
    ArticleRecord, Candidate, EnrichmentData, ExtractedArticle, Facet, Outcome, ProviderQuery,
    Recency, SearchMode, SearchResult,
};
use crate::outlets::OutletDirectory;
use crate::quality::filter_quality;
use crate::relevance::filter_relevant;
use crate::selection::{ScoredArticle, base_score, select};
use crate::source_tracker::SourceTracker;
use crate::text::normalize_url;
use crate::traits::{ContentExtractor, LanguageModel, SearchProvider};

/// Search-domain tag carried by news candidates.
pub const NEWS_DOMAIN: &str = "news";
/// Facets reused by the widened re-search.
const WIDEN_FACETS: usize = 2;

/// Orchestrates one news search: classify → search → quality filter →
/// extract → dedup → relevance filter → (widen) → score/select → cluster →
/// assemble.
///
/// Generic over the extractor and language model via traits; providers are
/// trait objects so any number can be registered. The reliability ledger
/// and extraction cache are injected and shared, and are persisted at the
/// end of every extraction step.
pub struct NewsSearchEngine<X, L>
where
    X: ContentExtractor,
    L: LanguageModel,
{
    providers: Vec<Arc<dyn SearchProvider>>,
    extractor: X,
    llm: L,
    tracker: SourceTracker,
    cache: ExtractionCache,
    outlets: Arc<OutletDirectory>,
    discovery: Option<DiscoveryQueue>,
    config: EngineConfig,
}

impl<X, L> NewsSearchEngine<X, L>
where
    X: ContentExtractor,
    L: LanguageModel,
{
    pub fn new(extractor: X, llm: L, tracker: SourceTracker, cache: ExtractionCache) -> Self {
        Self {
            providers: Vec::new(),
            extractor,
            llm,
            tracker,
            cache,
            outlets: Arc::new(OutletDirectory::default_seed()),
            discovery: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_outlets(mut self, outlets: Arc<OutletDirectory>) -> Self {
        self.outlets = outlets;
        self
    }

    pub fn with_discovery(mut self, queue: DiscoveryQueue) -> Self {
        self.discovery = Some(queue);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tracker(&self) -> &SourceTracker {
        &self.tracker
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run the full pipeline for a free-text query.
    ///
    /// Never fails: every local failure is logged and degraded, and a search
    /// that finds nothing returns an empty [`SearchResult`].
    pub async fn search(&self, query: &str) -> SearchResult {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("news_search", query = %query, %request_id);
        self.search_inner(query, request_id).instrument(span).await
    }

    async fn search_inner(&self, query: &str, request_id: Uuid) -> SearchResult {
        let trials = self.tracker.run_maintenance();
        if trials > 0 {
            tracing::info!(trials, "Started source recovery trials");
        }

        // 1. Classify
        let classification = classify(&self.llm, query).await;
        let mode = classification.mode;
        let facets = unique_facets(&classification.facets);
        tracing::info!(%mode, recency = ?classification.recency, facets = facets.len(), "Search classified");

        // 2–6. Search, filter, extract, dedup, relevance
        let now = Utc::now();
        let window_days = classification.recency.window_days();
        let mut articles = self
            .collect(query, &facets, mode, now - TimeDelta::days(window_days), now)
            .await;

        // 7. Widen on starvation
        let general_days = Recency::General.window_days();
        if articles.len() < self.config.widen_threshold && window_days < general_days {
            tracing::info!(
                found = articles.len(),
                days = general_days,
                "Too few articles, widening search window"
            );
            let narrow: Vec<Facet> = facets.iter().take(WIDEN_FACETS).cloned().collect();
            let wider = self
                .collect(query, &narrow, mode, now - TimeDelta::days(general_days), now)
                .await;
            articles.extend(wider);
            articles = deduplicate(articles, &self.outlets);
        }

        if articles.is_empty() {
            tracing::info!("No articles survived, returning empty result");
            return SearchResult::empty(request_id, mode);
        }

        // 8. Score + select
        let pool: Vec<ScoredArticle> = articles
            .into_iter()
            .map(|record| {
                let outlet = self.outlets.canonical(&record.source_domain);
                let penalty = self.tracker.score_penalty(&record.source_domain);
                let base = base_score(&record, penalty, now);
                ScoredArticle::new(record, outlet, base)
            })
            .collect();
        let selection = select(pool, mode, self.config.max_results);

        // 9. Cluster
        let selected: Vec<ArticleRecord> = selection
            .articles
            .iter()
            .map(|s| s.record.clone())
            .collect();
        let clusters = cluster_articles(&selected);

        // 10. Assemble
        let candidates: Vec<Candidate> = selection
            .articles
            .into_iter()
            .map(|s| to_candidate(s.record, s.score))
            .collect();

        tracing::info!(
            results = candidates.len(),
            first_pass = selection.first_pass,
            relaxed = selection.relaxed,
            clusters = clusters.len(),
            "News search complete"
        );

        SearchResult {
            request_id,
            mode,
            candidates,
            clusters,
        }
    }

    /// Steps 2–6 for one date window.
    async fn collect(
        &self,
        query: &str,
        facets: &[Facet],
        mode: SearchMode,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<ArticleRecord> {
        let records = self.search_providers(facets, from, to).await;
        if records.is_empty() {
            return records;
        }
        let unknown = self.unknown_outlets(&records);
        let records = filter_quality(records, self.config.min_snippet_chars(mode), &self.tracker);
        let records = self.extract_content(records).await;
        // Offered only once this search's outcomes are in the ledger.
        self.offer_for_discovery(unknown);
        let records = deduplicate(records, &self.outlets);
        filter_relevant(&self.llm, query, records).await
    }

    /// Every facet against every provider, concurrently. A failing or slow
    /// provider contributes nothing and does not affect the others.
    async fn search_providers(
        &self,
        facets: &[Facet],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<ArticleRecord> {
        let queries: Vec<ProviderQuery> = facets
            .iter()
            .map(|facet| ProviderQuery {
                facet: facet.clone(),
                from,
                to,
                limit: self.config.provider_page_size,
            })
            .collect();

        let timeout = self.config.provider_timeout;
        let calls = self.providers.iter().flat_map(|provider| {
            queries.iter().map(move |q| async move {
                let name = provider.name();
                match tokio::time::timeout(timeout, provider.search(q)).await {
                    Ok(Ok(records)) => {
                        tracing::debug!(provider = %name, facet = %q.facet.query, count = records.len(), "Provider returned");
                        records
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(provider = %name, facet = %q.facet.query, error = %e, "Provider search failed");
                        Vec::new()
                    }
                    Err(_) => {
                        tracing::warn!(
                            provider = %name,
                            facet = %q.facet.query,
                            timeout_ms = timeout.as_millis() as u64,
                            "Provider search timed out"
                        );
                        Vec::new()
                    }
                }
            })
        });
        let mut records: Vec<ArticleRecord> = join_all(calls).await.into_iter().flatten().collect();
        for record in &mut records {
            self.outlets.annotate(record);
        }
        tracing::debug!(count = records.len(), "Provider search complete");
        records
    }

    /// Domains with no directory entry, in first-seen order.
    fn unknown_outlets(&self, records: &[ArticleRecord]) -> Vec<String> {
        if self.discovery.is_none() {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        records
            .iter()
            .map(|r| r.source_domain.as_str())
            .filter(|d| !self.outlets.is_known(d) && seen.insert(*d))
            .map(str::to_string)
            .collect()
    }

    fn offer_for_discovery(&self, domains: Vec<String>) {
        let Some(queue) = &self.discovery else {
            return;
        };
        for domain in &domains {
            queue.offer(domain);
        }
    }

    /// Cache → live extractor for up to `extraction_limit` unique URLs on
    /// non-blocked domains, then drop articles still too thin to use.
    async fn extract_content(&self, mut records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
        let mut seen = HashSet::new();
        let mut targets: Vec<(String, String)> = Vec::new();
        for record in &records {
            if targets.len() >= self.config.extraction_limit {
                break;
            }
            let key = normalize_url(&record.url);
            if !seen.insert(key) {
                continue;
            }
            if self.tracker.should_skip(&record.source_domain) {
                tracing::debug!(url = %record.url, domain = %record.source_domain, "Skipping blocked source");
                continue;
            }
            targets.push((record.url.clone(), record.source_domain.clone()));
        }

        let mut extracted: HashMap<String, ExtractedArticle> = HashMap::new();
        let mut live = Vec::new();
        for (url, domain) in targets {
            match self.cache.get(&url) {
                CacheLookup::Hit(article) => {
                    extracted.insert(normalize_url(&url), article);
                }
                CacheLookup::KnownFailure => {
                    tracing::debug!(%url, "Cached extraction failure");
                }
                CacheLookup::Miss => live.push((url, domain)),
            }
        }

        if !live.is_empty() {
            let batch = BatchConfig::new(
                self.config.extraction_batch_size,
                self.config.extraction_batch_delay,
                self.config.extraction_hard_timeout,
            );
            let extractor = &self.extractor;
            let results = run_paced(live, &batch, |(url, _domain)| async move {
                extractor.extract(&url).await
            })
            .await;

            for ((url, domain), result) in results {
                let outcome = match result {
                    Some(Ok(article)) if !article.text.trim().is_empty() => {
                        self.cache.set(&url, Some(article.clone()));
                        extracted.insert(normalize_url(&url), article);
                        Outcome::Success
                    }
                    Some(Ok(_)) => {
                        self.cache.set(&url, None);
                        Outcome::NoText
                    }
                    Some(Err(e)) => {
                        tracing::debug!(%url, error = %e, "Extraction failed");
                        if e.is_cacheable_failure() {
                            self.cache.set(&url, None);
                        }
                        e.outcome()
                    }
                    None => {
                        tracing::debug!(%url, "Extraction hit hard timeout");
                        Outcome::Timeout
                    }
                };
                self.tracker.record(&domain, outcome);
            }
        }

        self.persist();

        for record in &mut records {
            if let Some(article) = extracted.get(&normalize_url(&record.url)) {
                record.apply_extraction(article.clone());
            }
        }
        let before = records.len();
        records.retain(|r| r.content_chars() >= self.config.min_content_chars);
        tracing::debug!(
            extracted = extracted.len(),
            before,
            after = records.len(),
            "Extraction step complete"
        );
        records
    }

    /// Flush ledger and cache. Failures are logged; in-memory state carries on.
    fn persist(&self) {
        if let Err(e) = self.tracker.save() {
            tracing::warn!(error = %e, "Failed to save source ledger");
        }
        if let Err(e) = self.cache.save() {
            tracing::warn!(error = %e, "Failed to save extraction cache");
        }
    }
}

fn unique_facets(facets: &[Facet]) -> Vec<Facet> {
    let mut seen = HashSet::new();
    facets
        .iter()
        .filter(|f| seen.insert((*f).clone()))
        .cloned()
        .collect()
}

fn to_candidate(record: ArticleRecord, score: f64) -> Candidate {
    let payload = match serde_json::to_value(&record) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(url = %record.url, error = %e, "Failed to serialize article payload");
            serde_json::Value::Null
        }
    };
    Candidate {
        id: record.url.clone(),
        name: record.title.clone(),
        domain: NEWS_DOMAIN.to_string(),
        verified: true,
        score: Some(score),
        enrichment: Some(EnrichmentData {
            hook: record.origin.provider().to_string(),
            domain: NEWS_DOMAIN.to_string(),
            verified: true,
            payload,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::discovery::{DiscoveryConfig, discovery_channel};
    use crate::error::{AppError, ExtractionFailureReason};
    use crate::models::SourceStatus;
    use crate::source_tracker::SourceTrackerConfig;
    use crate::testutil::*;

    const THEMATIC_GENERAL: &str =
        r#"{"mode":"thematic","recency":"general","facets":[{"query":"senate budget"}]}"#;
    const DEEP_BREAKING: &str = r#"{"mode":"deep","recency":"breaking","facets":[
        {"query":"senate budget"},{"query":"budget vote"},{"query":"house budget"},{"query":"budget deal"}]}"#;

    fn fast_config() -> EngineConfig {
        EngineConfig {
            extraction_batch_delay: Duration::ZERO,
            extraction_hard_timeout: Duration::from_millis(100),
            extraction_soft_timeout: Duration::from_millis(50),
            provider_timeout: Duration::from_millis(100),
            ..EngineConfig::default()
        }
    }

    fn engine(
        providers: Vec<MockProvider>,
        extractor: MockExtractor,
        llm: MockLanguageModel,
    ) -> NewsSearchEngine<MockExtractor, MockLanguageModel> {
        let mut engine = NewsSearchEngine::new(
            extractor,
            llm,
            SourceTracker::in_memory(SourceTrackerConfig::default()),
            ExtractionCache::in_memory(),
        )
        .with_outlets(Arc::new(OutletDirectory::empty()))
        .with_config(fast_config());
        for p in providers {
            engine = engine.with_provider(Arc::new(p));
        }
        engine
    }

    fn three_outlets() -> Vec<ArticleRecord> {
        vec![
            make_article("Senate passes budget bill", "https://a.com/1", "a.com"),
            make_article("Wildfire forces evacuations", "https://b.com/1", "b.com"),
            make_article("Central bank holds rates", "https://c.com/1", "c.com"),
        ]
    }

    #[tokio::test]
    async fn test_happy_path_assembles_news_candidates() {
        let provider = MockProvider::new("wire", three_outlets());
        let engine = engine(
            vec![provider.clone()],
            MockExtractor::new(),
            MockLanguageModel::with_responses(vec![Ok(THEMATIC_GENERAL.into()), Ok(r#"{"drop":[]}"#.into())]),
        );

        let result = engine.search("senate budget").await;

        assert_eq!(result.mode, SearchMode::Thematic);
        assert_eq!(result.candidates.len(), 3);
        for c in &result.candidates {
            assert_eq!(c.domain, "news");
            assert!(c.verified);
            let payload = &c.enrichment.as_ref().unwrap().payload;
            assert_eq!(payload["title"], serde_json::json!(c.name));
            assert!(payload["extraction"]["contentHash"].is_string());
        }
        // Padded identical facets are searched once.
        assert_eq!(provider.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_provider_is_isolated() {
        let good = MockProvider::new("good", three_outlets());
        let bad = MockProvider::with_error("bad", "upstream 500");
        let engine = engine(
            vec![bad, good],
            MockExtractor::new(),
            MockLanguageModel::new(THEMATIC_GENERAL),
        );

        let result = engine.search("senate budget").await;
        assert_eq!(result.candidates.len(), 3);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out_without_blocking_others() {
        let slow = MockProvider::new("slow", three_outlets()).with_delay(Duration::from_millis(500));
        let fast = MockProvider::new("fast", vec![make_article(
            "Markets rally on jobs data",
            "https://d.com/1",
            "d.com",
        )]);
        let engine = engine(vec![slow, fast], MockExtractor::new(), MockLanguageModel::new(THEMATIC_GENERAL));

        let result = engine.search("markets").await;
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].id, "https://d.com/1");
    }

    #[tokio::test]
    async fn test_all_providers_failing_yields_empty_result() {
        let engine = engine(
            vec![MockProvider::with_error("a", "down"), MockProvider::with_error("b", "down")],
            MockExtractor::new(),
            MockLanguageModel::new(THEMATIC_GENERAL),
        );
        let result = engine.search("anything").await;
        assert!(result.is_empty());
        assert!(result.clusters.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_domain_is_not_extracted() {
        let extractor = MockExtractor::new();
        let engine = engine(
            vec![MockProvider::new("wire", three_outlets())],
            extractor.clone(),
            MockLanguageModel::new(THEMATIC_GENERAL),
        );
        engine.tracker().seed_known_bad(&[("a.com", Outcome::Paywall)]);

        let result = engine.search("senate budget").await;

        assert!(!extractor.calls().contains(&"https://a.com/1".to_string()));
        assert_eq!(extractor.calls().len(), 2);
        // Snippet still long enough, but the ledger penalty sinks its score.
        let blocked = result.candidates.iter().find(|c| c.id == "https://a.com/1").unwrap();
        assert!(result.candidates.iter().all(|c| c.score >= blocked.score));
    }

    #[tokio::test]
    async fn test_cache_short_circuits_extraction() {
        let extractor = MockExtractor::new();
        let engine = engine(
            vec![MockProvider::new("wire", three_outlets())],
            extractor.clone(),
            MockLanguageModel::new(THEMATIC_GENERAL),
        );
        engine.cache().set("https://a.com/1", None);
        engine
            .cache()
            .set("https://b.com/1?ref=x", Some(ExtractedArticle::new("Cached body. ".repeat(40))));

        engine.search("senate budget").await;

        assert_eq!(extractor.calls(), vec!["https://c.com/1".to_string()]);
        assert!(matches!(engine.cache().get("https://c.com/1"), CacheLookup::Hit(_)));
    }

    #[tokio::test]
    async fn test_extraction_failures_recorded_and_cached_by_kind() {
        let extractor = MockExtractor::new()
            .with_failure("https://a.com/1", ExtractionFailureReason::Paywall)
            .with_delay("https://b.com/1", Duration::from_millis(500));
        let engine = engine(
            vec![MockProvider::new("wire", three_outlets())],
            extractor,
            MockLanguageModel::new(THEMATIC_GENERAL),
        );

        engine.search("senate budget").await;

        let tracker = engine.tracker();
        assert_eq!(tracker.profile("a.com").unwrap().outcomes.back(), Some(&Outcome::Paywall));
        assert_eq!(tracker.profile("b.com").unwrap().outcomes.back(), Some(&Outcome::Timeout));
        assert_eq!(tracker.profile("c.com").unwrap().outcomes.back(), Some(&Outcome::Success));
        assert_eq!(engine.cache().get("https://a.com/1"), CacheLookup::KnownFailure);
        assert_eq!(engine.cache().get("https://b.com/1"), CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_thin_articles_dropped_after_extraction() {
        let mut thin = make_article("Short item on budget", "https://thin.com/1", "thin.com");
        thin.snippet = "x".repeat(250);
        let mut records = three_outlets();
        records.push(thin);
        let extractor = MockExtractor::new().with_failure("https://thin.com/1", ExtractionFailureReason::NoText);
        let engine = engine(
            vec![MockProvider::new("wire", records)],
            extractor,
            MockLanguageModel::new(THEMATIC_GENERAL),
        );

        let result = engine.search("budget").await;
        assert_eq!(result.candidates.len(), 3);
        assert!(result.candidates.iter().all(|c| c.id != "https://thin.com/1"));
    }

    #[tokio::test]
    async fn test_cross_provider_duplicates_collapse() {
        let wire = MockProvider::new("wire", three_outlets());
        let neural = MockProvider::new(
            "neural",
            vec![make_article("Senate passes the budget bill", "https://a.com/1?src=neural", "a.com")],
        );
        let engine = engine(vec![wire, neural], MockExtractor::new(), MockLanguageModel::new(THEMATIC_GENERAL));

        let result = engine.search("senate budget").await;
        assert_eq!(result.candidates.len(), 3);
    }

    #[tokio::test]
    async fn test_relevance_filter_drops_marked_articles() {
        let engine = engine(
            vec![MockProvider::new("wire", three_outlets())],
            MockExtractor::new(),
            MockLanguageModel::with_responses(vec![
                Ok(THEMATIC_GENERAL.into()),
                Ok(r#"{"drop":[0]}"#.into()),
            ]),
        );
        let result = engine.search("senate budget").await;
        assert_eq!(result.candidates.len(), 2);
    }

    #[tokio::test]
    async fn test_starved_search_widens_to_thirty_days_with_two_facets() {
        let provider = MockProvider::new("wire", three_outlets());
        let engine = engine(
            vec![provider.clone()],
            MockExtractor::new(),
            MockLanguageModel::new(DEEP_BREAKING),
        );

        let result = engine.search("senate budget").await;

        let queries = provider.queries();
        assert_eq!(queries.len(), 4 + 2);
        let wide: Vec<_> = queries
            .iter()
            .filter(|q| q.to - q.from == TimeDelta::days(30))
            .collect();
        assert_eq!(wide.len(), 2);
        assert_eq!(wide[0].facet.query, "senate budget");
        assert_eq!(wide[1].facet.query, "budget vote");
        // Same three stories from both windows merge back to three.
        assert_eq!(result.candidates.len(), 3);
        assert_eq!(result.mode, SearchMode::Deep);
    }

    #[tokio::test]
    async fn test_classifier_failure_falls_back_to_original_query() {
        let provider = MockProvider::new("wire", three_outlets());
        let engine = engine(
            vec![provider.clone()],
            MockExtractor::new(),
            MockLanguageModel::with_error(AppError::RateLimitExceeded),
        );

        let result = engine.search("what is going on with the senate budget").await;
        assert_eq!(result.mode, SearchMode::Thematic);
        assert_eq!(provider.queries()[0].facet.query, "what is going on with the senate budget");
        assert_eq!(result.candidates.len(), 3);
    }

    #[tokio::test]
    async fn test_same_story_articles_are_clustered() {
        let records = vec![
            make_article("Senate passes budget bill", "https://a.com/1", "a.com"),
            make_article("Budget bill clears Senate after delay", "https://b.com/1", "b.com"),
            make_article("Wildfire forces evacuations", "https://c.com/1", "c.com"),
        ];
        let engine = engine(
            vec![MockProvider::new("wire", records)],
            MockExtractor::new(),
            MockLanguageModel::new(THEMATIC_GENERAL),
        );

        let result = engine.search("senate budget").await;
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[0].members.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_outlets_offered_for_discovery() {
        let tracker = SourceTracker::in_memory(SourceTrackerConfig::default());
        let outlets = Arc::new(OutletDirectory::empty());
        let (queue, worker) = discovery_channel(tracker.clone(), outlets.clone(), DiscoveryConfig::default());
        for _ in 0..5 {
            tracker.record("a.com", Outcome::Success);
        }

        let engine = NewsSearchEngine::new(
            MockExtractor::new(),
            MockLanguageModel::new(THEMATIC_GENERAL),
            tracker,
            ExtractionCache::in_memory(),
        )
        .with_outlets(outlets.clone())
        .with_discovery(queue)
        .with_config(fast_config())
        .with_provider(Arc::new(MockProvider::new("wire", three_outlets())));

        engine.search("senate budget").await;
        drop(engine);

        let stats = worker.run(tokio_util::sync::CancellationToken::new()).await;
        assert_eq!(stats.evaluated, 3);
        assert_eq!(stats.promoted, 1);
        assert!(outlets.is_known("a.com"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_running_worker_sees_this_searchs_outcomes() {
        let tracker = SourceTracker::in_memory(SourceTrackerConfig::default());
        let outlets = Arc::new(OutletDirectory::empty());
        let (queue, worker) = discovery_channel(tracker.clone(), outlets.clone(), DiscoveryConfig::default());
        let cancel_token = tokio_util::sync::CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel_token.clone()));

        let records = vec![
            make_article("Senate passes budget bill", "https://a.com/1", "a.com"),
            make_article("Wildfire forces evacuations", "https://a.com/2", "a.com"),
            make_article("Central bank holds rates", "https://a.com/3", "a.com"),
        ];
        let engine = NewsSearchEngine::new(
            MockExtractor::new(),
            MockLanguageModel::new(THEMATIC_GENERAL),
            tracker.clone(),
            ExtractionCache::in_memory(),
        )
        .with_outlets(outlets.clone())
        .with_discovery(queue)
        .with_config(fast_config())
        .with_provider(Arc::new(MockProvider::new("wire", records)));

        engine.search("senate budget").await;
        drop(engine);

        let stats = handle.await.unwrap();
        // Three snippet checks and three extractions, all successful.
        assert_eq!(tracker.profile("a.com").unwrap().total_attempts, 6);
        assert_eq!(stats.promoted, 1);
        assert!(outlets.is_known("a.com"));
    }

    #[tokio::test]
    async fn test_extraction_capped_at_limit_per_search() {
        let mut records: Vec<ArticleRecord> = (0..25)
            .map(|i| {
                make_article(
                    &format!("Story number {i} unique{i} token{i}"),
                    &format!("https://outlet{i}.com/story"),
                    &format!("outlet{i}.com"),
                )
            })
            .collect();
        // Past the cap, a snippet long enough for the quality filter but
        // short of the content threshold has nothing to backfill it.
        for record in &mut records[23..] {
            record.snippet = "Short but acceptable snippet. ".repeat(9);
        }

        let extractor = MockExtractor::new();
        let mut engine = engine(
            vec![MockProvider::new("wire", records)],
            extractor.clone(),
            MockLanguageModel::new(THEMATIC_GENERAL),
        );
        engine.config.max_results = 30;

        let result = engine.search("senate budget").await;

        let calls = extractor.calls();
        assert_eq!(calls.len(), 20);
        assert!(!calls.contains(&"https://outlet20.com/story".to_string()));
        assert_eq!(engine.tracker().profile("outlet21.com").unwrap().total_attempts, 1);
        assert_eq!(result.candidates.len(), 23);
        assert!(result.candidates.iter().any(|c| c.id == "https://outlet22.com/story"));
        assert!(result.candidates.iter().all(|c| c.id != "https://outlet24.com/story"));
    }

    #[tokio::test]
    async fn test_ledger_and_cache_persisted_after_extraction() {
        let tmp = tempfile::TempDir::new().unwrap();
        let sources = tmp.path().join("sources.json");
        let cache_path = tmp.path().join("extraction_cache.json");
        let engine = NewsSearchEngine::new(
            MockExtractor::new(),
            MockLanguageModel::new(THEMATIC_GENERAL),
            SourceTracker::open(&sources, SourceTrackerConfig::default()),
            ExtractionCache::open(&cache_path),
        )
        .with_outlets(Arc::new(OutletDirectory::empty()))
        .with_config(fast_config())
        .with_provider(Arc::new(MockProvider::new("wire", three_outlets())));

        engine.search("senate budget").await;

        let reopened = SourceTracker::open(&sources, SourceTrackerConfig::default());
        assert_eq!(reopened.status("a.com"), SourceStatus::Active);
        assert_eq!(reopened.profile("a.com").unwrap().total_attempts, 2);
        assert_eq!(ExtractionCache::open(&cache_path).len(), 3);
    }
}
