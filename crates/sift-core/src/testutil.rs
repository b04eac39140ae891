//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use crate::enrichment::{ExecutorEvent, ExecutorReporter};
use crate::error::{AppError, ExtractionFailureReason};
use crate::models::{
    ArticleRecord, ArticleType, Candidate, EnrichmentContext, EnrichmentData, ExtractedArticle,
    Origin, PaywallStatus, ProviderQuery, SourceTier,
};
use crate::traits::{ContentExtractor, EnrichmentHook, LanguageModel, SearchProvider};

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum ProviderBehavior {
    Fixed(Vec<ArticleRecord>),
    Failing(String),
}

/// Mock search provider. Returns the same records (or the same error) for
/// every query and records each query it receives.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    behavior: ProviderBehavior,
    delay: Option<Duration>,
    queries: Arc<Mutex<Vec<ProviderQuery>>>,
}

impl MockProvider {
    pub fn new(name: &str, records: Vec<ArticleRecord>) -> Self {
        Self {
            name: name.to_string(),
            behavior: ProviderBehavior::Fixed(records),
            delay: None,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            behavior: ProviderBehavior::Failing(message.to_string()),
            delay: None,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<ProviderQuery> {
        self.queries.lock().unwrap().clone()
    }
}

impl SearchProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn search<'a>(
        &'a self,
        query: &'a ProviderQuery,
    ) -> BoxFuture<'a, Result<Vec<ArticleRecord>, AppError>> {
        self.queries.lock().unwrap().push(query.clone());
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.behavior {
                ProviderBehavior::Fixed(records) => Ok(records.clone()),
                ProviderBehavior::Failing(message) => Err(AppError::ProviderError {
                    provider: self.name.clone(),
                    message: message.clone(),
                }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor. Succeeds with a URL-specific body unless a failure or
/// article is configured for the URL.
#[derive(Clone, Default)]
pub struct MockExtractor {
    articles: Arc<Mutex<HashMap<String, ExtractedArticle>>>,
    failures: Arc<Mutex<HashMap<String, ExtractionFailureReason>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_article(self, url: &str, article: ExtractedArticle) -> Self {
        self.articles.lock().unwrap().insert(url.to_string(), article);
        self
    }

    pub fn with_failure(self, url: &str, reason: ExtractionFailureReason) -> Self {
        self.failures.lock().unwrap().insert(url.to_string(), reason);
        self
    }

    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    /// URLs passed to `extract`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ContentExtractor for MockExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedArticle, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.failures.lock().unwrap().get(url).copied() {
            return Err(AppError::ExtractionFailure {
                url: url.to_string(),
                reason,
            });
        }
        if let Some(article) = self.articles.lock().unwrap().get(url).cloned() {
            return Ok(article);
        }
        Ok(ExtractedArticle::new(format!(
            "Full text of {url}. {}",
            "The article body continues with reporting and quotes. ".repeat(10)
        )))
    }
}

// ---------------------------------------------------------------------------
// MockLanguageModel
// ---------------------------------------------------------------------------

/// Mock LLM. Scripted responses are popped first; after that the default
/// reply is returned, or an error if there is none.
#[derive(Clone)]
pub struct MockLanguageModel {
    default: Option<String>,
    responses: Arc<Mutex<VecDeque<Result<String, AppError>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLanguageModel {
    /// Always replies with `reply`.
    pub fn new(reply: &str) -> Self {
        Self {
            default: Some(reply.to_string()),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            default: None,
            responses: Arc::new(Mutex::new(responses.into())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// User prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl LanguageModel for MockLanguageModel {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, AppError> {
        self.prompts.lock().unwrap().push(user.to_string());
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        self.default.clone().ok_or_else(|| AppError::LlmError {
            message: "no scripted response".into(),
            status_code: 500,
            retryable: false,
        })
    }
}

// ---------------------------------------------------------------------------
// MockHook
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum HookBehavior {
    Verified,
    Unverified,
    Failing,
    Slow(Duration),
    Panicking,
}

/// Mock enrichment hook with a fixed behaviour and a call counter.
#[derive(Clone)]
pub struct MockHook {
    name: String,
    domains: Vec<String>,
    priority: i32,
    behavior: HookBehavior,
    fail_for: Option<String>,
    healthy: bool,
    calls: Arc<AtomicUsize>,
}

impl MockHook {
    fn build(name: &str, domain: &str, behavior: HookBehavior) -> Self {
        Self {
            name: name.to_string(),
            domains: vec![domain.to_string()],
            priority: 0,
            behavior,
            fail_for: None,
            healthy: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn verified(name: &str, domain: &str) -> Self {
        Self::build(name, domain, HookBehavior::Verified)
    }

    pub fn unverified(name: &str, domain: &str) -> Self {
        Self::build(name, domain, HookBehavior::Unverified)
    }

    pub fn failing(name: &str, domain: &str) -> Self {
        Self::build(name, domain, HookBehavior::Failing)
    }

    pub fn slow(name: &str, domain: &str, delay: Duration) -> Self {
        Self::build(name, domain, HookBehavior::Slow(delay))
    }

    pub fn panicking(name: &str, domain: &str) -> Self {
        Self::build(name, domain, HookBehavior::Panicking)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Fail for one candidate id, behave normally otherwise.
    pub fn failing_for(mut self, candidate_id: &str) -> Self {
        self.fail_for = Some(candidate_id.to_string());
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn payload(&self, candidate: &Candidate, verified: bool) -> EnrichmentData {
        EnrichmentData {
            hook: self.name.clone(),
            domain: candidate.domain.clone(),
            verified,
            payload: serde_json::json!({ "id": candidate.id }),
        }
    }
}

impl EnrichmentHook for MockHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn domains(&self) -> &[String] {
        &self.domains
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn enrich<'a>(
        &'a self,
        candidate: &'a Candidate,
        _context: &'a EnrichmentContext,
    ) -> BoxFuture<'a, Result<Option<EnrichmentData>, AppError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if self.fail_for.as_deref() == Some(candidate.id.as_str()) {
                return Err(AppError::Generic(format!("no match for {}", candidate.id)));
            }
            match &self.behavior {
                HookBehavior::Verified => Ok(Some(self.payload(candidate, true))),
                HookBehavior::Unverified => Ok(Some(self.payload(candidate, false))),
                HookBehavior::Failing => Err(AppError::HttpError("HTTP 503".into())),
                HookBehavior::Slow(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(Some(self.payload(candidate, true)))
                }
                HookBehavior::Panicking => panic!("hook exploded"),
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'_, bool> {
        let healthy = self.healthy;
        Box::pin(async move { healthy })
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock executor reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutorReporter for MockReporter {
    fn report(&self, event: ExecutorEvent<'_>) {
        let label = match &event {
            ExecutorEvent::Started { .. } => "Started",
            ExecutorEvent::HookFailed { .. } => "HookFailed",
            ExecutorEvent::HookTimedOut { .. } => "HookTimedOut",
            ExecutorEvent::CandidateUnverified { .. } => "CandidateUnverified",
            ExecutorEvent::TaskPanicked { .. } => "TaskPanicked",
            ExecutorEvent::Completed { .. } => "Completed",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// A wire-search article with an unknown tier and a snippet long enough to
/// pass every quality and content threshold.
pub fn make_article(title: &str, url: &str, domain: &str) -> ArticleRecord {
    ArticleRecord {
        title: title.to_string(),
        url: url.to_string(),
        source_domain: domain.to_string(),
        source_tier: SourceTier::Unknown,
        source_region: None,
        paywall: PaywallStatus::Free,
        article_type: ArticleType::News,
        snippet: format!(
            "{title}. {}",
            "Reporting continues with details from officials and witnesses. ".repeat(6)
        ),
        author: None,
        published_at: None,
        word_count: None,
        origin: Origin::Wire {
            provider: "wire".into(),
            event_id: None,
        },
        is_live: false,
        extraction: None,
    }
}
