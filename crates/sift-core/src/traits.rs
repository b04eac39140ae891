use std::future::Future;

use futures::future::BoxFuture;

use crate::error::AppError;
use crate::models::{ArticleRecord, Candidate, EnrichmentContext, EnrichmentData, ExtractedArticle, ProviderQuery};

/// One upstream news search API.
///
/// Providers are held as trait objects so any number of them can be fanned
/// out per facet. Implementations normalise their wire format into
/// [`ArticleRecord`] before returning.
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    fn search<'a>(
        &'a self,
        query: &'a ProviderQuery,
    ) -> BoxFuture<'a, Result<Vec<ArticleRecord>, AppError>>;
}

/// Turns an article URL into its body text and metadata.
pub trait ContentExtractor: Send + Sync + Clone {
    /// Returns `AppError::ExtractionFailure` for paywalls and empty pages.
    fn extract(&self, url: &str) -> impl Future<Output = Result<ExtractedArticle, AppError>> + Send;
}

/// Chat-style LLM used for query classification and relevance filtering.
pub trait LanguageModel: Send + Sync + Clone {
    /// Sends a system + user prompt and returns the raw assistant text.
    fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// A verification/enrichment step for candidates of one or more search domains.
pub trait EnrichmentHook: Send + Sync {
    fn name(&self) -> &str;

    /// Search domains this hook applies to ("places", "movies", ...).
    fn domains(&self) -> &[String];

    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// `Ok(None)` means the hook found nothing for this candidate.
    fn enrich<'a>(
        &'a self,
        candidate: &'a Candidate,
        context: &'a EnrichmentContext,
    ) -> BoxFuture<'a, Result<Option<EnrichmentData>, AppError>>;

    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }
}
