pub mod batch;
pub mod classify;
pub mod cluster;
pub mod config;
pub mod dedup;
pub mod discovery;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod extraction_cache;
pub mod models;
pub mod outlets;
pub mod persist;
pub mod quality;
pub mod relevance;
pub mod selection;
pub mod source_tracker;
pub mod text;
pub mod traits;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use config::{EngineConfig, StatePaths};
pub use engine::NewsSearchEngine;
pub use enrichment::{EnrichmentExecutor, ExecutionStats};
pub use error::AppError;
pub use extraction_cache::{CacheLookup, ExtractionCache};
pub use models::{ArticleRecord, Candidate, ExtractedArticle, Outcome, SearchResult, compute_hash};
pub use outlets::OutletDirectory;
pub use source_tracker::{SourceTracker, SourceTrackerConfig};
pub use traits::{ContentExtractor, EnrichmentHook, LanguageModel, SearchProvider};
