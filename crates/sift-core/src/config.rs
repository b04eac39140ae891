use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::models::SearchMode;

/// Tunables of the news aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Articles returned per search.
    pub max_results: usize,
    /// Maximum URLs sent through extraction per search.
    pub extraction_limit: usize,
    pub extraction_batch_size: usize,
    pub extraction_batch_delay: Duration,
    /// Budget the extractor itself is asked to honour.
    pub extraction_soft_timeout: Duration,
    /// Wall-clock limit raced against each extraction call.
    pub extraction_hard_timeout: Duration,
    pub provider_timeout: Duration,
    /// Records requested from each provider per facet.
    pub provider_page_size: usize,
    /// Fewer survivors than this triggers a 30-day re-search.
    pub widen_threshold: usize,
    /// Articles with less body than this after extraction are dropped.
    pub min_content_chars: usize,
    pub survey_min_snippet_chars: usize,
    pub default_min_snippet_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            extraction_limit: 20,
            extraction_batch_size: 6,
            extraction_batch_delay: Duration::from_millis(250),
            extraction_soft_timeout: Duration::from_millis(3500),
            extraction_hard_timeout: Duration::from_secs(6),
            provider_timeout: Duration::from_secs(5),
            provider_page_size: 10,
            widen_threshold: 10,
            min_content_chars: 325,
            survey_min_snippet_chars: 325,
            default_min_snippet_chars: 200,
        }
    }
}

impl EngineConfig {
    /// Read overrides from environment variables.
    ///
    /// - `SIFT_MAX_RESULTS` (default 10)
    /// - `SIFT_EXTRACTION_LIMIT` (default 20)
    /// - `SIFT_EXTRACTION_BATCH_SIZE` (default 6)
    /// - `SIFT_EXTRACTION_BATCH_DELAY_MS` (default 250)
    /// - `SIFT_EXTRACTION_TIMEOUT_MS` (soft, default 3500)
    /// - `SIFT_EXTRACTION_HARD_TIMEOUT_MS` (default 6000)
    /// - `SIFT_PROVIDER_TIMEOUT_MS` (default 5000)
    /// - `SIFT_MIN_CONTENT_CHARS` (default 325)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_results: positive(&lookup, "SIFT_MAX_RESULTS", defaults.max_results)?,
            extraction_limit: parse_or(&lookup, "SIFT_EXTRACTION_LIMIT", defaults.extraction_limit)?,
            extraction_batch_size: positive(
                &lookup,
                "SIFT_EXTRACTION_BATCH_SIZE",
                defaults.extraction_batch_size,
            )?,
            extraction_batch_delay: millis(
                &lookup,
                "SIFT_EXTRACTION_BATCH_DELAY_MS",
                defaults.extraction_batch_delay,
            )?,
            extraction_soft_timeout: millis(
                &lookup,
                "SIFT_EXTRACTION_TIMEOUT_MS",
                defaults.extraction_soft_timeout,
            )?,
            extraction_hard_timeout: millis(
                &lookup,
                "SIFT_EXTRACTION_HARD_TIMEOUT_MS",
                defaults.extraction_hard_timeout,
            )?,
            provider_timeout: millis(&lookup, "SIFT_PROVIDER_TIMEOUT_MS", defaults.provider_timeout)?,
            min_content_chars: parse_or(
                &lookup,
                "SIFT_MIN_CONTENT_CHARS",
                defaults.min_content_chars,
            )?,
            ..defaults
        };

        if config.extraction_hard_timeout < config.extraction_soft_timeout {
            return Err(AppError::ConfigError(
                "SIFT_EXTRACTION_HARD_TIMEOUT_MS must not be below SIFT_EXTRACTION_TIMEOUT_MS"
                    .into(),
            ));
        }
        Ok(config)
    }

    /// Minimum snippet length for the pre-dedup quality filter.
    pub fn min_snippet_chars(&self, mode: SearchMode) -> usize {
        match mode {
            SearchMode::Survey => self.survey_min_snippet_chars,
            _ => self.default_min_snippet_chars,
        }
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: usize) -> Result<usize, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(format!("Invalid {key} '{raw}': must be a non-negative integer"))
        }),
    }
}

fn positive<F>(lookup: &F, key: &str, default: usize) -> Result<usize, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default)?;
    if value == 0 {
        return Err(AppError::ConfigError(format!("{key} must be at least 1")));
    }
    Ok(value)
}

fn millis<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let ms = parse_or(lookup, key, default.as_millis() as usize)?;
    Ok(Duration::from_millis(ms as u64))
}

/// Locations of the persisted ledger and cache documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub dir: PathBuf,
}

impl StatePaths {
    pub const DEFAULT_DIR: &'static str = ".sift";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `SIFT_STATE_DIR`, falling back to `.sift/`.
    pub fn from_env() -> Self {
        match std::env::var("SIFT_STATE_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Self::new(dir),
            _ => Self::new(Self::DEFAULT_DIR),
        }
    }

    pub fn sources(&self) -> PathBuf {
        self.dir.join("sources.json")
    }

    pub fn extraction_cache(&self) -> PathBuf {
        self.dir.join("extraction_cache.json")
    }

    pub fn outlet_overrides(&self) -> PathBuf {
        self.dir.join("outlets.json")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
