//! Permanent URL → extracted-article cache.
//!
//! Entries never expire: content at a stable article URL does not change.
//! Known failures (paywall, empty page) are cached as `None` so they are not
//! retried; the presence of the key is what separates "attempted" from
//! "never attempted".

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::ExtractedArticle;
use crate::persist::{read_document, write_document};
use crate::text::normalize_url;

const CACHE_VERSION: u32 = 1;

/// Three-way cache lookup result.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Extraction succeeded earlier.
    Hit(ExtractedArticle),
    /// Extraction was attempted and failed permanently; do not retry.
    KnownFailure,
    /// Never attempted.
    Miss,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    data: Option<ExtractedArticle>,
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

/// On-disk shapes accepted on load. The unversioned flat map is the layout
/// written before the document carried a version.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCache {
    Versioned(CacheDocument),
    Flat(BTreeMap<String, CacheEntry>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub successes: usize,
    pub failures: usize,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
}

/// Thread-safe extraction cache with flush-if-dirty persistence.
#[derive(Clone)]
pub struct ExtractionCache {
    path: Option<PathBuf>,
    inner: Arc<Mutex<CacheInner>>,
}

impl ExtractionCache {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Arc::new(Mutex::new(CacheInner::default())),
        }
    }

    /// Load the cache document at `path`; any read or parse failure yields an
    /// empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut inner = CacheInner::default();

        match read_document::<StoredCache>(&path) {
            Ok(Some(StoredCache::Versioned(doc))) if doc.version == CACHE_VERSION => {
                inner.entries = doc.entries.into_iter().collect();
            }
            Ok(Some(StoredCache::Versioned(doc))) => {
                tracing::warn!(
                    path = %path.display(),
                    version = doc.version,
                    "Unsupported extraction cache version, starting fresh"
                );
            }
            Ok(Some(StoredCache::Flat(entries))) => {
                inner.entries = entries.into_iter().collect();
                // Rewrite in the versioned layout on next save.
                inner.dirty = true;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Extraction cache unreadable, starting fresh");
            }
        }
        tracing::debug!(path = %path.display(), entries = inner.entries.len(), "Opened extraction cache");

        Self {
            path: Some(path),
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned extraction cache mutex");
            poisoned.into_inner()
        })
    }

    pub fn get(&self, url: &str) -> CacheLookup {
        let inner = self.lock_inner();
        match inner.entries.get(&normalize_url(url)) {
            Some(CacheEntry { data: Some(article), .. }) => CacheLookup::Hit(article.clone()),
            Some(CacheEntry { data: None, .. }) => CacheLookup::KnownFailure,
            None => CacheLookup::Miss,
        }
    }

    /// Store a success (`Some`) or a permanent failure (`None`).
    pub fn set(&self, url: &str, data: Option<ExtractedArticle>) {
        let mut inner = self.lock_inner();
        inner.entries.insert(
            normalize_url(url),
            CacheEntry {
                data,
                cached_at: Utc::now(),
            },
        );
        inner.dirty = true;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock_inner();
        let successes = inner.entries.values().filter(|e| e.data.is_some()).count();
        CacheStats {
            entries: inner.entries.len(),
            successes,
            failures: inner.entries.len() - successes,
        }
    }

    pub fn len(&self) -> usize {
        self.lock_inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.lock_inner().dirty
    }

    pub fn save(&self) -> Result<(), AppError> {
        let mut inner = self.lock_inner();
        if !inner.dirty {
            return Ok(());
        }
        let Some(path) = &self.path else {
            inner.dirty = false;
            return Ok(());
        };

        let doc = CacheDocument {
            version: CACHE_VERSION,
            entries: inner
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        write_document(path, &doc)?;
        inner.dirty = false;
        tracing::debug!(path = %path.display(), entries = doc.entries.len(), "Saved extraction cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_failure_is_distinct_from_miss() {
        let cache = ExtractionCache::in_memory();
        cache.set("https://wsj.com/articles/x", None);

        assert_eq!(cache.get("https://wsj.com/articles/x"), CacheLookup::KnownFailure);
        assert_eq!(cache.get("https://wsj.com/articles/y"), CacheLookup::Miss);
    }

    #[test]
    fn test_lookup_ignores_query_fragment_and_case() {
        let cache = ExtractionCache::in_memory();
        let article = ExtractedArticle::new("Body text");
        cache.set("https://Example.com/Story?utm=1", Some(article.clone()));

        assert_eq!(
            cache.get("https://example.com/story#comments"),
            CacheLookup::Hit(article)
        );
    }

    #[test]
    fn test_stats_count_successes_and_failures() {
        let cache = ExtractionCache::in_memory();
        cache.set("https://a.com/1", Some(ExtractedArticle::new("one")));
        cache.set("https://a.com/2", None);
        cache.set("https://a.com/3", None);

        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 3,
                successes: 1,
                failures: 2
            }
        );
    }

    #[test]
    fn test_save_and_reopen_preserves_failures() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("extraction_cache.json");

        let cache = ExtractionCache::open(&path);
        cache.set("https://a.com/ok", Some(ExtractedArticle::new("text")));
        cache.set("https://a.com/paywalled", None);
        cache.save().unwrap();
        assert!(!cache.is_dirty());

        let reopened = ExtractionCache::open(&path);
        assert!(matches!(reopened.get("https://a.com/ok"), CacheLookup::Hit(_)));
        assert_eq!(reopened.get("https://a.com/paywalled"), CacheLookup::KnownFailure);
        assert!(!reopened.is_dirty());
    }

    #[test]
    fn test_flat_legacy_layout_loads() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("extraction_cache.json");
        std::fs::write(
            &path,
            r#"{"https://a.com/x": {"data": null, "cachedAt": "2025-01-01T00:00:00Z"}}"#,
        )
        .unwrap();

        let cache = ExtractionCache::open(&path);
        assert_eq!(cache.get("https://a.com/x"), CacheLookup::KnownFailure);
        assert!(cache.is_dirty());
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("extraction_cache.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let cache = ExtractionCache::open(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_is_noop_when_clean() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("extraction_cache.json");
        ExtractionCache::open(&path).save().unwrap();
        assert!(!path.exists());
    }
}
