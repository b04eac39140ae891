//! Pre-dedup quality filter for provider snippets.

use crate::models::{ArticleRecord, Outcome};
use crate::source_tracker::SourceTracker;

/// Boilerplate that shows up when a provider scraped a navigation bar
/// instead of the article.
const NAV_PHRASES: &[&str] = &[
    "skip to main content",
    "skip to content",
    "sign in",
    "subscribe now",
    "accept cookies",
    "cookie policy",
    "privacy policy",
    "terms of service",
    "all rights reserved",
    "follow us on",
    "share this article",
    "advertisement",
    "newsletter sign up",
    "most popular",
];

/// Markdown link marker counted by the junk heuristic.
const LINK_MARKER: &str = "](";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityIssue {
    TooShort,
    NavJunk,
}

/// ≥3 bracketed-link markers or ≥2 navigation phrases.
pub fn is_nav_junk(snippet: &str) -> bool {
    if snippet.matches(LINK_MARKER).count() >= 3 {
        return true;
    }
    let lowered = snippet.to_lowercase();
    NAV_PHRASES.iter().filter(|p| lowered.contains(*p)).count() >= 2
}

pub fn check(record: &ArticleRecord, min_snippet_chars: usize) -> Result<(), QualityIssue> {
    if record.snippet.trim().chars().count() < min_snippet_chars {
        return Err(QualityIssue::TooShort);
    }
    if is_nav_junk(&record.snippet) {
        return Err(QualityIssue::NavJunk);
    }
    Ok(())
}

/// Drop records that fail [`check`], recording `junk` against their domain;
/// survivors are recorded as `success`. Blocked domains are filtered the
/// same way but not recorded: only a recovery trial can readmit them.
pub fn filter_quality(
    records: Vec<ArticleRecord>,
    min_snippet_chars: usize,
    tracker: &SourceTracker,
) -> Vec<ArticleRecord> {
    let before = records.len();
    let kept: Vec<ArticleRecord> = records
        .into_iter()
        .filter(|r| {
            let verdict = check(r, min_snippet_chars);
            if !tracker.should_skip(&r.source_domain) {
                let outcome = if verdict.is_ok() { Outcome::Success } else { Outcome::Junk };
                tracker.record(&r.source_domain, outcome);
            }
            if let Err(issue) = verdict {
                tracing::debug!(url = %r.url, ?issue, "Dropped low-quality snippet");
            }
            verdict.is_ok()
        })
        .collect();
    tracing::debug!(before, after = kept.len(), "Quality filter applied");
    kept
}
