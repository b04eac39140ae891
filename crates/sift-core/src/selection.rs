//! Scoring and mode-adaptive, outlet-capped selection.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{ArticleRecord, SearchMode};
use crate::text::topic_keywords;

/// Chosen articles only pay the deep-mode repeat penalty once this many are in.
const DEEP_REPEAT_PENALTY_AFTER: usize = 3;

/// `+1` for under a day old, `+0.5` for under a week, otherwise 0.
pub fn recency_bonus(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(published) = published_at else {
        return 0.0;
    };
    let age = now - published;
    if age < chrono::TimeDelta::hours(24) {
        1.0
    } else if age < chrono::TimeDelta::days(7) {
        0.5
    } else {
        0.0
    }
}

/// Tier + paywall + recency + ledger penalty.
pub fn base_score(record: &ArticleRecord, ledger_penalty: i32, now: DateTime<Utc>) -> f64 {
    record.source_tier.weight()
        + record.paywall.weight()
        + recency_bonus(record.published_at, now)
        + f64::from(ledger_penalty)
}

/// An article ready for selection.
#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub record: ArticleRecord,
    /// Canonical outlet, the unit of the per-outlet cap.
    pub outlet: String,
    pub base: f64,
    keywords: BTreeSet<String>,
}

impl ScoredArticle {
    pub fn new(record: ArticleRecord, outlet: impl Into<String>, base: f64) -> Self {
        Self {
            keywords: topic_keywords(&record.title),
            outlet: outlet.into(),
            base,
            record,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Selected {
    pub record: ArticleRecord,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub articles: Vec<Selected>,
    /// Articles picked under the strict per-outlet cap.
    pub first_pass: usize,
    /// Articles added by the relaxed (cap + 1) pass.
    pub relaxed: usize,
}

#[derive(Default)]
struct SelectionState {
    per_outlet: HashMap<String, usize>,
    regions: HashSet<String>,
    covered: BTreeSet<String>,
    chosen: usize,
}

impl SelectionState {
    fn diversity_bonus(&self, mode: SearchMode, article: &ScoredArticle) -> f64 {
        let fresh_outlet = !self.per_outlet.contains_key(&article.outlet);
        let fresh_region = article
            .record
            .source_region
            .as_ref()
            .map(|r| !self.regions.contains(r));

        match mode {
            SearchMode::Survey => {
                if article.keywords.iter().any(|k| !self.covered.contains(k)) {
                    2.0
                } else {
                    -1.0
                }
            }
            SearchMode::Thematic => {
                let mut bonus = 0.0;
                if fresh_outlet {
                    bonus += 1.0;
                }
                if fresh_region == Some(true) {
                    bonus += 0.5;
                }
                bonus
            }
            SearchMode::Deep => {
                let enforce = self.chosen >= DEEP_REPEAT_PENALTY_AFTER;
                let mut bonus = 0.0;
                if fresh_outlet {
                    bonus += 2.0;
                } else if enforce {
                    bonus -= 2.0;
                }
                match fresh_region {
                    Some(true) => bonus += 1.0,
                    Some(false) if enforce => bonus -= 2.0,
                    _ => {}
                }
                bonus
            }
        }
    }

    fn take(&mut self, article: &ScoredArticle) {
        *self.per_outlet.entry(article.outlet.clone()).or_default() += 1;
        if let Some(region) = &article.record.source_region {
            self.regions.insert(region.clone());
        }
        self.covered.extend(article.keywords.iter().cloned());
        self.chosen += 1;
    }
}

fn greedy_pass(
    pool: &mut Vec<ScoredArticle>,
    state: &mut SelectionState,
    out: &mut Vec<Selected>,
    mode: SearchMode,
    cap: usize,
    limit: usize,
) -> usize {
    let mut added = 0;
    while out.len() < limit {
        let best = pool
            .iter()
            .enumerate()
            .filter(|(_, a)| state.per_outlet.get(&a.outlet).copied().unwrap_or(0) < cap)
            .map(|(i, a)| (i, a.base + state.diversity_bonus(mode, a)))
            // First maximum wins so ties keep the pool order.
            .fold(None::<(usize, f64)>, |best, (i, s)| match best {
                Some((_, b)) if b >= s => best,
                _ => Some((i, s)),
            });
        let Some((idx, score)) = best else {
            break;
        };
        let article = pool.remove(idx);
        state.take(&article);
        out.push(Selected {
            record: article.record,
            score,
        });
        added += 1;
    }
    added
}

/// Pick up to `limit` articles.
///
/// Each step takes the highest base-plus-diversity score among articles whose
/// outlet is under the mode's cap. If that under-fills, a second pass admits
/// one more article per outlet.
pub fn select(mut pool: Vec<ScoredArticle>, mode: SearchMode, limit: usize) -> Selection {
    // Deterministic tie order: base score, then URL.
    pool.sort_by(|a, b| {
        b.base
            .total_cmp(&a.base)
            .then_with(|| a.record.url.cmp(&b.record.url))
    });

    let cap = mode.outlet_cap();
    let mut state = SelectionState::default();
    let mut articles = Vec::with_capacity(limit.min(pool.len()));

    let first_pass = greedy_pass(&mut pool, &mut state, &mut articles, mode, cap, limit);
    let relaxed = if articles.len() < limit {
        greedy_pass(&mut pool, &mut state, &mut articles, mode, cap + 1, limit)
    } else {
        0
    };

    tracing::debug!(%mode, first_pass, relaxed, "Selection complete");
    Selection {
        articles,
        first_pass,
        relaxed,
    }
}
