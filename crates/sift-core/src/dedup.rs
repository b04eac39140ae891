//! Cross-provider deduplication.
//!
//! Two records are the same story when, in order:
//! 1. their URLs match after normalisation,
//! 2. their extracted bodies hash equal (syndicated wire copy), or
//! 3. their title token sets share at least two tokens and reach the Dice
//!    threshold: 0.6 within one canonical outlet, 0.7 across outlets.
//!
//! Input is put in a fixed order before the scan and the survivor of each
//! duplicate pair is chosen by [`prefer`], so the result does not depend on
//! provider arrival order.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::ArticleRecord;
use crate::outlets::OutletDirectory;
use crate::text::{dice_coefficient, normalize_url, title_tokens};

pub const SAME_OUTLET_THRESHOLD: f64 = 0.6;
pub const CROSS_OUTLET_THRESHOLD: f64 = 0.7;
/// Titles sharing fewer tokens than this never dedup.
pub const MIN_SHARED_TOKENS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    Url,
    Content,
    Title,
}

struct Keyed {
    record: ArticleRecord,
    url: String,
    outlet: String,
    tokens: HashSet<String>,
}

impl Keyed {
    fn new(record: ArticleRecord, outlets: &OutletDirectory) -> Self {
        Self {
            url: normalize_url(&record.url),
            outlet: outlets.canonical(&record.source_domain),
            tokens: title_tokens(&record.title),
            record,
        }
    }

    fn content_hash(&self) -> Option<&str> {
        self.record.extraction.as_ref().map(|e| e.content_hash.as_str())
    }
}

fn duplicate_kind(a: &Keyed, b: &Keyed) -> Option<DuplicateKind> {
    if a.url == b.url {
        return Some(DuplicateKind::Url);
    }
    if let (Some(x), Some(y)) = (a.content_hash(), b.content_hash())
        && x == y
    {
        return Some(DuplicateKind::Content);
    }
    if a.tokens.intersection(&b.tokens).count() < MIN_SHARED_TOKENS {
        return None;
    }
    let threshold = if a.outlet == b.outlet {
        SAME_OUTLET_THRESHOLD
    } else {
        CROSS_OUTLET_THRESHOLD
    };
    (dice_coefficient(&a.tokens, &b.tokens) >= threshold).then_some(DuplicateKind::Title)
}

/// True if `candidate` should replace `kept`: higher tier wins; at equal
/// tier a neural-search duplicate with a longer snippet wins.
pub fn prefer(candidate: &ArticleRecord, kept: &ArticleRecord) -> bool {
    let (c, k) = (candidate.source_tier.weight(), kept.source_tier.weight());
    if c != k {
        return c > k;
    }
    (candidate.origin.is_neural() || kept.origin.is_neural())
        && candidate.snippet.chars().count() > kept.snippet.chars().count()
}

/// Arrival-independent scan order: neural results first, then raw URL,
/// title and snippet. Only records identical in all four tie, and either
/// one may stand for the other.
fn scan_order(a: &Keyed, b: &Keyed) -> Ordering {
    b.record
        .origin
        .is_neural()
        .cmp(&a.record.origin.is_neural())
        .then_with(|| a.record.url.cmp(&b.record.url))
        .then_with(|| a.record.title.cmp(&b.record.title))
        .then_with(|| a.record.snippet.cmp(&b.record.snippet))
}

/// Collapse duplicate stories, keeping the preferred version of each.
pub fn deduplicate(records: Vec<ArticleRecord>, outlets: &OutletDirectory) -> Vec<ArticleRecord> {
    let before = records.len();
    let mut pending: Vec<Keyed> = records.into_iter().map(|r| Keyed::new(r, outlets)).collect();
    pending.sort_by(scan_order);

    let mut kept: Vec<Keyed> = Vec::with_capacity(pending.len());
    for candidate in pending {
        let hit = kept
            .iter()
            .enumerate()
            .find_map(|(i, k)| duplicate_kind(&candidate, k).map(|kind| (i, kind)));
        match hit {
            Some((i, kind)) => {
                tracing::debug!(
                    url = %candidate.record.url,
                    kept = %kept[i].record.url,
                    ?kind,
                    "Duplicate article"
                );
                if prefer(&candidate.record, &kept[i].record) {
                    kept[i] = candidate;
                }
            }
            None => kept.push(candidate),
        }
    }

    tracing::debug!(before, after = kept.len(), "Deduplicated articles");
    kept.into_iter().map(|k| k.record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedArticle, Origin, SourceTier};
    use crate::testutil::make_article;

    fn dir() -> OutletDirectory {
        OutletDirectory::empty()
    }

    #[test]
    fn test_exact_url_ignoring_query_dedups() {
        let a = make_article("One headline", "https://a.com/story?utm=x", "a.com");
        let b = make_article("Different words entirely", "https://a.com/story#top", "a.com");
        assert_eq!(deduplicate(vec![a, b], &dir()).len(), 1);
    }

    #[test]
    fn test_same_pair_dedups_for_one_outlet_and_across_outlets() {
        let a = make_article("Senate Passes Budget Bill", "https://a.com/1", "a.com");
        let b = make_article("Senate passes the budget bill", "https://a.com/2", "a.com");
        assert_eq!(deduplicate(vec![a.clone(), b.clone()], &dir()).len(), 1);

        let b_other = make_article("Senate passes the budget bill", "https://b.com/2", "b.com");
        assert_eq!(deduplicate(vec![a, b_other], &dir()).len(), 1);
    }

    #[test]
    fn test_threshold_between_same_and_cross_outlet() {
        // Dice = 2*3 / (4+6) = 0.6
        let a = make_article("Senate Passes Budget Bill", "https://a.com/1", "a.com");
        let same = make_article(
            "Senate passes budget after marathon session",
            "https://a.com/2",
            "a.com",
        );
        let other = make_article(
            "Senate passes budget after marathon session",
            "https://b.com/2",
            "b.com",
        );
        assert_eq!(deduplicate(vec![a.clone(), same], &dir()).len(), 1);
        assert_eq!(deduplicate(vec![a, other], &dir()).len(), 2);
    }

    #[test]
    fn test_outlet_aliases_count_as_same_outlet() {
        let a = make_article("Senate Passes Budget Bill", "https://bbc.com/1", "bbc.com");
        let b = make_article(
            "Senate passes budget after marathon session",
            "https://bbc.co.uk/2",
            "bbc.co.uk",
        );
        assert_eq!(deduplicate(vec![a, b], &dir()).len(), 1);
    }

    #[test]
    fn test_fewer_than_two_shared_tokens_never_dedup() {
        let a = make_article("Earthquake", "https://a.com/1", "a.com");
        let b = make_article("Earthquake", "https://a.com/2", "a.com");
        assert_eq!(deduplicate(vec![a, b], &dir()).len(), 2);
    }

    #[test]
    fn test_identical_body_hash_dedups_across_outlets() {
        let body = "Full wire copy body. ".repeat(30);
        let mut a = make_article("Storm hits coast", "https://a.com/1", "a.com");
        a.extraction = Some(ExtractedArticle::new(body.clone()));
        let mut b = make_article("Coastal towns brace", "https://b.com/9", "b.com");
        b.extraction = Some(ExtractedArticle::new(body));
        assert_eq!(deduplicate(vec![a, b], &dir()).len(), 1);
    }

    #[test]
    fn test_higher_tier_wins_regardless_of_order() {
        let mut low = make_article("Senate Passes Budget Bill", "https://low.com/1", "low.com");
        low.source_tier = SourceTier::Tier3;
        let mut high = make_article("Senate passes the budget bill", "https://high.com/1", "high.com");
        high.source_tier = SourceTier::Tier1;

        let forward = deduplicate(vec![low.clone(), high.clone()], &dir());
        let backward = deduplicate(vec![high, low], &dir());
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].url, "https://high.com/1");
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_same_url_different_query_is_order_independent() {
        let wire = make_article("Senate Passes Budget Bill", "https://a.com/story?src=wire", "a.com");
        let mut neural = make_article("Senate Passes Budget Bill", "https://a.com/story?src=exa", "a.com");
        neural.origin = Origin::Neural {
            provider: "neural".into(),
            relevance: None,
        };

        let forward = deduplicate(vec![wire.clone(), neural.clone()], &dir());
        let backward = deduplicate(vec![neural, wire], &dir());
        assert_eq!(forward.len(), 1);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].url, "https://a.com/story?src=exa");
    }

    #[test]
    fn test_neural_duplicate_with_longer_snippet_survives() {
        let wire = make_article("Storm hits coast", "https://a.com/1", "a.com");
        let mut neural = make_article("Storm hits coast", "https://b.com/1", "b.com");
        neural.origin = Origin::Neural {
            provider: "neural".into(),
            relevance: None,
        };
        neural.snippet.push_str(" Extra paragraph from the neural index.");
        // Same tier, so the neural record's longer snippet decides.
        let forward = deduplicate(vec![wire.clone(), neural.clone()], &dir());
        let backward = deduplicate(vec![neural, wire], &dir());
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].url, "https://b.com/1");
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_higher_tier_wire_replaces_neural_duplicate() {
        let mut neural = make_article("Storm hits coast", "https://small.com/1", "small.com");
        neural.origin = Origin::Neural {
            provider: "neural".into(),
            relevance: None,
        };
        neural.source_tier = SourceTier::Tier3;
        neural.snippet.push_str(" Extra paragraph from the neural index.");
        let mut wire = make_article("Storm hits coast", "https://big.com/1", "big.com");
        wire.source_tier = SourceTier::Tier1;

        let kept = deduplicate(vec![neural.clone(), wire.clone()], &dir());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://big.com/1");
        assert_eq!(kept, deduplicate(vec![wire, neural], &dir()));
    }

    #[test]
    fn test_neural_duplicate_with_longer_snippet_preferred() {
        let kept = make_article("A", "https://a.com/1", "a.com");
        let mut neural = kept.clone();
        neural.origin = Origin::Neural {
            provider: "neural".into(),
            relevance: Some(0.9),
        };
        neural.snippet.push_str(" more detail");
        assert!(prefer(&neural, &kept));
        assert!(!prefer(&kept, &neural));
    }
}
