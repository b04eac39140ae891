//! Shared text utilities: URL normalisation, title tokenisation, and the
//! token-set similarity used by deduplication, selection and clustering.

use std::collections::{BTreeSet, HashSet};

use url::Url;

/// Words that carry no topic signal in a headline.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "into", "over", "after", "before",
    "about", "amid", "are", "was", "were", "has", "have", "had", "will", "would", "could",
    "says", "said", "new", "its", "his", "her", "their", "they", "what", "when", "where",
    "who", "why", "how", "not", "but", "out", "more", "than", "just", "now", "live", "update",
    "updates", "news", "latest", "report", "video", "watch",
];

/// Cache/dedup key for a URL: query string and fragment stripped, lowercased.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.as_str().to_lowercase()
        }
        Err(_) => trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase(),
    }
}

/// Host of a URL without port, lowercased.
pub fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    url.host_str().map(|h| h.to_lowercase())
}

/// Tokenise a headline for similarity: lowercase, `U.S.` → `us`, punctuation
/// stripped, tokens shorter than 3 characters dropped (`us` is kept).
pub fn title_tokens(title: &str) -> HashSet<String> {
    let lowered = title.to_lowercase().replace("u.s.", " us ");
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() >= 3 || *t == "us")
        .map(str::to_string)
        .collect()
}

/// Sørensen–Dice coefficient `2|A∩B| / (|A|+|B|)`, in `[0, 1]`.
pub fn dice_coefficient(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    (2 * shared) as f64 / total as f64
}

/// Content keywords of a headline: title tokens minus stop words.
pub fn topic_keywords(title: &str) -> BTreeSet<String> {
    title_tokens(title)
        .into_iter()
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// `|A∩B| / min(|A|, |B|)`; zero when either set is empty.
pub fn overlap_ratio(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

const LIVE_PATH_MARKERS: &[&str] = &["/live/", "/live-", "liveblog", "live-updates", "live-news"];
const LIVE_TITLE_MARKERS: &[&str] = &["live:", "live updates", "as it happened", "latest updates"];

/// Rolling live-blog coverage, recognised from URL path or headline wording.
pub fn looks_live(title: &str, url: &str) -> bool {
    let path = Url::parse(url.trim())
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();
    let title = title.to_lowercase();
    LIVE_PATH_MARKERS.iter().any(|m| path.contains(m))
        || LIVE_TITLE_MARKERS.iter().any(|m| title.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_live_blogs_detected_from_path_or_headline() {
        assert!(looks_live("Budget vote", "https://www.theguardian.com/politics/live/2026/mar/04/budget"));
        assert!(looks_live("Live: Senate votes on budget", "https://a.com/1"));
        assert!(looks_live("Election night as it happened", "https://a.com/2"));
        assert!(!looks_live("Senate passes budget bill", "https://a.com/politics/budget"));
        assert!(!looks_live("Oliver reviews new album", "https://a.com/culture/oliver"));
    }

    #[test]
    fn test_normalize_url_strips_query_and_fragment() {
        assert_eq!(
            normalize_url("https://Example.com/News/Story?utm_source=x#top"),
            "https://example.com/news/story"
        );
        assert_eq!(normalize_url("not a url?x=1"), "not a url");
    }

    #[test]
    fn test_host_of_lowercases() {
        assert_eq!(
            host_of("https://WWW.BBC.co.uk/news/1").as_deref(),
            Some("www.bbc.co.uk")
        );
        assert_eq!(host_of("garbage"), None);
    }

    #[test]
    fn test_title_tokens_normalises_us_and_drops_short_tokens() {
        let tokens = title_tokens("U.S. Senate to vote on AI bill, officials say");
        assert!(tokens.contains("us"));
        assert!(tokens.contains("senate"));
        assert!(tokens.contains("bill"));
        assert!(!tokens.contains("to"));
        assert!(!tokens.contains("on"));
        assert!(!tokens.contains("ai"));
    }

    #[test]
    fn test_dice_is_symmetric() {
        let a = set(&["senate", "passes", "budget", "bill"]);
        let b = set(&["senate", "passes", "the", "budget", "bill", "vote"]);
        assert_eq!(dice_coefficient(&a, &b), dice_coefficient(&b, &a));
        assert!((dice_coefficient(&a, &b) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_dice_of_empty_sets_is_zero() {
        assert_eq!(dice_coefficient(&HashSet::new(), &HashSet::new()), 0.0);
        assert_eq!(dice_coefficient(&set(&["one"]), &HashSet::new()), 0.0);
    }

    #[test]
    fn test_topic_keywords_drop_stop_words() {
        let kw = topic_keywords("The Fed says rates will hold after inflation report");
        assert!(kw.contains("fed"));
        assert!(kw.contains("rates"));
        assert!(kw.contains("inflation"));
        assert!(!kw.contains("the"));
        assert!(!kw.contains("says"));
    }

    #[test]
    fn test_overlap_ratio_uses_smaller_set() {
        let a: BTreeSet<String> = ["fed", "rates", "inflation"].iter().map(|s| s.to_string()).collect();
        let b: BTreeSet<String> = ["fed", "rates", "hold", "powell", "markets"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!((overlap_ratio(&a, &b) - 2.0 / 3.0).abs() < 1e-9);
    }
}
