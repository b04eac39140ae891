//! Query classification: one LLM call maps free text to a search mode, a
//! recency window and four search facets.

use serde::Deserialize;

use crate::error::AppError;
use crate::models::{Classification, Facet, Recency, SearchMode};
use crate::traits::LanguageModel;

/// Facets handed to providers per search.
pub const FACET_COUNT: usize = 4;
/// Longest facet query, in words.
pub const MAX_FACET_WORDS: usize = 4;

pub const CLASSIFY_SYSTEM_PROMPT: &str = "You classify news search queries. Respond ONLY with JSON of the form \
{\"mode\": \"survey\"|\"thematic\"|\"deep\", \"recency\": \"breaking\"|\"recent\"|\"general\", \
\"facets\": [{\"query\": string, \"category\": string|null, \"country\": string|null}]}. \
Use survey for broad 'what is happening' requests, deep for one specific story, thematic otherwise. \
Return exactly 4 facets; each query has at most 4 words.";

#[derive(Deserialize)]
struct RawClassification {
    mode: String,
    recency: String,
    #[serde(default)]
    facets: Vec<RawFacet>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFacet {
    Full {
        query: String,
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        country: Option<String>,
    },
    Bare(String),
}

/// Classification used whenever the model output cannot be trusted.
pub fn fallback(query: &str) -> Classification {
    Classification {
        mode: SearchMode::Thematic,
        recency: Recency::General,
        facets: pad_facets(vec![Facet::new(query.trim())], query),
    }
}

/// Slice out the JSON value in an LLM reply, tolerating code fences and
/// surrounding prose.
pub(crate) fn json_payload(raw: &str) -> &str {
    let trimmed = raw.trim();
    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &trimmed[s..=e],
        _ => trimmed,
    }
}

fn truncate_words(text: &str, max: usize) -> String {
    text.split_whitespace().take(max).collect::<Vec<_>>().join(" ")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn pad_facets(mut facets: Vec<Facet>, query: &str) -> Vec<Facet> {
    facets.truncate(FACET_COUNT);
    while facets.len() < FACET_COUNT {
        facets.push(Facet::new(query.trim()));
    }
    facets
}

/// Parse a classifier reply. Facet queries are cut to four words and the list
/// is padded with the original query (or truncated) to exactly four entries.
pub fn parse_classification(raw: &str, query: &str) -> Result<Classification, AppError> {
    let parsed: RawClassification = serde_json::from_str(json_payload(raw))
        .map_err(|e| AppError::ClassificationFailure(format!("Invalid classifier JSON: {e}")))?;

    let mode: SearchMode = parsed.mode.parse().map_err(AppError::ClassificationFailure)?;
    let recency: Recency = parsed.recency.parse().map_err(AppError::ClassificationFailure)?;

    let facets = parsed
        .facets
        .into_iter()
        .filter_map(|f| {
            let (q, category, country) = match f {
                RawFacet::Full {
                    query,
                    category,
                    country,
                } => (query, category, country),
                RawFacet::Bare(query) => (query, None, None),
            };
            let q = truncate_words(&q, MAX_FACET_WORDS);
            (!q.is_empty()).then(|| Facet {
                query: q,
                category: non_empty(category),
                country: non_empty(country),
            })
        })
        .collect();

    Ok(Classification {
        mode,
        recency,
        facets: pad_facets(facets, query),
    })
}

/// Classify `query`, degrading to [`fallback`] on any model or parse failure.
pub async fn classify<L: LanguageModel>(llm: &L, query: &str) -> Classification {
    let raw = match llm.complete(CLASSIFY_SYSTEM_PROMPT, query).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Classifier call failed, using fallback classification");
            return fallback(query);
        }
    };
    match parse_classification(&raw, query) {
        Ok(c) => {
            tracing::debug!(mode = %c.mode, recency = ?c.recency, "Query classified");
            c
        }
        Err(e) => {
            tracing::warn!(error = %e, "Unusable classifier output, using fallback classification");
            fallback(query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockLanguageModel;

    #[test]
    fn test_parses_full_reply() {
        let raw = r#"{"mode":"deep","recency":"breaking","facets":[
            {"query":"senate budget vote tonight late","category":"politics","country":"US"},
            {"query":"budget reaction","category":null,"country":""}
        ]}"#;
        let c = parse_classification(raw, "senate budget").unwrap();
        assert_eq!(c.mode, SearchMode::Deep);
        assert_eq!(c.recency, Recency::Breaking);
        assert_eq!(c.facets.len(), 4);
        assert_eq!(c.facets[0].query, "senate budget vote tonight");
        assert_eq!(c.facets[0].country.as_deref(), Some("US"));
        assert_eq!(c.facets[1].country, None);
        assert_eq!(c.facets[3].query, "senate budget");
    }

    #[test]
    fn test_accepts_code_fences_and_bare_facets() {
        let raw = "```json\n{\"mode\":\"survey\",\"recency\":\"recent\",\"facets\":[\"world\",\"markets\",\"tech\",\"sport\",\"weather\"]}\n```";
        let c = parse_classification(raw, "news").unwrap();
        assert_eq!(c.mode, SearchMode::Survey);
        assert_eq!(c.facets.len(), 4);
        assert_eq!(c.facets[3].query, "sport");
    }

    #[test]
    fn test_unknown_mode_is_failure() {
        let raw = r#"{"mode":"sideways","recency":"recent","facets":[]}"#;
        assert!(matches!(
            parse_classification(raw, "q"),
            Err(AppError::ClassificationFailure(_))
        ));
    }

    #[test]
    fn test_fallback_shape() {
        let c = fallback("  what happened in Lisbon  ");
        assert_eq!(c.mode, SearchMode::Thematic);
        assert_eq!(c.recency, Recency::General);
        assert_eq!(c.facets.len(), 4);
        assert!(c.facets.iter().all(|f| f.query == "what happened in Lisbon"));
    }

    #[tokio::test]
    async fn test_classify_degrades_on_garbage() {
        let llm = MockLanguageModel::new("I think this is about politics.");
        let c = classify(&llm, "budget").await;
        assert_eq!(c, fallback("budget"));
    }

    #[tokio::test]
    async fn test_classify_degrades_on_llm_error() {
        let llm = MockLanguageModel::with_error(AppError::RateLimitExceeded);
        let c = classify(&llm, "budget").await;
        assert_eq!(c.mode, SearchMode::Thematic);
    }
}
