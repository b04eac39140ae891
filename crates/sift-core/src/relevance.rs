//! LLM relevance filter. The model names only the indices to drop; anything
//! ambiguous keeps the article.

use std::collections::BTreeSet;
use std::fmt::Write;

use serde::Deserialize;

use crate::classify::json_payload;
use crate::models::ArticleRecord;
use crate::traits::LanguageModel;

pub const RELEVANCE_SYSTEM_PROMPT: &str = "You filter news search results. You receive a query and a numbered list of \
headlines. Respond ONLY with JSON {\"drop\": [indices]} listing headlines that are unrelated to the query. \
When unsure, keep the headline.";

#[derive(Deserialize)]
#[serde(untagged)]
enum DropReply {
    Object { drop: Vec<serde_json::Value> },
    List(Vec<serde_json::Value>),
}

pub fn build_prompt(query: &str, articles: &[ArticleRecord]) -> String {
    let mut prompt = format!("Query: {query}\n\n");
    for (i, a) in articles.iter().enumerate() {
        let _ = writeln!(prompt, "{i}. {} ({})", a.title, a.source_domain);
    }
    prompt
}

/// Indices to drop, or `None` if the reply is unusable. Out-of-range and
/// non-integer entries are ignored.
pub fn parse_drop_indices(raw: &str, len: usize) -> Option<BTreeSet<usize>> {
    let reply: DropReply = serde_json::from_str(json_payload(raw)).ok()?;
    let values = match reply {
        DropReply::Object { drop } => drop,
        DropReply::List(list) => list,
    };
    Some(
        values
            .iter()
            .filter_map(|v| v.as_u64().or_else(|| v.as_str()?.trim().parse().ok()))
            .map(|i| i as usize)
            .filter(|i| *i < len)
            .collect(),
    )
}

/// Remove articles the model marks as off-topic.
///
/// A failed call, an unparsable reply, or a reply that would drop every
/// article leaves the list untouched.
pub async fn filter_relevant<L: LanguageModel>(
    llm: &L,
    query: &str,
    articles: Vec<ArticleRecord>,
) -> Vec<ArticleRecord> {
    if articles.is_empty() {
        return articles;
    }

    let raw = match llm
        .complete(RELEVANCE_SYSTEM_PROMPT, &build_prompt(query, &articles))
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Relevance filter call failed, keeping all");
            return articles;
        }
    };

    let Some(drop) = parse_drop_indices(&raw, articles.len()) else {
        tracing::warn!("Unparsable relevance reply, keeping all");
        return articles;
    };
    if drop.len() >= articles.len() {
        tracing::warn!(count = articles.len(), "Relevance filter would drop everything, keeping all");
        return articles;
    }

    tracing::debug!(dropped = drop.len(), "Relevance filter applied");
    articles
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !drop.contains(i))
        .map(|(_, a)| a)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::testutil::{MockLanguageModel, make_article};

    fn three() -> Vec<ArticleRecord> {
        vec![
            make_article("Senate passes budget", "https://a.com/1", "a.com"),
            make_article("Celebrity chef opens bistro", "https://b.com/2", "b.com"),
            make_article("Budget heads to House", "https://c.com/3", "c.com"),
        ]
    }

    #[test]
    fn test_parses_object_and_list_forms() {
        assert_eq!(
            parse_drop_indices(r#"{"drop": [1, "2", 9]}"#, 3),
            Some(BTreeSet::from([1, 2]))
        );
        assert_eq!(parse_drop_indices("[0]", 3), Some(BTreeSet::from([0])));
        assert_eq!(parse_drop_indices("no idea", 3), None);
    }

    #[tokio::test]
    async fn test_drops_marked_indices() {
        let llm = MockLanguageModel::new(r#"{"drop": [1]}"#);
        let kept = filter_relevant(&llm, "budget", three()).await;
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|a| a.title.contains("udget")));
        assert!(llm.prompts()[0].contains("1. Celebrity chef opens bistro"));
    }

    #[tokio::test]
    async fn test_unparsable_reply_keeps_everything() {
        let llm = MockLanguageModel::new("Sorry, I can't help with that.");
        assert_eq!(filter_relevant(&llm, "budget", three()).await.len(), 3);
    }

    #[tokio::test]
    async fn test_drop_all_keeps_everything() {
        let llm = MockLanguageModel::new(r#"{"drop": [0, 1, 2]}"#);
        assert_eq!(filter_relevant(&llm, "budget", three()).await.len(), 3);
    }

    #[tokio::test]
    async fn test_llm_error_keeps_everything() {
        let llm = MockLanguageModel::with_error(AppError::Timeout(5000));
        assert_eq!(filter_relevant(&llm, "budget", three()).await.len(), 3);
    }
}
