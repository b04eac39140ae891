use crate::models::{ArticleCluster, ArticleRecord};
use crate::text::{overlap_ratio, topic_keywords};

/// Keyword overlap (relative to the smaller set) needed to join a cluster.
pub const CLUSTER_OVERLAP: f64 = 0.4;

/// Greedy single-pass topic clustering.
///
/// Each article joins the first cluster whose accumulated keywords overlap
/// its own by more than [`CLUSTER_OVERLAP`], otherwise it starts a new one.
/// Singleton clusters are discarded.
pub fn cluster_articles(articles: &[ArticleRecord]) -> Vec<ArticleCluster> {
    let mut clusters: Vec<ArticleCluster> = Vec::new();

    for (idx, article) in articles.iter().enumerate() {
        let keywords = topic_keywords(&article.title);
        if keywords.is_empty() {
            continue;
        }
        match clusters
            .iter_mut()
            .find(|c| overlap_ratio(&keywords, &c.keywords) > CLUSTER_OVERLAP)
        {
            Some(cluster) => {
                cluster.keywords.extend(keywords);
                cluster.members.push(idx);
            }
            None => clusters.push(ArticleCluster {
                keywords,
                members: vec![idx],
            }),
        }
    }

    clusters.retain(|c| c.members.len() > 1);
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_article;

    #[test]
    fn test_groups_same_story_and_drops_singletons() {
        let articles = vec![
            make_article("Senate passes budget bill", "https://a.com/1", "a.com"),
            make_article("Wildfire forces evacuations in California", "https://b.com/1", "b.com"),
            make_article("Budget bill clears Senate after delay", "https://c.com/1", "c.com"),
            make_article("Central bank holds rates steady", "https://d.com/1", "d.com"),
        ];
        let clusters = cluster_articles(&articles);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 2]);
        assert!(clusters[0].keywords.contains("delay"));
    }

    #[test]
    fn test_exact_forty_percent_does_not_join() {
        // {alpha beta gamma delta epsilon} vs {alpha beta zeta eta theta}: 2/5 = 0.4
        let articles = vec![
            make_article("alpha beta gamma delta epsilon", "https://a.com/1", "a.com"),
            make_article("alpha beta zeta eta theta", "https://b.com/1", "b.com"),
        ];
        assert!(cluster_articles(&articles).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_articles(&[]).is_empty());
    }
}
