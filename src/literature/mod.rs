//! Academic literature search.
//!
//! Two independent providers are queried one after the other; their
//! results are merged, deduplicated by DOI and ranked by citations.
//! Literature is optional context, so every failure here degrades to an
//! empty list.

pub mod pubmed;
pub mod semantic_scholar;

pub use pubmed::PubMedClient;
pub use semantic_scholar::SemanticScholarClient;

use crate::data::retry::Sleeper;
use crate::data::source::SourceError;
use crate::models::{Article, LiteratureProvider, LiteratureQueries};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A provider of article records.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    fn provider(&self) -> LiteratureProvider;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Article>, SourceError>;
}

/// Runs both providers and combines their answers.
pub struct LiteratureSearcher {
    semantic_scholar: Arc<dyn LiteratureSource>,
    pubmed: Arc<dyn LiteratureSource>,
    sleeper: Arc<dyn Sleeper>,
    semantic_scholar_max: usize,
    pubmed_max: usize,
    /// Pause between the two providers.
    pub pause: Duration,
}

impl LiteratureSearcher {
    pub fn new(
        semantic_scholar: Arc<dyn LiteratureSource>,
        pubmed: Arc<dyn LiteratureSource>,
        sleeper: Arc<dyn Sleeper>,
        semantic_scholar_max: usize,
        pubmed_max: usize,
    ) -> Self {
        Self {
            semantic_scholar,
            pubmed,
            sleeper,
            semantic_scholar_max,
            pubmed_max,
            pause: Duration::from_secs(1),
        }
    }

    /// Search both providers. Never fails.
    pub async fn search(&self, queries: &LiteratureQueries) -> Vec<Article> {
        let first = run_one(
            self.semantic_scholar.as_ref(),
            &queries.semantic_scholar,
            self.semantic_scholar_max,
        )
        .await;
        self.sleeper.sleep(self.pause).await;
        let second = run_one(self.pubmed.as_ref(), &queries.pubmed, self.pubmed_max).await;

        let combined = combine_literature(first.into_iter().chain(second));
        info!("{} unique articles found", combined.len());
        combined
    }
}

async fn run_one(source: &dyn LiteratureSource, query: &str, max_results: usize) -> Vec<Article> {
    info!("{} search: {}", source.provider(), query);
    match source.search(query, max_results).await {
        Ok(articles) => {
            info!("{}: {} articles", source.provider(), articles.len());
            articles
        }
        Err(e) => {
            warn!("{} search failed: {}", source.provider(), e);
            Vec::new()
        }
    }
}

/// Drop repeated DOIs (first occurrence wins) and rank by citations.
///
/// Articles without a DOI are never considered duplicates. The sort is
/// stable, so ties keep provider order.
pub fn combine_literature(articles: impl IntoIterator<Item = Article>) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut combined: Vec<Article> = articles
        .into_iter()
        .filter(|a| match a.external_id.as_deref().map(str::trim) {
            Some(doi) if !doi.is_empty() => seen.insert(doi.to_lowercase()),
            _ => true,
        })
        .collect();

    combined.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
    combined
}

/// Shorten text to `max` characters on a character boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{article, FakeLiterature, RecordingSleeper};
    use crate::models::LiteratureProvider::{PubMed, SemanticScholar};

    #[test]
    fn test_combine_dedupes_by_doi_only() {
        let articles = vec![
            article("Same title", Some("10.1/a"), 5, SemanticScholar),
            article("Same title", None, 0, PubMed),
            article("Other", Some("10.1/A"), 50, PubMed),
            article("Same title", None, 0, PubMed),
        ];

        let combined = combine_literature(articles);

        assert_eq!(combined.len(), 3);
        assert_eq!(combined[0].citation_count, 5);
        assert_eq!(combined[0].source, SemanticScholar);
    }

    #[test]
    fn test_combine_sorts_by_citations_stably() {
        let articles = vec![
            article("a", Some("1"), 3, SemanticScholar),
            article("b", Some("2"), 10, SemanticScholar),
            article("c", None, 3, PubMed),
        ];

        let titles: Vec<_> = combine_literature(articles)
            .into_iter()
            .map(|a| a.title)
            .collect();

        assert_eq!(titles, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_search_tolerates_provider_failure() {
        let ss = Arc::new(FakeLiterature::failing(SemanticScholar));
        let pm = Arc::new(FakeLiterature::new(
            PubMed,
            vec![article("p", Some("10.2/p"), 0, PubMed)],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let searcher = LiteratureSearcher::new(ss.clone(), pm.clone(), sleeper.clone(), 8, 5);
        let queries = LiteratureQueries {
            semantic_scholar: "health spending".to_string(),
            pubmed: "health expenditure life expectancy".to_string(),
        };

        let found = searcher.search(&queries).await;

        assert_eq!(found.len(), 1);
        assert_eq!(*ss.queries.lock().unwrap(), vec!["health spending"]);
        assert_eq!(
            *pm.queries.lock().unwrap(),
            vec!["health expenditure life expectancy"]
        );
        assert_eq!(sleeper.pauses(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }
}
