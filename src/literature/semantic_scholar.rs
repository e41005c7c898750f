//! Semantic Scholar paper search.

use crate::config::LiteratureConfig;
use crate::data::retry::{RetryPolicy, Sleeper};
use crate::data::source::SourceError;
use crate::literature::{truncate_chars, LiteratureSource};
use crate::models::{Article, LiteratureProvider};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const FIELDS: &str = "title,authors,year,journal,externalIds,abstract,citationCount";
const ABSTRACT_CHARS: usize = 500;

pub struct SemanticScholarClient {
    http_client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl SemanticScholarClient {
    pub fn new(
        config: &LiteratureConfig,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("empirica/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.semantic_scholar_url.trim_end_matches('/').to_string(),
            retry,
            sleeper,
        })
    }

    async fn search_once(&self, query: &str, max_results: usize) -> Result<Value, SourceError> {
        let response = self
            .http_client
            .get(format!("{}/paper/search", self.base_url))
            .query(&[
                ("query", query.to_string()),
                ("limit", max_results.to_string()),
                ("fields", FIELDS.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl LiteratureSource for SemanticScholarClient {
    fn provider(&self) -> LiteratureProvider {
        LiteratureProvider::SemanticScholar
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Article>, SourceError> {
        let body = self
            .retry
            .run(&self.sleeper, "semantic scholar search", || {
                self.search_once(query, max_results)
            })
            .await?;
        Ok(parse_search(&body))
    }
}

/// Articles from a `/paper/search` answer, most cited first.
///
/// Papers without a title, an author or a year are skipped.
pub fn parse_search(body: &Value) -> Vec<Article> {
    let papers = match body["data"].as_array() {
        Some(papers) => papers,
        None => return Vec::new(),
    };

    let mut articles: Vec<Article> = papers.iter().filter_map(parse_paper).collect();
    articles.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
    articles
}

fn parse_paper(paper: &Value) -> Option<Article> {
    let title = paper["title"].as_str().map(str::trim).filter(|t| !t.is_empty())?;
    let authors: Vec<String> = paper["authors"]
        .as_array()?
        .iter()
        .filter_map(|a| a["name"].as_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();
    if authors.is_empty() {
        return None;
    }
    let year = i32::try_from(paper["year"].as_i64()?).ok()?;

    let venue = paper["journal"]["name"]
        .as_str()
        .filter(|v| !v.is_empty())
        .unwrap_or("Unknown");
    let doi = paper["externalIds"]["DOI"]
        .as_str()
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Some(Article {
        title: title.to_string(),
        authors,
        year,
        venue: venue.to_string(),
        external_id: doi,
        pmid: None,
        citation_count: paper["citationCount"].as_u64().unwrap_or(0),
        abstract_text: truncate_chars(paper["abstract"].as_str().unwrap_or(""), ABSTRACT_CHARS),
        source: LiteratureProvider::SemanticScholar,
    })
}
