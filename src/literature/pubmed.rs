//! PubMed search through the NCBI E-utilities.
//!
//! `esearch` returns matching PMIDs, `esummary` their metadata.

use crate::config::LiteratureConfig;
use crate::data::source::SourceError;
use crate::literature::LiteratureSource;
use crate::models::{Article, LiteratureProvider};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct PubMedClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl PubMedClient {
    pub fn new(config: &LiteratureConfig) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("empirica/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.pubmed_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, SourceError> {
        let response = self
            .http_client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(query)
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
impl LiteratureSource for PubMedClient {
    fn provider(&self) -> LiteratureProvider {
        LiteratureProvider::PubMed
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Article>, SourceError> {
        let search = self
            .get_json(
                "esearch.fcgi",
                &[
                    ("db", "pubmed".to_string()),
                    ("term", query.to_string()),
                    ("retmax", max_results.to_string()),
                    ("retmode", "json".to_string()),
                    ("sort", "relevance".to_string()),
                ],
            )
            .await?;

        let ids = parse_id_list(&search);
        if ids.is_empty() {
            debug!("No PubMed results for {}", query);
            return Ok(Vec::new());
        }

        let summary = self
            .get_json(
                "esummary.fcgi",
                &[
                    ("db", "pubmed".to_string()),
                    ("id", ids.join(",")),
                    ("retmode", "json".to_string()),
                ],
            )
            .await?;

        Ok(parse_summary(&summary, &ids))
    }
}

/// PMIDs from an `esearch` answer.
pub fn parse_id_list(body: &Value) -> Vec<String> {
    body["esearchresult"]["idlist"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Articles from an `esummary` answer, in `ids` order.
pub fn parse_summary(body: &Value, ids: &[String]) -> Vec<Article> {
    ids.iter()
        .filter(|pmid| pmid.as_str() != "uids")
        .filter_map(|pmid| parse_entry(&body["result"][pmid.as_str()], pmid))
        .collect()
}

fn parse_entry(info: &Value, pmid: &str) -> Option<Article> {
    let title = info["title"].as_str()?.trim().trim_end_matches('.');
    if title.is_empty() {
        return None;
    }
    let authors: Vec<String> = info["authors"]
        .as_array()?
        .iter()
        .filter_map(|a| a["name"].as_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();
    if authors.is_empty() {
        return None;
    }
    let year = info["pubdate"]
        .as_str()
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok())?;

    let doi = info["articleids"].as_array().and_then(|ids| {
        ids.iter()
            .find(|id| id["idtype"].as_str() == Some("doi"))
            .and_then(|id| id["value"].as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    });

    Some(Article {
        title: title.to_string(),
        authors,
        year,
        venue: info["source"].as_str().unwrap_or("Unknown").to_string(),
        external_id: doi,
        pmid: Some(pmid.to_string()),
        citation_count: 0,
        abstract_text: String::new(),
        source: LiteratureProvider::PubMed,
    })
}
