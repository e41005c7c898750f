//! The paged indicator provider seam.

use crate::models::IndicatorCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider transport and protocol failures.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// One page of one indicator over a year range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub indicator: IndicatorCode,
    pub start_year: i32,
    pub end_year: i32,
    pub page: u32,
    pub per_page: u32,
}

/// A record as the provider returns it, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub country_code: String,
    pub country_name: String,
    /// Year as reported (usually a four-digit string).
    pub date: String,
    pub value: Option<f64>,
}

/// One page of results plus the paging metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelPage {
    pub page: u32,
    pub pages: u32,
    /// Total records across all pages.
    pub total: u64,
    pub records: Vec<RawRecord>,
}

impl PanelPage {
    pub fn empty(page: u32) -> Self {
        Self {
            page,
            pages: 0,
            total: 0,
            records: Vec::new(),
        }
    }
}

/// Catalog entry for an existing indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorInfo {
    pub code: IndicatorCode,
    pub name: String,
    #[serde(default)]
    pub source: String,
}

/// A provider of per-country, per-year indicator values.
#[async_trait]
pub trait PanelSource: Send + Sync {
    /// Fetch one page of observations.
    async fn fetch_page(&self, request: &PageRequest) -> Result<PanelPage, SourceError>;

    /// Look the code up in the catalog. `Ok(None)` means it does not exist.
    async fn indicator_info(
        &self,
        code: &IndicatorCode,
    ) -> Result<Option<IndicatorInfo>, SourceError>;
}
