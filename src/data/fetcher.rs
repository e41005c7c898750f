//! Paginated panel fetch for one indicator.
//!
//! Pages are requested until the reported page count is reached or a page
//! comes back empty. Each page gets the configured number of attempts; when
//! a page still fails the fetch stops and returns what it already has.

use crate::data::aggregates::is_aggregate;
use crate::data::retry::{RetryPolicy, Sleeper};
use crate::data::source::{PageRequest, PanelSource, SourceError};
use crate::models::{IndicatorCode, Observation};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fetches complete (possibly partial on failure) series from a `PanelSource`.
pub struct PanelFetcher {
    source: Arc<dyn PanelSource>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    per_page: u32,
}

impl PanelFetcher {
    pub fn new(
        source: Arc<dyn PanelSource>,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        per_page: u32,
    ) -> Self {
        Self {
            source,
            retry,
            sleeper,
            per_page: per_page.max(1),
        }
    }

    /// Fetch every non-aggregate, non-null observation of `indicator`.
    ///
    /// Never fails: transport errors end the fetch early and whatever was
    /// collected so far (possibly nothing) is returned.
    pub async fn fetch(
        &self,
        indicator: &IndicatorCode,
        start_year: i32,
        end_year: i32,
    ) -> Vec<Observation> {
        info!("Fetching {} ({}-{})", indicator, start_year, end_year);

        let mut observations = Vec::new();
        let mut page = 1;

        loop {
            let request = PageRequest {
                indicator: indicator.clone(),
                start_year,
                end_year,
                page,
                per_page: self.per_page,
            };

            let operation = format!("fetch {} page {}", indicator, page);
            let result: Result<_, SourceError> = self
                .retry
                .run(&self.sleeper, &operation, || self.source.fetch_page(&request))
                .await;

            let panel_page = match result {
                Ok(p) => p,
                Err(e) => {
                    warn!(
                        indicator = %indicator,
                        page,
                        kept = observations.len(),
                        "Provider error, stopping fetch: {}",
                        e
                    );
                    break;
                }
            };

            if panel_page.records.is_empty() {
                debug!(indicator = %indicator, page, "Empty page, stopping");
                break;
            }

            let before = observations.len();
            observations.extend(panel_page.records.into_iter().filter_map(|record| {
                let value = record.value.filter(|v| v.is_finite())?;
                if is_aggregate(&record.country_code) {
                    return None;
                }
                let year = record.date.trim().parse::<i32>().ok()?;
                Some(Observation {
                    country: record.country_name,
                    country_code: record.country_code,
                    year,
                    value,
                })
            }));
            debug!(
                indicator = %indicator,
                page,
                pages = panel_page.pages,
                kept = observations.len() - before,
                "Page processed"
            );

            if page >= panel_page.pages {
                break;
            }
            page += 1;
        }

        if observations.is_empty() {
            warn!("No data returned for {}", indicator);
        } else {
            let countries: BTreeSet<_> = observations.iter().map(|o| &o.country_code).collect();
            info!(
                "{} observations, {} countries for {}",
                observations.len(),
                countries.len(),
                indicator
            );
        }

        observations
    }

    /// Raw observation count for the range, probed with a one-record page.
    pub async fn coverage(
        &self,
        indicator: &IndicatorCode,
        start_year: i32,
        end_year: i32,
    ) -> Result<u64, SourceError> {
        let request = PageRequest {
            indicator: indicator.clone(),
            start_year,
            end_year,
            page: 1,
            per_page: 1,
        };
        let page = self.source.fetch_page(&request).await?;
        Ok(page.total)
    }

    /// The underlying provider.
    pub fn source(&self) -> &Arc<dyn PanelSource> {
        &self.source
    }
}
