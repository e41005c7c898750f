//! Panel data access.
//!
//! This module provides the provider seam, the World Bank client, the
//! paginated fetcher with retry, and the dataset merger.

pub mod aggregates;
pub mod fetcher;
pub mod merger;
pub mod retry;
pub mod source;
pub mod worldbank;

pub use aggregates::is_aggregate;
pub use fetcher::PanelFetcher;
pub use merger::{merge_panel, MergedPanel};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use source::{IndicatorInfo, PageRequest, PanelPage, PanelSource, RawRecord, SourceError};
pub use worldbank::WorldBankClient;
