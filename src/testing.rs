//! In-memory collaborators for unit tests.

use crate::data::retry::Sleeper;
use crate::data::source::{
    IndicatorInfo, PageRequest, PanelPage, PanelSource, RawRecord, SourceError,
};
use crate::literature::LiteratureSource;
use crate::llm::{LlmError, TextGenerator};
use crate::models::{Article, IndicatorCode, LiteratureProvider};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays canned answers in order and records every prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// (system, user) pairs received so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

#[derive(Default)]
struct FakeState {
    series: HashMap<String, Vec<RawRecord>>,
    known: HashSet<String>,
    /// (indicator, page) -> failures still to serve
    failures: HashMap<(String, u32), u32>,
    catalog_down: bool,
    requests: Vec<(String, u32)>,
}

/// Panel provider backed by in-memory series.
///
/// Clones share state, so a test can keep a handle for assertions.
#[derive(Clone, Default)]
pub struct FakePanelSource {
    state: Arc<Mutex<FakeState>>,
}

impl FakePanelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a series (the code also becomes a known indicator).
    pub fn with_series(self, code: &str, records: Vec<RawRecord>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.series.insert(code.to_string(), records);
            state.known.insert(code.to_string());
        }
        self
    }

    /// Register observations as a series of records.
    pub fn with_observations(self, code: &str, rows: &[(&str, i32, f64)]) -> Self {
        let records = rows
            .iter()
            .map(|(country, year, value)| RawRecord {
                country_code: country.to_string(),
                country_name: country.to_string(),
                date: year.to_string(),
                value: Some(*value),
            })
            .collect();
        self.with_series(code, records)
    }

    /// Make a catalog entry exist without any data behind it.
    pub fn with_known(self, code: &str) -> Self {
        self.state.lock().unwrap().known.insert(code.to_string());
        self
    }

    /// Fail `page` of `code` for the next `times` requests.
    pub fn failing_page(self, code: &str, page: u32, times: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((code.to_string(), page), times);
        self
    }

    /// Make every catalog lookup fail at the transport level.
    pub fn catalog_down(self) -> Self {
        self.state.lock().unwrap().catalog_down = true;
        self
    }

    /// Pages requested for `code`, in order.
    pub fn page_requests(&self, code: &str) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(c, _)| c == code)
            .map(|(_, p)| *p)
            .collect()
    }

    /// Every indicator that was fetched at least once, in order of first request.
    pub fn requested_indicators(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut seen = Vec::new();
        for (code, _) in &state.requests {
            if !seen.contains(code) {
                seen.push(code.clone());
            }
        }
        seen
    }
}

#[async_trait]
impl PanelSource for FakePanelSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PanelPage, SourceError> {
        let mut state = self.state.lock().unwrap();
        let code = request.indicator.as_str().to_string();
        state.requests.push((code.clone(), request.page));

        if let Some(remaining) = state.failures.get_mut(&(code.clone(), request.page)) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SourceError::Network("connection reset".to_string()));
            }
        }

        let records = match state.series.get(&code) {
            Some(records) => records,
            None => return Ok(PanelPage::empty(request.page)),
        };

        let per_page = request.per_page.max(1) as usize;
        let total = records.len();
        let pages = total.div_ceil(per_page) as u32;
        let start = (request.page.saturating_sub(1) as usize) * per_page;
        let page_records = records.iter().skip(start).take(per_page).cloned().collect();

        Ok(PanelPage {
            page: request.page,
            pages,
            total: total as u64,
            records: page_records,
        })
    }

    async fn indicator_info(
        &self,
        code: &IndicatorCode,
    ) -> Result<Option<IndicatorInfo>, SourceError> {
        let state = self.state.lock().unwrap();
        if state.catalog_down {
            return Err(SourceError::Network("catalog unreachable".to_string()));
        }
        Ok(state.known.contains(code.as_str()).then(|| IndicatorInfo {
            code: code.clone(),
            name: format!("Indicator {}", code),
            source: "fake".to_string(),
        }))
    }
}

/// Literature provider returning fixed articles.
pub struct FakeLiterature {
    pub provider: LiteratureProvider,
    pub articles: Vec<Article>,
    pub fail: bool,
    pub queries: Mutex<Vec<String>>,
}

impl FakeLiterature {
    pub fn new(provider: LiteratureProvider, articles: Vec<Article>) -> Self {
        Self {
            provider,
            articles,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(provider: LiteratureProvider) -> Self {
        Self {
            fail: true,
            ..Self::new(provider, Vec::new())
        }
    }
}

#[async_trait]
impl LiteratureSource for FakeLiterature {
    fn provider(&self) -> LiteratureProvider {
        self.provider
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Article>, SourceError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(SourceError::Api(503, "unavailable".to_string()));
        }
        Ok(self.articles.iter().take(max_results).cloned().collect())
    }
}

/// Article with the fields tests care about.
pub fn article(title: &str, doi: Option<&str>, citations: u64, source: LiteratureProvider) -> Article {
    Article {
        title: title.to_string(),
        authors: vec!["A. Author".to_string()],
        year: 2018,
        venue: "Journal".to_string(),
        external_id: doi.map(str::to_string),
        pmid: None,
        citation_count: citations,
        abstract_text: String::new(),
        source,
    }
}
