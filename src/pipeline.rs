//! The research pipeline.
//!
//! Stages run strictly in order: plan, fetch, literature, review, clean,
//! analyse. Each stage's output is the next stage's input, so nothing here
//! runs concurrently.

use crate::config::Config;
use crate::data::{
    merge_panel, MergedPanel, PanelFetcher, RetryPolicy, Sleeper, TokioSleeper, WorldBankClient,
};
use crate::error::{EmpiricaError, Result, SeriesRole};
use crate::indicators::IndicatorValidator;
use crate::literature::{LiteratureSearcher, PubMedClient, SemanticScholarClient};
use crate::llm::{AnthropicClient, TextGenerator};
use crate::models::{Article, ControlVar, HypothesisPlan};
use crate::planner::Planner;
use crate::review::{apply_cleaning, CleaningDirective, CleaningReport, DataReviewer, DataSummary};
use crate::stats::{run_all, ModelResults, ResultBundle, MIN_OBSERVATIONS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// A step of the pipeline, reported to the caller as it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Planning,
    Fetching,
    Literature,
    Reviewing,
    Cleaning,
    Analysis,
}

impl Stage {
    /// Short progress message for the stage.
    pub fn describe(&self) -> &'static str {
        match self {
            Stage::Planning => "Planning research design",
            Stage::Fetching => "Fetching panel data",
            Stage::Literature => "Searching literature",
            Stage::Reviewing => "Reviewing data quality",
            Stage::Cleaning => "Cleaning panel",
            Stage::Analysis => "Running statistical models",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Planning => "planning",
            Stage::Fetching => "fetching",
            Stage::Literature => "literature",
            Stage::Reviewing => "reviewing",
            Stage::Cleaning => "cleaning",
            Stage::Analysis => "analysis",
        };
        f.write_str(name)
    }
}

/// Everything a finished run hands to the output sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub hypothesis: String,
    pub plan: HypothesisPlan,
    /// Controls that had data and were merged into the panel.
    pub controls_fetched: Vec<ControlVar>,
    pub data_summary: DataSummary,
    pub directive: CleaningDirective,
    pub cleaning: CleaningReport,
    pub results: ModelResults,
    pub literature: Vec<Article>,
    pub generated_at: DateTime<Utc>,
}

/// Owns the collaborators of one run.
pub struct Pipeline {
    fetcher: Arc<PanelFetcher>,
    planner: Planner,
    reviewer: DataReviewer,
    literature: Option<LiteratureSearcher>,
    min_rows: usize,
}

impl Pipeline {
    /// Assemble a pipeline around `generator` and `fetcher`.
    ///
    /// The planner validates indicators against the same provider the
    /// fetcher reads from. Literature search is off until
    /// `with_literature` is called.
    pub fn new(generator: Arc<dyn TextGenerator>, fetcher: Arc<PanelFetcher>, config: &Config) -> Self {
        let validator = IndicatorValidator::new(
            fetcher.clone(),
            generator.clone(),
            config.data.min_coverage,
        );
        let planner = Planner::new(generator.clone(), &config.data).with_validator(validator);

        Self {
            fetcher,
            planner,
            reviewer: DataReviewer::new(generator),
            literature: None,
            min_rows: config.cleaning.min_rows,
        }
    }

    /// Build the pipeline with the HTTP clients named in `config`.
    ///
    /// Fails before any stage runs when the API key is missing or a client
    /// cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let generator: Arc<dyn TextGenerator> = Arc::new(
            AnthropicClient::new(&config.llm).map_err(|e| EmpiricaError::llm(Stage::Planning, e))?,
        );

        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let retry = RetryPolicy::from(&config.retry);
        let source = WorldBankClient::new(&config.data)
            .map_err(|e| EmpiricaError::Config(format!("cannot build data client: {}", e)))?;
        let fetcher = Arc::new(PanelFetcher::new(
            Arc::new(source),
            retry,
            sleeper.clone(),
            config.data.per_page,
        ));

        let mut pipeline = Self::new(generator, fetcher, config);

        if config.literature.enabled {
            let semantic_scholar =
                SemanticScholarClient::new(&config.literature, retry, sleeper.clone()).map_err(
                    |e| EmpiricaError::Config(format!("cannot build literature client: {}", e)),
                )?;
            let pubmed = PubMedClient::new(&config.literature)
                .map_err(|e| EmpiricaError::Config(format!("cannot build literature client: {}", e)))?;
            pipeline = pipeline.with_literature(LiteratureSearcher::new(
                Arc::new(semantic_scholar),
                Arc::new(pubmed),
                sleeper,
                config.literature.semantic_scholar_max,
                config.literature.pubmed_max,
            ));
        }

        Ok(pipeline)
    }

    pub fn with_literature(mut self, searcher: LiteratureSearcher) -> Self {
        self.literature = Some(searcher);
        self
    }

    /// Run every stage for `hypothesis`, calling `on_stage` as each starts.
    pub async fn run_empirica<F>(&self, hypothesis: &str, mut on_stage: F) -> Result<RunOutcome>
    where
        F: FnMut(Stage),
    {
        on_stage(Stage::Planning);
        let plan = self.planner.plan(hypothesis).await?;

        on_stage(Stage::Fetching);
        let MergedPanel {
            panel,
            controls_fetched,
        } = self.fetch_panel(&plan).await?;

        let literature = match self.literature {
            Some(ref searcher) => {
                on_stage(Stage::Literature);
                searcher.search(&plan.queries).await
            }
            None => Vec::new(),
        };

        on_stage(Stage::Reviewing);
        let review = self.reviewer.review(&panel, &plan).await?;

        on_stage(Stage::Cleaning);
        let (panel, cleaning) = apply_cleaning(panel, &review.directive);
        if panel.len() < self.min_rows {
            return Err(EmpiricaError::InsufficientData {
                stage: Stage::Cleaning,
                rows: panel.len(),
                required: self.min_rows,
            });
        }

        on_stage(Stage::Analysis);
        let results = match run_all(&panel, &plan) {
            ResultBundle::Complete(models) => *models,
            ResultBundle::Insufficient { valid_rows, .. } => {
                return Err(EmpiricaError::InsufficientData {
                    stage: Stage::Analysis,
                    rows: valid_rows,
                    required: MIN_OBSERVATIONS,
                });
            }
        };

        info!("Pipeline complete: {} rows analysed", panel.len());

        Ok(RunOutcome {
            hypothesis: hypothesis.to_string(),
            plan,
            controls_fetched,
            data_summary: review.summary,
            directive: review.directive,
            cleaning,
            results,
            literature,
            generated_at: Utc::now(),
        })
    }

    async fn fetch_panel(&self, plan: &HypothesisPlan) -> Result<MergedPanel> {
        let (start, end) = (plan.start_year, plan.end_year);

        let x = self.fetcher.fetch(&plan.independent_var, start, end).await;
        if x.is_empty() {
            return Err(EmpiricaError::EmptySeries {
                role: SeriesRole::Independent,
                indicator: plan.independent_var.to_string(),
                start_year: start,
                end_year: end,
            });
        }

        let y = self.fetcher.fetch(&plan.dependent_var, start, end).await;
        if y.is_empty() {
            return Err(EmpiricaError::EmptySeries {
                role: SeriesRole::Dependent,
                indicator: plan.dependent_var.to_string(),
                start_year: start,
                end_year: end,
            });
        }

        let mut controls = Vec::with_capacity(plan.control_vars.len());
        for control in &plan.control_vars {
            let series = self.fetcher.fetch(&control.code, start, end).await;
            if series.is_empty() {
                warn!(indicator = %control.code, "No data for control, leaving it out");
            }
            controls.push((control.clone(), series));
        }

        let merged = merge_panel(&x, &y, &controls);
        info!(
            "Merged panel: {} rows, {} countries",
            merged.panel.len(),
            merged.panel.country_count()
        );
        Ok(merged)
    }
}

/// Run the whole pipeline with the real clients configured in `config`.
pub async fn run_empirica<F>(hypothesis: &str, config: &Config, on_stage: F) -> Result<RunOutcome>
where
    F: FnMut(Stage),
{
    Pipeline::from_config(config)?
        .run_empirica(hypothesis, on_stage)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LiteratureProvider;
    use crate::testing::{article, FakeLiterature, FakePanelSource, RecordingSleeper, ScriptedGenerator};
    use std::time::Duration;

    const HEALTH: &str = "Higher government healthcare spending leads to longer life expectancy";
    const X: &str = "SH.XPD.CHEX.GD.ZS";
    const Y: &str = "SP.DYN.LE00.IN";
    const GDP: &str = "NY.GDP.PCAP.PP.KD";
    const URBAN: &str = "SP.URB.TOTL.IN.ZS";
    const COUNTRIES: [&str; 6] = ["KEN", "PER", "CHL", "IND", "FRA", "JPN"];

    const PLAN_ANSWER: &str = r#"{
        "title": "Health Spending and Longevity",
        "independent_var": "SH.XPD.CHEX.GD.ZS",
        "dependent_var": "SP.DYN.LE00.IN",
        "x_label": "Health expenditure (% of GDP)",
        "y_label": "Life expectancy (years)",
        "control_vars": [
            {"code": "NY.GDP.PCAP.PP.KD", "label": "GDP per capita"},
            {"code": "SP.URB.TOTL.IN.ZS", "label": "Urban population"}
        ],
        "start_year": 2015,
        "end_year": 2019,
        "semantic_scholar_query": "health expenditure life expectancy",
        "pubmed_query": "health spending longevity"
    }"#;

    const REVIEW_ANSWER: &str = r#"{"assessment": "fine", "winsorize": false, "min_observations_per_country": 3}"#;

    type Rows = Vec<(&'static str, i32, f64)>;

    fn health_series() -> (Rows, Rows, Rows) {
        let (mut x, mut y, mut gdp) = (Vec::new(), Vec::new(), Vec::new());
        for (c, country) in COUNTRIES.iter().enumerate() {
            for t in 0..5 {
                let spend = 3.0 + c as f64 + 0.2 * t as f64;
                let noise = ((c * 7 + t as usize * 3) % 5) as f64 * 0.1;
                x.push((*country, 2015 + t, spend));
                y.push((*country, 2015 + t, 60.0 + 2.5 * spend + noise));
                gdp.push((*country, 2015 + t, 5000.0 + 900.0 * c as f64 + 37.0 * (t * t) as f64));
            }
        }
        (x, y, gdp)
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.data.min_coverage = 10;
        config
    }

    fn pipeline(source: FakePanelSource, answers: Vec<&str>) -> (Pipeline, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator::new(answers));
        let retry = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        };
        let fetcher = Arc::new(PanelFetcher::new(
            Arc::new(source),
            retry,
            Arc::new(RecordingSleeper::default()),
            50,
        ));
        (Pipeline::new(generator.clone(), fetcher, &config()), generator)
    }

    fn healthy_source() -> FakePanelSource {
        let (x, y, gdp) = health_series();
        FakePanelSource::new()
            .with_observations(X, &x)
            .with_observations(Y, &y)
            .with_observations(GDP, &gdp)
    }

    #[tokio::test]
    async fn test_health_hypothesis_end_to_end() {
        let source = healthy_source();
        let (pipeline, generator) = pipeline(source.clone(), vec![PLAN_ANSWER, REVIEW_ANSWER]);
        let searcher = LiteratureSearcher::new(
            Arc::new(FakeLiterature::new(
                LiteratureProvider::SemanticScholar,
                vec![article("Spending and health", Some("10.1/a"), 40, LiteratureProvider::SemanticScholar)],
            )),
            Arc::new(FakeLiterature::new(
                LiteratureProvider::PubMed,
                vec![article("Longevity", Some("10.1/b"), 3, LiteratureProvider::PubMed)],
            )),
            Arc::new(RecordingSleeper::default()),
            8,
            5,
        );
        let pipeline = pipeline.with_literature(searcher);

        let mut stages = Vec::new();
        let outcome = pipeline.run_empirica(HEALTH, |s| stages.push(s)).await.unwrap();

        assert_eq!(
            stages,
            vec![
                Stage::Planning,
                Stage::Fetching,
                Stage::Literature,
                Stage::Reviewing,
                Stage::Cleaning,
                Stage::Analysis
            ]
        );
        assert_eq!(outcome.plan.independent_var.as_str(), X);
        assert_eq!(outcome.plan.dependent_var.as_str(), Y);
        assert_eq!(generator.calls().len(), 2);

        let fetched: Vec<_> = outcome.controls_fetched.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(fetched, vec![GDP]);
        assert!(source.requested_indicators().contains(&URBAN.to_string()));

        assert_eq!(outcome.cleaning.rows_before, 30);
        assert_eq!(outcome.cleaning.rows_after, 30);
        let ols = outcome.results.ols.fitted().unwrap();
        assert!(ols.coefficient > 2.0 && ols.coefficient < 3.0);
        assert_eq!(ols.n_obs, 30);
        assert!(outcome.results.fixed_effects.is_some());
        assert_eq!(outcome.literature.len(), 2);
        assert_eq!(outcome.literature[0].citation_count, 40);
    }

    #[tokio::test]
    async fn test_empty_dependent_series_is_fatal() {
        let (x, _, _) = health_series();
        let source = FakePanelSource::new().with_observations(X, &x).with_known(Y);
        let (pipeline, generator) = pipeline(source, vec![PLAN_ANSWER, REVIEW_ANSWER]);

        let err = pipeline.run_empirica(HEALTH, |_| {}).await.unwrap_err();

        match err {
            EmpiricaError::EmptySeries { role, indicator, .. } => {
                assert_eq!(role, SeriesRole::Dependent);
                assert_eq!(indicator, Y);
            }
            other => panic!("unexpected error: {}", other),
        }
        // The reviewer is never asked.
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_too_few_rows_after_cleaning() {
        let review = r#"{"exclude_countries": ["KEN", "PER", "CHL", "IND", "FRA"]}"#;
        let (pipeline, _) = pipeline(healthy_source(), vec![PLAN_ANSWER, review]);

        let mut stages = Vec::new();
        let err = pipeline.run_empirica(HEALTH, |s| stages.push(s)).await.unwrap_err();

        assert!(matches!(
            err,
            EmpiricaError::InsufficientData {
                stage: Stage::Cleaning,
                rows: 5,
                required: 10,
            }
        ));
        assert_eq!(stages.last(), Some(&Stage::Cleaning));
    }

    #[tokio::test]
    async fn test_missing_planner_field_stops_before_fetching() {
        let source = healthy_source();
        let (pipeline, _) = pipeline(source.clone(), vec![r#"{"independent_var": "SH.XPD.CHEX.GD.ZS"}"#]);

        let err = pipeline.run_empirica(HEALTH, |_| {}).await.unwrap_err();

        assert!(matches!(err, EmpiricaError::MissingField("dependent_var")));
        assert!(source.requested_indicators().is_empty());
    }

    #[test]
    fn test_stage_display_is_lowercase() {
        assert_eq!(Stage::Reviewing.to_string(), "reviewing");
        assert_eq!(
            serde_json::to_string(&Stage::Analysis).unwrap(),
            "\"analysis\""
        );
    }

    #[test]
    fn test_missing_api_key_fails_before_any_stage() {
        let err = match Pipeline::from_config(&Config::default()) {
            Ok(_) => panic!("pipeline built without a key"),
            Err(e) => e,
        };
        assert!(matches!(err, EmpiricaError::Config(_)));
    }
}
