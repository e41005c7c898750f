//! Data quality review.
//!
//! Summarizes the merged panel and asks the text-generation service for a
//! cleaning directive. Nothing is modified here.

use crate::error::{EmpiricaError, Result};
use crate::llm::{generate_json, GenerateJsonError, TextGenerator};
use crate::models::{HypothesisPlan, Panel};
use crate::pipeline::Stage;
use crate::stats::descriptive::{mean, round_to, sample_std};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const REVIEW_SYSTEM: &str = r#"You are a data quality analyst. Review this dataset and recommend cleaning.
Return JSON:
{
    "assessment": "brief quality assessment",
    "winsorize": true/false,
    "winsorize_percentile": 1 or 5,
    "exclude_zeros_x": true/false,
    "exclude_zeros_y": true/false,
    "min_observations_per_country": 3 or 5,
    "exclude_countries": [],
    "warnings": []
}"#;

/// Descriptive statistics of one panel column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub missing_pct: f64,
    pub zeros_pct: f64,
}

/// What the reviewer is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSummary {
    pub rows: usize,
    pub countries: usize,
    pub years: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_stats: Option<VariableStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_stats: Option<VariableStats>,
    /// Share of rows missing each control, in percent.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub control_missing_pct: BTreeMap<String, f64>,
}

/// Cleaning steps proposed by the reviewer.
///
/// Every field has a default, so a partial answer still yields a usable
/// directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningDirective {
    #[serde(default)]
    pub assessment: String,
    #[serde(default)]
    pub winsorize: bool,
    #[serde(default = "default_percentile", deserialize_with = "lenient_percentile")]
    pub winsorize_percentile: f64,
    #[serde(default)]
    pub exclude_zeros_x: bool,
    #[serde(default)]
    pub exclude_zeros_y: bool,
    #[serde(default = "default_min_obs", deserialize_with = "lenient_count")]
    pub min_observations_per_country: usize,
    #[serde(default)]
    pub exclude_countries: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Default for CleaningDirective {
    fn default() -> Self {
        Self {
            assessment: String::new(),
            winsorize: false,
            winsorize_percentile: default_percentile(),
            exclude_zeros_x: false,
            exclude_zeros_y: false,
            min_observations_per_country: default_min_obs(),
            exclude_countries: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

fn default_percentile() -> f64 {
    1.0
}

fn default_min_obs() -> usize {
    3
}

fn lenient_percentile<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().trim_end_matches('%').parse().ok()))
        .ok_or_else(|| D::Error::custom(format!("invalid percentile: {}", value)))
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<usize, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .map(|n| n as usize)
        .ok_or_else(|| D::Error::custom(format!("invalid count: {}", value)))
}

impl CleaningDirective {
    /// Read a directive from the reviewer's answer, falling back to the
    /// default when the answer does not fit.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value(value) {
            Ok(directive) => directive,
            Err(e) => {
                warn!("Unusable cleaning directive, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Winsorizing tail as a fraction, kept strictly inside (0, 0.5).
    pub fn tail_fraction(&self) -> f64 {
        let pct = if self.winsorize_percentile.is_finite() {
            self.winsorize_percentile
        } else {
            default_percentile()
        };
        pct.clamp(0.01, 49.99) / 100.0
    }
}

/// Review outcome: the summary shown and the directive received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub summary: DataSummary,
    pub directive: CleaningDirective,
}

/// Describe the panel the way the reviewer sees it.
pub fn summarize(panel: &Panel) -> DataSummary {
    let xs: Vec<f64> = panel.rows.iter().map(|r| r.x).collect();
    let ys: Vec<f64> = panel.rows.iter().map(|r| r.y).collect();

    let control_missing_pct = panel
        .control_columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let missing = panel
                .rows
                .iter()
                .filter(|r| r.controls.get(i).copied().flatten().is_none())
                .count();
            (name.clone(), percent(missing, panel.len()))
        })
        .collect();

    DataSummary {
        rows: panel.len(),
        countries: panel.country_count(),
        years: panel
            .year_span()
            .map(|(lo, hi)| format!("{}-{}", lo, hi))
            .unwrap_or_else(|| "N/A".to_string()),
        x_stats: variable_stats(&xs),
        y_stats: variable_stats(&ys),
        control_missing_pct,
    }
}

fn variable_stats(values: &[f64]) -> Option<VariableStats> {
    let present: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let m = mean(&present)?;
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let zeros = present.iter().filter(|v| **v == 0.0).count();

    Some(VariableStats {
        mean: round_to(m, 4),
        std: round_to(sample_std(&present).unwrap_or(0.0), 4),
        min: round_to(min, 4),
        max: round_to(max, 4),
        missing_pct: percent(values.len() - present.len(), values.len()),
        zeros_pct: percent(zeros, values.len()),
    })
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_to(part as f64 / whole as f64 * 100.0, 2)
    }
}

/// Asks the text-generation service how to clean a panel.
pub struct DataReviewer {
    generator: Arc<dyn TextGenerator>,
}

impl DataReviewer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Summarize `panel` and obtain a directive.
    ///
    /// Transport failures are fatal. An answer without a usable JSON object
    /// yields the default directive.
    pub async fn review(&self, panel: &Panel, plan: &HypothesisPlan) -> Result<Review> {
        info!("Reviewing data quality");

        let summary = summarize(panel);
        let summary_json = serde_json::to_string_pretty(&summary)
            .map_err(|e| EmpiricaError::Analysis(format!("cannot encode data summary: {}", e)))?;
        let user = format!("Hypothesis: {}\n\n{}", plan.statement, summary_json);

        let directive = match generate_json(self.generator.as_ref(), REVIEW_SYSTEM, &user).await {
            Ok(value) => CleaningDirective::from_value(value),
            Err(GenerateJsonError::Json(e)) => {
                warn!("Reviewer answer unreadable, using default directive: {}", e);
                CleaningDirective::default()
            }
            Err(e) => return Err(EmpiricaError::generation(Stage::Reviewing, e)),
        };

        if !directive.assessment.is_empty() {
            info!("Assessment: {}", directive.assessment);
        }
        for w in &directive.warnings {
            warn!("Reviewer: {}", w);
        }

        Ok(Review { summary, directive })
    }
}
