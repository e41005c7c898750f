//! Data models for the research pipeline.
//!
//! This module contains the core data structures that flow between
//! stages: indicator codes, the hypothesis plan, raw observations, the
//! merged panel and literature records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a statistical series in the provider's dotted namespace
/// (e.g. `SP.DYN.LE00.IN`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorCode(String);

impl IndicatorCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dot-delimited segments of the code.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Column name used for this code when it is merged as a control.
    pub fn control_column(&self) -> String {
        format!("control_{}", self.0.replace('.', "_"))
    }
}

impl fmt::Display for IndicatorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IndicatorCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A control variable proposed for the regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlVar {
    pub code: IndicatorCode,
    pub label: String,
    #[serde(default)]
    pub rationale: String,
}

impl ControlVar {
    pub fn new(code: &str, label: &str, rationale: &str) -> Self {
        Self {
            code: IndicatorCode::new(code),
            label: label.to_string(),
            rationale: rationale.to_string(),
        }
    }
}

/// Search queries handed to the literature providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteratureQueries {
    pub semantic_scholar: String,
    pub pubmed: String,
}

/// The research plan derived from a free-text hypothesis.
///
/// Created once by the planner, possibly corrected by the indicator
/// validator, then read-only for every later stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisPlan {
    pub title: String,
    pub statement: String,
    pub independent_var: IndicatorCode,
    pub dependent_var: IndicatorCode,
    pub x_label: String,
    pub y_label: String,
    pub control_vars: Vec<ControlVar>,
    pub start_year: i32,
    pub end_year: i32,
    pub queries: LiteratureQueries,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
}

impl HypothesisPlan {
    /// Paper title, falling back to a generic one built from the labels.
    pub fn display_title(&self) -> String {
        let title = self.title.trim();
        if title.is_empty() {
            format!(
                "The Effect of {} on {}: A Cross-Country Panel Analysis",
                self.x_label, self.y_label
            )
        } else {
            title.to_string()
        }
    }

    /// Drop controls that duplicate X, Y or an earlier control.
    pub fn dedupe_controls(&mut self) {
        let mut seen = BTreeSet::new();
        let x = self.independent_var.clone();
        let y = self.dependent_var.clone();
        self.control_vars
            .retain(|c| c.code != x && c.code != y && seen.insert(c.code.clone()));
    }
}

/// One value of one indicator for one country and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Display name of the country.
    pub country: String,
    /// ISO-like country code.
    pub country_code: String,
    pub year: i32,
    pub value: f64,
}

impl Observation {
    pub fn new(country: &str, country_code: &str, year: i32, value: f64) -> Self {
        Self {
            country: country.to_string(),
            country_code: country_code.to_string(),
            year,
            value,
        }
    }
}

/// One (country, year) row of the merged panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub country: String,
    pub country_code: String,
    pub year: i32,
    pub x: f64,
    pub y: f64,
    /// Control values, aligned with `Panel::control_columns`.
    pub controls: Vec<Option<f64>>,
}

/// Tidy panel keyed by (country, year).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub control_columns: Vec<String>,
    pub rows: Vec<PanelRow>,
}

impl Panel {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of distinct countries.
    pub fn country_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.country.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// First and last year present, if any.
    pub fn year_span(&self) -> Option<(i32, i32)> {
        let min = self.rows.iter().map(|r| r.year).min()?;
        let max = self.rows.iter().map(|r| r.year).max()?;
        Some((min, max))
    }
}

/// Which literature provider a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteratureProvider {
    SemanticScholar,
    PubMed,
}

impl fmt::Display for LiteratureProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteratureProvider::SemanticScholar => write!(f, "Semantic Scholar"),
            LiteratureProvider::PubMed => write!(f, "PubMed"),
        }
    }
}

/// A published article returned by a literature provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub authors: Vec<String>,
    pub year: i32,
    pub venue: String,
    /// DOI when the provider knows one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    pub citation_count: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub abstract_text: String,
    pub source: LiteratureProvider,
}

impl Article {
    /// "First et al." for more than three authors, else the joined list.
    pub fn authors_short(&self) -> String {
        match self.authors.as_slice() {
            [first, _, _, _, ..] => format!("{} et al.", first),
            authors => authors.join(", "),
        }
    }

    /// One-line reference in author-year style.
    pub fn reference(&self) -> String {
        let mut line = format!(
            "{} ({}). {}. {}.",
            self.authors_short(),
            self.year,
            self.title,
            self.venue
        );
        if let Some(ref doi) = self.external_id {
            line.push_str(&format!(" DOI: {}", doi));
        }
        line
    }
}
