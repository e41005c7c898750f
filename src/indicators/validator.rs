//! Catalog and density checks for the planned indicators.
//!
//! The validator confirms that both regression variables exist in the
//! provider's catalog and carry enough observations in the plan's year
//! range. Missing codes are replaced by a model suggestion; sparse codes are
//! replaced only by a suggestion that is measurably denser.

use crate::data::fetcher::PanelFetcher;
use crate::data::source::IndicatorInfo;
use crate::error::SeriesRole;
use crate::indicators::tautology::is_tautology;
use crate::llm::{generate_json, TextGenerator};
use crate::models::{HypothesisPlan, IndicatorCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const REPLACEMENT_SYSTEM: &str = "You are a World Bank data expert. \
Suggest one replacement World Bank indicator code. \
Return JSON only: {\"code\": \"indicator code\", \"label\": \"human-readable label\"}";

/// Result of a catalog lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Existence {
    Found(IndicatorInfo),
    Missing,
    /// The lookup itself failed; nothing is known about the code.
    Unknown,
}

#[derive(Debug, Deserialize)]
struct Suggestion {
    code: String,
    #[serde(default)]
    label: String,
}

/// Checks and corrects the indicator pair of a plan.
pub struct IndicatorValidator {
    fetcher: Arc<PanelFetcher>,
    generator: Arc<dyn TextGenerator>,
    min_coverage: u64,
}

impl IndicatorValidator {
    pub fn new(
        fetcher: Arc<PanelFetcher>,
        generator: Arc<dyn TextGenerator>,
        min_coverage: u64,
    ) -> Self {
        Self {
            fetcher,
            generator,
            min_coverage,
        }
    }

    /// Catalog entry for `code`, or `None` when it is unknown or the lookup failed.
    pub async fn validate(&self, code: &IndicatorCode) -> Option<IndicatorInfo> {
        match self.probe(code).await {
            Existence::Found(info) => Some(info),
            Existence::Missing | Existence::Unknown => None,
        }
    }

    /// Raw observation count in the range; 0 when the probe fails.
    pub async fn data_coverage(&self, code: &IndicatorCode, start_year: i32, end_year: i32) -> u64 {
        match self.fetcher.coverage(code, start_year, end_year).await {
            Ok(total) => {
                debug!(indicator = %code, total, "Coverage probe");
                total
            }
            Err(e) => {
                warn!(indicator = %code, "Coverage probe failed: {}", e);
                0
            }
        }
    }

    /// Check both regression variables and replace the ones that fail.
    pub async fn fix_plan(&self, mut plan: HypothesisPlan) -> HypothesisPlan {
        for role in [SeriesRole::Independent, SeriesRole::Dependent] {
            self.fix_role(&mut plan, role).await;
        }
        plan
    }

    async fn probe(&self, code: &IndicatorCode) -> Existence {
        match self.fetcher.source().indicator_info(code).await {
            Ok(Some(info)) => Existence::Found(info),
            Ok(None) => Existence::Missing,
            Err(e) => {
                warn!(indicator = %code, "Catalog lookup failed, keeping code: {}", e);
                Existence::Unknown
            }
        }
    }

    async fn fix_role(&self, plan: &mut HypothesisPlan, role: SeriesRole) {
        let (code, label, other) = match role {
            SeriesRole::Independent => (
                plan.independent_var.clone(),
                plan.x_label.clone(),
                plan.dependent_var.clone(),
            ),
            SeriesRole::Dependent => (
                plan.dependent_var.clone(),
                plan.y_label.clone(),
                plan.independent_var.clone(),
            ),
        };
        let (start, end) = (plan.start_year, plan.end_year);

        match self.probe(&code).await {
            Existence::Unknown => {}
            Existence::Missing => {
                warn!(indicator = %code, "Indicator not found in catalog, asking for a replacement");
                let problem = "does not exist in the World Bank catalog";
                if let Some(s) = self.suggest(&code, &label, &other, problem, start, end).await {
                    info!("Replaced {} {} with {}", role, code, s.code);
                    apply(plan, role, s);
                }
            }
            Existence::Found(_) => {
                let coverage = self.data_coverage(&code, start, end).await;
                if coverage >= self.min_coverage {
                    debug!(indicator = %code, coverage, "Coverage sufficient");
                    return;
                }

                warn!(
                    indicator = %code,
                    coverage,
                    min_coverage = self.min_coverage,
                    "Sparse indicator, asking for a denser alternative"
                );
                let problem = format!("has only {} observations", coverage);
                let suggestion = match self.suggest(&code, &label, &other, &problem, start, end).await {
                    Some(s) => s,
                    None => return,
                };

                let candidate = self.data_coverage(&suggestion.code, start, end).await;
                if candidate > coverage {
                    info!(
                        "Replaced {} {} ({} obs) with {} ({} obs)",
                        role, code, coverage, suggestion.code, candidate
                    );
                    apply(plan, role, suggestion);
                } else {
                    warn!(
                        "Suggested {} has {} obs, not more than {}; keeping {}",
                        suggestion.code, candidate, coverage, code
                    );
                }
            }
        }
    }

    /// Ask the model for a replacement, rejecting unusable answers.
    async fn suggest(
        &self,
        code: &IndicatorCode,
        label: &str,
        other: &IndicatorCode,
        problem: &str,
        start_year: i32,
        end_year: i32,
    ) -> Option<Replacement> {
        let user = format!(
            "The indicator {} ({}) {}. Suggest one alternative World Bank indicator measuring \
             the same concept with good country coverage for {}-{}. It must not come from the \
             same indicator family as {}.",
            code, label, problem, start_year, end_year, other
        );

        let value = match generate_json(self.generator.as_ref(), REPLACEMENT_SYSTEM, &user).await {
            Ok(v) => v,
            Err(e) => {
                warn!(indicator = %code, "Replacement request failed: {}", e);
                return None;
            }
        };

        let suggestion: Suggestion = match serde_json::from_value(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(indicator = %code, "Unusable replacement answer: {}", e);
                return None;
            }
        };

        let replacement = IndicatorCode::new(suggestion.code);
        if replacement.as_str().is_empty() || &replacement == code {
            warn!(indicator = %code, "Replacement is empty or unchanged");
            return None;
        }
        if is_tautology(&replacement, other) {
            warn!(
                "Rejected replacement {}: same family as {}",
                replacement, other
            );
            return None;
        }

        let label = suggestion.label.trim();
        Some(Replacement {
            label: if label.is_empty() {
                replacement.to_string()
            } else {
                label.to_string()
            },
            code: replacement,
        })
    }
}

struct Replacement {
    code: IndicatorCode,
    label: String,
}

fn apply(plan: &mut HypothesisPlan, role: SeriesRole, replacement: Replacement) {
    match role {
        SeriesRole::Independent => {
            plan.independent_var = replacement.code;
            plan.x_label = replacement.label;
        }
        SeriesRole::Dependent => {
            plan.dependent_var = replacement.code;
            plan.y_label = replacement.label;
        }
    }
    plan.dedupe_controls();
}
