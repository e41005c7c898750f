//! Hypothesis planning.
//!
//! Turns the free-text hypothesis into a `HypothesisPlan` via the
//! text-generation service, then applies the deterministic guards: required
//! fields, tautology repair, default controls and catalog validation.

use crate::config::DataConfig;
use crate::error::{EmpiricaError, Result};
use crate::indicators::{
    select_fallback, tautology_reason, FallbackRule, IndicatorValidator, FALLBACK_RULES,
};
use crate::llm::{generate_json, TextGenerator};
use crate::models::{ControlVar, HypothesisPlan, IndicatorCode, LiteratureQueries};
use crate::pipeline::Stage;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Controls added when the plan names fewer than two.
pub const DEFAULT_CONTROLS: &[(&str, &str, &str)] = &[
    ("NY.GDP.PCAP.PP.KD", "GDP per capita (PPP)", "Income level confounder"),
    ("SE.SEC.ENRR", "Secondary school enrollment", "Education confounder"),
    ("SP.URB.TOTL.IN.ZS", "Urban population (%)", "Urbanization confounder"),
    ("SP.POP.GROW", "Population growth (%)", "Demographic confounder"),
];

const MIN_CONTROLS: usize = 2;
const FILLED_CONTROLS: usize = 3;

const PLANNER_SYSTEM: &str = r#"You are a research methodology expert. Given a hypothesis, pick World Bank indicators.

CRITICAL RULES:
1. X and Y MUST be from DIFFERENT domains (e.g., health spending -> life expectancy, NOT GDP growth -> GDP per capita growth)
2. NEVER pick two GDP indicators, two health indicators, or two education indicators as X and Y
3. The relationship must be causal and interesting, not an accounting identity
4. Pick 2-4 control variables that are CONFOUNDERS (affect both X and Y)

World Bank indicators:
ECONOMIC:
- NY.GDP.PCAP.PP.KD = GDP per capita (PPP, constant 2017 $)
- NY.GDP.PCAP.KD.ZG = GDP per capita growth (annual %)
- FP.CPI.TOTL.ZG = Inflation (annual %)
- SL.UEM.TOTL.ZS = Unemployment (%)

EDUCATION:
- SE.XPD.TOTL.GD.ZS = Education expenditure (% of GDP)
- SE.SEC.ENRR = Secondary school enrollment (% gross)
- SE.TER.ENRR = Tertiary enrollment (% gross)

HEALTH:
- SH.XPD.CHEX.GD.ZS = Health expenditure (% of GDP)
- SP.DYN.LE00.IN = Life expectancy (years)
- SP.DYN.IMRT.IN = Infant mortality rate (per 1,000)
- SH.MED.PHYS.ZS = Physicians (per 1,000 people)

INFRASTRUCTURE & GOVERNANCE:
- IT.NET.USER.ZS = Internet users (% of population)
- EG.ELC.ACCS.ZS = Access to electricity (%)
- SP.URB.TOTL.IN.ZS = Urban population (%)
- GE.EST = Government effectiveness

INEQUALITY:
- SI.POV.GINI = Gini index
- SP.POP.GROW = Population growth (%)

Return JSON:
{
    "title": "Academic paper title (specific, not generic)",
    "statement": "Cleaned hypothesis",
    "independent_var": "World Bank indicator code for X (the CAUSE)",
    "dependent_var": "World Bank indicator code for Y (the EFFECT)",
    "x_label": "Human-readable label for X",
    "y_label": "Human-readable label for Y",
    "control_vars": [
        {"code": "indicator code", "label": "label", "rationale": "why"}
    ],
    "start_year": 2000,
    "end_year": 2023,
    "pubmed_query": "search query for PubMed",
    "semantic_scholar_query": "search query for Semantic Scholar",
    "reasoning": "explanation"
}"#;

/// Builds and repairs research plans.
pub struct Planner {
    generator: Arc<dyn TextGenerator>,
    validator: Option<IndicatorValidator>,
    rules: &'static [FallbackRule],
    default_years: (i32, i32),
}

impl Planner {
    pub fn new(generator: Arc<dyn TextGenerator>, data: &DataConfig) -> Self {
        Self {
            generator,
            validator: None,
            rules: FALLBACK_RULES,
            default_years: (data.default_start_year, data.default_end_year),
        }
    }

    /// Run catalog validation after the guards.
    pub fn with_validator(mut self, validator: IndicatorValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Replace the keyword fallback table.
    pub fn with_rules(mut self, rules: &'static [FallbackRule]) -> Self {
        self.rules = rules;
        self
    }

    /// Produce the plan for `hypothesis`.
    pub async fn plan(&self, hypothesis: &str) -> Result<HypothesisPlan> {
        info!("Parsing hypothesis");

        let user = format!(
            "Hypothesis: \"{}\"\n\nPick the CORRECT X and Y indicators. X must be the CAUSE, Y must be the EFFECT.",
            hypothesis
        );
        let value = generate_json(self.generator.as_ref(), PLANNER_SYSTEM, &user)
            .await
            .map_err(|e| EmpiricaError::generation(Stage::Planning, e))?;

        let mut plan = parse_plan(&value, hypothesis, self.default_years)?;

        repair_tautology(&mut plan, hypothesis, self.rules);

        if let Some(ref validator) = self.validator {
            plan = validator.fix_plan(plan).await;
        }

        plan.dedupe_controls();
        ensure_controls(&mut plan);

        info!("Title: {}", plan.display_title());
        info!("X: {} ({})", plan.x_label, plan.independent_var);
        info!("Y: {} ({})", plan.y_label, plan.dependent_var);
        info!(
            "Controls: {}",
            plan.control_vars
                .iter()
                .map(|c| c.label.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        info!("Years: {}-{}", plan.start_year, plan.end_year);

        Ok(plan)
    }
}

/// Build a plan from the model's JSON answer.
///
/// Only the two indicator codes are required; every other field has a
/// fallback derived from the hypothesis or the defaults.
pub fn parse_plan(
    value: &Value,
    hypothesis: &str,
    default_years: (i32, i32),
) -> Result<HypothesisPlan> {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);

    let independent_var = required_code(obj, "independent_var")?;
    let dependent_var = required_code(obj, "dependent_var")?;

    let statement = text(obj, "statement").unwrap_or_else(|| hypothesis.trim().to_string());
    let x_label = text(obj, "x_label").unwrap_or_else(|| independent_var.to_string());
    let y_label = text(obj, "y_label").unwrap_or_else(|| dependent_var.to_string());

    let mut start_year = year(obj, "start_year").unwrap_or(default_years.0);
    let mut end_year = year(obj, "end_year").unwrap_or(default_years.1);
    if start_year > end_year {
        warn!("Start year {} after end year {}, swapping", start_year, end_year);
        std::mem::swap(&mut start_year, &mut end_year);
    }

    let control_vars = obj
        .get("control_vars")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_control).collect())
        .unwrap_or_default();

    let queries = LiteratureQueries {
        semantic_scholar: text(obj, "semantic_scholar_query").unwrap_or_else(|| statement.clone()),
        pubmed: text(obj, "pubmed_query").unwrap_or_else(|| statement.clone()),
    };

    let mut plan = HypothesisPlan {
        title: text(obj, "title").unwrap_or_default(),
        statement,
        independent_var,
        dependent_var,
        x_label,
        y_label,
        control_vars,
        start_year,
        end_year,
        queries,
        reasoning: text(obj, "reasoning").unwrap_or_default(),
    };
    plan.dedupe_controls();
    Ok(plan)
}

/// Swap a tautological pair for the first matching fallback pair.
///
/// Returns whether the pair was replaced. Without a matching rule the pair
/// is kept and a warning logged.
pub fn repair_tautology(plan: &mut HypothesisPlan, hypothesis: &str, rules: &[FallbackRule]) -> bool {
    let reason = match tautology_reason(&plan.independent_var, &plan.dependent_var) {
        Some(reason) => reason,
        None => return false,
    };

    warn!(
        "Tautology detected: {} -> {} ({})",
        plan.independent_var, plan.dependent_var, reason
    );

    match select_fallback(rules, hypothesis) {
        Some(pair) => {
            plan.independent_var = pair.independent;
            plan.dependent_var = pair.dependent;
            plan.x_label = pair.x_label;
            plan.y_label = pair.y_label;
            plan.dedupe_controls();
            info!("Corrected to: {} -> {}", plan.x_label, plan.y_label);
            true
        }
        None => {
            warn!("No fallback rule matches the hypothesis, keeping the tautological pair");
            false
        }
    }
}

/// Top up the controls from `DEFAULT_CONTROLS` when fewer than two remain.
pub fn ensure_controls(plan: &mut HypothesisPlan) {
    if plan.control_vars.len() >= MIN_CONTROLS {
        return;
    }

    for (code, label, rationale) in DEFAULT_CONTROLS {
        if plan.control_vars.len() >= FILLED_CONTROLS {
            break;
        }
        let code = IndicatorCode::new(*code);
        if code == plan.independent_var
            || code == plan.dependent_var
            || plan.control_vars.iter().any(|c| c.code == code)
        {
            continue;
        }
        plan.control_vars.push(ControlVar {
            code,
            label: label.to_string(),
            rationale: rationale.to_string(),
        });
    }
}

fn required_code(obj: &Map<String, Value>, field: &'static str) -> Result<IndicatorCode> {
    text(obj, field)
        .map(IndicatorCode::new)
        .ok_or(EmpiricaError::MissingField(field))
}

fn text(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn year(obj: &Map<String, Value>, field: &str) -> Option<i32> {
    let value = obj.get(field)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .and_then(|y| i32::try_from(y).ok())
}

fn parse_control(item: &Value) -> Option<ControlVar> {
    if let Some(code) = item.as_str().map(str::trim).filter(|s| !s.is_empty()) {
        return Some(ControlVar::new(code, code, ""));
    }

    let obj = item.as_object()?;
    let code = text(obj, "code")?;
    Some(ControlVar {
        label: text(obj, "label").unwrap_or_else(|| code.clone()),
        rationale: text(obj, "rationale").unwrap_or_default(),
        code: IndicatorCode::new(code),
    })
}
