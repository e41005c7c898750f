//! Markdown, JSON and TOML output for a finished run.
//!
//! The JSON file carries the whole outcome. The Markdown summary is the
//! human-readable digest of design, data, models and references. The
//! manifest pins the series and cleaning steps a rerun needs.

use crate::models::{Article, HypothesisPlan, IndicatorCode};
use crate::pipeline::RunOutcome;
use crate::review::{CleaningDirective, CleaningReport, DataSummary, VariableStats};
use crate::stats::{stars, ModelOutcome, ModelResults};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const RESULTS_FILE: &str = "results.json";
pub const SUMMARY_FILE: &str = "summary.md";
pub const MANIFEST_FILE: &str = "reproduce.toml";

/// The choices a run made, in a form that can be checked or replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReproductionManifest {
    pub empirica_version: String,
    pub hypothesis: String,
    pub generated_at: DateTime<Utc>,
    pub variables: ManifestVariables,
    pub cleaning: CleaningDirective,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestVariables {
    pub independent: IndicatorCode,
    pub dependent: IndicatorCode,
    /// Controls that had data; requested controls without data are left out.
    pub controls: Vec<IndicatorCode>,
    pub start_year: i32,
    pub end_year: i32,
}

impl ReproductionManifest {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            empirica_version: env!("CARGO_PKG_VERSION").to_string(),
            hypothesis: outcome.hypothesis.clone(),
            generated_at: outcome.generated_at,
            variables: ManifestVariables {
                independent: outcome.plan.independent_var.clone(),
                dependent: outcome.plan.dependent_var.clone(),
                controls: outcome
                    .controls_fetched
                    .iter()
                    .map(|c| c.code.clone())
                    .collect(),
                start_year: outcome.plan.start_year,
                end_year: outcome.plan.end_year,
            },
            cleaning: outcome.directive.clone(),
        }
    }
}

/// Generate the Markdown summary of a run.
pub fn generate_markdown_summary(outcome: &RunOutcome) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", outcome.plan.display_title()));

    output.push_str(&generate_metadata_section(outcome));
    output.push_str(&generate_design_section(&outcome.plan, outcome));
    output.push_str(&generate_data_section(
        &outcome.data_summary,
        &outcome.cleaning,
        &outcome.directive,
        &outcome.plan,
    ));
    output.push_str(&generate_results_section(&outcome.results, &outcome.plan));
    output.push_str(&generate_references_section(&outcome.literature));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(outcome: &RunOutcome) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Hypothesis:** {}\n", outcome.hypothesis));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        outcome.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Period:** {}-{}\n",
        outcome.plan.start_year, outcome.plan.end_year
    ));
    section.push_str(&format!(
        "- **Sample:** {} observations, {} countries\n",
        outcome.results.descriptive.n_obs, outcome.results.descriptive.n_countries
    ));
    section.push('\n');

    section
}

fn generate_design_section(plan: &HypothesisPlan, outcome: &RunOutcome) -> String {
    let mut section = String::new();

    section.push_str("## Research Design\n\n");
    section.push_str(&format!("{}\n\n", plan.statement));
    section.push_str("| Role | Indicator | Code |\n");
    section.push_str("|:---|:---|:---|\n");
    section.push_str(&format!(
        "| Independent (X) | {} | `{}` |\n",
        plan.x_label, plan.independent_var
    ));
    section.push_str(&format!(
        "| Dependent (Y) | {} | `{}` |\n",
        plan.y_label, plan.dependent_var
    ));
    for control in &plan.control_vars {
        let merged = outcome
            .controls_fetched
            .iter()
            .any(|c| c.code == control.code);
        let note = if merged { "" } else { " (no data)" };
        section.push_str(&format!(
            "| Control | {}{} | `{}` |\n",
            control.label, note, control.code
        ));
    }
    section.push('\n');

    if !plan.reasoning.is_empty() {
        section.push_str(&format!("> {}\n\n", plan.reasoning));
    }

    section
}

fn generate_data_section(
    summary: &DataSummary,
    cleaning: &CleaningReport,
    directive: &CleaningDirective,
    plan: &HypothesisPlan,
) -> String {
    let mut section = String::new();

    section.push_str("## Data\n\n");
    section.push_str(&format!(
        "Merged panel: {} rows, {} countries, years {}.\n\n",
        summary.rows, summary.countries, summary.years
    ));

    section.push_str("| Variable | Mean | Std | Min | Max | Zeros |\n");
    section.push_str("|:---|---:|---:|---:|---:|---:|\n");
    for (label, stats) in [(&plan.x_label, &summary.x_stats), (&plan.y_label, &summary.y_stats)] {
        if let Some(stats) = stats {
            section.push_str(&stats_row(label, stats));
        }
    }
    section.push('\n');

    section.push_str("### Cleaning\n\n");
    if !directive.assessment.is_empty() {
        section.push_str(&format!("{}\n\n", directive.assessment));
    }
    if directive.winsorize {
        section.push_str(&format!(
            "- Winsorized X and Y at {:.2}% per tail\n",
            directive.tail_fraction() * 100.0
        ));
    }
    if directive.exclude_zeros_x {
        section.push_str("- Dropped rows with X = 0\n");
    }
    if directive.exclude_zeros_y {
        section.push_str("- Dropped rows with Y = 0\n");
    }
    section.push_str(&format!(
        "- Kept countries with at least {} observations\n",
        directive.min_observations_per_country
    ));
    if !directive.exclude_countries.is_empty() {
        section.push_str(&format!(
            "- Excluded: {}\n",
            directive.exclude_countries.join(", ")
        ));
    }
    section.push_str(&format!(
        "- Rows: {} -> {} ({} dropped); countries: {} -> {}\n\n",
        cleaning.rows_before,
        cleaning.rows_after,
        cleaning.rows_dropped(),
        cleaning.countries_before,
        cleaning.countries_after
    ));

    for warning in &directive.warnings {
        section.push_str(&format!("> **Warning:** {}\n\n", warning));
    }

    section
}

fn stats_row(label: &str, stats: &VariableStats) -> String {
    format!(
        "| {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.1}% |\n",
        label, stats.mean, stats.std, stats.min, stats.max, stats.zeros_pct
    )
}

fn generate_results_section(results: &ModelResults, plan: &HypothesisPlan) -> String {
    let mut section = String::new();

    section.push_str("## Results\n\n");
    section.push_str(&format!(
        "Effect of {} on {}.\n\n",
        plan.x_label, plan.y_label
    ));
    section.push_str("| Model | Coefficient | Std. Error | p-value | R² | N |\n");
    section.push_str("|:---|---:|---:|---:|---:|---:|\n");

    section.push_str(&model_row("Pooled OLS", &results.ols, |m| {
        (m.coefficient, m.std_error, m.p_value, m.r_squared, m.n_obs)
    }));
    if let Some(ref controlled) = results.ols_controls {
        section.push_str(&model_row("OLS with controls", controlled, |m| {
            (m.coefficient, m.std_error, m.p_value, m.r_squared, m.n_obs)
        }));
    }
    if let Some(ref fe) = results.fixed_effects {
        section.push_str(&model_row("Country fixed effects", fe, |m| {
            (m.coefficient, m.std_error, m.p_value, m.r_squared_within, m.n_obs)
        }));
    }
    section.push_str("\n*Significance: \\*\\*\\* p<0.001, \\*\\* p<0.01, \\* p<0.05*\n\n");

    match results.correlation {
        ModelOutcome::Fitted(ref c) => section.push_str(&format!(
            "Pearson r = {:.4} (p = {:.4}); Spearman rho = {:.4} (p = {:.4}).\n\n",
            c.pearson_r, c.pearson_p, c.spearman_r, c.spearman_p
        )),
        ModelOutcome::Failed { ref error } => {
            section.push_str(&format!("Correlation not available: {}\n\n", error))
        }
    }

    section
}

fn model_row<T, F>(name: &str, outcome: &ModelOutcome<T>, fields: F) -> String
where
    F: Fn(&T) -> (f64, f64, f64, f64, usize),
{
    match outcome {
        ModelOutcome::Fitted(model) => {
            let (coef, se, p, r2, n) = fields(model);
            format!(
                "| {} | {}{} | {} | {:.4} | {:.4} | {} |\n",
                name,
                format_estimate(coef),
                stars(p).replace('*', "\\*"),
                format_estimate(se),
                p,
                r2,
                n
            )
        }
        ModelOutcome::Failed { error } => {
            format!("| {} | failed: {} | | | | |\n", name, error.replace('|', "/"))
        }
    }
}

/// Four decimals, or scientific notation when that would print zero.
fn format_estimate(value: f64) -> String {
    if value != 0.0 && value.abs() < 1e-4 {
        format!("{:.4e}", value)
    } else {
        format!("{:.4}", value)
    }
}

fn generate_references_section(literature: &[Article]) -> String {
    if literature.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## References\n\n");
    for (i, article) in literature.iter().enumerate() {
        section.push_str(&format!(
            "{}. {} *[{}, {} citations]*\n",
            i + 1,
            article.reference(),
            article.source,
            article.citation_count
        ));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Generated by Empirica. Estimates are descriptive associations, not causal effects.*\n"
        .to_string()
}

/// Generate the JSON report.
pub fn generate_json_report(outcome: &RunOutcome) -> Result<String> {
    serde_json::to_string_pretty(outcome).map_err(Into::into)
}

/// Generate the reproduction manifest.
pub fn generate_reproduction_manifest(outcome: &RunOutcome) -> Result<String> {
    let manifest = ReproductionManifest::from_outcome(outcome);
    let body = toml::to_string_pretty(&manifest).context("Failed to serialize manifest")?;

    let mut output = String::new();
    output.push_str("# Empirica reproduction manifest\n");
    output.push_str(&format!("# Rerun with: empirica {:?}\n", outcome.hypothesis));
    output.push_str("# Series codes, period and cleaning steps chosen for this run.\n\n");
    output.push_str(&body);
    Ok(output)
}

/// Directory for a run started at `at`, below `base`.
pub fn run_directory(base: &Path, at: DateTime<Utc>) -> PathBuf {
    base.join(format!("run_{}", at.format("%Y%m%d_%H%M%S")))
}

/// Write `results.json`, `summary.md` and `reproduce.toml` into a fresh
/// run directory.
///
/// Returns the directory that was written.
pub fn write_outputs(base: &Path, outcome: &RunOutcome) -> Result<PathBuf> {
    let dir = run_directory(base, outcome.generated_at);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let json = generate_json_report(outcome)?;
    let results_path = dir.join(RESULTS_FILE);
    std::fs::write(&results_path, json)
        .with_context(|| format!("Failed to write {}", results_path.display()))?;

    let summary_path = dir.join(SUMMARY_FILE);
    std::fs::write(&summary_path, generate_markdown_summary(outcome))
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    let manifest_path = dir.join(MANIFEST_FILE);
    std::fs::write(&manifest_path, generate_reproduction_manifest(outcome)?)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    info!(
        "Wrote {}, {} and {} to {}",
        RESULTS_FILE,
        SUMMARY_FILE,
        MANIFEST_FILE,
        dir.display()
    );
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ControlVar, LiteratureProvider, LiteratureQueries, Panel, PanelRow};
    use crate::review::summarize;
    use crate::stats::run_all;
    use crate::testing::article;
    use chrono::TimeZone;

    fn create_test_outcome() -> RunOutcome {
        let mut rows = Vec::new();
        for c in 0..6 {
            for t in 0..4 {
                let x = 2.0 + c as f64 + 0.5 * t as f64;
                rows.push(PanelRow {
                    country: format!("Country {}", c),
                    country_code: format!("C{:02}", c),
                    year: 2010 + t,
                    x,
                    y: 55.0 + 3.0 * x + ((c + t as usize) % 3) as f64,
                    controls: vec![Some(1000.0 * (c + 1) as f64 + (t * t) as f64)],
                });
            }
        }
        let panel = Panel {
            control_columns: vec!["control_NY_GDP_PCAP_PP_KD".to_string()],
            rows,
        };
        let gdp = ControlVar::new("NY.GDP.PCAP.PP.KD", "GDP per capita", "income");
        let plan = HypothesisPlan {
            title: "Health Spending and Longevity".to_string(),
            statement: "Higher health spending increases life expectancy".to_string(),
            independent_var: "SH.XPD.CHEX.GD.ZS".into(),
            dependent_var: "SP.DYN.LE00.IN".into(),
            x_label: "Health expenditure".to_string(),
            y_label: "Life expectancy".to_string(),
            control_vars: vec![
                gdp.clone(),
                ControlVar::new("SP.URB.TOTL.IN.ZS", "Urban population", ""),
            ],
            start_year: 2010,
            end_year: 2013,
            queries: LiteratureQueries::default(),
            reasoning: String::new(),
        };
        let results = run_all(&panel, &plan).models().cloned().unwrap();

        RunOutcome {
            hypothesis: plan.statement.clone(),
            data_summary: summarize(&panel),
            directive: CleaningDirective {
                winsorize: true,
                warnings: vec!["Short panel".to_string()],
                ..CleaningDirective::default()
            },
            cleaning: CleaningReport {
                rows_before: 26,
                rows_after: 24,
                countries_before: 7,
                countries_after: 6,
            },
            results,
            literature: vec![article(
                "Spending and health",
                Some("10.1/a"),
                12,
                LiteratureProvider::SemanticScholar,
            )],
            controls_fetched: vec![gdp],
            plan,
            generated_at: Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_generate_markdown_summary() {
        let outcome = create_test_outcome();
        let markdown = generate_markdown_summary(&outcome);

        assert!(markdown.starts_with("# Health Spending and Longevity"));
        assert!(markdown.contains("## Research Design"));
        assert!(markdown.contains("## Data"));
        assert!(markdown.contains("## Results"));
        assert!(markdown.contains("| Pooled OLS |"));
        assert!(markdown.contains("| Country fixed effects |"));
        assert!(markdown.contains("Urban population (no data)"));
        assert!(markdown.contains("Rows: 26 -> 24 (2 dropped)"));
        assert!(markdown.contains("**Warning:** Short panel"));
        assert!(markdown.contains("## References"));
        assert!(markdown.contains("DOI: 10.1/a"));
    }

    #[test]
    fn test_failed_model_is_reported_in_table() {
        let mut outcome = create_test_outcome();
        outcome.results.ols = ModelOutcome::Failed {
            error: "singular design matrix".to_string(),
        };
        let markdown = generate_markdown_summary(&outcome);
        assert!(markdown.contains("| Pooled OLS | failed: singular design matrix |"));
    }

    #[test]
    fn test_references_omitted_without_literature() {
        let mut outcome = create_test_outcome();
        outcome.literature.clear();
        assert!(!generate_markdown_summary(&outcome).contains("## References"));
    }

    #[test]
    fn test_generate_json_report() {
        let outcome = create_test_outcome();
        let json = generate_json_report(&outcome).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["plan"]["independent_var"], "SH.XPD.CHEX.GD.ZS");
        assert_eq!(value["cleaning"]["rows_after"], 24);
        assert!(value["results"]["ols"]["coefficient"].is_number());
        assert_eq!(value["controls_fetched"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_write_outputs_creates_run_directory() {
        let temp = tempfile::tempdir().unwrap();
        let outcome = create_test_outcome();

        let dir = write_outputs(temp.path(), &outcome).unwrap();

        assert_eq!(dir, temp.path().join("run_20240305_143000"));
        assert!(dir.join(RESULTS_FILE).is_file());
        let summary = std::fs::read_to_string(dir.join(SUMMARY_FILE)).unwrap();
        assert!(summary.contains("Health Spending and Longevity"));
        assert!(dir.join(MANIFEST_FILE).is_file());
    }

    #[test]
    fn test_reproduction_manifest_records_run_choices() {
        let outcome = create_test_outcome();
        let text = generate_reproduction_manifest(&outcome).unwrap();

        assert!(text.starts_with("# Empirica reproduction manifest"));
        assert!(text.contains("empirica \"Higher health spending increases life expectancy\""));

        let manifest: ReproductionManifest = toml::from_str(&text).unwrap();
        assert_eq!(manifest.variables.independent.as_str(), "SH.XPD.CHEX.GD.ZS");
        assert_eq!(manifest.variables.dependent.as_str(), "SP.DYN.LE00.IN");
        // only the control with data
        assert_eq!(
            manifest.variables.controls,
            vec![IndicatorCode::new("NY.GDP.PCAP.PP.KD")]
        );
        assert_eq!((manifest.variables.start_year, manifest.variables.end_year), (2010, 2013));
        assert_eq!(manifest.cleaning, outcome.directive);
        assert_eq!(manifest.generated_at, outcome.generated_at);
    }

    #[test]
    fn test_tiny_estimates_are_not_printed_as_zero() {
        assert_eq!(format_estimate(1.5e-12), "1.5000e-12");
        assert_eq!(format_estimate(2.0), "2.0000");
        assert_eq!(format_estimate(0.0), "0.0000");
    }
}
