//! The model suite run on the cleaned panel.
//!
//! Every model is isolated: a failed fit becomes an `{"error": ...}`
//! sub-result and the remaining models still run. Only the sample-size
//! precondition short-circuits the whole bundle.

use crate::models::{HypothesisPlan, Panel, PanelRow};
use crate::stats::descriptive::{average_ranks, mean, round_estimate, round_to, sample_std};
use crate::stats::dist::t_two_sided_p;
use crate::stats::linalg::{fit_ols, FitError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// Valid (x, y) rows required before any model runs.
pub const MIN_OBSERVATIONS: usize = 10;

/// Countries required before the fixed-effects model runs (exclusive).
pub const MIN_FE_COUNTRIES: usize = 5;

const SIGNIFICANCE: f64 = 0.05;

/// A model's estimates or the reason it could not be fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelOutcome<T> {
    Fitted(T),
    Failed { error: String },
}

impl<T> ModelOutcome<T> {
    pub fn fitted(&self) -> Option<&T> {
        match self {
            ModelOutcome::Fitted(v) => Some(v),
            ModelOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ModelOutcome::Fitted(_) => None,
            ModelOutcome::Failed { error } => Some(error),
        }
    }

    fn from_result<E: std::fmt::Display>(model: &str, result: Result<T, E>) -> Self {
        match result {
            Ok(v) => ModelOutcome::Fitted(v),
            Err(e) => {
                warn!("{} failed: {}", model, e);
                ModelOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// y ~ const + x
///
/// `t_stat` and `f_stat` are `None` when the fit leaves no residual
/// variance and the ratio is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsResult {
    pub coefficient: f64,
    pub intercept: f64,
    pub std_error: f64,
    pub t_stat: Option<f64>,
    pub p_value: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub n_obs: usize,
    pub f_stat: Option<f64>,
    pub f_p_value: Option<f64>,
    pub significant: bool,
}

/// y ~ const + x + controls, on complete rows only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlledResult {
    pub coefficient: f64,
    pub std_error: f64,
    pub t_stat: Option<f64>,
    pub p_value: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub n_obs: usize,
    pub significant: bool,
    pub controls_used: Vec<String>,
}

/// Demeaned y ~ const + demeaned x.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedEffectsResult {
    pub coefficient: f64,
    pub std_error: f64,
    pub p_value: f64,
    pub r_squared_within: f64,
    pub n_obs: usize,
    pub n_countries: usize,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub pearson_r: f64,
    pub pearson_p: f64,
    pub spearman_r: f64,
    pub spearman_p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptive {
    pub n_obs: usize,
    pub n_countries: usize,
    pub year_range: String,
    pub x_mean: f64,
    pub x_std: f64,
    pub y_mean: f64,
    pub y_std: f64,
}

/// Sub-results of a complete run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResults {
    pub ols: ModelOutcome<OlsResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ols_controls: Option<ModelOutcome<ControlledResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_effects: Option<ModelOutcome<FixedEffectsResult>>,
    pub correlation: ModelOutcome<CorrelationResult>,
    pub descriptive: Descriptive,
}

/// Everything the engine produced, or the reason nothing was run.
///
/// Consumers must check `error()` before reading model fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultBundle {
    Complete(Box<ModelResults>),
    Insufficient {
        error: String,
        #[serde(skip)]
        valid_rows: usize,
    },
}

impl ResultBundle {
    pub fn models(&self) -> Option<&ModelResults> {
        match self {
            ResultBundle::Complete(models) => Some(models.as_ref()),
            ResultBundle::Insufficient { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ResultBundle::Complete(_) => None,
            ResultBundle::Insufficient { error, .. } => Some(error),
        }
    }
}

/// Run the full model suite. Never fails; errors live inside the bundle.
pub fn run_all(panel: &Panel, plan: &HypothesisPlan) -> ResultBundle {
    info!(
        "Running statistical analysis of {} on {}",
        plan.y_label, plan.x_label
    );

    let rows: Vec<&PanelRow> = panel
        .rows
        .iter()
        .filter(|r| r.x.is_finite() && r.y.is_finite())
        .collect();

    if rows.len() < MIN_OBSERVATIONS {
        warn!("Only {} valid observations", rows.len());
        return ResultBundle::Insufficient {
            error: format!(
                "Insufficient data ({} observations, at least {} required)",
                rows.len(),
                MIN_OBSERVATIONS
            ),
            valid_rows: rows.len(),
        };
    }

    let xs: Vec<f64> = rows.iter().map(|r| r.x).collect();
    let ys: Vec<f64> = rows.iter().map(|r| r.y).collect();
    let n_countries = rows.iter().map(|r| r.country.as_str()).collect::<BTreeSet<_>>().len();

    let ols = ModelOutcome::from_result("OLS", ols(&xs, &ys));
    if let Some(r) = ols.fitted() {
        info!(
            "OLS: B = {} (p = {}){}, R2 = {}",
            r.coefficient,
            r.p_value,
            stars(r.p_value),
            r.r_squared
        );
    }

    let ols_controls = if panel.control_columns.is_empty() {
        None
    } else {
        let outcome = ModelOutcome::from_result(
            "OLS with controls",
            ols_with_controls(&rows, &panel.control_columns),
        );
        if let Some(r) = outcome.fitted() {
            info!(
                "OLS with {} controls: B = {} (p = {}), R2 = {}",
                r.controls_used.len(),
                r.coefficient,
                r.p_value,
                r.r_squared
            );
        }
        Some(outcome)
    };

    let fixed_effects = if n_countries > MIN_FE_COUNTRIES {
        let outcome = ModelOutcome::from_result("Fixed effects", fixed_effects(&rows, n_countries));
        if let Some(r) = outcome.fitted() {
            info!(
                "FE: B = {} (p = {}), R2 within = {}",
                r.coefficient, r.p_value, r.r_squared_within
            );
        }
        Some(outcome)
    } else {
        info!("Skipping fixed effects: {} countries", n_countries);
        None
    };

    let correlation = ModelOutcome::from_result("Correlation", correlation(&xs, &ys));

    let (min_year, max_year) = rows
        .iter()
        .fold((i32::MAX, i32::MIN), |(lo, hi), r| (lo.min(r.year), hi.max(r.year)));

    let descriptive = Descriptive {
        n_obs: rows.len(),
        n_countries,
        year_range: format!("{}-{}", min_year, max_year),
        x_mean: round_to(mean(&xs).unwrap_or(f64::NAN), 4),
        x_std: round_to(sample_std(&xs).unwrap_or(f64::NAN), 4),
        y_mean: round_to(mean(&ys).unwrap_or(f64::NAN), 4),
        y_std: round_to(sample_std(&ys).unwrap_or(f64::NAN), 4),
    };

    ResultBundle::Complete(Box::new(ModelResults {
        ols,
        ols_controls,
        fixed_effects,
        correlation,
        descriptive,
    }))
}

/// Significance stars for log lines and tables.
pub fn stars(p: f64) -> &'static str {
    if p < 0.001 {
        "***"
    } else if p < 0.01 {
        "**"
    } else if p < SIGNIFICANCE {
        "*"
    } else {
        ""
    }
}

fn with_constant(columns: &[&[f64]], n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| std::iter::once(1.0).chain(columns.iter().map(|c| c[i])).collect())
        .collect()
}

/// JSON has no encoding for infinities or NaN.
fn finite(value: f64, decimals: i32) -> Option<f64> {
    value.is_finite().then(|| round_to(value, decimals))
}

fn ols(xs: &[f64], ys: &[f64]) -> Result<OlsResult, FitError> {
    let fit = fit_ols(&with_constant(&[xs], xs.len()), ys)?;
    Ok(OlsResult {
        coefficient: round_estimate(fit.coefficients[1], 6),
        intercept: round_estimate(fit.coefficients[0], 6),
        std_error: round_estimate(fit.std_errors[1], 6),
        t_stat: finite(fit.t_values[1], 4),
        p_value: round_to(fit.p_values[1], 6),
        r_squared: round_to(fit.r_squared, 4),
        adj_r_squared: round_to(fit.adj_r_squared, 4),
        n_obs: fit.n_obs,
        f_stat: finite(fit.f_stat, 4),
        f_p_value: finite(fit.f_p_value, 6),
        significant: fit.p_values[1] < SIGNIFICANCE,
    })
}

fn ols_with_controls(rows: &[&PanelRow], control_columns: &[String]) -> Result<ControlledResult, FitError> {
    let complete: Vec<(&PanelRow, Vec<f64>)> = rows
        .iter()
        .filter_map(|r| {
            let values: Option<Vec<f64>> = r
                .controls
                .iter()
                .map(|c| c.filter(|v| v.is_finite()))
                .collect();
            match values {
                Some(v) if v.len() == control_columns.len() => Some((*r, v)),
                _ => None,
            }
        })
        .collect();

    let design: Vec<Vec<f64>> = complete
        .iter()
        .map(|(r, controls)| {
            let mut row = Vec::with_capacity(controls.len() + 2);
            row.push(1.0);
            row.push(r.x);
            row.extend(controls);
            row
        })
        .collect();
    let ys: Vec<f64> = complete.iter().map(|(r, _)| r.y).collect();

    if ys.is_empty() {
        return Err(FitError::TooFewObservations {
            n: 0,
            k: control_columns.len() + 2,
        });
    }

    let fit = fit_ols(&design, &ys)?;
    Ok(ControlledResult {
        coefficient: round_estimate(fit.coefficients[1], 6),
        std_error: round_estimate(fit.std_errors[1], 6),
        t_stat: finite(fit.t_values[1], 4),
        p_value: round_to(fit.p_values[1], 6),
        r_squared: round_to(fit.r_squared, 4),
        adj_r_squared: round_to(fit.adj_r_squared, 4),
        n_obs: fit.n_obs,
        significant: fit.p_values[1] < SIGNIFICANCE,
        controls_used: control_columns.to_vec(),
    })
}

fn fixed_effects(rows: &[&PanelRow], n_countries: usize) -> Result<FixedEffectsResult, FitError> {
    let mut sums: HashMap<&str, (f64, f64, usize)> = HashMap::new();
    for r in rows {
        let entry = sums.entry(r.country.as_str()).or_insert((0.0, 0.0, 0));
        entry.0 += r.x;
        entry.1 += r.y;
        entry.2 += 1;
    }

    let (x_dm, y_dm): (Vec<f64>, Vec<f64>) = rows
        .iter()
        .map(|r| {
            let (sx, sy, count) = sums[r.country.as_str()];
            (r.x - sx / count as f64, r.y - sy / count as f64)
        })
        .unzip();

    let fit = fit_ols(&with_constant(&[&x_dm], x_dm.len()), &y_dm)?;
    Ok(FixedEffectsResult {
        coefficient: round_estimate(fit.coefficients[1], 6),
        std_error: round_estimate(fit.std_errors[1], 6),
        p_value: round_to(fit.p_values[1], 6),
        r_squared_within: round_to(fit.r_squared, 4),
        n_obs: fit.n_obs,
        n_countries,
        significant: fit.p_values[1] < SIGNIFICANCE,
    })
}

#[derive(Debug, thiserror::Error)]
#[error("correlation undefined: {0} has no variance")]
struct NoVariance(&'static str);

fn pearson(xs: &[f64], ys: &[f64]) -> Result<(f64, f64), NoVariance> {
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx == 0.0 {
        return Err(NoVariance("x"));
    }
    if syy == 0.0 {
        return Err(NoVariance("y"));
    }

    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let df = n - 2.0;
    let p = if r.abs() >= 1.0 {
        0.0
    } else {
        t_two_sided_p(r * (df / (1.0 - r * r)).sqrt(), df)
    };
    Ok((r, p))
}

fn correlation(xs: &[f64], ys: &[f64]) -> Result<CorrelationResult, NoVariance> {
    let (pearson_r, pearson_p) = pearson(xs, ys)?;
    let (spearman_r, spearman_p) = pearson(&average_ranks(xs), &average_ranks(ys))?;
    info!("Pearson r = {:.4}, Spearman rho = {:.4}", pearson_r, spearman_r);
    Ok(CorrelationResult {
        pearson_r: round_to(pearson_r, 4),
        pearson_p: round_to(pearson_p, 6),
        spearman_r: round_to(spearman_r, 4),
        spearman_p: round_to(spearman_p, 6),
    })
}
