//! Deterministic application of a cleaning directive.
//!
//! Steps run in a fixed order: winsorize, drop zeros, drop thin countries,
//! drop excluded countries. The per-country count uses the rows left after
//! the earlier steps.

use crate::models::{Panel, PanelRow};
use crate::review::reviewer::CleaningDirective;
use crate::stats::descriptive::quantile;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Row and country counts around cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_before: usize,
    pub rows_after: usize,
    pub countries_before: usize,
    pub countries_after: usize,
}

impl CleaningReport {
    pub fn rows_dropped(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// Apply `directive` to `panel`.
pub fn apply_cleaning(mut panel: Panel, directive: &CleaningDirective) -> (Panel, CleaningReport) {
    let rows_before = panel.len();
    let countries_before = panel.country_count();

    if directive.winsorize {
        let tail = directive.tail_fraction();
        winsorize(&mut panel, tail, |r| &mut r.x);
        winsorize(&mut panel, tail, |r| &mut r.y);
        debug!("Winsorized x and y at {:.2}%", tail * 100.0);
    }

    if directive.exclude_zeros_x {
        panel.rows.retain(|r| r.x != 0.0);
    }
    if directive.exclude_zeros_y {
        panel.rows.retain(|r| r.y != 0.0);
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in &panel.rows {
        *counts.entry(row.country.clone()).or_default() += 1;
    }
    let min_obs = directive.min_observations_per_country;
    panel.rows.retain(|r| counts[&r.country] >= min_obs);

    if !directive.exclude_countries.is_empty() {
        let excluded: HashSet<String> = directive
            .exclude_countries
            .iter()
            .map(|c| c.trim().to_lowercase())
            .collect();
        panel.rows.retain(|r| {
            !excluded.contains(&r.country.to_lowercase())
                && !excluded.contains(&r.country_code.to_lowercase())
        });
    }

    let report = CleaningReport {
        rows_before,
        rows_after: panel.len(),
        countries_before,
        countries_after: panel.country_count(),
    };
    info!("Cleaning: {} -> {} rows", report.rows_before, report.rows_after);

    (panel, report)
}

fn winsorize<F>(panel: &mut Panel, tail: f64, mut column: F)
where
    F: FnMut(&mut PanelRow) -> &mut f64,
{
    let values: Vec<f64> = panel.rows.iter_mut().map(|r| *column(r)).collect();
    let (lower, upper) = match (quantile(&values, tail), quantile(&values, 1.0 - tail)) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => return,
    };

    for row in panel.rows.iter_mut() {
        let v = column(row);
        *v = v.clamp(lower, upper);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(country: &str, year: i32, x: f64, y: f64) -> PanelRow {
        PanelRow {
            country: country.to_string(),
            country_code: country[..3.min(country.len())].to_uppercase(),
            year,
            x,
            y,
            controls: vec![],
        }
    }

    fn panel(rows: Vec<PanelRow>) -> Panel {
        Panel {
            control_columns: vec![],
            rows,
        }
    }

    fn directive() -> CleaningDirective {
        CleaningDirective {
            winsorize: true,
            winsorize_percentile: 5.0,
            min_observations_per_country: 3,
            ..CleaningDirective::default()
        }
    }

    #[test]
    fn test_count_filter_after_winsorizing() {
        let mut rows: Vec<PanelRow> = (0..4)
            .map(|t| row("Kenya", 2000 + t, t as f64, 50.0 + t as f64))
            .collect();
        rows.push(row("Malta", 2000, 100.0, 80.0));
        rows.push(row("Malta", 2001, 101.0, 81.0));

        let (cleaned, report) = apply_cleaning(panel(rows), &directive());

        assert_eq!(cleaned.rows.iter().filter(|r| r.country == "Kenya").count(), 4);
        assert!(cleaned.rows.iter().all(|r| r.country != "Malta"));
        assert_eq!(report.rows_before, 6);
        assert_eq!(report.rows_after, 4);
        assert_eq!(report.countries_after, 1);
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let mut rows = Vec::new();
        for (c, name) in ["Peru", "Chad", "Fiji"].iter().enumerate() {
            for t in 0..(3 + c as i32) {
                rows.push(row(name, 2000 + t, (c * 10) as f64 + t as f64 + 1.0, 40.0 + t as f64));
            }
        }
        rows.push(row("Laos", 2000, 5.0, 45.0));
        let d = CleaningDirective {
            exclude_zeros_x: true,
            exclude_countries: vec!["chad".to_string()],
            ..directive()
        };

        let (once, first) = apply_cleaning(panel(rows), &d);
        let (twice, second) = apply_cleaning(once.clone(), &d);

        assert!(first.rows_dropped() > 0);
        assert_eq!(second.rows_dropped(), 0);
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn test_winsorize_clips_extremes() {
        let mut rows: Vec<PanelRow> = (1..=20).map(|i| row("Peru", 1990 + i, i as f64, 1.0)).collect();
        rows[19].x = 1000.0;
        let expected_upper = quantile(&rows.iter().map(|r| r.x).collect::<Vec<_>>(), 1.0 - 0.05).unwrap();

        let (cleaned, _) = apply_cleaning(panel(rows), &directive());

        let max = cleaned.rows.iter().map(|r| r.x).fold(f64::MIN, f64::max);
        assert_eq!(max, expected_upper);
        assert!(max < 1000.0);
        assert_eq!(cleaned.len(), 20);
    }

    #[test]
    fn test_zero_exclusion_runs_before_count_filter() {
        let rows = vec![
            row("Peru", 2000, 0.0, 1.0),
            row("Peru", 2001, 2.0, 1.0),
            row("Peru", 2002, 3.0, 1.0),
        ];
        let d = CleaningDirective {
            exclude_zeros_x: true,
            min_observations_per_country: 3,
            ..CleaningDirective::default()
        };

        let (cleaned, _) = apply_cleaning(panel(rows), &d);

        assert!(cleaned.is_empty());
    }

    #[test]
    fn test_exclude_by_name_or_code() {
        let mut rows = Vec::new();
        for t in 0..3 {
            rows.push(row("Peru", 2000 + t, 1.0 + t as f64, 1.0));
            rows.push(row("Chad", 2000 + t, 1.0 + t as f64, 1.0));
            rows.push(row("Fiji", 2000 + t, 1.0 + t as f64, 1.0));
        }
        let d = CleaningDirective {
            exclude_countries: vec![" peru ".to_string(), "CHA".to_string()],
            ..CleaningDirective::default()
        };

        let (cleaned, _) = apply_cleaning(panel(rows), &d);

        assert!(cleaned.rows.iter().all(|r| r.country == "Fiji"));
        assert_eq!(cleaned.len(), 3);
    }

    #[test]
    fn test_default_directive_only_enforces_min_obs() {
        let rows = vec![
            row("Peru", 2000, 0.0, 0.0),
            row("Peru", 2001, 0.0, 0.0),
            row("Peru", 2002, 9.0, 9.0),
            row("Chad", 2000, 1.0, 1.0),
        ];

        let (cleaned, report) = apply_cleaning(panel(rows), &CleaningDirective::default());

        assert_eq!(cleaned.len(), 3);
        assert_eq!(report.countries_before, 2);
        assert_eq!(report.countries_after, 1);
    }
}
