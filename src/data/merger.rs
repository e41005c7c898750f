//! Joining per-indicator series into one panel.

use crate::models::{ControlVar, Observation, Panel, PanelRow};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

type Key = (String, i32);

/// A merged panel and the controls that actually made it in.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedPanel {
    pub panel: Panel,
    /// Planned controls that had data. Controls without data are absent.
    pub controls_fetched: Vec<ControlVar>,
}

/// Inner-join X and Y on (country, year), then left-join each control.
///
/// A control whose series is empty is left out entirely instead of being
/// joined as an all-missing column. If a series repeats a key, its first
/// value wins.
pub fn merge_panel(
    x: &[Observation],
    y: &[Observation],
    controls: &[(ControlVar, Vec<Observation>)],
) -> MergedPanel {
    let y_by_key = index_series(y);

    let mut base: BTreeMap<Key, PanelRow> = BTreeMap::new();
    for obs in x {
        let key = (obs.country.clone(), obs.year);
        if base.contains_key(&key) {
            continue;
        }
        if let Some(y_obs) = y_by_key.get(&key) {
            base.insert(
                key,
                PanelRow {
                    country: obs.country.clone(),
                    country_code: obs.country_code.clone(),
                    year: obs.year,
                    x: obs.value,
                    y: y_obs.value,
                    controls: Vec::new(),
                },
            );
        }
    }

    let mut control_columns = Vec::new();
    let mut controls_fetched = Vec::new();

    for (control, series) in controls {
        let column = control.code.control_column();
        if series.is_empty() {
            warn!("Control {} has no data, leaving it out", control.code);
            continue;
        }
        if control_columns.contains(&column) {
            continue;
        }

        let by_key = index_series(series);
        for (key, row) in base.iter_mut() {
            row.controls.push(by_key.get(key).map(|o| o.value));
        }
        control_columns.push(column);
        controls_fetched.push(control.clone());
    }

    let panel = Panel {
        control_columns,
        rows: base.into_values().collect(),
    };

    info!(
        "Merged: {} rows, {} countries",
        panel.len(),
        panel.country_count()
    );

    MergedPanel {
        panel,
        controls_fetched,
    }
}

fn index_series(series: &[Observation]) -> HashMap<Key, &Observation> {
    let mut index = HashMap::with_capacity(series.len());
    for obs in series {
        index.entry((obs.country.clone(), obs.year)).or_insert(obs);
    }
    index
}
