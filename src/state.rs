use std::collections::BTreeSet;
use std::path::Path;

use crate::color::SeriesColors;
use crate::config::DashboardConfig;
use crate::data::error::PipelineError;
use crate::data::filter::Predicate;
use crate::data::model::{CellValue, Table};
use crate::data::options::{Choice, FilterField};
use crate::data::pipeline::{self, AnalysisMode, ChartKind, ChartOutput, PreparedTable, UserSelection};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
#[derive(Default)]
pub struct AppState {
    pub config: DashboardConfig,

    /// Validated table (None until a file loads successfully).
    pub prepared: Option<PreparedTable>,

    /// Current control values; rebuilt whenever a file is loaded.
    pub selection: Option<UserSelection>,

    /// Result for the current selection (cached until the selection changes).
    pub output: Option<Result<ChartOutput, PipelineError>>,

    /// Colours for the series column, shared by all panels.
    pub series_colors: SeriesColors,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Load a file and ingest it, reporting failures in the status line.
    pub fn load_path(&mut self, path: &Path) {
        match crate::data::loader::load_file(path) {
            Ok(table) => self.set_table(table),
            Err(e) => {
                log::error!("Failed to load file: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    /// Validate a newly loaded table and reset the controls.
    ///
    /// A validation failure clears any previous dataset: nothing may be
    /// charted from a file that failed preparation.
    pub fn set_table(&mut self, table: Table) {
        match pipeline::prepare(table, &self.config) {
            Ok(prepared) => {
                let progress = prepared
                    .table
                    .column(&self.config.columns.progress)
                    .map(|c| c.distinct_values())
                    .unwrap_or_default();
                self.series_colors = SeriesColors::new(&progress);
                self.selection = Some(prepared.default_selection());
                self.prepared = Some(prepared);
                self.status_message = None;
                self.refresh();
            }
            Err(e) => {
                log::error!("Cannot use this file: {e}");
                self.prepared = None;
                self.selection = None;
                self.output = None;
                self.status_message = Some(format!("Error: {e}"));
            }
        }
    }

    /// Re-run filter → aggregate for the current selection.
    pub fn refresh(&mut self) {
        self.output = match (&self.prepared, &self.selection) {
            (Some(prep), Some(sel)) => Some(pipeline::run(prep, sel)),
            _ => None,
        };
    }

    /// Apply `change` to the selection and refresh if anything changed.
    pub fn update_selection(&mut self, change: impl FnOnce(&mut UserSelection)) {
        let Some(sel) = &self.selection else {
            return;
        };
        let mut next = sel.clone();
        change(&mut next);
        if Some(&next) != self.selection.as_ref() {
            self.selection = Some(next);
            self.refresh();
        }
    }

    /// Switch between treatment comparison and time trend.
    pub fn set_trend_mode(&mut self, trend: bool) {
        let first_treatment = self
            .prepared
            .as_ref()
            .and_then(|p| p.treatments.first().cloned());
        self.update_selection(|sel| {
            sel.mode = match (trend, first_treatment) {
                (true, Some(treatment)) => AnalysisMode::Trend { treatment },
                _ => AnalysisMode::Comparison {
                    interval: None,
                    chart: ChartKind::Bar,
                },
            };
        });
    }

    /// Single-select change: the sentinel clears the constraint.
    pub fn set_single_filter(&mut self, column: &str, choice: Choice) {
        self.update_selection(|sel| {
            let pred = match choice {
                Choice::All => Predicate::Any,
                Choice::Value(v) => Predicate::Equals(v),
            };
            sel.filters.insert(column.to_string(), pred);
        });
    }

    fn filter_field(&self, column: &str) -> Option<FilterField> {
        self.prepared
            .as_ref()
            .and_then(|p| p.filters.iter().find(|f| f.column == column))
            .cloned()
    }

    /// Toggle a single value in a multi-select filter.
    pub fn toggle_filter_value(&mut self, column: &str, value: &CellValue) {
        let Some(field) = self.filter_field(column) else {
            return;
        };
        self.update_selection(|sel| {
            let current = sel.filters.get(column).cloned().unwrap_or_default();
            let mut selected = field.selected(&current);
            if !selected.remove(value) {
                selected.insert(value.clone());
            }
            sel.filters
                .insert(column.to_string(), field.multi_predicate(selected));
        });
    }

    /// Select all values of a multi-select column.
    pub fn select_all(&mut self, column: &str) {
        let Some(field) = self.filter_field(column) else {
            return;
        };
        self.update_selection(|sel| {
            sel.filters
                .insert(column.to_string(), field.multi_predicate(field.values.clone()));
        });
    }

    /// Deselect all values of a multi-select column (matches nothing).
    pub fn select_none(&mut self, column: &str) {
        self.update_selection(|sel| {
            sel.filters
                .insert(column.to_string(), Predicate::OneOf(BTreeSet::new()));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::columns::ResolutionStrategy;
    use crate::data::model::Column;
    use crate::data::pipeline::ChartBody;

    fn state() -> AppState {
        let config = DashboardConfig {
            measurements: ResolutionStrategy::ExplicitList {
                candidates: vec!["MeSA".into()],
            },
            ..DashboardConfig::default()
        };
        let mut state = AppState::new(config);
        let n = 6;
        state.set_table(
            Table::from_columns(vec![
                Column::new("Treatment", (0..n).map(|i| if i < 3 { "T1".into() } else { "T2".into() }).collect()),
                Column::new("Interval (h)", (0..n).map(|i| CellValue::Integer(i % 3)).collect()),
                Column::new("Progress", (0..n).map(|i| if i % 2 == 0 { "a".into() } else { "b".into() }).collect()),
                Column::new("MeSA", (0..n).map(|i| CellValue::Float(i as f64)).collect()),
            ])
            .unwrap(),
        );
        state
    }

    fn total_rows(state: &AppState) -> usize {
        match &state.output {
            Some(Ok(out)) => match &out.body {
                ChartBody::Bars(res) => res.total_rows(),
                ChartBody::Trend { measurement, .. } => measurement.total_rows(),
                ChartBody::Boxes { groups, .. } => groups.iter().map(|g| g.1.len()).sum(),
            },
            _ => 0,
        }
    }

    #[test]
    fn loading_computes_a_first_chart() {
        let state = state();
        assert!(state.status_message.is_none());
        assert_eq!(total_rows(&state), 6);
    }

    #[test]
    fn multiselect_toggles_and_resets() {
        let mut state = state();
        state.toggle_filter_value("Progress", &CellValue::from("a"));
        assert_eq!(total_rows(&state), 3);

        state.select_none("Progress");
        assert!(matches!(state.output, Some(Err(PipelineError::EmptyResultSet))));

        state.select_all("Progress");
        assert_eq!(total_rows(&state), 6);
        let sel = state.selection.as_ref().unwrap();
        assert_eq!(sel.filters["Progress"], Predicate::Any);
    }

    #[test]
    fn retoggling_the_last_value_clears_the_constraint() {
        let mut state = state();
        state.toggle_filter_value("Progress", &CellValue::from("b"));
        state.toggle_filter_value("Progress", &CellValue::from("b"));
        let sel = state.selection.as_ref().unwrap();
        assert_eq!(sel.filters["Progress"], Predicate::Any);
        assert_eq!(total_rows(&state), 6);
    }

    #[test]
    fn trend_mode_picks_first_treatment() {
        let mut state = state();
        state.set_trend_mode(true);
        let sel = state.selection.as_ref().unwrap();
        assert_eq!(sel.mode, AnalysisMode::Trend { treatment: "T1".into() });
        assert_eq!(total_rows(&state), 3);
    }

    #[test]
    fn invalid_file_clears_previous_dataset() {
        let mut state = state();
        state.set_table(Table::from_columns(vec![Column::new("Other", vec![])]).unwrap());
        assert!(state.prepared.is_none());
        assert!(state.output.is_none());
        assert!(state.status_message.as_deref().unwrap_or("").contains("Treatment"));
    }
}
