use crate::config::DashboardConfig;

use super::aggregate::{self, AggregationResult, IntervalCoverage, Statistics};
use super::columns::{self, ResolvedColumns};
use super::error::PipelineError;
use super::filter::{self, FilterSpec, Predicate};
use super::model::{CellValue, Table};
use super::options::{self, FilterField};

// ---------------------------------------------------------------------------
// Preparation: runs once per loaded file
// ---------------------------------------------------------------------------

/// A loaded table that passed validation, with everything derived from it
/// that does not depend on the user's selection.
#[derive(Debug, Clone)]
pub struct PreparedTable {
    pub table: Table,
    pub config: DashboardConfig,
    pub measurements: ResolvedColumns,
    pub filters: Vec<FilterField>,
    /// Sorted distinct treatments.
    pub treatments: Vec<CellValue>,
    /// Distinct intervals, ascending.
    pub intervals: Vec<CellValue>,
    pub coverage: IntervalCoverage,
    /// Non-fatal remarks about the file layout.
    pub notices: Vec<String>,
}

/// Validate `table` against `config` and derive the selection-independent
/// state. Fails before any chart logic can run when the treatment or
/// interval column is absent or no measurement column resolves.
pub fn prepare(table: Table, config: &DashboardConfig) -> Result<PreparedTable, PipelineError> {
    let cols = &config.columns;
    for required in [&cols.treatment, &cols.interval] {
        if !table.has_column(required) {
            return Err(PipelineError::MissingRequiredColumn {
                column: required.clone(),
                found: table.column_names().iter().map(|s| s.to_string()).collect(),
            });
        }
    }

    let measurements = columns::resolve(&table, &config.measurements, &config.display_aliases)?;
    if measurements.is_empty() {
        let expected = match &config.measurements {
            columns::ResolutionStrategy::ExplicitList { candidates } => candidates.clone(),
            _ => Vec::new(),
        };
        return Err(PipelineError::NoMeasurementColumns { expected });
    }

    let filters = options::filter_fields(&table, &config.filters);
    let distinct = |name: &str| {
        table
            .column(name)
            .map(|c| c.distinct_values())
            .unwrap_or_default()
    };
    let treatments: Vec<CellValue> = distinct(&cols.treatment).into_iter().collect();
    let interval_set = distinct(&cols.interval);
    let coverage = IntervalCoverage::compute(&interval_set, &config.expected_intervals);
    let intervals: Vec<CellValue> = interval_set.into_iter().collect();

    let mut notices = Vec::new();
    if !coverage.is_complete() {
        log::info!("{coverage}");
        notices.push(coverage.to_string());
    }
    let missing_meta: Vec<&str> = [&cols.chamber, &cols.line]
        .into_iter()
        .filter(|c| !table.has_column(c))
        .map(String::as_str)
        .collect();
    if !missing_meta.is_empty() {
        let msg = format!("columns not found, filters disabled: {}", missing_meta.join(", "));
        log::warn!("{msg}");
        notices.push(msg);
    }

    Ok(PreparedTable {
        table,
        config: config.clone(),
        measurements,
        filters,
        treatments,
        intervals,
        coverage,
        notices,
    })
}

impl PreparedTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.table.has_column(name)
    }

    /// What the controls show before the user changes anything.
    pub fn default_selection(&self) -> UserSelection {
        UserSelection {
            mode: AnalysisMode::Comparison {
                interval: None,
                chart: ChartKind::Bar,
            },
            measurement: self
                .measurements
                .display_names()
                .first()
                .map(|s| s.to_string())
                .unwrap_or_default(),
            filters: options::default_filter_spec(&self.filters),
            facet_by_chamber: false,
            facet_by_line: false,
        }
    }

    /// Temperature / humidity columns present in the table.
    fn environment_columns(&self) -> Vec<String> {
        let cols = &self.config.columns;
        [&cols.temperature, &cols.humidity]
            .into_iter()
            .filter(|c| self.has_column(c))
            .cloned()
            .collect()
    }

    /// Primary dimension, then progress when present, then active facets.
    fn group_key(&self, primary: &str, sel: &UserSelection) -> Vec<String> {
        let cols = &self.config.columns;
        let mut key = vec![primary.to_string()];
        if self.has_column(&cols.progress) {
            key.push(cols.progress.clone());
        }
        key.extend(self.facet_columns(sel));
        key
    }

    fn facet_columns(&self, sel: &UserSelection) -> Vec<String> {
        let cols = &self.config.columns;
        let mut facets = Vec::new();
        if sel.facet_by_chamber && self.has_column(&cols.chamber) {
            facets.push(cols.chamber.clone());
        }
        if sel.facet_by_line && self.has_column(&cols.line) {
            facets.push(cols.line.clone());
        }
        facets
    }

    fn series_column(&self) -> Option<String> {
        let progress = &self.config.columns.progress;
        self.has_column(progress).then(|| progress.clone())
    }
}

// ---------------------------------------------------------------------------
// Selection: runs on every interaction
// ---------------------------------------------------------------------------

/// Bar (mean ± std) or box (distribution) comparison chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Box,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisMode {
    /// Compare treatments at one interval (`None` = all intervals).
    Comparison {
        interval: Option<CellValue>,
        chart: ChartKind,
    },
    /// Follow one treatment over time.
    Trend { treatment: CellValue },
}

/// Everything the user picked in the controls.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSelection {
    pub mode: AnalysisMode,
    /// Display name of the measurement column.
    pub measurement: String,
    pub filters: FilterSpec,
    pub facet_by_chamber: bool,
    pub facet_by_line: bool,
}

/// How the adapter should lay out a result.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartLayout {
    pub title: String,
    /// Column on the x axis.
    pub primary: String,
    /// Column whose values become colour-coded series.
    pub series: Option<String>,
    /// Columns whose value combinations become separate panels.
    pub facets: Vec<String>,
    /// Display name of the measurement.
    pub measurement: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartBody {
    /// Mean and sample std per group.
    Bars(AggregationResult),
    /// Raw numeric values per group, keyed like an aggregation row.
    Boxes {
        key_columns: Vec<String>,
        groups: Vec<(Vec<CellValue>, Vec<f64>)>,
    },
    /// Mean per interval, ascending; environment means when available.
    Trend {
        measurement: AggregationResult,
        environment: Option<AggregationResult>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartOutput {
    pub layout: ChartLayout,
    pub body: ChartBody,
    /// Informational remarks for this chart only.
    pub notices: Vec<String>,
}

/// Filter and aggregate for one chart request.
///
/// `EmptyResultSet` is returned when the filters leave no rows; callers
/// show a placeholder and keep going.
pub fn run(prep: &PreparedTable, sel: &UserSelection) -> Result<ChartOutput, PipelineError> {
    let raw = prep
        .measurements
        .raw_for(&sel.measurement)
        .ok_or_else(|| PipelineError::UnknownMeasurement(sel.measurement.clone()))?
        .to_string();
    let cols = &prep.config.columns;

    let mut mode_spec = FilterSpec::new();
    match &sel.mode {
        AnalysisMode::Comparison {
            interval: Some(iv), ..
        } => {
            mode_spec.insert(cols.interval.clone(), Predicate::Equals(iv.clone()));
        }
        AnalysisMode::Comparison { interval: None, .. } => {}
        AnalysisMode::Trend { treatment } => {
            mode_spec.insert(cols.treatment.clone(), Predicate::Equals(treatment.clone()));
        }
    }
    let data = filter::apply(&filter::apply(&prep.table, &sel.filters), &mode_spec);
    if data.is_empty() {
        log::debug!("selection {sel:?} matched no rows");
        return Err(PipelineError::EmptyResultSet);
    }

    let facets = prep.facet_columns(sel);
    let series = prep.series_column();
    let mut notices = Vec::new();

    let (layout, body) = match &sel.mode {
        AnalysisMode::Comparison { interval, chart } => {
            let key = prep.group_key(&cols.treatment, sel);
            let scope = match interval {
                Some(iv) => format!("interval {iv} h"),
                None => "all intervals".to_string(),
            };
            let (title, body) = match chart {
                ChartKind::Bar => (
                    format!("{} – mean by treatment ({scope})", sel.measurement),
                    ChartBody::Bars(aggregate::aggregate(
                        &data,
                        &key,
                        &[raw],
                        Statistics::MeanAndStd,
                    )?),
                ),
                ChartKind::Box => (
                    format!("{} – distribution by treatment ({scope})", sel.measurement),
                    ChartBody::Boxes {
                        groups: aggregate::distributions(&data, &key, &raw)?,
                        key_columns: key,
                    },
                ),
            };
            (
                ChartLayout {
                    title,
                    primary: cols.treatment.clone(),
                    series,
                    facets,
                    measurement: sel.measurement.clone(),
                },
                body,
            )
        }
        AnalysisMode::Trend { treatment } => {
            let key = prep.group_key(&cols.interval, sel);
            let mut measurement = aggregate::aggregate(&data, &key, &[raw], Statistics::Mean)?;
            measurement.sort_by_numeric_key(&cols.interval);

            let env_cols = prep.environment_columns();
            let environment = if env_cols.is_empty() {
                notices.push("no temperature / humidity columns; environment charts skipped".to_string());
                None
            } else {
                let mut env = aggregate::aggregate(&data, &key, &env_cols, Statistics::Mean)?;
                env.sort_by_numeric_key(&cols.interval);
                Some(env)
            };
            (
                ChartLayout {
                    title: format!("{treatment} – {} over time", sel.measurement),
                    primary: cols.interval.clone(),
                    series,
                    facets,
                    measurement: sel.measurement.clone(),
                },
                ChartBody::Trend {
                    measurement,
                    environment,
                },
            )
        }
    };

    Ok(ChartOutput {
        layout,
        body,
        notices,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::data::columns::{FixedCandidate, ResolutionStrategy};
    use crate::data::model::Column;

    /// `[Treatment, Interval (h), CompoundA, CompoundB]`, 2 treatments ×
    /// intervals [0, 6] × 2 replicates, rows shuffled.
    fn scenario_table() -> Table {
        let rows = [
            ("T2", 6, 40.0, 1.0),
            ("T1", 6, 12.0, 1.0),
            ("T1", 0, 2.0, 1.0),
            ("T2", 0, 20.0, 1.0),
            ("T1", 6, 14.0, 1.0),
            ("T2", 6, 42.0, 1.0),
            ("T1", 0, 4.0, 1.0),
            ("T2", 0, 22.0, 1.0),
        ];
        Table::from_columns(vec![
            Column::new("Treatment", rows.iter().map(|r| r.0.into()).collect()),
            Column::new("Interval (h)", rows.iter().map(|r| CellValue::Integer(r.1)).collect()),
            Column::new("CompoundA", rows.iter().map(|r| CellValue::Float(r.2)).collect()),
            Column::new("CompoundB", rows.iter().map(|r| CellValue::Float(r.3)).collect()),
        ])
        .unwrap()
    }

    fn scenario_config() -> DashboardConfig {
        DashboardConfig {
            measurements: ResolutionStrategy::ExplicitList {
                candidates: vec!["CompoundA".into(), "CompoundB".into()],
            },
            ..DashboardConfig::default()
        }
    }

    fn with_metadata() -> Table {
        let base = scenario_table();
        let mut cols: Vec<Column> = base.columns().to_vec();
        cols.push(Column::new(
            "Chamber",
            ["C1", "C2"].iter().cycle().take(8).map(|&c| c.into()).collect(),
        ));
        cols.push(Column::new(
            "Progress",
            ["early", "early", "late", "late"].iter().cycle().take(8).map(|&c| c.into()).collect(),
        ));
        Table::from_columns(cols).unwrap()
    }

    #[test]
    fn comparison_over_all_intervals() {
        let prep = prepare(scenario_table(), &scenario_config()).unwrap();
        let mut sel = prep.default_selection();
        sel.measurement = "CompoundA".into();

        let out = run(&prep, &sel).unwrap();
        let ChartBody::Bars(res) = out.body else {
            panic!("expected bars");
        };
        assert_eq!(res.rows.len(), 2);
        assert!(res.rows.iter().all(|r| r.rows == 4 && r.summaries[0].n == 4));
        assert_eq!(res.rows[0].key[0], CellValue::from("T1"));
        assert!((res.rows[0].summaries[0].mean - 8.0).abs() < 1e-12);
        assert_eq!(out.layout.series, None);
    }

    #[test]
    fn comparison_at_one_interval() {
        let prep = prepare(scenario_table(), &scenario_config()).unwrap();
        let mut sel = prep.default_selection();
        sel.mode = AnalysisMode::Comparison {
            interval: Some(CellValue::Integer(6)),
            chart: ChartKind::Bar,
        };
        let ChartBody::Bars(res) = run(&prep, &sel).unwrap().body else {
            panic!("expected bars");
        };
        assert!(res.rows.iter().all(|r| r.rows == 2));
        assert!((res.rows[1].summaries[0].mean - 41.0).abs() < 1e-12);
    }

    #[test]
    fn trend_for_one_treatment_is_ordered() {
        let prep = prepare(scenario_table(), &scenario_config()).unwrap();
        let mut sel = prep.default_selection();
        sel.mode = AnalysisMode::Trend {
            treatment: "T1".into(),
        };

        let out = run(&prep, &sel).unwrap();
        let ChartBody::Trend {
            measurement,
            environment,
        } = out.body
        else {
            panic!("expected trend");
        };
        let intervals: Vec<f64> = measurement.rows.iter().filter_map(|r| r.key[0].to_numeric()).collect();
        assert_eq!(intervals, vec![0.0, 6.0]);
        assert!(measurement.rows.iter().all(|r| r.rows == 2));
        assert!((measurement.rows[0].summaries[0].mean - 3.0).abs() < 1e-12);
        assert!(measurement.rows[0].summaries[0].std.is_none());
        assert!(environment.is_none());
        assert_eq!(out.notices.len(), 1);
    }

    #[test]
    fn box_chart_hands_over_raw_values() {
        let prep = prepare(scenario_table(), &scenario_config()).unwrap();
        let mut sel = prep.default_selection();
        sel.mode = AnalysisMode::Comparison {
            interval: None,
            chart: ChartKind::Box,
        };
        let ChartBody::Boxes { groups, key_columns } = run(&prep, &sel).unwrap().body else {
            panic!("expected boxes");
        };
        assert_eq!(key_columns, vec!["Treatment".to_string()]);
        assert_eq!(groups.iter().map(|g| g.1.len()).sum::<usize>(), 8);
    }

    #[test]
    fn facets_and_progress_extend_the_key() {
        let prep = prepare(with_metadata(), &scenario_config()).unwrap();
        let mut sel = prep.default_selection();
        sel.facet_by_chamber = true;
        sel.facet_by_line = true;

        let out = run(&prep, &sel).unwrap();
        assert_eq!(out.layout.facets, vec!["Chamber".to_string()]);
        assert_eq!(out.layout.series.as_deref(), Some("Progress"));
        let ChartBody::Bars(res) = out.body else {
            panic!("expected bars");
        };
        assert_eq!(res.key_columns, vec!["Treatment", "Progress", "Chamber"]);
        assert_eq!(res.total_rows(), 8);
    }

    #[test]
    fn untouched_filters_keep_all_rows() {
        let prep = prepare(with_metadata(), &scenario_config()).unwrap();
        let sel = prep.default_selection();
        assert_eq!(sel.filters.get("Progress"), Some(&Predicate::Any));
        let ChartBody::Bars(res) = run(&prep, &sel).unwrap().body else {
            panic!("expected bars");
        };
        assert_eq!(res.total_rows(), 8);
    }

    #[test]
    fn empty_selection_is_reported() {
        let prep = prepare(with_metadata(), &scenario_config()).unwrap();
        let mut sel = prep.default_selection();
        sel.filters
            .insert("Progress".into(), Predicate::OneOf(BTreeSet::new()));
        assert_eq!(run(&prep, &sel).unwrap_err(), PipelineError::EmptyResultSet);
    }

    #[test]
    fn unknown_measurement_is_reported() {
        let prep = prepare(scenario_table(), &scenario_config()).unwrap();
        let mut sel = prep.default_selection();
        sel.measurement = "Nope".into();
        assert!(matches!(run(&prep, &sel), Err(PipelineError::UnknownMeasurement(_))));
    }

    #[test]
    fn missing_interval_column_is_fatal() {
        let t = Table::from_columns(vec![
            Column::new("Treatment", vec!["T1".into()]),
            Column::new("CompoundA", vec![CellValue::Float(1.0)]),
        ])
        .unwrap();
        let err = prepare(t, &scenario_config()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingRequiredColumn { ref column, .. } if column == "Interval (h)"));
    }

    #[test]
    fn empty_explicit_list_halts() {
        let cfg = DashboardConfig {
            measurements: ResolutionStrategy::ExplicitList {
                candidates: vec!["MeSA".into()],
            },
            ..DashboardConfig::default()
        };
        let err = prepare(scenario_table(), &cfg).unwrap_err();
        assert_eq!(
            err,
            PipelineError::NoMeasurementColumns {
                expected: vec!["MeSA".into()]
            }
        );
    }

    #[test]
    fn fixed_set_failure_stops_preparation() {
        let cfg = DashboardConfig {
            measurements: ResolutionStrategy::FixedSet {
                candidates: vec![FixedCandidate::new("CompoundA", &[]), FixedCandidate::new("MeJA", &[])],
            },
            ..DashboardConfig::default()
        };
        assert!(matches!(
            prepare(scenario_table(), &cfg),
            Err(PipelineError::IncompleteResolution { .. })
        ));
    }

    #[test]
    fn coverage_and_layout_notices() {
        let prep = prepare(scenario_table(), &scenario_config()).unwrap();
        assert_eq!(prep.coverage.missing.len(), 9);
        assert_eq!(prep.notices.len(), 2);
        assert_eq!(prep.intervals, vec![CellValue::Integer(0), CellValue::Integer(6)]);
        assert_eq!(prep.treatments.len(), 2);
    }
}
