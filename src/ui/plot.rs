use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::{Column as TableColumn, TableBuilder};
use egui_plot::{
    Bar, BarChart, BoxElem, BoxPlot, BoxSpread, GridInput, GridMark, Legend, Line, Plot, PlotPoints,
    Points,
};

use crate::color::SeriesColors;
use crate::data::aggregate::{AggregationResult, Summary};
use crate::data::error::PipelineError;
use crate::data::model::CellValue;
use crate::data::pipeline::{ChartBody, ChartLayout, ChartOutput, PreparedTable};
use crate::state::AppState;

const PLOT_HEIGHT: f32 = 280.0;
const GROUP_WIDTH: f64 = 0.8;
const NOTICE_COLOR: Color32 = Color32::from_rgb(230, 190, 80);

// ---------------------------------------------------------------------------
// Central panel
// ---------------------------------------------------------------------------

/// Render notices, the chart for the current selection and the raw table.
pub fn central_panel(ui: &mut Ui, state: &AppState) {
    let prepared = match &state.prepared {
        Some(p) => p,
        None => {
            ui.centered_and_justified(|ui: &mut Ui| {
                ui.heading("Open a file to view VOC data  (File → Open…)");
            });
            return;
        }
    };

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            for note in &prepared.notices {
                ui.label(RichText::new(format!("ℹ {note}")).color(NOTICE_COLOR));
            }

            match &state.output {
                Some(Ok(out)) => chart(ui, out, &state.series_colors, &prepared.config.expected_intervals),
                Some(Err(PipelineError::EmptyResultSet)) => {
                    ui.add_space(24.0);
                    ui.vertical_centered(|ui: &mut Ui| {
                        ui.heading("No rows match the current filters.");
                    });
                    ui.add_space(24.0);
                }
                Some(Err(e)) => {
                    ui.label(RichText::new(format!("Error: {e}")).color(Color32::RED));
                }
                None => {}
            }

            ui.separator();
            raw_table(ui, prepared);
        });
}

fn chart(ui: &mut Ui, out: &ChartOutput, colors: &SeriesColors, expected_intervals: &[f64]) {
    for note in &out.notices {
        ui.label(RichText::new(format!("ℹ {note}")).color(NOTICE_COLOR));
    }
    ui.heading(&out.layout.title);
    let n_rows = match &out.body {
        ChartBody::Bars(res) | ChartBody::Trend { measurement: res, .. } => res.total_rows(),
        ChartBody::Boxes { groups, .. } => groups.iter().map(|(_, v)| v.len()).sum(),
    };
    ui.label(RichText::new(format!("{n_rows} observations")).weak());

    match &out.body {
        ChartBody::Bars(res) => bar_panels(ui, &out.layout, res, colors),
        ChartBody::Boxes { key_columns, groups } => {
            box_panels(ui, &out.layout, key_columns, groups, colors)
        }
        ChartBody::Trend {
            measurement,
            environment,
        } => {
            let voc_label = format!("{} (ppb)", out.layout.measurement);
            trend_panels(ui, "trend", &out.layout, measurement, 0, &voc_label, colors, expected_intervals);
            if let Some(env) = environment {
                for (i, col) in env.measurement_columns.iter().enumerate() {
                    ui.add_space(8.0);
                    ui.strong(format!("{col} over time"));
                    trend_panels(ui, &format!("env_{i}"), &out.layout, env, i, col, colors, expected_intervals);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Facets + series helpers
// ---------------------------------------------------------------------------

type Keyed<'a, T> = Vec<(&'a [CellValue], T)>;

/// Split keyed items into one panel per combination of facet values.
fn by_facet<'a, T>(
    key_columns: &[String],
    facets: &[String],
    items: impl IntoIterator<Item = (&'a [CellValue], T)>,
) -> BTreeMap<Vec<CellValue>, Keyed<'a, T>> {
    let idx: Vec<usize> = facets
        .iter()
        .filter_map(|f| key_columns.iter().position(|k| k == f))
        .collect();
    let mut panels: BTreeMap<Vec<CellValue>, Keyed<'a, T>> = BTreeMap::new();
    for (key, item) in items {
        let facet_key = idx.iter().map(|&i| key[i].clone()).collect();
        panels.entry(facet_key).or_default().push((key, item));
    }
    panels
}

fn panel_label(facets: &[String], values: &[CellValue]) -> String {
    facets
        .iter()
        .zip(values)
        .map(|(f, v)| format!("{f} = {v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn distinct_at(keys: impl Iterator<Item = CellValue>) -> Vec<CellValue> {
    keys.collect::<BTreeSet<_>>().into_iter().collect()
}

fn series_name(layout: &ChartLayout, value: &CellValue) -> String {
    match &layout.series {
        Some(col) => format!("{col}: {value}"),
        None => layout.measurement.clone(),
    }
}

fn series_color(has_series: bool, colors: &SeriesColors, value: &CellValue) -> Color32 {
    if has_series {
        colors.color_for(value)
    } else {
        Color32::LIGHT_BLUE
    }
}

/// x position of series `s` out of `n` within category `c`.
fn grouped_x(c: usize, s: usize, n: usize) -> f64 {
    let width = GROUP_WIDTH / n as f64;
    c as f64 + (s as f64 - (n as f64 - 1.0) / 2.0) * width
}

/// Tick labels for integer x positions naming categories.
fn category_axis(labels: Vec<String>) -> impl Fn(GridMark, &RangeInclusive<f64>) -> String + 'static {
    move |mark: GridMark, _range: &RangeInclusive<f64>| {
        let nearest = mark.value.round();
        if (mark.value - nearest).abs() > 1e-6 || nearest < 0.0 {
            return String::new();
        }
        labels.get(nearest as usize).cloned().unwrap_or_default()
    }
}

/// Grid lines and tick labels only at the expected sampling checkpoints.
fn checkpoint_grid(expected: Vec<f64>) -> impl Fn(GridInput) -> Vec<GridMark> + 'static {
    move |input: GridInput| {
        let (lo, hi) = input.bounds;
        expected
            .iter()
            .copied()
            .filter(|x| (lo..=hi).contains(x))
            .map(|value| GridMark {
                value,
                step_size: input.base_step_size * 10.0,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Bar chart (mean ± std)
// ---------------------------------------------------------------------------

fn bar_panels(ui: &mut Ui, layout: &ChartLayout, res: &AggregationResult, colors: &SeriesColors) {
    let primary = res.key_index(&layout.primary);
    let series_idx = layout.series.as_deref().and_then(|s| res.key_index(s));
    let categories = distinct_at(res.rows.iter().filter_map(|r| primary.map(|i| r.key[i].clone())));
    let series_vals = match series_idx {
        Some(i) => distinct_at(res.rows.iter().map(|r| r.key[i].clone())),
        None => vec![CellValue::Null],
    };
    let n_series = series_vals.len().max(1);
    let bar_width = GROUP_WIDTH / n_series as f64 * 0.95;

    let panels = by_facet(
        &res.key_columns,
        &layout.facets,
        res.rows.iter().map(|r| (r.key.as_slice(), r.summaries[0])),
    );

    for (p, (facet_vals, items)) in panels.iter().enumerate() {
        if !layout.facets.is_empty() {
            ui.strong(panel_label(&layout.facets, facet_vals));
        }
        let labels = categories.iter().map(|c| c.to_string()).collect();
        Plot::new(format!("bars_{p}"))
            .height(PLOT_HEIGHT)
            .legend(Legend::default())
            .x_axis_label(layout.primary.clone())
            .y_axis_label(format!("{} (ppb)", layout.measurement))
            .x_axis_formatter(category_axis(labels))
            .show(ui, |plot_ui| {
                for (s, sv) in series_vals.iter().enumerate() {
                    let color = series_color(series_idx.is_some(), colors, sv);
                    let mut bars = Vec::new();
                    let mut whiskers = Vec::new();
                    let in_series = items
                        .iter()
                        .filter(|(key, _)| series_idx.map_or(true, |i| &key[i] == sv));
                    for (key, summary) in in_series {
                        let Some(c) = primary.and_then(|i| categories.iter().position(|v| *v == key[i]))
                        else {
                            continue;
                        };
                        let Summary { mean, std, .. } = *summary;
                        if mean.is_nan() {
                            continue;
                        }
                        let x = grouped_x(c, s, n_series);
                        bars.push(Bar::new(x, mean).width(bar_width));
                        if let Some(sd) = std.filter(|v| v.is_finite()) {
                            whiskers.push([[x, mean - sd], [x, mean + sd]]);
                        }
                    }
                    plot_ui.bar_chart(BarChart::new(bars).color(color).name(series_name(layout, sv)));
                    for segment in whiskers {
                        plot_ui.line(
                            Line::new(PlotPoints::from(segment.to_vec()))
                                .color(Color32::from_gray(200))
                                .width(1.5),
                        );
                    }
                }
            });
    }
}

// ---------------------------------------------------------------------------
// Box plot
// ---------------------------------------------------------------------------

/// Tukey box: quartiles by linear interpolation, whiskers at the most
/// extreme values within 1.5 IQR.
#[derive(Debug, Clone, PartialEq)]
struct BoxStats {
    lower_whisker: f64,
    q1: f64,
    median: f64,
    q3: f64,
    upper_whisker: f64,
    outliers: Vec<f64>,
}

fn box_stats(values: &[f64]) -> Option<BoxStats> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let quantile = |p: f64| {
        let pos = p * (sorted.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
    };
    let (q1, median, q3) = (quantile(0.25), quantile(0.5), quantile(0.75));
    let iqr = q3 - q1;
    let (lo_fence, hi_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    let inside = sorted.iter().copied().filter(|v| (lo_fence..=hi_fence).contains(v));
    let lower_whisker = inside.clone().fold(f64::INFINITY, f64::min);
    let upper_whisker = inside.fold(f64::NEG_INFINITY, f64::max);
    let outliers = sorted
        .iter()
        .copied()
        .filter(|v| !(lo_fence..=hi_fence).contains(v))
        .collect();
    Some(BoxStats {
        lower_whisker,
        q1,
        median,
        q3,
        upper_whisker,
        outliers,
    })
}

fn box_panels(
    ui: &mut Ui,
    layout: &ChartLayout,
    key_columns: &[String],
    groups: &[(Vec<CellValue>, Vec<f64>)],
    colors: &SeriesColors,
) {
    let position = |col: &str| key_columns.iter().position(|k| k == col);
    let primary = position(&layout.primary);
    let series_idx = layout.series.as_deref().and_then(position);
    let categories = distinct_at(groups.iter().filter_map(|(k, _)| primary.map(|i| k[i].clone())));
    let series_vals = match series_idx {
        Some(i) => distinct_at(groups.iter().map(|(k, _)| k[i].clone())),
        None => vec![CellValue::Null],
    };
    let n_series = series_vals.len().max(1);
    let box_width = GROUP_WIDTH / n_series as f64 * 0.9;

    let panels = by_facet(
        key_columns,
        &layout.facets,
        groups.iter().map(|(k, v)| (k.as_slice(), v.as_slice())),
    );

    for (p, (facet_vals, items)) in panels.iter().enumerate() {
        if !layout.facets.is_empty() {
            ui.strong(panel_label(&layout.facets, facet_vals));
        }
        let labels = categories.iter().map(|c| c.to_string()).collect();
        Plot::new(format!("boxes_{p}"))
            .height(PLOT_HEIGHT)
            .legend(Legend::default())
            .x_axis_label(layout.primary.clone())
            .y_axis_label(format!("{} (ppb)", layout.measurement))
            .x_axis_formatter(category_axis(labels))
            .show(ui, |plot_ui| {
                for (s, sv) in series_vals.iter().enumerate() {
                    let color = series_color(series_idx.is_some(), colors, sv);
                    let mut boxes = Vec::new();
                    let mut outliers = Vec::new();
                    let in_series = items
                        .iter()
                        .filter(|(key, _)| series_idx.map_or(true, |i| &key[i] == sv));
                    for (key, values) in in_series {
                        let Some(c) = primary.and_then(|i| categories.iter().position(|v| *v == key[i]))
                        else {
                            continue;
                        };
                        let Some(stats) = box_stats(values) else {
                            continue;
                        };
                        let x = grouped_x(c, s, n_series);
                        boxes.push(
                            BoxElem::new(
                                x,
                                BoxSpread::new(
                                    stats.lower_whisker,
                                    stats.q1,
                                    stats.median,
                                    stats.q3,
                                    stats.upper_whisker,
                                ),
                            )
                            .box_width(box_width)
                            .whisker_width(box_width * 0.5),
                        );
                        outliers.extend(stats.outliers.iter().map(|&y| [x, y]));
                    }
                    plot_ui.box_plot(BoxPlot::new(boxes).color(color).name(series_name(layout, sv)));
                    if !outliers.is_empty() {
                        plot_ui.points(Points::new(PlotPoints::from(outliers)).color(color).radius(2.5));
                    }
                }
            });
    }
}

// ---------------------------------------------------------------------------
// Trend lines
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn trend_panels(
    ui: &mut Ui,
    id: &str,
    layout: &ChartLayout,
    res: &AggregationResult,
    measure: usize,
    y_label: &str,
    colors: &SeriesColors,
    expected_intervals: &[f64],
) {
    let primary = res.key_index(&layout.primary);
    let series_idx = layout.series.as_deref().and_then(|s| res.key_index(s));

    let panels = by_facet(
        &res.key_columns,
        &layout.facets,
        res.rows.iter().map(|r| (r.key.as_slice(), r.summaries[measure])),
    );

    for (p, (facet_vals, items)) in panels.iter().enumerate() {
        if !layout.facets.is_empty() {
            ui.strong(panel_label(&layout.facets, facet_vals));
        }

        // Rows arrive sorted by interval, so each series is already ordered.
        let mut series: BTreeMap<CellValue, Vec<[f64; 2]>> = BTreeMap::new();
        for (key, summary) in items {
            let Some(x) = primary.and_then(|i| key[i].to_numeric()) else {
                continue;
            };
            if summary.mean.is_nan() {
                continue;
            }
            let sv = series_idx.map_or(CellValue::Null, |i| key[i].clone());
            series.entry(sv).or_default().push([x, summary.mean]);
        }

        Plot::new(format!("{id}_{p}"))
            .height(PLOT_HEIGHT)
            .legend(Legend::default())
            .x_axis_label(layout.primary.clone())
            .y_axis_label(y_label.to_string())
            .x_grid_spacer(checkpoint_grid(expected_intervals.to_vec()))
            .show(ui, |plot_ui| {
                for (sv, pts) in series {
                    let color = series_color(series_idx.is_some(), colors, &sv);
                    plot_ui.line(
                        Line::new(PlotPoints::from(pts.clone()))
                            .name(series_name(layout, &sv))
                            .color(color)
                            .width(1.5),
                    );
                    plot_ui.points(Points::new(PlotPoints::from(pts)).color(color).radius(3.0));
                }
            });
    }
}

// ---------------------------------------------------------------------------
// Raw data
// ---------------------------------------------------------------------------

/// The loaded rows, with measurement headers shown under their display names.
fn raw_table(ui: &mut Ui, prepared: &PreparedTable) {
    let table = &prepared.table;
    egui::CollapsingHeader::new(RichText::new("Raw data").strong())
        .id_salt("raw_data")
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            let cols = table.columns();
            ScrollArea::horizontal().id_salt("raw_data_scroll").show(ui, |ui: &mut Ui| {
                TableBuilder::new(ui)
                    .striped(true)
                    .vscroll(true)
                    .max_scroll_height(320.0)
                    .columns(TableColumn::auto().at_least(60.0), cols.len())
                    .header(20.0, |mut header| {
                        for c in cols {
                            header.col(|ui: &mut Ui| {
                                let name = prepared.measurements.display_for(&c.name).unwrap_or(c.name.as_str());
                                ui.strong(name);
                            });
                        }
                    })
                    .body(|body| {
                        body.rows(18.0, table.n_rows(), |mut row| {
                            let i = row.index();
                            for c in cols {
                                row.col(|ui: &mut Ui| {
                                    if let Some(v) = table.value(i, &c.name).filter(|v| !v.is_null()) {
                                        ui.label(v.to_string());
                                    }
                                });
                            }
                        });
                    });
            });
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_stats_uses_tukey_fences() {
        let stats = box_stats(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_eq!(stats.q1, 2.0);
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.q3, 4.0);
        assert_eq!(stats.lower_whisker, 1.0);
        assert_eq!(stats.upper_whisker, 4.0);
        assert_eq!(stats.outliers, vec![100.0]);
    }

    #[test]
    fn box_stats_of_nothing() {
        assert!(box_stats(&[]).is_none());
        assert!(box_stats(&[f64::NAN]).is_none());
        let single = box_stats(&[5.0]).unwrap();
        assert_eq!((single.q1, single.median, single.upper_whisker), (5.0, 5.0, 5.0));
    }

    #[test]
    fn grouped_positions_are_centred() {
        assert_eq!(grouped_x(2, 0, 1), 2.0);
        let left = grouped_x(0, 0, 2);
        let right = grouped_x(0, 1, 2);
        assert!((left + right).abs() < 1e-12);
        assert!(left < right);
    }

    #[test]
    fn facets_split_keyed_items() {
        let keys = vec![
            vec![CellValue::from("T1"), CellValue::from("C1")],
            vec![CellValue::from("T2"), CellValue::from("C2")],
            vec![CellValue::from("T2"), CellValue::from("C1")],
        ];
        let key_columns = vec!["Treatment".to_string(), "Chamber".to_string()];
        let facets = vec!["Chamber".to_string()];
        let panels = by_facet(&key_columns, &facets, keys.iter().map(|k| (k.as_slice(), ())));
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[&vec![CellValue::from("C1")]].len(), 2);
        assert_eq!(panel_label(&facets, &[CellValue::from("C1")]), "Chamber = C1");
    }

    #[test]
    fn trend_ticks_sit_on_checkpoints() {
        let spacer = checkpoint_grid(vec![-1.0, 0.0, 6.0, 12.0, 24.0]);
        let marks = spacer(GridInput {
            bounds: (-0.5, 13.0),
            base_step_size: 0.5,
        });
        let values: Vec<f64> = marks.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![0.0, 6.0, 12.0]);
        assert!(marks.iter().all(|m| m.step_size == 5.0));
    }

    #[test]
    fn category_axis_labels_integer_marks_only() {
        let fmt = category_axis(vec!["T1".into(), "T2".into()]);
        let range = 0.0..=1.0;
        let mark = |value| GridMark {
            value,
            step_size: 1.0,
        };
        assert_eq!(fmt(mark(1.0), &range), "T2");
        assert_eq!(fmt(mark(0.5), &range), "");
        assert_eq!(fmt(mark(3.0), &range), "");
    }
}
