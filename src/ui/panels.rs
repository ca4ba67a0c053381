use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use crate::data::filter::Predicate;
use crate::data::model::CellValue;
use crate::data::options::{Choice, FilterField, FilterKind};
use crate::data::pipeline::{AnalysisMode, ChartKind};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – filter and analysis widgets
// ---------------------------------------------------------------------------

/// Render the left options panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Analysis options");
    ui.separator();

    let (prepared, selection) = match (&state.prepared, &state.selection) {
        (Some(p), Some(s)) => (p, s),
        _ => {
            ui.label("No dataset loaded.");
            return;
        }
    };

    // Clone what we need so we can mutate state inside the widgets.
    let fields = prepared.filters.clone();
    let measurements: Vec<String> = prepared
        .measurements
        .display_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let treatments = prepared.treatments.clone();
    let intervals = prepared.intervals.clone();
    let sel = selection.clone();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            // ---- Metadata filters ----
            for field in &fields {
                if !field.is_available() {
                    ui.label(RichText::new(format!("{}: not in file", field.column)).weak());
                    continue;
                }
                let current = sel.filters.get(&field.column).cloned().unwrap_or_default();
                match field.kind {
                    FilterKind::Single => single_filter(ui, state, field, &current),
                    FilterKind::Multi => multi_filter(ui, state, field, &current),
                }
            }
            ui.separator();

            // ---- Mode ----
            ui.strong("Analysis mode");
            let trend = matches!(sel.mode, AnalysisMode::Trend { .. });
            if ui.radio(!trend, "Compare treatments").clicked() && trend {
                state.set_trend_mode(false);
            }
            if ui.radio(trend, "Change over time").clicked() && !trend {
                state.set_trend_mode(true);
            }
            ui.add_space(4.0);

            // ---- Measurement ----
            ui.strong("VOC");
            egui::ComboBox::from_id_salt("measurement")
                .selected_text(&sel.measurement)
                .show_ui(ui, |ui: &mut Ui| {
                    for name in &measurements {
                        if ui.selectable_label(sel.measurement == *name, name).clicked() {
                            let name = name.clone();
                            state.update_selection(|s| s.measurement = name);
                        }
                    }
                });
            ui.add_space(4.0);

            // ---- Facets ----
            let mut by_chamber = sel.facet_by_chamber;
            if ui.checkbox(&mut by_chamber, "Split by chamber").changed() {
                state.update_selection(|s| s.facet_by_chamber = by_chamber);
            }
            let mut by_line = sel.facet_by_line;
            if ui.checkbox(&mut by_line, "Split by line").changed() {
                state.update_selection(|s| s.facet_by_line = by_line);
            }
            ui.separator();

            // ---- Mode-specific controls ----
            match &sel.mode {
                AnalysisMode::Comparison { interval, chart } => {
                    ui.strong("Chart type");
                    for (kind, label) in [(ChartKind::Bar, "Bar (mean ± SD)"), (ChartKind::Box, "Box plot")] {
                        if ui.radio(*chart == kind, label).clicked() {
                            let interval = interval.clone();
                            state.update_selection(|s| {
                                s.mode = AnalysisMode::Comparison {
                                    interval,
                                    chart: kind,
                                }
                            });
                        }
                    }
                    ui.add_space(4.0);

                    ui.strong("Interval (h)");
                    let shown = interval
                        .as_ref()
                        .map_or_else(|| "All".to_string(), CellValue::to_string);
                    egui::ComboBox::from_id_salt("interval")
                        .selected_text(shown)
                        .show_ui(ui, |ui: &mut Ui| {
                            let options = std::iter::once(None).chain(intervals.iter().cloned().map(Some));
                            for option in options {
                                let label = option.as_ref().map_or_else(|| "All".to_string(), CellValue::to_string);
                                if ui.selectable_label(*interval == option, label).clicked() {
                                    let chart = *chart;
                                    state.update_selection(|s| {
                                        s.mode = AnalysisMode::Comparison {
                                            interval: option,
                                            chart,
                                        }
                                    });
                                }
                            }
                        });
                }
                AnalysisMode::Trend { treatment } => {
                    ui.strong("Treatment");
                    egui::ComboBox::from_id_salt("treatment")
                        .selected_text(treatment.to_string())
                        .show_ui(ui, |ui: &mut Ui| {
                            for t in &treatments {
                                if ui.selectable_label(treatment == t, t.to_string()).clicked() {
                                    let t = t.clone();
                                    state.update_selection(|s| s.mode = AnalysisMode::Trend { treatment: t });
                                }
                            }
                        });
                }
            }
        });
}

fn single_filter(ui: &mut Ui, state: &mut AppState, field: &FilterField, current: &Predicate) {
    let current_choice = match current {
        Predicate::Equals(v) => Choice::Value(v.clone()),
        _ => Choice::All,
    };
    let label = |c: &Choice| match c {
        Choice::All => "All".to_string(),
        Choice::Value(v) => v.to_string(),
    };

    ui.strong(&field.column);
    egui::ComboBox::from_id_salt(format!("filter_{}", field.column))
        .selected_text(label(&current_choice))
        .show_ui(ui, |ui: &mut Ui| {
            for choice in field.choices() {
                if ui
                    .selectable_label(choice == current_choice, label(&choice))
                    .clicked()
                {
                    state.set_single_filter(&field.column, choice);
                }
            }
        });
    ui.add_space(4.0);
}

fn multi_filter(ui: &mut Ui, state: &mut AppState, field: &FilterField, current: &Predicate) {
    let selected = field.selected(current);
    let n_selected = field.values.iter().filter(|v| selected.contains(*v)).count();
    let header_text = format!("{}  ({n_selected}/{})", field.column, field.values.len());

    egui::CollapsingHeader::new(RichText::new(header_text).strong())
        .id_salt(&field.column)
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                if ui.small_button("All").clicked() {
                    state.select_all(&field.column);
                }
                if ui.small_button("None").clicked() {
                    state.select_none(&field.column);
                }
            });
            for val in &field.values {
                let mut checked = selected.contains(val);
                if ui.checkbox(&mut checked, val.to_string()).changed() {
                    state.toggle_filter_value(&field.column, val);
                }
            }
        });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        if let Some(prep) = &state.prepared {
            ui.label(format!(
                "{} rows loaded, {} VOC columns",
                prep.table.n_rows(),
                prep.measurements.len()
            ));
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialog
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open VOC data")
        .add_filter("Supported files", &["xlsx", "xlsm", "xls", "ods", "csv", "json", "parquet", "pq"])
        .add_filter("Spreadsheet", &["xlsx", "xlsm", "xls", "ods"])
        .add_filter("CSV", &["csv"])
        .add_filter("JSON", &["json"])
        .add_filter("Parquet", &["parquet", "pq"])
        .pick_file();

    if let Some(path) = file {
        state.load_path(&path);
    }
}
