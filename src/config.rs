use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::aggregate::EXPECTED_INTERVALS;
use crate::data::columns::ResolutionStrategy;
use crate::data::options::FilterKind;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV_VAR: &str = "VOC_DASHBOARD_CONFIG";

// ---------------------------------------------------------------------------
// Dashboard configuration
// ---------------------------------------------------------------------------

/// Column names of the experiment sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub treatment: String,
    pub interval: String,
    pub chamber: String,
    pub line: String,
    pub progress: String,
    pub temperature: String,
    pub humidity: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            treatment: "Treatment".into(),
            interval: "Interval (h)".into(),
            chamber: "Chamber".into(),
            line: "Line".into(),
            progress: "Progress".into(),
            temperature: "Temp (℃)".into(),
            humidity: "Humid (%)".into(),
        }
    }
}

/// Everything the pipeline needs to know about a sheet layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub columns: ColumnNames,
    /// How the VOC measurement columns are located.
    pub measurements: ResolutionStrategy,
    /// Raw header → name shown in the UI.
    pub display_aliases: BTreeMap<String, String>,
    /// Widget kind per metadata column, in sidebar order.
    pub filters: Vec<(String, FilterKind)>,
    /// Sampling checkpoints (hours) the experiment is expected to cover.
    pub expected_intervals: Vec<f64>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let columns = ColumnNames::default();
        let filters = vec![
            (columns.chamber.clone(), FilterKind::Single),
            (columns.line.clone(), FilterKind::Single),
            (columns.progress.clone(), FilterKind::Multi),
        ];
        Self {
            columns,
            measurements: ResolutionStrategy::RangeScan {
                start_markers: strings(&["trans-nerolidol", "t-nerolidol", "(+/-)-nerolidol", "nerolidol"]),
                end_markers: strings(&["xylenes+ethylbenzene", "xylenes + ethylbenzene", "xylenesethylbenzene"]),
            },
            display_aliases: BTreeMap::new(),
            filters,
            expected_intervals: EXPECTED_INTERVALS.to_vec(),
        }
    }
}

impl DashboardConfig {
    /// The short hand-picked VOC list with `Methyl jasmonate` shown as `MeJA`.
    pub fn explicit_voc_list() -> Self {
        Self {
            measurements: ResolutionStrategy::ExplicitList {
                candidates: strings(&[
                    "z-3-hexenal",
                    "z-3-hexenol",
                    "z-3-hexenyl acetate",
                    "nerolidol",
                    "DMNT",
                    "MeSA",
                    "Methyl jasmonate",
                    "MeJA",
                ]),
            },
            display_aliases: BTreeMap::from([("Methyl jasmonate".to_string(), "MeJA".to_string())]),
            ..Self::default()
        }
    }

    /// Read a JSON config; missing keys take their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Config from `$VOC_DASHBOARD_CONFIG`, falling back to the defaults.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV_VAR) else {
            return Self::default();
        };
        match Self::from_path(Path::new(&path)) {
            Ok(cfg) => {
                log::info!("using config {}", Path::new(&path).display());
                cfg
            }
            Err(e) => {
                log::error!("Failed to load config, using defaults: {e:#}");
                Self::default()
            }
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::data::columns::{resolve, FixedCandidate};
    use crate::data::model::{CellValue, Column, Table};

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "columns": {{ "interval": "Hours" }},
                "measurements": {{
                    "kind": "fixed_set",
                    "candidates": [{{ "name": "MeJA", "aliases": ["Methyl jasmonate"] }}, {{ "name": "DMNT" }}]
                }}
            }}"#
        )
        .unwrap();

        let cfg = DashboardConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.columns.interval, "Hours");
        assert_eq!(cfg.columns.treatment, "Treatment");
        assert_eq!(
            cfg.measurements,
            ResolutionStrategy::FixedSet {
                candidates: vec![
                    FixedCandidate::new("MeJA", &["Methyl jasmonate"]),
                    FixedCandidate::new("DMNT", &[]),
                ]
            }
        );
        assert_eq!(cfg.expected_intervals.len(), 11);
        assert_eq!(cfg.filters[2], ("Progress".to_string(), FilterKind::Multi));
    }

    #[test]
    fn bad_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(DashboardConfig::from_path(file.path()).is_err());
    }

    #[test]
    fn defaults_round_trip_through_json() {
        let cfg = DashboardConfig::explicit_voc_list();
        let text = serde_json::to_string(&cfg).unwrap();
        let back: DashboardConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn voc_list_keeps_both_jasmonate_spellings_selectable() {
        let cfg = DashboardConfig::explicit_voc_list();
        let ResolutionStrategy::ExplicitList { candidates } = &cfg.measurements else {
            panic!("expected an explicit list");
        };
        let columns = candidates
            .iter()
            .map(|name| Column::new(name.as_str(), vec![CellValue::Float(1.0)]))
            .collect();
        let table = Table::from_columns(columns).unwrap();

        let resolved = resolve(&table, &cfg.measurements, &cfg.display_aliases).unwrap();
        assert_eq!(resolved.len(), 8);
        assert_eq!(resolved.raw_for("MeJA"), Some("Methyl jasmonate"));
        assert_eq!(resolved.display_for("MeJA"), Some("MeJA (8)"));
        assert_eq!(resolved.raw_for("MeJA (8)"), Some("MeJA"));
    }
}
