use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::error::{MarkerKind, PipelineError};
use super::model::Table;

/// How many column names are echoed back when a marker cannot be found.
const SEEN_COLUMNS_IN_ERRORS: usize = 40;

// ---------------------------------------------------------------------------
// Strategy + descriptors
// ---------------------------------------------------------------------------

/// How the measurement (VOC) columns of a table are discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the candidates present in the table, in candidate order.
    ExplicitList { candidates: Vec<String> },
    /// Every candidate must resolve, either by name or through one of its
    /// alternate spellings.
    FixedSet { candidates: Vec<FixedCandidate> },
    /// Every numeric column between the first start marker and the first
    /// end marker (inclusive), matched on normalised names.
    RangeScan {
        start_markers: Vec<String>,
        end_markers: Vec<String>,
    },
}

/// A required measurement column with its accepted alternate raw names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedCandidate {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl FixedCandidate {
    pub fn new(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// A resolved measurement column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Name as it appears in the table header.
    pub raw: String,
    /// Human-facing name when it differs from `raw`.
    pub display: Option<String>,
}

impl ColumnDescriptor {
    pub fn display_name(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.raw)
    }
}

/// The ordered measurement columns plus the raw ↔ display mapping.
#[derive(Debug, Clone, Default)]
pub struct ResolvedColumns {
    pub descriptors: Vec<ColumnDescriptor>,
    to_display: BTreeMap<String, String>,
    to_raw: BTreeMap<String, String>,
}

impl ResolvedColumns {
    /// Attach display names: an explicit per-descriptor display wins, then
    /// the alias table. When two raw columns would share one display name
    /// the later one falls back to its raw name (suffixed with its position
    /// if that is taken too) so both stay selectable.
    fn new(raw_descriptors: Vec<ColumnDescriptor>, aliases: &BTreeMap<String, String>) -> Self {
        let mut resolved = ResolvedColumns::default();
        for (pos, mut desc) in raw_descriptors.into_iter().enumerate() {
            let wanted = desc
                .display
                .clone()
                .or_else(|| aliases.get(&desc.raw).cloned())
                .unwrap_or_else(|| desc.raw.clone());
            let display = if resolved.to_raw.contains_key(&wanted) {
                log::warn!(
                    "columns '{}' and '{}' both display as '{wanted}'",
                    resolved.to_raw[&wanted],
                    desc.raw
                );
                if resolved.to_raw.contains_key(&desc.raw) {
                    format!("{} ({})", desc.raw, pos + 1)
                } else {
                    desc.raw.clone()
                }
            } else {
                wanted
            };
            resolved.to_display.insert(desc.raw.clone(), display.clone());
            resolved.to_raw.insert(display.clone(), desc.raw.clone());
            desc.display = (display != desc.raw).then_some(display);
            resolved.descriptors.push(desc);
        }
        resolved
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Display name for a raw table column.
    pub fn display_for(&self, raw: &str) -> Option<&str> {
        self.to_display.get(raw).map(String::as_str)
    }

    /// Raw table column for a display name picked by the user.
    pub fn raw_for(&self, display: &str) -> Option<&str> {
        self.to_raw.get(display).map(String::as_str)
    }

    pub fn display_names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.display_name()).collect()
    }

    pub fn raw_names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.raw.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Determine the measurement columns of `table`.
///
/// An explicit list that matches nothing yields an empty result rather than
/// an error; callers must refuse to go further with zero columns.
pub fn resolve(
    table: &Table,
    strategy: &ResolutionStrategy,
    aliases: &BTreeMap<String, String>,
) -> Result<ResolvedColumns, PipelineError> {
    let descriptors = match strategy {
        ResolutionStrategy::ExplicitList { candidates } => resolve_explicit(table, candidates),
        ResolutionStrategy::FixedSet { candidates } => resolve_fixed(table, candidates)?,
        ResolutionStrategy::RangeScan {
            start_markers,
            end_markers,
        } => resolve_range(table, start_markers, end_markers)?,
    };
    let resolved = ResolvedColumns::new(descriptors, aliases);
    log::info!("resolved {} measurement columns: {:?}", resolved.len(), resolved.raw_names());
    Ok(resolved)
}

fn resolve_explicit(table: &Table, candidates: &[String]) -> Vec<ColumnDescriptor> {
    candidates
        .iter()
        .filter(|c| table.has_column(c))
        .map(|c| ColumnDescriptor {
            raw: c.clone(),
            display: None,
        })
        .collect()
}

fn resolve_fixed(
    table: &Table,
    candidates: &[FixedCandidate],
) -> Result<Vec<ColumnDescriptor>, PipelineError> {
    let mut found = Vec::with_capacity(candidates.len());
    let mut missing = Vec::new();

    for cand in candidates {
        let hit = std::iter::once(&cand.name)
            .chain(cand.aliases.iter())
            .find(|name| table.has_column(name));
        match hit {
            Some(raw) => found.push(ColumnDescriptor {
                raw: raw.clone(),
                display: Some(cand.name.clone()),
            }),
            None => missing.push(cand.name.clone()),
        }
    }

    if found.len() != candidates.len() {
        return Err(PipelineError::IncompleteResolution {
            required: candidates.len(),
            found: found.into_iter().map(|d| d.raw).collect(),
            missing,
        });
    }
    Ok(found)
}

fn resolve_range(
    table: &Table,
    start_markers: &[String],
    end_markers: &[String],
) -> Result<Vec<ColumnDescriptor>, PipelineError> {
    let names = table.column_names();
    let start = find_marker(&names, start_markers, MarkerKind::Start)?;
    let end = find_marker(&names, end_markers, MarkerKind::End)?;
    let (lo, hi) = if start > end { (end, start) } else { (start, end) };

    let descriptors: Vec<ColumnDescriptor> = table.columns()[lo..=hi]
        .iter()
        .filter(|col| {
            let numeric = col.has_numeric();
            if !numeric {
                log::debug!("skipping non-numeric column '{}' inside VOC range", col.name);
            }
            numeric
        })
        .map(|col| ColumnDescriptor {
            raw: col.name.clone(),
            display: None,
        })
        .collect();

    if descriptors.is_empty() {
        return Err(PipelineError::NoNumericColumns {
            start: names[lo].to_string(),
            end: names[hi].to_string(),
        });
    }
    Ok(descriptors)
}

/// Index of the first column whose normalised name equals any normalised marker.
fn find_marker(names: &[&str], markers: &[String], which: MarkerKind) -> Result<usize, PipelineError> {
    let wanted: Vec<String> = markers.iter().map(|m| normalize_name(m)).collect();
    names
        .iter()
        .position(|n| wanted.contains(&normalize_name(n)))
        .ok_or_else(|| PipelineError::MarkerNotFound {
            which,
            accepted: markers.to_vec(),
            seen: names
                .iter()
                .take(SEEN_COLUMNS_IN_ERRORS)
                .map(|n| n.to_string())
                .collect(),
        })
}

/// Canonical form for header matching: NFKC, trimmed, lowercased, keeping
/// only alphanumerics and `_`.
pub fn normalize_name(name: &str) -> String {
    let composed: String = name.nfkc().collect();
    composed
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}
