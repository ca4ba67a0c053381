use std::collections::{BTreeMap, BTreeSet};

use super::model::{CellValue, Table};

// ---------------------------------------------------------------------------
// Filter predicate: which values are accepted per column
// ---------------------------------------------------------------------------

/// Accepted values for one metadata column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Predicate {
    /// No constraint (the "all" choice of a single-select).
    #[default]
    Any,
    /// Single-select: the cell must equal this value.
    Equals(CellValue),
    /// Multi-select: the cell must be one of these values.
    /// An empty set matches nothing; missing values never match.
    OneOf(BTreeSet<CellValue>),
}

impl Predicate {
    pub fn accepts(&self, value: &CellValue) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::Equals(v) => v == value,
            Predicate::OneOf(set) => set.contains(value),
        }
    }

    fn is_active(&self) -> bool {
        !matches!(self, Predicate::Any)
    }

    /// Cheaper / typically more selective predicates first.
    fn cost(&self) -> u8 {
        match self {
            Predicate::Any => 0,
            Predicate::Equals(_) => 1,
            Predicate::OneOf(_) => 2,
        }
    }
}

/// Per-column predicates, combined with logical AND.
pub type FilterSpec = BTreeMap<String, Predicate>;

/// Return indices of rows that pass all active filters.
///
/// A row passes a column filter when:
/// * The column is not in the table → passes (the filter is skipped)
/// * The predicate is `Any` → passes
/// * The predicate accepts the row's value → passes
pub fn filtered_indices(table: &Table, filters: &FilterSpec) -> Vec<usize> {
    let mut active: Vec<(&[CellValue], &Predicate)> = filters
        .iter()
        .filter(|(_, pred)| pred.is_active())
        .filter_map(|(col, pred)| match table.column(col) {
            Some(c) => Some((c.values.as_slice(), pred)),
            None => {
                log::debug!("filter on absent column '{col}' skipped");
                None
            }
        })
        .collect();
    active.sort_by_key(|(_, pred)| pred.cost());

    (0..table.n_rows())
        .filter(|&row| active.iter().all(|(values, pred)| pred.accepts(&values[row])))
        .collect()
}

/// Apply `filters` and return the surviving rows as a new table.
pub fn apply(table: &Table, filters: &FilterSpec) -> Table {
    table.take_rows(&filtered_indices(table, filters))
}
