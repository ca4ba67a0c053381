use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::filter::{FilterSpec, Predicate};
use super::model::{CellValue, Table};

/// Widget kind of a metadata filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// One value or the "all" sentinel.
    Single,
    /// Any subset of values, all selected by default.
    Multi,
}

/// The choices offered for one metadata column.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterField {
    pub column: String,
    pub kind: FilterKind,
    /// Sorted distinct non-null values; empty when the column is absent.
    pub values: BTreeSet<CellValue>,
}

/// One entry of a single-select list: the sentinel or a concrete value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    All,
    Value(CellValue),
}

impl FilterField {
    /// Whether the column exists in the loaded table.
    pub fn is_available(&self) -> bool {
        !self.values.is_empty()
    }

    /// Single-select entries with the "all" sentinel first.
    pub fn choices(&self) -> Vec<Choice> {
        std::iter::once(Choice::All)
            .chain(self.values.iter().cloned().map(Choice::Value))
            .collect()
    }

    /// The predicate used before the user touches the widget. Both kinds
    /// start unconstrained: the sentinel for single-selects, every value
    /// ticked for multi-selects.
    pub fn default_predicate(&self) -> Predicate {
        Predicate::Any
    }

    /// Values ticked in a multi-select under `pred`.
    pub fn selected(&self, pred: &Predicate) -> BTreeSet<CellValue> {
        match pred {
            Predicate::Any => self.values.clone(),
            Predicate::Equals(v) => BTreeSet::from([v.clone()]),
            Predicate::OneOf(set) => set.clone(),
        }
    }

    /// Predicate for a multi-select with `selected` ticked. Ticking every
    /// option of the loaded file means no constraint, decided against the
    /// full option list rather than whatever rows are left after other
    /// filters.
    pub fn multi_predicate(&self, selected: BTreeSet<CellValue>) -> Predicate {
        if !selected.is_empty() && selected == self.values {
            Predicate::Any
        } else {
            Predicate::OneOf(selected)
        }
    }
}

/// Distinct non-null values for each metadata column, sorted.
/// Absent columns map to an empty set.
pub fn options(table: &Table, metadata_columns: &[&str]) -> BTreeMap<String, BTreeSet<CellValue>> {
    metadata_columns
        .iter()
        .map(|&col| {
            let values = table
                .column(col)
                .map(|c| c.distinct_values())
                .unwrap_or_default();
            (col.to_string(), values)
        })
        .collect()
}

/// Build filter fields, in the order given, for `(column, kind)` pairs.
pub fn filter_fields(table: &Table, fields: &[(String, FilterKind)]) -> Vec<FilterField> {
    let names: Vec<&str> = fields.iter().map(|(c, _)| c.as_str()).collect();
    let mut opts = options(table, &names);
    fields
        .iter()
        .map(|(column, kind)| FilterField {
            column: column.clone(),
            kind: *kind,
            values: opts.remove(column).unwrap_or_default(),
        })
        .collect()
}

/// The untouched-widget filter spec: a no-op over the loaded table.
pub fn default_filter_spec(fields: &[FilterField]) -> FilterSpec {
    fields
        .iter()
        .filter(|f| f.is_available())
        .map(|f| (f.column.clone(), f.default_predicate()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::filtered_indices;
    use crate::data::model::Column;

    fn sample() -> Table {
        Table::from_columns(vec![
            Column::new("Line", vec!["L2".into(), CellValue::Null, "L1".into(), "L2".into()]),
            Column::new(
                "Progress",
                vec!["b".into(), "a".into(), CellValue::Null, "a".into()],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn options_are_sorted_and_skip_nulls() {
        let opts = options(&sample(), &["Line", "Chamber"]);
        let lines: Vec<String> = opts["Line"].iter().map(|v| v.to_string()).collect();
        assert_eq!(lines, vec!["L1", "L2"]);
        assert!(opts["Chamber"].is_empty());
    }

    #[test]
    fn single_select_starts_with_sentinel() {
        let fields = filter_fields(&sample(), &[("Line".into(), FilterKind::Single)]);
        let choices = fields[0].choices();
        assert_eq!(choices[0], Choice::All);
        assert_eq!(choices.len(), 3);
        assert_eq!(fields[0].default_predicate(), Predicate::Any);
    }

    #[test]
    fn default_spec_keeps_every_row() {
        let table = sample();
        let fields = filter_fields(
            &table,
            &[
                ("Line".into(), FilterKind::Single),
                ("Progress".into(), FilterKind::Multi),
                ("Chamber".into(), FilterKind::Single),
            ],
        );
        let spec = default_filter_spec(&fields);
        assert!(!spec.contains_key("Chamber"));
        assert_eq!(spec["Progress"], Predicate::Any);
        assert_eq!(filtered_indices(&table, &spec).len(), table.n_rows());
    }

    #[test]
    fn ticking_every_option_clears_the_constraint() {
        let fields = filter_fields(&sample(), &[("Progress".into(), FilterKind::Multi)]);
        let field = &fields[0];
        let all = field.values.clone();
        assert_eq!(field.multi_predicate(all.clone()), Predicate::Any);
        assert_eq!(field.selected(&Predicate::Any), all);

        let only_a = BTreeSet::from([CellValue::from("a")]);
        assert_eq!(field.multi_predicate(only_a.clone()), Predicate::OneOf(only_a));
        assert_eq!(field.multi_predicate(BTreeSet::new()), Predicate::OneOf(BTreeSet::new()));
    }
}
