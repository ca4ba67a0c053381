use std::collections::{BTreeMap, BTreeSet};

use super::error::PipelineError;
use super::model::{CellValue, Table};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Which statistics to compute per measurement column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistics {
    Mean,
    MeanAndStd,
}

/// Summary of one measurement within one partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// Mean of the numeric values; NaN when there are none.
    pub mean: f64,
    /// Sample standard deviation (N − 1); NaN below two values.
    /// `None` when not requested.
    pub std: Option<f64>,
    /// Number of numeric values used.
    pub n: usize,
}

/// One partition of the input rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    /// Group key values, aligned with [`AggregationResult::key_columns`].
    pub key: Vec<CellValue>,
    /// Number of input rows in the partition.
    pub rows: usize,
    /// Aligned with [`AggregationResult::measurement_columns`].
    pub summaries: Vec<Summary>,
}

/// Grouped summary of a filtered table.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
    pub key_columns: Vec<String>,
    pub measurement_columns: Vec<String>,
    pub rows: Vec<AggregateRow>,
}

impl AggregationResult {
    pub fn key_index(&self, column: &str) -> Option<usize> {
        self.key_columns.iter().position(|c| c == column)
    }

    /// Total input rows across all partitions.
    pub fn total_rows(&self) -> usize {
        self.rows.iter().map(|r| r.rows).sum()
    }

    /// Stable ascending sort on the numeric value of one key column;
    /// non-numeric keys go last.
    pub fn sort_by_numeric_key(&mut self, column: &str) {
        let Some(idx) = self.key_index(column) else {
            return;
        };
        self.rows.sort_by(|a, b| {
            match (a.key[idx].to_numeric(), b.key[idx].to_numeric()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Partitioning + aggregation
// ---------------------------------------------------------------------------

/// Row indices per distinct key combination, ordered by key.
/// Missing key values form their own (null) partition.
pub fn partition(
    table: &Table,
    group_key: &[String],
) -> Result<BTreeMap<Vec<CellValue>, Vec<usize>>, PipelineError> {
    let key_cols = group_key
        .iter()
        .map(|name| {
            table
                .column(name)
                .map(|c| c.values.as_slice())
                .ok_or_else(|| missing_column(table, name))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut parts: BTreeMap<Vec<CellValue>, Vec<usize>> = BTreeMap::new();
    for row in 0..table.n_rows() {
        let key = key_cols.iter().map(|vals| vals[row].clone()).collect();
        parts.entry(key).or_default().push(row);
    }
    Ok(parts)
}

/// Group `table` by `group_key` and summarise every measurement column.
pub fn aggregate(
    table: &Table,
    group_key: &[String],
    measurement_columns: &[String],
    stats: Statistics,
) -> Result<AggregationResult, PipelineError> {
    let measures = measurement_columns
        .iter()
        .map(|name| {
            table
                .column(name)
                .map(|c| c.values.as_slice())
                .ok_or_else(|| missing_column(table, name))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rows = partition(table, group_key)?
        .into_iter()
        .map(|(key, idx)| {
            let summaries = measures
                .iter()
                .map(|vals| summarize(idx.iter().filter_map(|&r| vals[r].to_numeric()), stats))
                .collect();
            AggregateRow {
                key,
                rows: idx.len(),
                summaries,
            }
        })
        .collect();

    Ok(AggregationResult {
        key_columns: group_key.to_vec(),
        measurement_columns: measurement_columns.to_vec(),
        rows,
    })
}

/// Numeric values of one measurement per partition, for distribution charts.
pub fn distributions(
    table: &Table,
    group_key: &[String],
    measurement: &str,
) -> Result<Vec<(Vec<CellValue>, Vec<f64>)>, PipelineError> {
    let values = table
        .column(measurement)
        .ok_or_else(|| missing_column(table, measurement))?;
    Ok(partition(table, group_key)?
        .into_iter()
        .map(|(key, idx)| {
            let nums = idx.iter().filter_map(|&r| values.values[r].to_numeric()).collect();
            (key, nums)
        })
        .collect())
}

fn summarize(values: impl Iterator<Item = f64>, stats: Statistics) -> Summary {
    let values: Vec<f64> = values.collect();
    let n = values.len();
    let mean = if n == 0 {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / n as f64
    };
    let std = match stats {
        Statistics::Mean => None,
        Statistics::MeanAndStd if n < 2 => Some(f64::NAN),
        Statistics::MeanAndStd => {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            Some((ss / (n - 1) as f64).sqrt())
        }
    };
    Summary { mean, std, n }
}

fn missing_column(table: &Table, name: &str) -> PipelineError {
    PipelineError::MissingRequiredColumn {
        column: name.to_string(),
        found: table.column_names().iter().map(|s| s.to_string()).collect(),
    }
}

// ---------------------------------------------------------------------------
// Interval coverage
// ---------------------------------------------------------------------------

/// Expected sampling checkpoints, in hours.
pub const EXPECTED_INTERVALS: [f64; 11] = [-1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 12.0, 18.0, 24.0];

/// Informational check of which expected checkpoints never occur.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalCoverage {
    /// Expected checkpoints absent from the data, in reference order.
    pub missing: Vec<f64>,
}

impl IntervalCoverage {
    pub fn compute(observed: &BTreeSet<CellValue>, expected: &[f64]) -> Self {
        let seen: Vec<f64> = observed.iter().filter_map(CellValue::to_numeric).collect();
        let missing = expected
            .iter()
            .copied()
            .filter(|e| !seen.iter().any(|s| s == e))
            .collect();
        Self { missing }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

impl std::fmt::Display for IntervalCoverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listed: Vec<String> = self.missing.iter().map(|v| CellValue::Float(*v).to_string()).collect();
        write!(f, "intervals (h) missing from the data: [{}]", listed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Column;

    fn table() -> Table {
        // 2 treatments × intervals [6, 0] × 2 replicates, deliberately unsorted.
        let mut treat = Vec::new();
        let mut interval = Vec::new();
        let mut a = Vec::new();
        let mut b = Vec::new();
        for (t, base) in [("T2", 10.0), ("T1", 0.0)] {
            for iv in [6_i64, 0] {
                for rep in 0..2 {
                    treat.push(CellValue::from(t));
                    interval.push(CellValue::Integer(iv));
                    a.push(CellValue::Float(base + iv as f64 + rep as f64));
                    b.push(CellValue::from("n.d."));
                }
            }
        }
        Table::from_columns(vec![
            Column::new("Treatment", treat),
            Column::new("Interval (h)", interval),
            Column::new("CompoundA", a),
            Column::new("CompoundB", b),
        ])
        .unwrap()
    }

    fn key(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn groups_by_treatment() {
        let res = aggregate(&table(), &key(&["Treatment"]), &key(&["CompoundA"]), Statistics::MeanAndStd)
            .unwrap();
        assert_eq!(res.rows.len(), 2);
        assert_eq!(res.rows[0].key, vec![CellValue::from("T1")]);
        assert_eq!(res.rows[0].rows, 4);
        assert_eq!(res.rows[0].summaries[0].n, 4);
        // T1 values: 6, 7, 0, 1
        assert!((res.rows[0].summaries[0].mean - 3.5).abs() < 1e-12);
        assert!(res.rows[0].summaries[0].std.unwrap() > 0.0);
    }

    #[test]
    fn partitions_cover_every_row() {
        let t = table();
        let groupings: [&[&str]; 4] = [&["Treatment"], &["Interval (h)"], &["Treatment", "Interval (h)"], &[]];
        for cols in groupings {
            let res = aggregate(&t, &key(cols), &key(&["CompoundA"]), Statistics::Mean).unwrap();
            assert_eq!(res.total_rows(), t.n_rows());
        }
    }

    #[test]
    fn single_row_std_is_nan() {
        let t = Table::from_columns(vec![
            Column::new("g", vec!["x".into()]),
            Column::new("v", vec![CellValue::Float(3.0)]),
        ])
        .unwrap();
        let res = aggregate(&t, &key(&["g"]), &key(&["v"]), Statistics::MeanAndStd).unwrap();
        assert_eq!(res.rows[0].summaries[0].mean, 3.0);
        assert!(res.rows[0].summaries[0].std.unwrap().is_nan());
    }

    #[test]
    fn missing_keys_form_their_own_group() {
        let t = Table::from_columns(vec![
            Column::new("g", vec!["x".into(), CellValue::Null, CellValue::Null]),
            Column::new("v", vec![CellValue::Float(1.0), CellValue::Float(2.0), CellValue::Float(4.0)]),
        ])
        .unwrap();
        let res = aggregate(&t, &key(&["g"]), &key(&["v"]), Statistics::Mean).unwrap();
        assert_eq!(res.rows.len(), 2);
        assert_eq!(res.rows[0].key, vec![CellValue::Null]);
        assert_eq!(res.rows[0].summaries[0].mean, 3.0);
    }

    #[test]
    fn non_numeric_measurement_gives_nan_mean() {
        let res = aggregate(&table(), &key(&["Treatment"]), &key(&["CompoundB"]), Statistics::Mean).unwrap();
        assert!(res.rows.iter().all(|r| r.summaries[0].mean.is_nan() && r.summaries[0].n == 0));
    }

    #[test]
    fn numeric_sort_orders_intervals() {
        let t = Table::from_columns(vec![
            Column::new(
                "iv",
                vec![CellValue::Float(12.0), CellValue::from("3"), CellValue::Integer(-1)],
            ),
            Column::new("v", vec![CellValue::Float(1.0); 3]),
        ])
        .unwrap();
        let mut res = aggregate(&t, &key(&["iv"]), &key(&["v"]), Statistics::Mean).unwrap();
        res.sort_by_numeric_key("iv");
        let order: Vec<f64> = res.rows.iter().filter_map(|r| r.key[0].to_numeric()).collect();
        assert_eq!(order, vec![-1.0, 3.0, 12.0]);
    }

    #[test]
    fn unknown_group_column_is_reported() {
        let err = aggregate(&table(), &key(&["Chamber"]), &key(&["CompoundA"]), Statistics::Mean).unwrap_err();
        assert!(matches!(err, PipelineError::MissingRequiredColumn { ref column, .. } if column == "Chamber"));
    }

    #[test]
    fn coverage_lists_absent_checkpoints() {
        let observed: BTreeSet<CellValue> =
            [0_i64, 1, 2, 3, 4, 5, 6, 12, 18, 24].into_iter().map(CellValue::Integer).collect();
        let cov = IntervalCoverage::compute(&observed, &EXPECTED_INTERVALS);
        assert_eq!(cov.missing, vec![-1.0]);
        assert!(!cov.is_complete());
        assert_eq!(cov.to_string(), "intervals (h) missing from the data: [-1]");
    }

    #[test]
    fn distributions_follow_partitions() {
        let d = distributions(&table(), &key(&["Treatment"]), "CompoundA").unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d[1].1.len(), 4);
    }
}
