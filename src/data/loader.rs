use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType as ArrowType;
use arrow::util::display::array_value_to_string;
use calamine::{open_workbook_auto, DataType as SheetCell, Reader};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, Column, Table};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load an experiment table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.xlsx` / `.xlsm` / `.xls` / `.ods` – first worksheet, header in row 1
/// * `.csv`     – header row, one observation per line
/// * `.json`    – `[{ "Treatment": "T1", "Interval (h)": 0, ... }, ...]`
/// * `.parquet` – flat columns of strings, numbers, bools or dates
///
/// The file is read completely and closed before this returns.
pub fn load_file(path: &Path) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => load_workbook(path),
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    log::info!(
        "Loaded {} rows × {} columns from {}",
        table.n_rows(),
        table.columns().len(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// Spreadsheet loader
// ---------------------------------------------------------------------------

fn load_workbook(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path).context("opening workbook")?;
    let range = workbook
        .worksheet_range_at(0)
        .context("workbook has no worksheets")?
        .context("reading first worksheet")?;

    let mut rows = range.rows();
    let header = rows.next().context("worksheet is empty")?;
    let headers = unique_headers(header.iter().map(|c| match c {
        SheetCell::Empty => String::new(),
        other => other.to_string(),
    }));

    let records = rows
        .map(|row| row.iter().map(sheet_cell_to_value).collect())
        .collect();

    Ok(Table::from_rows(headers, records))
}

fn sheet_cell_to_value(cell: &SheetCell) -> CellValue {
    match cell {
        SheetCell::Int(i) => CellValue::Integer(*i),
        SheetCell::Float(f) => CellValue::Float(*f),
        SheetCell::String(s) => guess_cell_type(s.trim()),
        SheetCell::Bool(b) => CellValue::Bool(*b),
        SheetCell::Empty | SheetCell::Error(_) => CellValue::Null,
        other => CellValue::Date(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, then one observation per row.
fn load_csv(path: &Path) -> Result<Table> {
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .context("opening CSV")?;
    let (headers, records, overlong) = read_csv_records(reader)?;
    if !overlong.is_empty() {
        log::warn!(
            "{}: {} row(s) have more fields than the {} header columns; extra cells dropped (lines {:?})",
            path.display(),
            overlong.len(),
            headers.len(),
            overlong
        );
    }
    Ok(Table::from_rows(headers, records))
}

/// Header, typed records, and the 1-based file lines of records that are
/// wider than the header.
fn read_csv_records<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<(Vec<String>, Vec<Vec<CellValue>>, Vec<usize>)> {
    let headers = unique_headers(
        reader
            .headers()
            .context("reading CSV headers")?
            .iter()
            .map(|h| h.trim().to_string()),
    );

    let mut records = Vec::new();
    let mut overlong = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        if record.len() > headers.len() {
            overlong.push(row_no + 2);
        }
        records.push(record.iter().map(|v| guess_cell_type(v.trim())).collect());
    }
    Ok((headers, records, overlong))
}

fn guess_cell_type(s: &str) -> CellValue {
    if s.is_empty() {
        return CellValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_nan() {
            return CellValue::Null;
        }
        return CellValue::Float(f);
    }
    if s == "true" || s == "false" {
        return CellValue::Bool(s == "true");
    }
    CellValue::String(s.to_string())
}

/// Blank headers become `Unnamed: i`; repeats get `.1`, `.2`, … suffixes.
fn unique_headers(raw: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.enumerate()
        .map(|(i, name)| {
            let name = if name.is_empty() {
                format!("Unnamed: {i}")
            } else {
                name
            };
            let count = seen.entry(name.clone()).or_insert(0);
            let unique = if *count == 0 {
                name
            } else {
                format!("{name}.{count}")
            };
            *count += 1;
            unique
        })
        .collect()
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "Treatment": "T1", "Interval (h)": 0, "nerolidol": 1.5 },
///   ...
/// ]
/// ```
///
/// Column order follows the first appearance of each key.
fn load_json(path: &Path) -> Result<Table> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut headers: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        let mut row = vec![CellValue::Null; headers.len()];
        for (key, val) in obj {
            let pos = *positions.entry(key.clone()).or_insert_with(|| {
                headers.push(key.clone());
                headers.len() - 1
            });
            if pos >= row.len() {
                row.resize(pos + 1, CellValue::Null);
            }
            row[pos] = json_to_cell(val);
        }
        rows.push(row);
    }

    Ok(Table::from_rows(headers, rows))
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => guess_cell_type(s.trim()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one flat column per sheet column.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut columns: Vec<Column> = names.into_iter().map(|n| Column::new(n, Vec::new())).collect();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (col_idx, column) in columns.iter_mut().enumerate() {
            let array = batch.column(col_idx);
            column
                .values
                .extend((0..batch.num_rows()).map(|row| extract_cell(array, row)));
        }
    }

    Ok(Table::from_columns(columns)?)
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &Arc<dyn Array>, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    let any = col.as_any();
    let value = match col.data_type() {
        ArrowType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|s| CellValue::String(s.value(row).to_string())),
        ArrowType::LargeUtf8 => Some(CellValue::String(col.as_string::<i64>().value(row).to_string())),
        ArrowType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map(|a| CellValue::Integer(a.value(row) as i64)),
        ArrowType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| CellValue::Integer(a.value(row))),
        ArrowType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| CellValue::Float(a.value(row) as f64)),
        ArrowType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| CellValue::Float(a.value(row))),
        ArrowType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| CellValue::Bool(a.value(row))),
        ArrowType::Date32 | ArrowType::Date64 | ArrowType::Timestamp(_, _) => {
            array_value_to_string(col, row).ok().map(CellValue::Date)
        }
        _ => array_value_to_string(col, row).ok().map(CellValue::String),
    };
    value.unwrap_or(CellValue::Null)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn csv_keeps_header_order_and_types() {
        let file = write_temp(
            ".csv",
            "Treatment,Interval (h),Notes,nerolidol\nT1,0,,1.5\nT1,6,dry,\n",
        );
        let table = load_file(file.path()).unwrap();
        assert_eq!(table.column_names(), vec!["Treatment", "Interval (h)", "Notes", "nerolidol"]);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.value(1, "Interval (h)"), Some(&CellValue::Integer(6)));
        assert_eq!(table.value(0, "Notes"), Some(&CellValue::Null));
        assert_eq!(table.value(0, "nerolidol"), Some(&CellValue::Float(1.5)));
    }

    #[test]
    fn csv_rows_wider_than_header_are_reported() {
        let data = "Treatment,MeSA\nT1,1.0\nT2,2.0,stray\nT3\n";
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(data.as_bytes());
        let (headers, records, overlong) = read_csv_records(reader).unwrap();
        assert_eq!(overlong, vec![3]);

        let table = Table::from_rows(headers, records);
        assert_eq!(table.column_names(), vec!["Treatment", "MeSA"]);
        assert_eq!(table.value(1, "MeSA"), Some(&CellValue::Float(2.0)));
        assert_eq!(table.value(2, "MeSA"), Some(&CellValue::Null));
    }

    #[test]
    fn csv_duplicate_and_blank_headers_are_renamed() {
        let file = write_temp(".csv", "a,,a\n1,2,3\n");
        let table = load_file(file.path()).unwrap();
        assert_eq!(table.column_names(), vec!["a", "Unnamed: 1", "a.1"]);
    }

    #[test]
    fn json_records_union_keys_in_first_seen_order() {
        let file = write_temp(
            ".json",
            r#"[{"Treatment": "T1", "Interval (h)": 0}, {"Treatment": "T2", "MeSA": 2.5}]"#,
        );
        let table = load_file(file.path()).unwrap();
        assert_eq!(table.column_names(), vec!["Treatment", "Interval (h)", "MeSA"]);
        assert_eq!(table.value(0, "MeSA"), Some(&CellValue::Null));
        assert_eq!(table.value(1, "Interval (h)"), Some(&CellValue::Null));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let file = write_temp(".txt", "whatever");
        let err = load_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Unsupported file extension"));
    }

    #[test]
    fn guesses_cell_types() {
        assert_eq!(guess_cell_type("12"), CellValue::Integer(12));
        assert_eq!(guess_cell_type("-0.5"), CellValue::Float(-0.5));
        assert_eq!(guess_cell_type(""), CellValue::Null);
        assert_eq!(guess_cell_type("NaN"), CellValue::Null);
        assert_eq!(guess_cell_type("T1"), CellValue::from("T1"));
    }
}
