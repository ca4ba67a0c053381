//! Writes a synthetic plant VOC experiment table for trying out the dashboard.
//!
//! ```text
//! cargo run --bin generate_sample [out.parquet | out.csv]
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

const TREATMENTS: [(&str, f64); 3] = [("Control", 1.0), ("Herbivory", 2.5), ("MeJA", 1.8)];
const CHAMBERS: [&str; 2] = ["C1", "C2"];
const LINES: [&str; 2] = ["WT", "OE-1"];
const PROGRESS: [&str; 2] = ["Early", "Late"];
const INTERVALS: [i64; 11] = [-1, 0, 1, 2, 3, 4, 5, 6, 12, 18, 24];
const REPLICATES: usize = 2;

/// VOC block in sheet order; `None` marks the free-text `Notes` column.
const VOCS: [(&str, Option<f64>); 7] = [
    ("trans-nerolidol", Some(4.0)),
    ("DMNT", Some(9.0)),
    ("MeSA", Some(3.0)),
    ("Notes", None),
    ("z-3-hexenal", Some(14.0)),
    ("z-3-hexenyl acetate", Some(7.0)),
    ("xylenes + ethylbenzene", Some(2.0)),
];

/// Minimal deterministic PRNG (xorshift64*).
struct SimpleRng(u64);

impl SimpleRng {
    fn next_f64(&mut self) -> f64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        (self.0.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        mean + std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

/// Emission response: a burst peaking around 6 h that decays by 24 h.
fn response(interval: i64, strength: f64) -> f64 {
    if interval < 0 {
        return 1.0;
    }
    let t = interval as f64;
    1.0 + (strength - 1.0) * (t / 6.0) * (1.0 - t / 6.0).exp()
}

#[derive(Default)]
struct Rows {
    name: Vec<String>,
    treatment: Vec<String>,
    chamber: Vec<String>,
    line: Vec<String>,
    progress: Vec<String>,
    interval: Vec<i64>,
    temp: Vec<f64>,
    humid: Vec<f64>,
    vocs: Vec<Vec<Option<f64>>>,
    notes: Vec<Option<String>>,
}

fn generate() -> Rows {
    let mut rng = SimpleRng(0x5EED_CAFE);
    let mut rows = Rows {
        vocs: vec![Vec::new(); VOCS.len()],
        ..Rows::default()
    };

    for (treatment, strength) in TREATMENTS {
        for chamber in CHAMBERS {
            for line in LINES {
                for progress in PROGRESS {
                    for interval in INTERVALS {
                        for rep in 0..REPLICATES {
                            rows.name.push(format!("{treatment}-{chamber}-{line}-{rep}"));
                            rows.treatment.push(treatment.to_string());
                            rows.chamber.push(chamber.to_string());
                            rows.line.push(line.to_string());
                            rows.progress.push(progress.to_string());
                            rows.interval.push(interval);
                            rows.temp.push(rng.gauss(24.0, 0.6));
                            rows.humid.push(rng.gauss(62.0, 3.0));

                            let late = if progress == "Late" { 1.3 } else { 1.0 };
                            for (slot, (_, base)) in rows.vocs.iter_mut().zip(VOCS) {
                                let value = base.map(|b| {
                                    (b * response(interval, strength) * late + rng.gauss(0.0, 0.1 * b)).max(0.0)
                                });
                                // Below-detection readings are left blank.
                                slot.push(value.filter(|v| *v > 0.05 * base.unwrap_or(0.0)));
                            }
                            rows.notes
                                .push((rng.next_f64() < 0.05).then(|| "leaf damage".to_string()));
                        }
                    }
                }
            }
        }
    }
    rows
}

fn write_parquet(rows: &Rows, path: &Path) -> Result<()> {
    let strings = |v: &[String]| -> ArrayRef { Arc::new(StringArray::from(v.to_vec())) };

    let mut fields = vec![
        Field::new("Name", DataType::Utf8, false),
        Field::new("Treatment", DataType::Utf8, false),
        Field::new("Chamber", DataType::Utf8, false),
        Field::new("Line", DataType::Utf8, false),
        Field::new("Progress", DataType::Utf8, false),
        Field::new("Interval (h)", DataType::Int64, false),
        Field::new("Temp (℃)", DataType::Float64, false),
        Field::new("Humid (%)", DataType::Float64, false),
    ];
    let mut arrays: Vec<ArrayRef> = vec![
        strings(&rows.name),
        strings(&rows.treatment),
        strings(&rows.chamber),
        strings(&rows.line),
        strings(&rows.progress),
        Arc::new(Int64Array::from(rows.interval.clone())),
        Arc::new(Float64Array::from(rows.temp.clone())),
        Arc::new(Float64Array::from(rows.humid.clone())),
    ];
    for ((name, base), values) in VOCS.iter().zip(&rows.vocs) {
        match base {
            Some(_) => {
                fields.push(Field::new(*name, DataType::Float64, true));
                arrays.push(Arc::new(Float64Array::from(values.clone())));
            }
            None => {
                fields.push(Field::new(*name, DataType::Utf8, true));
                arrays.push(Arc::new(StringArray::from(rows.notes.clone())));
            }
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;
    let file = std::fs::File::create(path).context("creating output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn write_csv(rows: &Rows, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating output file")?;
    let mut header = vec![
        "Name", "Treatment", "Chamber", "Line", "Progress", "Interval (h)", "Temp (℃)", "Humid (%)",
    ];
    header.extend(VOCS.iter().map(|(name, _)| *name));
    writer.write_record(&header)?;

    for i in 0..rows.name.len() {
        let mut record = vec![
            rows.name[i].clone(),
            rows.treatment[i].clone(),
            rows.chamber[i].clone(),
            rows.line[i].clone(),
            rows.progress[i].clone(),
            rows.interval[i].to_string(),
            format!("{:.2}", rows.temp[i]),
            format!("{:.1}", rows.humid[i]),
        ];
        for ((_, base), values) in VOCS.iter().zip(&rows.vocs) {
            let cell = match base {
                Some(_) => values[i].map(|v| format!("{v:.3}")),
                None => rows.notes[i].clone(),
            };
            record.push(cell.unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let output = std::env::args().nth(1).unwrap_or_else(|| "sample_voc_data.parquet".to_string());
    let path = Path::new(&output);
    let rows = generate();

    if path.extension().and_then(|e| e.to_str()) == Some("csv") {
        write_csv(&rows, path)?;
    } else {
        write_parquet(&rows, path)?;
    }

    println!("Wrote {} observations ({} VOC columns) to {output}", rows.name.len(), VOCS.len() - 1);
    Ok(())
}
