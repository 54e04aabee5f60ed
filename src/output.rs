use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{Array, ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_schema::{Field as ArrowField, Schema};
use chrono::Local;
use clap::ValueEnum;
use parquet::arrow::ArrowWriter;
use serde::Deserialize;
use tracing::info;

use crate::db;
use crate::normalize::JobRecord;

const FILE_STEM: &str = "we_work";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Sqlite,
    Json,
    Csv,
    Parquet,
    /// SQLite and JSON
    Both,
    /// Every format above
    All,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Sqlite => "sqlite",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
            OutputFormat::Both => "both",
            OutputFormat::All => "all",
        }
    }

    fn sqlite(self) -> bool {
        matches!(self, OutputFormat::Sqlite | OutputFormat::Both | OutputFormat::All)
    }

    fn json(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Both | OutputFormat::All)
    }

    fn csv(self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::All)
    }

    fn parquet(self) -> bool {
        matches!(self, OutputFormat::Parquet | OutputFormat::All)
    }
}

/// Write the run's records under `<output_dir>/<today>/` and return the
/// files written.
pub fn persist(
    records: &[Option<JobRecord>],
    format: OutputFormat,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let today = Local::now().format("%Y-%m-%d").to_string();
    persist_in(records, format, &output_dir.join(today))
}

fn persist_in(
    records: &[Option<JobRecord>],
    format: OutputFormat,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut written = Vec::new();

    if format.sqlite() {
        let path = dir.join(format!("{}.sqlite", FILE_STEM));
        let conn = db::connect(&path)?;
        db::init_schema(&conn)?;
        db::save_jobs(&conn, records)?;
        info!("Wrote {} rows to {}", db::count_jobs(&conn)?, path.display());
        written.push(path);
    }

    if format.json() {
        let path = dir.join(format!("{}.json", FILE_STEM));
        write_json(&path, records)?;
        info!("Wrote {} entries to {}", records.len(), path.display());
        written.push(path);
    }

    if format.csv() {
        let path = dir.join(format!("{}.csv", FILE_STEM));
        write_csv(&path, records)?;
        info!("Wrote {} rows to {}", records.len(), path.display());
        written.push(path);
    }

    if format.parquet() {
        let path = dir.join(format!("{}.parquet", FILE_STEM));
        write_parquet(&path, records)?;
        info!("Wrote {} rows to {}", records.len(), path.display());
        written.push(path);
    }

    Ok(written)
}

/// Pretty JSON array in discovery order; failed listings are `null`.
pub fn write_json(path: &Path, records: &[Option<JobRecord>]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), records)?;
    Ok(())
}

/// One row per processed listing under a `JobRecord::FIELDS` header. Failed
/// listings become empty rows so line numbers follow discovery order.
pub fn write_csv(path: &Path, records: &[Option<JobRecord>]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record(JobRecord::FIELDS)?;
    for r in records {
        match r {
            Some(r) => wtr.write_record(csv_row(r))?,
            None => wtr.write_record([""; JobRecord::FIELDS.len()])?,
        }
    }
    wtr.flush()?;
    Ok(())
}

fn csv_row(r: &JobRecord) -> [String; JobRecord::FIELDS.len()] {
    [
        r.title.clone(),
        r.description.clone(),
        r.job_url.clone(),
        r.date_posted.clone(),
        r.valid_through.clone(),
        r.occupational_category.clone(),
        r.salary_min.to_string(),
        r.salary_max.to_string(),
        r.salary_currency.clone(),
        r.company_name.clone(),
        r.company_address_text(),
    ]
}

/// Single row group, one nullable column per `JobRecord::FIELDS` entry.
/// Failed listings are all-null rows.
pub fn write_parquet(path: &Path, records: &[Option<JobRecord>]) -> Result<()> {
    let batch = record_batch(records)?;
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("Failed to open parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("Failed to write record batch {}", path.display()))?;
    writer.close()?;
    Ok(())
}

fn record_batch(records: &[Option<JobRecord>]) -> Result<RecordBatch> {
    let text = |get: fn(&JobRecord) -> String| -> ArrayRef {
        Arc::new(StringArray::from(
            records.iter().map(|r| r.as_ref().map(get)).collect::<Vec<_>>(),
        ))
    };
    let number = |get: fn(&JobRecord) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.as_ref().map(get)).collect::<Vec<_>>(),
        ))
    };

    let columns = vec![
        text(|r| r.title.clone()),
        text(|r| r.description.clone()),
        text(|r| r.job_url.clone()),
        text(|r| r.date_posted.clone()),
        text(|r| r.valid_through.clone()),
        text(|r| r.occupational_category.clone()),
        number(|r| r.salary_min),
        number(|r| r.salary_max),
        text(|r| r.salary_currency.clone()),
        text(|r| r.company_name.clone()),
        text(JobRecord::company_address_text),
    ];
    let fields: Vec<ArrowField> = JobRecord::FIELDS
        .iter()
        .zip(&columns)
        .map(|(name, col)| ArrowField::new(*name, col.data_type().clone(), true))
        .collect();

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}
