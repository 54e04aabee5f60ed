use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use chrono::{DateTime, NaiveDate};

use crate::normalize::JobRecord;
use crate::pipeline::RunOutput;

const UNKNOWN_DATE: &str = "unknown";
const BAR_WIDTH: usize = 40;

pub struct RunSummary {
    pub discovered: usize,
    pub processed: usize,
    pub produced: usize,
    pub columns: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn from_output(out: &RunOutput) -> Self {
        RunSummary {
            discovered: out.discovered,
            processed: out.records.len(),
            produced: out.produced(),
            columns: JobRecord::FIELDS.len(),
            cancelled: out.cancelled,
        }
    }

}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Stats of scraped data: rows: {} and columns: {}",
            self.processed, self.columns
        )?;
        write!(
            f,
            "Produced {} records from {} listing URLs ({} discovered, {} skipped{})",
            self.produced,
            self.processed,
            self.discovered,
            self.processed - self.produced,
            if self.cancelled { ", run interrupted" } else { "" },
        )
    }
}

/// Postings per calendar day of `datePosted`.
pub fn postings_by_date(records: &[Option<JobRecord>]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for r in records.iter().flatten() {
        let key = posting_date(&r.date_posted)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| UNKNOWN_DATE.to_string());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

fn posting_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| {
            raw.get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        })
}

pub fn write_postings_by_date(
    w: &mut impl Write,
    counts: &BTreeMap<String, usize>,
) -> io::Result<()> {
    if counts.is_empty() {
        return Ok(());
    }
    let max = counts.values().copied().max().unwrap_or(1).max(1);

    writeln!(w, "\n--- Postings by date ---")?;
    for (date, n) in counts {
        let bar = "#".repeat((n * BAR_WIDTH).div_ceil(max));
        writeln!(w, "{:<10} | {:>4} | {}", date, n, bar)?;
    }
    Ok(())
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.2} sec", d.as_secs_f64())
    } else {
        format!("{} min {:.2} sec", secs / 60, d.as_secs_f64() % 60.0)
    }
}
