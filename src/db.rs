use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::normalize::JobRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            position              INTEGER PRIMARY KEY,
            job_url               TEXT NOT NULL,
            title                 TEXT NOT NULL,
            description           TEXT NOT NULL,
            date_posted           TEXT NOT NULL,
            valid_through         TEXT NOT NULL,
            occupational_category TEXT NOT NULL,
            salary_min            REAL NOT NULL,
            salary_max            REAL NOT NULL,
            salary_currency       TEXT NOT NULL,
            company_name          TEXT NOT NULL,
            company_address       TEXT NOT NULL,
            scraped_at            TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_date_posted ON jobs(date_posted);
        CREATE INDEX IF NOT EXISTS idx_jobs_company ON jobs(company_name);
        ",
    )?;
    Ok(())
}

/// Replace the table contents with this run's records. Absent records leave a
/// gap in `position` so rows keep their discovery order.
pub fn save_jobs(conn: &Connection, records: &[Option<JobRecord>]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        tx.execute("DELETE FROM jobs", [])?;
        let mut stmt = tx.prepare(
            "INSERT INTO jobs
             (position, job_url, title, description, date_posted, valid_through,
              occupational_category, salary_min, salary_max, salary_currency,
              company_name, company_address)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for (position, r) in records.iter().enumerate() {
            let Some(r) = r else { continue };
            count += stmt.execute(rusqlite::params![
                position as i64,
                r.job_url,
                r.title,
                r.description,
                r.date_posted,
                r.valid_through,
                r.occupational_category,
                r.salary_min,
                r.salary_max,
                r.salary_currency,
                r.company_name,
                r.company_address_text(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn count_jobs(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
    Ok(n as usize)
}

#[cfg(test)]
pub(crate) fn sample_record(url: &str, date_posted: &str) -> JobRecord {
    JobRecord {
        title: "Senior Rust Engineer".into(),
        description: "Build fast things.".into(),
        job_url: url.into(),
        date_posted: date_posted.into(),
        valid_through: "2026-12-11T09:30:00Z".into(),
        occupational_category: "Back-End Programming".into(),
        salary_min: 120000.0,
        salary_max: 160000.0,
        salary_currency: "USD".into(),
        company_name: "Ferrous Labs".into(),
        company_address: serde_json::json!({ "addressCountry": "Anywhere" }),
    }
}
