mod db;
mod fetcher;
mod listings;
mod normalize;
mod output;
mod pipeline;
mod repair;
mod report;
mod settings;

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{error, warn};

use output::OutputFormat;
use pipeline::{Pipeline, RunOutput};
use settings::{Overrides, Settings};

#[derive(Parser)]
#[command(name = "wwr_scraper", about = "Remote job listing harvester for weworkremotely.com")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover listings, scrape each one and save the records
    Run {
        /// Index page to discover listings from
        #[arg(long)]
        index_url: Option<String>,
        /// Max listings to scrape (default: all discovered)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Attempts per URL before giving up on it
        #[arg(long)]
        max_retries: Option<u32>,
        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
        /// Root directory for dated output folders
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the listing URLs found on the index page
    Listings {
        #[arg(long)]
        index_url: Option<String>,
    },
    /// Scrape one listing page and print its record as JSON
    Inspect {
        /// Listing URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            index_url,
            limit,
            max_retries,
            format,
            output_dir,
        } => {
            let overrides = Overrides {
                index_url,
                max_retries,
                output_dir,
                format,
            };
            run(&overrides, limit).await
        }
        Commands::Listings { index_url } => {
            let overrides = Overrides {
                index_url,
                ..Default::default()
            };
            print_listings(&overrides).await
        }
        Commands::Inspect { url } => inspect(&url).await,
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    println!(
        "\nScraping completed in {}",
        report::format_duration(t0.elapsed())
    );

    result
}

async fn run(overrides: &Overrides, limit: Option<usize>) -> anyhow::Result<()> {
    let settings = Settings::load(overrides)?;
    let cancel = Arc::new(AtomicBool::new(false));
    watch_for_interrupt(Arc::clone(&cancel));

    let mut pipeline = Pipeline::http(&settings, cancel)?;
    let out = pipeline.run(&settings.index_url, limit).await?;

    for path in report_and_persist(&out, &settings, &mut std::io::stdout())? {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

/// The report goes out before anything is saved, so a persistence failure
/// still shows what the run produced.
fn report_and_persist(
    out: &RunOutput,
    settings: &Settings,
    w: &mut impl Write,
) -> anyhow::Result<Vec<PathBuf>> {
    writeln!(w, "{}", report::RunSummary::from_output(out))?;
    report::write_postings_by_date(w, &report::postings_by_date(&out.records))?;
    w.flush()?;
    output::persist(&out.records, settings.format, &settings.output_dir)
}

async fn print_listings(overrides: &Overrides) -> anyhow::Result<()> {
    let settings = Settings::load(overrides)?;
    let mut pipeline = Pipeline::http(&settings, Arc::default())?;
    let links = pipeline.discover(&settings.index_url).await?;

    for (i, link) in links.iter().enumerate() {
        println!("{:>3} | {}", i + 1, link);
    }
    println!("\n{} listings", links.len());
    Ok(())
}

async fn inspect(url: &str) -> anyhow::Result<()> {
    let settings = Settings::load(&Overrides::default())?;
    let mut pipeline = Pipeline::http(&settings, Arc::default())?;
    let record = pipeline.try_scrape_listing(url).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// The first Ctrl-C asks the pipeline to stop after the listing in flight;
/// a second one exits immediately.
fn watch_for_interrupt(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if already_interrupted(&cancel) {
                warn!("Second interrupt, exiting without saving");
                std::process::exit(130);
            }
            warn!("Interrupt received, stopping after the current listing (Ctrl-C again to quit now)");
        }
    });
}

/// Raise the cancel flag and report whether it was already raised.
fn already_interrupted(cancel: &AtomicBool) -> bool {
    cancel.swap(true, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::db::sample_record;

    fn settings_in(output_dir: PathBuf) -> Settings {
        Settings {
            index_url: settings::DEFAULT_INDEX_URL.to_string(),
            site_origin: listings::DEFAULT_SITE_ORIGIN.to_string(),
            max_retries: 3,
            request_timeout_secs: 10,
            output_dir,
            format: OutputFormat::Json,
        }
    }

    #[test]
    fn summary_is_reported_when_saving_fails() {
        // A regular file where the output directory should be
        let blocker = std::env::temp_dir().join(format!("wwr_scraper_blocker_{}", std::process::id()));
        fs::write(&blocker, "").unwrap();

        let out = RunOutput {
            records: vec![Some(sample_record("https://x/a", "2026-10-12")), None],
            discovered: 2,
            cancelled: false,
        };
        let mut buf = Vec::new();
        let result = report_and_persist(&out, &settings_in(blocker.clone()), &mut buf);
        fs::remove_file(&blocker).unwrap();

        assert!(result.is_err());
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Produced 1 records from 2 listing URLs"));
        assert!(text.contains("2026-10-12 |    1 |"));
    }

    #[test]
    fn second_interrupt_requests_exit() {
        let cancel = AtomicBool::new(false);
        assert!(!already_interrupted(&cancel));
        assert!(cancel.load(Ordering::Relaxed));
        assert!(already_interrupted(&cancel));
    }
}
