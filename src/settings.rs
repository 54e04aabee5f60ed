use std::path::PathBuf;

use anyhow::{ensure, Result};
use config::{Config, Environment};
use serde::Deserialize;

use crate::fetcher::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::listings::DEFAULT_SITE_ORIGIN;
use crate::output::OutputFormat;

pub const DEFAULT_INDEX_URL: &str = "https://weworkremotely.com/remote-jobs";
const DEFAULT_OUTPUT_DIR: &str = "data/we_work";
const ENV_PREFIX: &str = "WWR";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub index_url: String,
    pub site_origin: String,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub output_dir: PathBuf,
    pub format: OutputFormat,
}

/// Values given on the command line; they win over the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub index_url: Option<String>,
    pub max_retries: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub format: Option<OutputFormat>,
}

impl Settings {
    /// Defaults, then `WWR_*` environment variables, then `overrides`.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX), overrides)
    }

    fn from_env(env: Environment, overrides: &Overrides) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("index_url", DEFAULT_INDEX_URL)?
            .set_default("site_origin", DEFAULT_SITE_ORIGIN)?
            .set_default("max_retries", i64::from(DEFAULT_MAX_RETRIES))?
            .set_default("request_timeout_secs", DEFAULT_TIMEOUT_SECS as i64)?
            .set_default("output_dir", DEFAULT_OUTPUT_DIR)?
            .set_default("format", OutputFormat::Sqlite.as_str())?
            .add_source(env.try_parsing(true));

        if let Some(url) = &overrides.index_url {
            builder = builder.set_override("index_url", url.as_str())?;
        }
        if let Some(n) = overrides.max_retries {
            builder = builder.set_override("max_retries", i64::from(n))?;
        }
        if let Some(dir) = &overrides.output_dir {
            builder = builder.set_override("output_dir", dir.to_string_lossy().into_owned())?;
        }
        if let Some(format) = overrides.format {
            builder = builder.set_override("format", format.as_str())?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.max_retries >= 1, "max_retries must be at least 1");
        ensure!(
            self.request_timeout_secs >= 1,
            "request_timeout_secs must be at least 1"
        );
        ensure!(!self.index_url.is_empty(), "index_url must not be empty");
        Ok(())
    }
}
