pub mod analytics;
pub mod pipeline;

use chrono::{Local, NaiveDate};
use clap::Args;
use frappe_core::provider::{CachedProvider, Dataset, InMemoryProvider};
use frappe_core::{Engine, EngineConfig};
use std::error::Error;
use std::path::Path;
use tracing::debug;

use crate::input;

pub type CliEngine = Engine<CachedProvider<InMemoryProvider>>;

/// Dataset, configuration and target date shared by every command
#[derive(Args)]
pub struct DataArgs {
    /// Path to the JSON dataset (read from stdin when omitted)
    #[arg(long)]
    pub data: Option<String>,

    /// Engine configuration file (.json, .yaml or .yml)
    #[arg(long)]
    pub config: Option<String>,

    /// Target date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

impl DataArgs {
    /// Target date, checked against today.
    pub fn target_date(&self) -> Result<NaiveDate, Box<dyn Error>> {
        let today = today();
        let date = self.date.unwrap_or(today);
        CliEngine::validate_target_date(date, today)?;
        Ok(date)
    }

    pub fn engine(&self) -> Result<CliEngine, Box<dyn Error>> {
        let dataset = load_dataset(self.data.as_deref())?;
        debug!(
            funds = dataset.funds.len(),
            traded = dataset.trading.len(),
            benchmarks = dataset.benchmarks.len(),
            "dataset loaded"
        );
        let config = match &self.config {
            Some(path) => EngineConfig::load(Path::new(path))?,
            None => EngineConfig::default(),
        };
        let provider = CachedProvider::new(InMemoryProvider::new(dataset));
        Ok(Engine::new(provider, config)?)
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn load_dataset(path: Option<&str>) -> Result<Dataset, Box<dyn Error>> {
    if let Some(path) = path {
        return input::file::read_dataset(path);
    }
    match input::stdin::read_stdin()? {
        Some(dataset) => Ok(dataset),
        None => Err("No dataset provided. Use --data <file> or pipe JSON to stdin".into()),
    }
}
