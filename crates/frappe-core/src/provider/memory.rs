//! In-memory provider over a materialised JSON dataset.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::DataProvider;
use crate::error::FrappeError;
use crate::types::{BenchmarkSeries, FundRecord, PricePoint, PriceSeries, TradingRecord};
use crate::FrappeResult;

/// Score id of the developed-market equity indicator that drives weighting.
pub const DM_STOCK_SCORE_ID: &str = "DM_STOCK";

/// Benchmark index history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkData {
    pub name: String,
    pub points: Vec<PricePoint>,
}

/// A monthly macro indicator row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroScore {
    pub date: NaiveDate,
    pub score_id: String,
    pub score_value: Decimal,
}

/// Everything the pipeline reads, already fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Universe rows; may hold several snapshot dates.
    pub funds: Vec<FundRecord>,
    /// Trading rows keyed by fund id.
    #[serde(default)]
    pub trading: BTreeMap<String, Vec<TradingRecord>>,
    /// Benchmark histories keyed by benchmark symbol.
    #[serde(default)]
    pub benchmarks: BTreeMap<String, BenchmarkData>,
    #[serde(default)]
    pub macro_scores: Vec<MacroScore>,
}

impl Dataset {
    pub fn from_json_str(s: &str) -> FrappeResult<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    dataset: Dataset,
}

impl InMemoryProvider {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
}

impl DataProvider for InMemoryProvider {
    fn fund_universe(&self, as_of: NaiveDate) -> FrappeResult<Vec<FundRecord>> {
        let snapshot = self
            .dataset
            .funds
            .iter()
            .map(|f| f.date)
            .filter(|d| *d <= as_of)
            .max();

        Ok(match snapshot {
            Some(date) => self
                .dataset
                .funds
                .iter()
                .filter(|f| f.date == date)
                .cloned()
                .collect(),
            None => Vec::new(),
        })
    }

    fn price_series(&self, asset_id: &str, as_of: NaiveDate) -> FrappeResult<PriceSeries> {
        let records = self
            .dataset
            .trading
            .get(asset_id)
            .map(|rows| rows.iter().filter(|r| r.date <= as_of).cloned().collect())
            .unwrap_or_default();
        Ok(PriceSeries::new(asset_id, records))
    }

    fn benchmark_series(&self, symbol: &str, as_of: NaiveDate) -> FrappeResult<BenchmarkSeries> {
        let data = self
            .dataset
            .benchmarks
            .get(symbol)
            .ok_or_else(|| FrappeError::Provider(format!("Unknown benchmark: {symbol}")))?;

        let mut points: Vec<PricePoint> = data
            .points
            .iter()
            .filter(|p| p.date <= as_of)
            .copied()
            .collect();
        points.sort_by_key(|p| p.date);

        Ok(BenchmarkSeries {
            symbol: symbol.to_string(),
            name: data.name.clone(),
            points,
        })
    }

    fn macro_score(&self, as_of: NaiveDate) -> FrappeResult<Option<Decimal>> {
        let month_start = as_of.with_day(1).unwrap_or(as_of);
        Ok(self
            .dataset
            .macro_scores
            .iter()
            .filter(|s| s.score_id == DM_STOCK_SCORE_ID && s.date < month_start)
            .max_by_key(|s| s.date)
            .map(|s| s.score_value))
    }

    fn refresh_prices(&self, asset_ids: &[String]) -> FrappeResult<()> {
        debug!(count = asset_ids.len(), "in-memory dataset has no upstream to refresh");
        Ok(())
    }
}
