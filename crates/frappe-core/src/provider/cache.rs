//! Read-through cache for price and benchmark series.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::DataProvider;
use crate::types::{BenchmarkSeries, FundRecord, PriceSeries};
use crate::FrappeResult;

/// Key-value store of series keyed by symbol and as-of date.
#[derive(Debug)]
pub struct SeriesCache<V> {
    entries: RwLock<HashMap<String, Arc<V>>>,
}

impl<V> Default for SeriesCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> SeriesCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(symbol: &str, as_of: NaiveDate) -> String {
        format!("{symbol}@{as_of}")
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn insert(&self, key: String, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, Arc::clone(&value));
        value
    }

    /// Drop every as-of entry cached for `symbol`.
    pub fn invalidate(&self, symbol: &str) -> usize {
        let prefix = format!("{symbol}@");
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(&prefix));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wraps a provider with per-fund and per-benchmark caches. A miss behaves
/// exactly like a fresh fetch.
#[derive(Debug)]
pub struct CachedProvider<P> {
    inner: P,
    prices: SeriesCache<PriceSeries>,
    benchmarks: SeriesCache<BenchmarkSeries>,
}

impl<P: DataProvider> CachedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            prices: SeriesCache::new(),
            benchmarks: SeriesCache::new(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn cached_price_series(&self) -> usize {
        self.prices.len()
    }

    pub fn cached_benchmarks(&self) -> usize {
        self.benchmarks.len()
    }
}

impl<P: DataProvider> DataProvider for CachedProvider<P> {
    fn fund_universe(&self, as_of: NaiveDate) -> FrappeResult<Vec<FundRecord>> {
        self.inner.fund_universe(as_of)
    }

    fn price_series(&self, asset_id: &str, as_of: NaiveDate) -> FrappeResult<PriceSeries> {
        let key = SeriesCache::<PriceSeries>::key(asset_id, as_of);
        if let Some(hit) = self.prices.get(&key) {
            return Ok((*hit).clone());
        }
        debug!(asset_id, %as_of, "price cache miss");
        let series = self.inner.price_series(asset_id, as_of)?;
        Ok((*self.prices.insert(key, series)).clone())
    }

    fn benchmark_series(&self, symbol: &str, as_of: NaiveDate) -> FrappeResult<BenchmarkSeries> {
        let key = SeriesCache::<BenchmarkSeries>::key(symbol, as_of);
        if let Some(hit) = self.benchmarks.get(&key) {
            return Ok((*hit).clone());
        }
        debug!(symbol, %as_of, "benchmark cache miss");
        let series = self.inner.benchmark_series(symbol, as_of)?;
        Ok((*self.benchmarks.insert(key, series)).clone())
    }

    fn macro_score(&self, as_of: NaiveDate) -> FrappeResult<Option<Decimal>> {
        self.inner.macro_score(as_of)
    }

    fn refresh_prices(&self, asset_ids: &[String]) -> FrappeResult<()> {
        for id in asset_ids {
            self.prices.invalidate(id);
        }
        self.inner.refresh_prices(asset_ids)
    }
}
