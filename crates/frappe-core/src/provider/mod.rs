//! Data collaborator seam.
//!
//! The pipeline never fetches data itself: universe snapshots, trading
//! history, benchmark prices and macro scores all come through
//! [`DataProvider`]. Connection handling, retries and persistence live
//! behind the trait.

pub mod cache;
pub mod memory;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::types::{BenchmarkSeries, FundRecord, PriceSeries};
use crate::FrappeResult;

pub use cache::{CachedProvider, SeriesCache};
pub use memory::{Dataset, InMemoryProvider};

pub trait DataProvider {
    /// Fund universe as of the most recent snapshot on or before `as_of`.
    fn fund_universe(&self, as_of: NaiveDate) -> FrappeResult<Vec<FundRecord>>;

    /// Trading history of a fund up to and including `as_of`, ascending.
    /// Unknown funds yield an empty series.
    fn price_series(&self, asset_id: &str, as_of: NaiveDate) -> FrappeResult<PriceSeries>;

    /// Raw (unlagged) benchmark prices up to and including `as_of`.
    fn benchmark_series(&self, symbol: &str, as_of: NaiveDate) -> FrappeResult<BenchmarkSeries>;

    /// Developed-market equity macro score for the month before `as_of`.
    fn macro_score(&self, as_of: NaiveDate) -> FrappeResult<Option<Decimal>>;

    /// Re-fetch trading history of the given funds from the upstream source.
    fn refresh_prices(&self, asset_ids: &[String]) -> FrappeResult<()>;
}

impl<P: DataProvider + ?Sized> DataProvider for &P {
    fn fund_universe(&self, as_of: NaiveDate) -> FrappeResult<Vec<FundRecord>> {
        (**self).fund_universe(as_of)
    }

    fn price_series(&self, asset_id: &str, as_of: NaiveDate) -> FrappeResult<PriceSeries> {
        (**self).price_series(asset_id, as_of)
    }

    fn benchmark_series(&self, symbol: &str, as_of: NaiveDate) -> FrappeResult<BenchmarkSeries> {
        (**self).benchmark_series(symbol, as_of)
    }

    fn macro_score(&self, as_of: NaiveDate) -> FrappeResult<Option<Decimal>> {
        (**self).macro_score(as_of)
    }

    fn refresh_prices(&self, asset_ids: &[String]) -> FrappeResult<()> {
        (**self).refresh_prices(asset_ids)
    }
}
