use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::FrappeError;

/// Portfolio weights on a 0-100 scale (30 = 30%). Never fractions.
pub type Percent = Decimal;

/// Asset-class symbol -> target weight.
pub type WeightMap = BTreeMap<AssetClass, Percent>;

/// Risk profile name -> value.
pub type ByRiskProfile<T> = BTreeMap<String, T>;

/// Categorical asset class of a fund. Drives benchmark choice and weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetClass {
    KrStock,
    DmStock,
    EmStock,
    Gold,
    KrBond,
    DmBond,
    EmBond,
    /// Catch-all class; never selectable.
    Etc,
}

impl AssetClass {
    pub const ALL: [AssetClass; 8] = [
        AssetClass::KrStock,
        AssetClass::DmStock,
        AssetClass::EmStock,
        AssetClass::Gold,
        AssetClass::KrBond,
        AssetClass::DmBond,
        AssetClass::EmBond,
        AssetClass::Etc,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            AssetClass::KrStock => "KR_STOCK",
            AssetClass::DmStock => "DM_STOCK",
            AssetClass::EmStock => "EM_STOCK",
            AssetClass::Gold => "GOLD",
            AssetClass::KrBond => "KR_BOND",
            AssetClass::DmBond => "DM_BOND",
            AssetClass::EmBond => "EM_BOND",
            AssetClass::Etc => "ETC",
        }
    }

    /// Weighting bucket, `None` for the catch-all class.
    pub fn bucket(&self) -> Option<Bucket> {
        match self {
            AssetClass::KrStock | AssetClass::DmStock | AssetClass::EmStock | AssetClass::Gold => {
                Some(Bucket::Equity)
            }
            AssetClass::KrBond | AssetClass::DmBond | AssetClass::EmBond => {
                Some(Bucket::FixedIncome)
            }
            AssetClass::Etc => None,
        }
    }

    pub fn is_bond(&self) -> bool {
        self.bucket() == Some(Bucket::FixedIncome)
    }

    /// Domestic-market classes settle faster, so their benchmarks lag less.
    pub fn is_domestic(&self) -> bool {
        matches!(self, AssetClass::KrStock | AssetClass::KrBond)
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for AssetClass {
    type Err = FrappeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetClass::ALL
            .iter()
            .find(|c| c.symbol().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| FrappeError::Validation {
                field: "asset_class".into(),
                reason: format!("Unknown asset class: {s}"),
            })
    }
}

/// Equity-like (stock, gold) vs fixed-income (bond) grouping used by the
/// weighting and correction stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Equity,
    FixedIncome,
}

impl Bucket {
    /// Class that absorbs remainders and sub-minimum weights of the bucket.
    pub fn default_class(&self) -> AssetClass {
        match self {
            Bucket::Equity => AssetClass::DmStock,
            Bucket::FixedIncome => AssetClass::KrBond,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Equity => write!(f, "equity"),
            Bucket::FixedIncome => write!(f, "fixed income"),
        }
    }
}

/// A fund as listed in the universe snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundRecord {
    /// Snapshot date of the universe row.
    pub date: NaiveDate,
    pub asset_id: String,
    pub asset_name: String,
    pub asset_class_symbol: AssetClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_area_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund_bm_name: Option<String>,
    /// Launch date of the fund, when the operator knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inception_date: Option<NaiveDate>,
}

/// One daily trading row of a fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingRecord {
    pub date: NaiveDate,
    pub adjusted_nav: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nav: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aum: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_assets: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_class_aum: Option<Decimal>,
}

/// A dated price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Trading history of a single fund, ascending by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub asset_id: String,
    pub records: Vec<TradingRecord>,
}

impl PriceSeries {
    /// Build a series, sorting rows ascending by date.
    pub fn new(asset_id: impl Into<String>, mut records: Vec<TradingRecord>) -> Self {
        records.sort_by_key(|r| r.date);
        Self {
            asset_id: asset_id.into(),
            records,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent trading row on or before `date`.
    pub fn latest_on_or_before(&self, date: NaiveDate) -> Option<&TradingRecord> {
        self.records.iter().rev().find(|r| r.date <= date)
    }

    /// Adjusted NAV as a plain price series.
    pub fn adjusted_nav(&self) -> Vec<PricePoint> {
        self.records
            .iter()
            .map(|r| PricePoint {
                date: r.date,
                price: r.adjusted_nav,
            })
            .collect()
    }
}

/// Price history of a benchmark index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSeries {
    pub symbol: String,
    /// Display name of the index.
    pub name: String,
    pub points: Vec<PricePoint>,
}

/// A fund that survived pre-selection, with the statistics it was judged on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreselectedFund {
    pub asset_id: String,
    pub asset_name: String,
    pub asset_class_symbol: AssetClass,
    /// Spearman correlation against the class benchmark. `None` when the
    /// aligned window was too short or constant.
    pub correlation: Option<Decimal>,
    /// Percentage return over the ranking window.
    pub period_return: Decimal,
}

/// A fund's allocated weight within a risk profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub asset_id: String,
    pub asset_class_symbol: AssetClass,
    pub asset_name: String,
    pub weight: Percent,
}

/// Sum of all weights in a map.
pub fn total_weight(weights: &WeightMap) -> Percent {
    weights.values().copied().sum()
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_asset_class_serde_symbols() {
        let json = serde_json::to_string(&AssetClass::DmStock).unwrap();
        assert_eq!(json, "\"DM_STOCK\"");
        let parsed: AssetClass = serde_json::from_str("\"EM_BOND\"").unwrap();
        assert_eq!(parsed, AssetClass::EmBond);
    }

    #[test]
    fn test_asset_class_from_str() {
        assert_eq!("kr_bond".parse::<AssetClass>().unwrap(), AssetClass::KrBond);
        assert!("CRYPTO".parse::<AssetClass>().is_err());
    }

    #[test]
    fn test_buckets() {
        assert_eq!(AssetClass::Gold.bucket(), Some(Bucket::Equity));
        assert_eq!(AssetClass::DmBond.bucket(), Some(Bucket::FixedIncome));
        assert_eq!(AssetClass::Etc.bucket(), None);
        assert!(AssetClass::EmBond.is_bond());
        assert!(!AssetClass::EmStock.is_bond());
        assert_eq!(Bucket::Equity.default_class(), AssetClass::DmStock);
        assert_eq!(Bucket::FixedIncome.default_class(), AssetClass::KrBond);
    }

    #[test]
    fn test_price_series_sorted_and_lookup() {
        let d = |day| NaiveDate::from_ymd_opt(2021, 8, day).unwrap();
        let row = |day, nav| TradingRecord {
            date: d(day),
            adjusted_nav: nav,
            nav: None,
            aum: None,
            net_assets: None,
            share_class_aum: None,
        };
        let series = PriceSeries::new("F1", vec![row(9, dec!(3)), row(2, dec!(1)), row(5, dec!(2))]);
        assert_eq!(series.records[0].date, d(2));
        assert_eq!(series.latest_on_or_before(d(8)).unwrap().adjusted_nav, dec!(2));
        assert!(series.latest_on_or_before(d(1)).is_none());
    }

    #[test]
    fn test_total_weight() {
        let mut w = WeightMap::new();
        w.insert(AssetClass::DmStock, dec!(40.5));
        w.insert(AssetClass::KrBond, dec!(59.5));
        assert_eq!(total_weight(&w), dec!(100));
    }
}
