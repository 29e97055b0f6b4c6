//! Pre-selection: keep funds that track their asset-class benchmark.
//!
//! Covers:
//! - **Benchmark lag** -- benchmark prices are shifted forward by a
//!   settlement lag (1 week for domestic classes, 2 weeks otherwise)
//! - **Period return** -- adjusted NAV return over
//!   `[target - window, target - skip]`
//! - **Correlation gate** -- weekly Spearman correlation against the lagged
//!   benchmark, computed once per asset class over the dates every fund of
//!   the class shares, must reach the threshold; bond classes bypass the gate
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::analytics::correlation::{spearman_correlation, PriceTable};
use crate::analytics::returns::period_return;
use crate::config::{EngineConfig, PreselectionRules};
use crate::error::FrappeError;
use crate::provider::DataProvider;
use crate::types::{AssetClass, FundRecord, PreselectedFund, PricePoint};
use crate::FrappeResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Benchmark a class was measured against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkInfo {
    pub asset_class: AssetClass,
    pub symbol: String,
    pub name: String,
    pub lag_weeks: i64,
}

/// A fund dropped by pre-selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreselectionExclusion {
    pub asset_id: String,
    pub asset_name: String,
    pub asset_class_symbol: AssetClass,
    pub correlation: Option<Decimal>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreselectionOutput {
    pub selected: Vec<PreselectedFund>,
    pub exclusions: Vec<PreselectionExclusion>,
    pub benchmarks: Vec<BenchmarkInfo>,
}

/// Return and benchmark correlation of one fund.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundStatistics {
    pub period_return: Decimal,
    pub correlation: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Shift benchmark observations forward by `lag_weeks`, so the value at
/// date `d` is the latest raw value at or before `d - lag`. Points moved
/// past `as_of` are dropped.
pub fn lag_benchmark(points: &[PricePoint], lag_weeks: i64, as_of: NaiveDate) -> Vec<PricePoint> {
    let lag = Duration::weeks(lag_weeks);
    points
        .iter()
        .map(|p| PricePoint {
            date: p.date + lag,
            price: p.price,
        })
        .filter(|p| p.date <= as_of)
        .collect()
}

/// Bond classes are kept regardless of correlation; other classes need a
/// defined correlation at or above `threshold`.
pub fn passes_correlation_gate(
    class: AssetClass,
    correlation: Option<Decimal>,
    threshold: Decimal,
) -> bool {
    class.is_bond() || correlation.is_some_and(|c| c >= threshold)
}

/// Adjusted NAV return over `[target - window, target - skip]`.
pub fn fund_period_return(
    points: &[PricePoint],
    target: NaiveDate,
    rules: &PreselectionRules,
) -> FrappeResult<Decimal> {
    let start = target - Duration::weeks(rules.window_weeks);
    let end = target - Duration::weeks(rules.skip_recent_weeks);
    period_return(points, start, end)
}

/// Spearman correlation of every fund in a class group against the lagged
/// benchmark, computed over one table holding the benchmark and all funds.
/// The table only keeps dates on which every series has a value, so a
/// short-history fund narrows the window for the whole group.
pub fn group_correlations(
    benchmark_symbol: &str,
    benchmark: &[PricePoint],
    funds: &[(String, Vec<PricePoint>)],
    rules: &PreselectionRules,
) -> FrappeResult<BTreeMap<String, Option<Decimal>>> {
    let mut series = Vec::with_capacity(funds.len() + 1);
    series.push((benchmark_symbol.to_string(), benchmark.to_vec()));
    series.extend(funds.iter().cloned());
    let table = PriceTable::align(series);

    if table.is_empty() {
        return Ok(funds.iter().map(|(id, _)| (id.clone(), None)).collect());
    }
    let matrix = spearman_correlation(&table, rules.window_weeks, rules.skip_recent_weeks)?;
    debug!(
        benchmark = benchmark_symbol,
        funds = funds.len(),
        observations = matrix.observations,
        "group correlation computed"
    );
    Ok(funds
        .iter()
        .map(|(id, _)| (id.clone(), matrix.get(id, benchmark_symbol)))
        .collect())
}

/// Period return and Spearman correlation of a single fund against an
/// already lagged benchmark.
pub fn evaluate_fund(
    asset_id: &str,
    fund: &[PricePoint],
    benchmark_symbol: &str,
    benchmark: &[PricePoint],
    target: NaiveDate,
    rules: &PreselectionRules,
) -> FrappeResult<FundStatistics> {
    let ret = fund_period_return(fund, target, rules)?;
    let correlations = group_correlations(
        benchmark_symbol,
        benchmark,
        &[(asset_id.to_string(), fund.to_vec())],
        rules,
    )?;

    Ok(FundStatistics {
        period_return: ret,
        correlation: correlations.get(asset_id).copied().flatten(),
    })
}

/// Fetch a class benchmark from the provider and apply its settlement lag.
pub fn load_lagged_benchmark<P: DataProvider>(
    provider: &P,
    class: AssetClass,
    target: NaiveDate,
    config: &EngineConfig,
) -> FrappeResult<(BenchmarkInfo, Vec<PricePoint>)> {
    let symbol = config.benchmark_symbol(class)?;
    let series = provider.benchmark_series(symbol, target)?;
    let lag_weeks = config.preselection.benchmark_lag_weeks(class);
    let lagged = lag_benchmark(&series.points, lag_weeks, target);
    let info = BenchmarkInfo {
        asset_class: class,
        symbol: series.symbol,
        name: series.name,
        lag_weeks,
    };
    Ok((info, lagged))
}

/// Correlation of a single fund against its class benchmark, for ad-hoc
/// inspection.
pub fn fund_benchmark_correlation<P: DataProvider>(
    provider: &P,
    asset_id: &str,
    class: AssetClass,
    target: NaiveDate,
    config: &EngineConfig,
) -> FrappeResult<FundStatistics> {
    let (info, benchmark) = load_lagged_benchmark(provider, class, target, config)?;
    let fund = provider.price_series(asset_id, target)?.adjusted_nav();
    evaluate_fund(
        asset_id,
        &fund,
        &info.symbol,
        &benchmark,
        target,
        &config.preselection,
    )
}

fn exclusion(
    fund: &FundRecord,
    correlation: Option<Decimal>,
    reason: String,
) -> PreselectionExclusion {
    PreselectionExclusion {
        asset_id: fund.asset_id.clone(),
        asset_name: fund.asset_name.clone(),
        asset_class_symbol: fund.asset_class_symbol,
        correlation,
        reason,
    }
}

/// Group `funds` by asset class and keep those passing the correlation
/// gate. Funds without enough history inside the window are excluded; the
/// rest of a class share one correlation table with the benchmark.
pub fn run_preselection<P: DataProvider>(
    provider: &P,
    funds: &[FundRecord],
    target: NaiveDate,
    config: &EngineConfig,
) -> FrappeResult<PreselectionOutput> {
    let rules = &config.preselection;

    let mut groups: BTreeMap<AssetClass, Vec<&FundRecord>> = BTreeMap::new();
    for fund in funds {
        groups.entry(fund.asset_class_symbol).or_default().push(fund);
    }

    let mut selected = Vec::new();
    let mut exclusions = Vec::new();
    let mut benchmarks = Vec::new();

    for (class, group) in groups {
        if class.bucket().is_none() {
            for fund in group {
                warn!(asset_id = %fund.asset_id, %class, "no benchmark for asset class");
                exclusions.push(exclusion(fund, None, format!("no benchmark for {class}")));
            }
            continue;
        }

        let (info, benchmark) = load_lagged_benchmark(provider, class, target, config)?;
        info!(
            %class,
            benchmark = %info.symbol,
            name = %info.name,
            funds = group.len(),
            "correlation filtering started"
        );

        let mut removed = 0usize;
        let mut measured = Vec::with_capacity(group.len());
        let mut series = Vec::with_capacity(group.len());
        for fund in group {
            let points = provider.price_series(&fund.asset_id, target)?.adjusted_nav();
            match fund_period_return(&points, target, rules) {
                Ok(ret) => {
                    measured.push((fund, ret));
                    series.push((fund.asset_id.clone(), points));
                }
                Err(FrappeError::InsufficientData(reason)) => {
                    warn!(
                        asset_id = %fund.asset_id,
                        asset_name = %fund.asset_name,
                        %reason,
                        "fund excluded: insufficient data"
                    );
                    removed += 1;
                    exclusions.push(exclusion(fund, None, reason));
                }
                Err(e) => return Err(e),
            }
        }

        let correlations = group_correlations(&info.symbol, &benchmark, &series, rules)?;
        for (fund, period_return) in measured {
            let correlation = correlations.get(&fund.asset_id).copied().flatten();
            if passes_correlation_gate(class, correlation, rules.correlation_threshold) {
                selected.push(PreselectedFund {
                    asset_id: fund.asset_id.clone(),
                    asset_name: fund.asset_name.clone(),
                    asset_class_symbol: class,
                    correlation,
                    period_return,
                });
            } else {
                let shown = correlation
                    .map_or_else(|| "undefined".to_string(), |c| c.round_dp(4).to_string());
                info!(
                    asset_id = %fund.asset_id,
                    asset_name = %fund.asset_name,
                    correlation = %shown,
                    "fund excluded"
                );
                removed += 1;
                exclusions.push(exclusion(
                    fund,
                    correlation,
                    format!(
                        "correlation {shown} below {}",
                        rules.correlation_threshold
                    ),
                ));
            }
        }
        info!(%class, removed, "correlation filtering finished");
        benchmarks.push(info);
    }

    info!(
        selected = selected.len(),
        excluded = exclusions.len(),
        "pre-selection finished"
    );
    Ok(PreselectionOutput {
        selected,
        exclusions,
        benchmarks,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::BenchmarkData;
    use crate::provider::{Dataset, InMemoryProvider};
    use crate::types::TradingRecord;
    use rust_decimal_macros::dec;

    fn target() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 8, 9).unwrap()
    }

    /// 131 weekly points ending on the target date.
    fn weekly(price: impl Fn(i64) -> Decimal) -> Vec<PricePoint> {
        (0..=130)
            .map(|i| PricePoint {
                date: target() - Duration::weeks(130 - i),
                price: price(i),
            })
            .collect()
    }

    fn rising() -> Vec<PricePoint> {
        weekly(|i| dec!(100) + Decimal::from(i))
    }

    fn choppy() -> Vec<PricePoint> {
        weekly(|i| dec!(100) + Decimal::from((i * 7) % 13))
    }

    fn trading(points: &[PricePoint]) -> Vec<TradingRecord> {
        points
            .iter()
            .map(|p| TradingRecord {
                date: p.date,
                adjusted_nav: p.price,
                nav: None,
                aum: None,
                net_assets: None,
                share_class_aum: None,
            })
            .collect()
    }

    fn fund(id: &str, class: AssetClass) -> FundRecord {
        FundRecord {
            date: target(),
            asset_id: id.into(),
            asset_name: format!("{id} C-e"),
            asset_class_symbol: class,
            risk_type_name: None,
            asset_class_name: None,
            investment_area_name: None,
            fund_bm_name: None,
            inception_date: None,
        }
    }

    fn provider() -> InMemoryProvider {
        let mut dataset = Dataset::default();
        let index = weekly(|i| dec!(1000) + Decimal::from(2 * i));
        for (symbol, name) in [("I04781", "KOSPI"), ("MLG0SK", "ICE Korea Govt")] {
            dataset.benchmarks.insert(
                symbol.into(),
                BenchmarkData {
                    name: name.into(),
                    points: index.clone(),
                },
            );
        }
        dataset.trading.insert("TRACKER".into(), trading(&rising()));
        dataset.trading.insert("DRIFTER".into(), trading(&choppy()));
        dataset.trading.insert("BONDY".into(), trading(&choppy()));
        dataset
            .trading
            .insert("NEWBIE".into(), trading(&rising()[128..]));
        // falls until week 80, then recovers
        dataset.trading.insert(
            "VSHAPE".into(),
            trading(&weekly(|i| dec!(100) + Decimal::from((i - 80).abs()))),
        );
        // first observation at week 70
        dataset
            .trading
            .insert("LATECOMER".into(), trading(&rising()[70..]));
        InMemoryProvider::new(dataset)
    }

    #[test]
    fn test_lag_shifts_dates_forward() {
        let pts = rising();
        let lagged = lag_benchmark(&pts, 2, target());
        assert_eq!(lagged.len(), pts.len() - 2);
        assert_eq!(lagged[0].date, pts[2].date);
        assert_eq!(lagged[0].price, pts[0].price);
        assert_eq!(lagged.last().unwrap().date, target());
    }

    #[test]
    fn test_gate_bond_bypass() {
        let threshold = dec!(0.8);
        assert!(passes_correlation_gate(AssetClass::KrStock, Some(dec!(0.8)), threshold));
        assert!(!passes_correlation_gate(AssetClass::KrStock, Some(dec!(0.79)), threshold));
        assert!(!passes_correlation_gate(AssetClass::Gold, None, threshold));
        assert!(passes_correlation_gate(AssetClass::KrBond, Some(dec!(-0.5)), threshold));
        assert!(passes_correlation_gate(AssetClass::EmBond, None, threshold));
    }

    #[test]
    fn test_evaluate_tracking_fund() {
        let rules = PreselectionRules::default();
        let bench = lag_benchmark(&weekly(|i| dec!(1000) + Decimal::from(i)), 1, target());
        let stats = evaluate_fund("F", &rising(), "B", &bench, target(), &rules).unwrap();
        assert!((stats.correlation.unwrap() - Decimal::ONE).abs() < dec!(0.0000001));
        // 126 -> 226 inside [target-104w, target-4w]
        let expected = dec!(100) / dec!(126) * dec!(100);
        assert!((stats.period_return - expected).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_preselection_gate_and_exclusions() {
        let p = provider();
        let config = EngineConfig::default();
        let funds = vec![
            fund("TRACKER", AssetClass::KrStock),
            fund("DRIFTER", AssetClass::KrStock),
            fund("BONDY", AssetClass::KrBond),
            fund("NEWBIE", AssetClass::KrStock),
        ];
        let out = run_preselection(&p, &funds, target(), &config).unwrap();

        let kept: Vec<&str> = out.selected.iter().map(|f| f.asset_id.as_str()).collect();
        assert_eq!(kept, vec!["TRACKER", "BONDY"]);

        let dropped: Vec<&str> = out.exclusions.iter().map(|e| e.asset_id.as_str()).collect();
        assert_eq!(dropped, vec!["NEWBIE", "DRIFTER"]);
        assert!(out.exclusions[0].correlation.is_none());
        assert!(out.exclusions[1].correlation.is_some());

        for f in &out.selected {
            if !f.asset_class_symbol.is_bond() {
                assert!(f.correlation.unwrap() >= dec!(0.8));
            }
        }

        assert_eq!(out.benchmarks.len(), 2);
        assert_eq!(out.benchmarks[0].name, "KOSPI");
        assert_eq!(out.benchmarks[0].lag_weeks, 1);
    }

    #[test]
    fn test_short_history_narrows_class_correlation_window() {
        let p = provider();
        let config = EngineConfig::default();

        // alone, the full window sees the drawdown and the recovery
        let alone = run_preselection(&p, &[fund("VSHAPE", AssetClass::KrStock)], target(), &config)
            .unwrap();
        assert!(alone.selected.is_empty());
        let rho = alone.exclusions[0].correlation.unwrap();
        assert!(rho < dec!(-0.21) && rho > dec!(-0.23));

        // a late starter cuts the shared table to weeks 70..=126
        let funds = vec![
            fund("VSHAPE", AssetClass::KrStock),
            fund("LATECOMER", AssetClass::KrStock),
        ];
        let out = run_preselection(&p, &funds, target(), &config).unwrap();
        assert!(out.exclusions.is_empty());
        let kept: Vec<&str> = out.selected.iter().map(|f| f.asset_id.as_str()).collect();
        assert_eq!(kept, vec!["VSHAPE", "LATECOMER"]);

        let vshape = out.selected[0].correlation.unwrap();
        assert!(vshape > dec!(0.95) && vshape < dec!(0.951));
        let late = out.selected[1].correlation.unwrap();
        assert!((late - Decimal::ONE).abs() < dec!(0.0000001));

        // the single-fund inspection path still measures the fund on its own
        let single =
            fund_benchmark_correlation(&p, "VSHAPE", AssetClass::KrStock, target(), &config)
                .unwrap();
        assert_eq!(single.correlation, Some(rho));
    }

    #[test]
    fn test_group_correlations_empty_series_is_undefined() {
        let rules = PreselectionRules::default();
        let funds = vec![
            ("TRACKER".to_string(), rising()),
            ("EMPTY".to_string(), Vec::new()),
        ];
        let out = group_correlations("B", &rising(), &funds, &rules).unwrap();
        assert_eq!(out.get("TRACKER"), Some(&None));
        assert_eq!(out.get("EMPTY"), Some(&None));
    }

    #[test]
    fn test_unknown_benchmark_is_provider_error() {
        let p = provider();
        let funds = vec![fund("TRACKER", AssetClass::Gold)];
        let err = run_preselection(&p, &funds, target(), &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, FrappeError::Provider(_)));
    }
}
