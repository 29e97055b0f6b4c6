//! Screening: independent exclusion filters over the fund universe.
//!
//! Filters run in a fixed order, each on the survivors of the previous one:
//! 1. **Recency** -- last trading row must be dated exactly the target date
//! 2. **Asset class** -- the catch-all `ETC` class is dropped
//! 3. **Name** -- names matching the denylist (private placements,
//!    leveraged/inverse products, pension share classes, ...) are dropped
//! 4. **Share class** -- only retail C-class names survive
//! 5. **Inception** -- funds younger than the required track record are dropped
//! 6. **AUM** -- share-class AUM below the floor is dropped
//!
//! Every exclusion is logged with fund identity and reason. Exclusions are
//! business outcomes, not errors.

use chrono::{Duration, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::config::ScreeningRules;
use crate::provider::DataProvider;
use crate::types::{AssetClass, FundRecord};
use crate::FrappeResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenFilter {
    Recency,
    AssetClass,
    Name,
    ShareClass,
    Inception,
    Aum,
}

impl fmt::Display for ScreenFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScreenFilter::Recency => "recency",
            ScreenFilter::AssetClass => "asset class",
            ScreenFilter::Name => "name",
            ScreenFilter::ShareClass => "share class",
            ScreenFilter::Inception => "inception",
            ScreenFilter::Aum => "AUM",
        };
        f.write_str(label)
    }
}

/// A fund removed by a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub asset_id: String,
    pub asset_name: String,
    pub filter: ScreenFilter,
    pub reason: String,
}

/// Result of a single filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterOutcome {
    pub survivors: Vec<FundRecord>,
    pub excluded: Vec<Exclusion>,
}

/// Number of funds a filter removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub filter: ScreenFilter,
    pub removed: usize,
}

/// Output of the whole screening stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningOutput {
    pub survivors: Vec<FundRecord>,
    pub exclusions: Vec<Exclusion>,
    pub summary: Vec<FilterSummary>,
    /// Whether trading data had to be refreshed before the recency filter
    /// let anything through.
    pub refreshed: bool,
}

/// Trading facts the filters need about one fund, read from its latest
/// trading row on or before the target date.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FundFacts {
    pub last_trade_date: Option<NaiveDate>,
    pub share_class_aum: Option<Decimal>,
}

/// Facts keyed by fund id.
pub type FactSheet = HashMap<String, FundFacts>;

/// Compiled name patterns.
#[derive(Debug, Clone)]
pub struct ScreeningPatterns {
    denylist: Option<Regex>,
    class: Regex,
}

impl ScreeningPatterns {
    pub fn compile(rules: &ScreeningRules) -> FrappeResult<Self> {
        let denylist = if rules.name_denylist.is_empty() {
            None
        } else {
            Some(Regex::new(&rules.name_denylist.join("|"))?)
        };
        Ok(Self {
            denylist,
            class: Regex::new(&rules.class_pattern)?,
        })
    }

    /// First denylisted fragment found in `name`.
    pub fn denied<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.denylist
            .as_ref()
            .and_then(|re| re.find(name))
            .map(|m| m.as_str())
    }

    pub fn is_retail_c_class(&self, name: &str) -> bool {
        self.class.is_match(name)
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

fn apply_filter<F>(funds: &[FundRecord], filter: ScreenFilter, mut reject: F) -> FilterOutcome
where
    F: FnMut(&FundRecord) -> Option<String>,
{
    info!(%filter, candidates = funds.len(), "screening filter started");
    let mut outcome = FilterOutcome::default();
    for fund in funds {
        match reject(fund) {
            Some(reason) => {
                info!(
                    asset_id = %fund.asset_id,
                    asset_name = %fund.asset_name,
                    %filter,
                    %reason,
                    "fund excluded"
                );
                outcome.excluded.push(Exclusion {
                    asset_id: fund.asset_id.clone(),
                    asset_name: fund.asset_name.clone(),
                    filter,
                    reason,
                });
            }
            None => outcome.survivors.push(fund.clone()),
        }
    }
    info!(%filter, removed = outcome.excluded.len(), "screening filter finished");
    outcome
}

/// Keep funds whose latest trading row is dated exactly `target`.
pub fn filter_recency(funds: &[FundRecord], facts: &FactSheet, target: NaiveDate) -> FilterOutcome {
    apply_filter(funds, ScreenFilter::Recency, |f| {
        match facts.get(&f.asset_id).and_then(|x| x.last_trade_date) {
            None => Some("no trading history".to_string()),
            Some(last) if last != target => Some(format!("last traded {last}, expected {target}")),
            Some(_) => None,
        }
    })
}

/// Drop the catch-all `ETC` class.
pub fn filter_asset_class(funds: &[FundRecord]) -> FilterOutcome {
    apply_filter(funds, ScreenFilter::AssetClass, |f| {
        (f.asset_class_symbol == AssetClass::Etc).then(|| "ETC asset class".to_string())
    })
}

/// Drop names matching the denylist.
pub fn filter_name(funds: &[FundRecord], patterns: &ScreeningPatterns) -> FilterOutcome {
    apply_filter(funds, ScreenFilter::Name, |f| {
        patterns
            .denied(&f.asset_name)
            .map(|hit| format!("name contains '{hit}'"))
    })
}

/// Keep retail C-class names only.
pub fn filter_share_class(funds: &[FundRecord], patterns: &ScreeningPatterns) -> FilterOutcome {
    apply_filter(funds, ScreenFilter::ShareClass, |f| {
        (!patterns.is_retail_c_class(&f.asset_name)).then(|| "not a C-class fund".to_string())
    })
}

/// Drop funds launched after `target - (inception_weeks + buffer)`.
/// Funds with an unknown launch date pass.
pub fn filter_inception(
    funds: &[FundRecord],
    target: NaiveDate,
    rules: &ScreeningRules,
) -> FilterOutcome {
    let least_date =
        target - Duration::weeks(rules.inception_weeks + rules.inception_buffer_weeks);
    apply_filter(funds, ScreenFilter::Inception, |f| match f.inception_date {
        Some(launched) if launched > least_date => Some(format!(
            "launched {launched}, after cut-off {least_date}"
        )),
        _ => None,
    })
}

/// Drop funds whose latest share-class AUM is below `floor`. Funds with no
/// reported AUM pass.
pub fn filter_aum(funds: &[FundRecord], facts: &FactSheet, floor: Decimal) -> FilterOutcome {
    apply_filter(funds, ScreenFilter::Aum, |f| {
        match facts.get(&f.asset_id).and_then(|x| x.share_class_aum) {
            Some(aum) if aum < floor => Some(format!("share-class AUM {aum} below {floor}")),
            _ => None,
        }
    })
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Read the trading facts of every fund from the provider.
pub fn collect_facts<P: DataProvider>(
    provider: &P,
    funds: &[FundRecord],
    target: NaiveDate,
) -> FrappeResult<FactSheet> {
    let mut facts = FactSheet::with_capacity(funds.len());
    for fund in funds {
        let series = provider.price_series(&fund.asset_id, target)?;
        let latest = series.latest_on_or_before(target);
        facts.insert(
            fund.asset_id.clone(),
            FundFacts {
                last_trade_date: latest.map(|r| r.date),
                share_class_aum: latest.and_then(|r| r.share_class_aum),
            },
        );
    }
    Ok(facts)
}

/// Run every filter in order over already-collected facts.
pub fn screen(
    funds: &[FundRecord],
    facts: &FactSheet,
    target: NaiveDate,
    rules: &ScreeningRules,
    patterns: &ScreeningPatterns,
) -> ScreeningOutput {
    let recency = filter_recency(funds, facts, target);
    finish_screening(recency, facts, target, rules, patterns, false)
}

fn finish_screening(
    recency: FilterOutcome,
    facts: &FactSheet,
    target: NaiveDate,
    rules: &ScreeningRules,
    patterns: &ScreeningPatterns,
    refreshed: bool,
) -> ScreeningOutput {
    let mut exclusions = Vec::new();
    let mut summary = Vec::new();
    let mut record = |filter: ScreenFilter, outcome: FilterOutcome| {
        summary.push(FilterSummary {
            filter,
            removed: outcome.excluded.len(),
        });
        exclusions.extend(outcome.excluded);
        outcome.survivors
    };

    let survivors = record(ScreenFilter::Recency, recency);
    let survivors = record(ScreenFilter::AssetClass, filter_asset_class(&survivors));
    let survivors = record(ScreenFilter::Name, filter_name(&survivors, patterns));
    let survivors = record(ScreenFilter::ShareClass, filter_share_class(&survivors, patterns));
    let survivors = record(
        ScreenFilter::Inception,
        filter_inception(&survivors, target, rules),
    );
    let survivors = record(
        ScreenFilter::Aum,
        filter_aum(&survivors, facts, rules.aum_floor),
    );

    ScreeningOutput {
        survivors,
        exclusions,
        summary,
        refreshed,
    }
}

/// Screen `universe` at `target`, refreshing trading data once if the
/// recency filter would otherwise remove every fund.
pub fn run_screening<P: DataProvider>(
    provider: &P,
    universe: &[FundRecord],
    target: NaiveDate,
    rules: &ScreeningRules,
) -> FrappeResult<ScreeningOutput> {
    let patterns = ScreeningPatterns::compile(rules)?;

    let mut facts = collect_facts(provider, universe, target)?;
    let mut recency = filter_recency(universe, &facts, target);
    let mut refreshed = false;

    if recency.survivors.is_empty() && !universe.is_empty() {
        warn!(%target, "no fund traded on the target date, refreshing trading data");
        let ids: Vec<String> = universe.iter().map(|f| f.asset_id.clone()).collect();
        provider.refresh_prices(&ids)?;
        facts = collect_facts(provider, universe, target)?;
        recency = filter_recency(universe, &facts, target);
        refreshed = true;
        info!(survivors = recency.survivors.len(), "trading data refresh finished");
    }

    let output = finish_screening(recency, &facts, target, rules, &patterns, refreshed);
    info!(
        universe = universe.len(),
        survivors = output.survivors.len(),
        "screening finished"
    );
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn target() -> NaiveDate {
        d(2021, 8, 9)
    }

    fn fund(id: &str, name: &str, class: AssetClass) -> FundRecord {
        FundRecord {
            date: target(),
            asset_id: id.into(),
            asset_name: name.into(),
            asset_class_symbol: class,
            risk_type_name: None,
            asset_class_name: None,
            investment_area_name: None,
            fund_bm_name: None,
            inception_date: Some(d(2015, 1, 1)),
        }
    }

    fn fresh(aum: Decimal) -> FundFacts {
        FundFacts {
            last_trade_date: Some(target()),
            share_class_aum: Some(aum),
        }
    }

    fn patterns() -> ScreeningPatterns {
        ScreeningPatterns::compile(&ScreeningRules::default()).unwrap()
    }

    fn ids(funds: &[FundRecord]) -> Vec<&str> {
        funds.iter().map(|f| f.asset_id.as_str()).collect()
    }

    #[test]
    fn test_recency_requires_exact_target_date() {
        let funds = vec![
            fund("A", "A C", AssetClass::KrStock),
            fund("B", "B C", AssetClass::KrStock),
            fund("C", "C C", AssetClass::KrStock),
        ];
        let mut facts = FactSheet::new();
        facts.insert("A".into(), fresh(dec!(1)));
        facts.insert(
            "B".into(),
            FundFacts {
                last_trade_date: Some(d(2021, 8, 6)),
                share_class_aum: None,
            },
        );
        let out = filter_recency(&funds, &facts, target());
        assert_eq!(ids(&out.survivors), vec!["A"]);
        assert_eq!(out.excluded.len(), 2);
        assert_eq!(out.excluded[1].reason, "no trading history");
    }

    #[test]
    fn test_asset_class_drops_etc() {
        let funds = vec![
            fund("A", "A C", AssetClass::Etc),
            fund("B", "B C", AssetClass::DmBond),
        ];
        let out = filter_asset_class(&funds);
        assert_eq!(ids(&out.survivors), vec!["B"]);
        assert_eq!(out.excluded[0].filter, ScreenFilter::AssetClass);
    }

    #[test]
    fn test_name_denylist() {
        let funds = vec![
            fund("A", "미래에셋 레버리지 증권투자신탁 C-e", AssetClass::KrStock),
            fund("B", "KB 인버스 C", AssetClass::KrStock),
            fund("C", "삼성 글로벌 주식 (UH) C", AssetClass::DmStock),
            fund("D", "삼성 글로벌 주식 (H) C", AssetClass::DmStock),
            fund("E", "한국 BULL 2배 C", AssetClass::KrStock),
        ];
        let out = filter_name(&funds, &patterns());
        assert_eq!(ids(&out.survivors), vec!["D"]);
        assert!(out.excluded[0].reason.contains("레버리지"));
        assert!(out.excluded[2].reason.contains("(UH)"));
    }

    #[test]
    fn test_empty_denylist_keeps_everything() {
        let rules = ScreeningRules {
            name_denylist: vec![],
            ..ScreeningRules::default()
        };
        let p = ScreeningPatterns::compile(&rules).unwrap();
        let funds = vec![fund("A", "레버리지 C", AssetClass::KrStock)];
        assert_eq!(filter_name(&funds, &p).survivors.len(), 1);
    }

    #[test]
    fn test_share_class_pattern() {
        let p = patterns();
        assert!(p.is_retail_c_class("한국밸류 10년투자 증권투자신탁 C"));
        assert!(p.is_retail_c_class("한국밸류 10년투자 증권투자신탁 C1"));
        assert!(p.is_retail_c_class("한국밸류 10년투자 증권투자신탁 C-e"));
        assert!(p.is_retail_c_class("한국밸류 10년투자 증권투자신탁 Ce"));
        assert!(p.is_retail_c_class("한국밸류 10년투자 증권투자신탁 C-E)"));
        assert!(!p.is_retail_c_class("한국밸류 10년투자 증권투자신탁 A"));
        assert!(!p.is_retail_c_class("한국밸류 10년투자 증권투자신탁 S-P"));
    }

    #[test]
    fn test_inception_cut_off() {
        let rules = ScreeningRules::default();
        // 109 weeks before 2021-08-09 is 2019-07-08
        let mut young = fund("YOUNG", "Y C", AssetClass::KrStock);
        young.inception_date = Some(d(2019, 7, 9));
        let mut edge = fund("EDGE", "E C", AssetClass::KrStock);
        edge.inception_date = Some(d(2019, 7, 8));
        let mut unknown = fund("UNKNOWN", "U C", AssetClass::KrStock);
        unknown.inception_date = None;
        let out = filter_inception(&[young, edge, unknown], target(), &rules);
        assert_eq!(ids(&out.survivors), vec!["EDGE", "UNKNOWN"]);
    }

    #[test]
    fn test_aum_floor() {
        let funds = vec![
            fund("RICH", "R C", AssetClass::KrStock),
            fund("POOR", "P C", AssetClass::KrStock),
            fund("EXACT", "X C", AssetClass::KrStock),
        ];
        let mut facts = FactSheet::new();
        facts.insert("RICH".into(), fresh(dec!(9000000000)));
        facts.insert("POOR".into(), fresh(dec!(4999999999)));
        facts.insert("EXACT".into(), fresh(dec!(5000000000)));
        let out = filter_aum(&funds, &facts, dec!(5000000000));
        assert_eq!(ids(&out.survivors), vec!["RICH", "EXACT"]);
    }

    #[test]
    fn test_screen_is_idempotent() {
        let mut funds = vec![
            fund("K1", "한국 주식 C-e", AssetClass::KrStock),
            fund("K2", "한국 주식 A", AssetClass::KrStock),
            fund("E1", "기타 C", AssetClass::Etc),
            fund("L1", "레버리지 C", AssetClass::KrStock),
            fund("S1", "작은 펀드 C", AssetClass::KrStock),
            fund("Y1", "신규 펀드 C", AssetClass::KrStock),
        ];
        funds[5].inception_date = Some(d(2021, 1, 1));
        let mut facts = FactSheet::new();
        for f in &funds {
            facts.insert(f.asset_id.clone(), fresh(dec!(10000000000)));
        }
        facts.insert("S1".into(), fresh(dec!(100)));

        let rules = ScreeningRules::default();
        let p = patterns();
        let once = screen(&funds, &facts, target(), &rules, &p);
        let twice = screen(&once.survivors, &facts, target(), &rules, &p);
        assert_eq!(ids(&once.survivors), vec!["K1"]);
        assert_eq!(once.survivors, twice.survivors);
        assert!(twice.exclusions.is_empty());

        let removed: Vec<usize> = once.summary.iter().map(|s| s.removed).collect();
        assert_eq!(removed, vec![0, 1, 1, 1, 1, 1]);
    }
}
