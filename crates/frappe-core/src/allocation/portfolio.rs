//! Portfolio selection: spread each asset-class weight over its top-ranked
//! funds, at most `max_weight` per fund.
//!
//! `fund_count = floor(weight / max_weight) + 1`. Every fund but the last
//! takes the cap; the last takes what is left, so per-class weight is
//! conserved exactly. In correction mode a remainder below `min_weight`
//! is not given a fund of its own: the count drops by one and the
//! remainder is shared across the others.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::AllocationRules;
use crate::selection::postselection::rank_by_class;
use crate::types::{AssetClass, ByRiskProfile, PortfolioEntry, PreselectedFund, WeightMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Normal,
    /// Relaxed cap used after weight correction.
    Correction,
}

/// Fund-level weights for one asset class. `ranked` must be sorted best
/// first.
pub fn allocate_class(
    class: AssetClass,
    weight: Decimal,
    ranked: &[PreselectedFund],
    rules: &AllocationRules,
    mode: SelectionMode,
) -> Vec<PortfolioEntry> {
    if weight <= Decimal::ZERO || ranked.is_empty() {
        return Vec::new();
    }

    let max = rules.max_weight;
    let remainder = weight % max;
    let mut count = (weight / max).floor().to_usize().unwrap_or(0) + 1;
    let mut share = max;

    if mode == SelectionMode::Correction && remainder < rules.min_weight {
        count = count.saturating_sub(1).max(1);
        share = max + (remainder / Decimal::from(count as u64)).round();
    }

    if count > ranked.len() {
        warn!(
            %class,
            %weight,
            needed = count,
            available = ranked.len(),
            "not enough funds, last fund takes the excess"
        );
        count = ranked.len();
    }

    let mut left = weight;
    let mut entries = Vec::with_capacity(count);
    for (i, fund) in ranked.iter().take(count).enumerate() {
        let own = if i + 1 == count { left } else { share.min(left) };
        left -= own;
        if own.is_zero() {
            continue;
        }
        entries.push(PortfolioEntry {
            asset_id: fund.asset_id.clone(),
            asset_class_symbol: class,
            asset_name: fund.asset_name.clone(),
            weight: own,
        });
    }
    entries
}

/// Portfolio of every risk profile.
pub fn run_portfolio_selection(
    funds: &[PreselectedFund],
    weights: &ByRiskProfile<WeightMap>,
    rules: &AllocationRules,
    mode: SelectionMode,
) -> ByRiskProfile<Vec<PortfolioEntry>> {
    let ranked: BTreeMap<AssetClass, Vec<PreselectedFund>> = rank_by_class(funds);

    let mut out = ByRiskProfile::new();
    for (profile, map) in weights {
        let mut entries = Vec::new();
        for (class, weight) in map {
            if weight.is_zero() {
                continue;
            }
            match ranked.get(class) {
                Some(group) => entries.extend(allocate_class(*class, *weight, group, rules, mode)),
                None => warn!(%profile, %class, %weight, "no fund selected for weighted class"),
            }
        }
        info!(%profile, funds = entries.len(), ?mode, "portfolio selected");
        out.insert(profile.clone(), entries);
    }
    out
}
