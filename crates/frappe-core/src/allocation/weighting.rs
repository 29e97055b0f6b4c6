//! Weighting: asset-class weights per risk profile from the macro score.
//!
//! Covers:
//! 1. **Score index** -- `floor(score + 1)` selects a row of every table
//! 2. **Total equity** -- `fraction * total_equity[idx] * 100`, 5 dp
//! 3. **Bucket split** -- per-class ratios of the equity and fixed-income
//!    totals; `DM_STOCK` and `KR_BOND` absorb the remainders
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::WeightingRules;
use crate::error::FrappeError;
use crate::types::{total_weight, AssetClass, Bucket, ByRiskProfile, WeightMap};
use crate::FrappeResult;

const WEIGHT_DP: u32 = 5;

/// Row of the weighting tables selected by a macro score.
pub fn score_index(score: Decimal, rows: usize) -> FrappeResult<usize> {
    (score + Decimal::ONE)
        .floor()
        .to_usize()
        .filter(|idx| *idx < rows)
        .ok_or_else(|| {
            FrappeError::Configuration(format!(
                "Macro score {score} selects no row of the {rows}-row weighting tables"
            ))
        })
}

fn split_bucket(
    total: Decimal,
    ratios: &BTreeMap<AssetClass, Vec<Decimal>>,
    idx: usize,
    bucket: Bucket,
    weights: &mut WeightMap,
) -> FrappeResult<()> {
    let mut allotted = WeightMap::new();
    for (class, table) in ratios {
        let ratio = table.get(idx).ok_or_else(|| {
            FrappeError::Configuration(format!("Ratio table for {class} has no row {idx}"))
        })?;
        allotted.insert(*class, (*ratio * total).round_dp(WEIGHT_DP));
    }
    let remainder = (total - total_weight(&allotted)).round_dp(WEIGHT_DP);
    allotted.insert(bucket.default_class(), remainder);
    weights.extend(allotted);
    Ok(())
}

/// Weight map of one risk profile.
pub fn profile_weights(
    equity_fraction: Decimal,
    idx: usize,
    rules: &WeightingRules,
) -> FrappeResult<WeightMap> {
    if equity_fraction < Decimal::ZERO || equity_fraction > Decimal::ONE {
        return Err(FrappeError::Validation {
            field: "equity_fraction".into(),
            reason: format!("Equity fraction {equity_fraction} outside [0, 1]"),
        });
    }
    let base = rules.total_equity.get(idx).ok_or_else(|| {
        FrappeError::Configuration(format!("Total equity table has no row {idx}"))
    })?;

    let equity = (equity_fraction * *base * dec!(100)).round_dp(WEIGHT_DP);
    let fixed_income = dec!(100) - equity;

    let mut weights = WeightMap::new();
    split_bucket(equity, &rules.equity, idx, Bucket::Equity, &mut weights)?;
    split_bucket(
        fixed_income,
        &rules.fixed_income,
        idx,
        Bucket::FixedIncome,
        &mut weights,
    )?;
    Ok(weights)
}

/// Weight maps for every given risk profile.
pub fn run_weighting(
    macro_score: Decimal,
    profiles: &BTreeMap<String, Decimal>,
    rules: &WeightingRules,
) -> FrappeResult<ByRiskProfile<WeightMap>> {
    let idx = score_index(macro_score, rules.rows())?;
    info!(%macro_score, score_index = idx, profiles = profiles.len(), "weighting started");

    let mut out = ByRiskProfile::new();
    for (name, fraction) in profiles {
        let weights = profile_weights(*fraction, idx, rules)?;
        debug!(profile = %name, ?weights, "profile weighted");
        out.insert(name.clone(), weights);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
