//! Correction: turn raw weights into a deliverable integer allocation.
//!
//! Covers:
//! 1. **Rounding** -- every weight to the nearest integer (banker's rounding)
//! 2. **Rebalance** -- step the total to exactly 100, one point at a time,
//!    alternating between the equity and fixed-income buckets
//! 3. **Orphans** -- classes with no selected fund are removed and their
//!    weight is split evenly over the rest of their bucket
//! 4. **Minimum weight** -- classes below `min_weight` fold into their
//!    bucket's default class
//! 5. **Portfolio** -- fund selection re-run in correction mode

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::allocation::portfolio::{run_portfolio_selection, SelectionMode};
use crate::config::AllocationRules;
use crate::error::FrappeError;
use crate::types::{
    total_weight, AssetClass, Bucket, ByRiskProfile, PortfolioEntry, PreselectedFund, WeightMap,
};
use crate::FrappeResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which bucket the rebalance step may adjust next.
///
/// From `PreferEquity` the equity bucket is adjusted when its extreme value
/// is at least as extreme as the fixed-income one. After an equity
/// adjustment the next step always goes to fixed income.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceState {
    PreferEquity,
    PreferFixedIncome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Down,
    Up,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionOutput {
    pub weights: ByRiskProfile<WeightMap>,
    pub portfolios: ByRiskProfile<Vec<PortfolioEntry>>,
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Round every weight to an integer. Classes outside both buckets are
/// dropped.
pub fn round_weights(weights: &WeightMap) -> WeightMap {
    weights
        .iter()
        .filter_map(|(class, w)| {
            if class.bucket().is_none() {
                warn!(%class, weight = %w, "class outside every bucket dropped");
                return None;
            }
            Some((*class, w.round()))
        })
        .collect()
}

/// First class of `bucket` holding the largest (`Down`) or smallest (`Up`)
/// weight.
fn extreme(weights: &WeightMap, bucket: Bucket, step: Step) -> Option<(AssetClass, Decimal)> {
    let mut best: Option<(AssetClass, Decimal)> = None;
    for (class, w) in weights.iter().filter(|(c, _)| c.bucket() == Some(bucket)) {
        let better = match (best, step) {
            (None, _) => true,
            (Some((_, b)), Step::Down) => *w > b,
            (Some((_, b)), Step::Up) => *w < b,
        };
        if better {
            best = Some((*class, *w));
        }
    }
    best
}

/// Bring the total of integer weights to exactly 100.
pub fn rebalance_to_hundred(weights: &mut WeightMap) -> FrappeResult<()> {
    let mut state = RebalanceState::PreferEquity;
    loop {
        let step = match total_weight(weights).cmp(&dec!(100)) {
            Ordering::Greater => Step::Down,
            Ordering::Less => Step::Up,
            Ordering::Equal => return Ok(()),
        };

        let equity = extreme(weights, Bucket::Equity, step);
        let fixed = extreme(weights, Bucket::FixedIncome, step);
        let (class, value) = match (equity, fixed) {
            (None, None) => {
                return Err(FrappeError::Configuration(
                    "No equity or fixed-income class left to rebalance".into(),
                ))
            }
            (Some(e), None) => e,
            (None, Some(f)) => f,
            (Some(e), Some(f)) => {
                let prefer_equity = state == RebalanceState::PreferEquity
                    && match step {
                        Step::Down => e.1 >= f.1,
                        Step::Up => e.1 <= f.1,
                    };
                // a bucket at zero cannot give up weight
                match (prefer_equity, step) {
                    (true, Step::Down) if e.1 <= Decimal::ZERO => f,
                    (false, Step::Down) if f.1 <= Decimal::ZERO => e,
                    (true, _) => e,
                    (false, _) => f,
                }
            }
        };

        let adjusted = match step {
            Step::Down => value - Decimal::ONE,
            Step::Up => value + Decimal::ONE,
        };
        debug!(%class, from = %value, to = %adjusted, "rebalance step");
        weights.insert(class, adjusted);

        state = if class.bucket() == Some(Bucket::Equity) {
            RebalanceState::PreferFixedIncome
        } else {
            RebalanceState::PreferEquity
        };
    }
}

/// Class of `bucket` that absorbs remainders: the default class when
/// present, otherwise the largest remaining class.
fn anchor(weights: &WeightMap, bucket: Bucket) -> Option<AssetClass> {
    let default = bucket.default_class();
    if weights.contains_key(&default) {
        return Some(default);
    }
    extreme(weights, bucket, Step::Down).map(|(class, _)| class)
}

/// Remove classes with no selectable fund and share their weight over the
/// remaining classes of the same bucket.
pub fn fold_orphans(weights: &mut WeightMap, available: &BTreeSet<AssetClass>) -> FrappeResult<()> {
    for bucket in [Bucket::Equity, Bucket::FixedIncome] {
        let orphans: Vec<AssetClass> = weights
            .keys()
            .filter(|c| c.bucket() == Some(bucket) && !available.contains(c))
            .copied()
            .collect();
        if orphans.is_empty() {
            continue;
        }

        let mut pool = Decimal::ZERO;
        for class in &orphans {
            if let Some(w) = weights.remove(class) {
                info!(%class, weight = %w, %bucket, "orphaned weight pooled");
                pool += w;
            }
        }

        let members: Vec<AssetClass> = weights
            .keys()
            .filter(|c| c.bucket() == Some(bucket))
            .copied()
            .collect();
        if members.is_empty() {
            if pool.is_zero() {
                continue;
            }
            return Err(FrappeError::Configuration(format!(
                "No {bucket} class left to absorb {pool} of orphaned weight"
            )));
        }

        let n = Decimal::from(members.len() as u64);
        let quotient = (pool / n).floor();
        let remainder = pool - quotient * n;
        for class in &members {
            if let Some(w) = weights.get_mut(class) {
                *w += quotient;
            }
        }
        if let Some(target) = anchor(weights, bucket) {
            if let Some(w) = weights.get_mut(&target) {
                *w += remainder;
            }
        }
    }
    Ok(())
}

/// Fold classes below `min_weight` into their bucket anchor.
pub fn fold_small(weights: &mut WeightMap, min_weight: Decimal) {
    for bucket in [Bucket::Equity, Bucket::FixedIncome] {
        let Some(target) = anchor(weights, bucket) else {
            continue;
        };
        let small: Vec<(AssetClass, Decimal)> = weights
            .iter()
            .filter(|(c, w)| c.bucket() == Some(bucket) && **c != target && **w < min_weight)
            .map(|(c, w)| (*c, *w))
            .collect();
        for (class, w) in small {
            weights.remove(&class);
            if let Some(t) = weights.get_mut(&target) {
                *t += w;
            }
            info!(%class, weight = %w, into = %target, "sub-minimum weight folded");
        }
    }
}

/// Integer weights summing to 100 over classes that have funds.
pub fn correct_weights(
    weights: &WeightMap,
    available: &BTreeSet<AssetClass>,
    rules: &AllocationRules,
) -> FrappeResult<WeightMap> {
    let mut corrected = round_weights(weights);
    rebalance_to_hundred(&mut corrected)?;
    fold_orphans(&mut corrected, available)?;
    fold_small(&mut corrected, rules.min_weight);
    Ok(corrected)
}

/// Correct the weights of every risk profile and reselect their funds.
pub fn run_correction(
    funds: &[PreselectedFund],
    weights: &ByRiskProfile<WeightMap>,
    rules: &AllocationRules,
) -> FrappeResult<CorrectionOutput> {
    let available: BTreeSet<AssetClass> = funds.iter().map(|f| f.asset_class_symbol).collect();

    let mut corrected = ByRiskProfile::new();
    for (profile, map) in weights {
        let fixed = correct_weights(map, &available, rules)?;
        info!(%profile, ?fixed, "weights corrected");
        corrected.insert(profile.clone(), fixed);
    }

    let portfolios = run_portfolio_selection(funds, &corrected, rules, SelectionMode::Correction);
    Ok(CorrectionOutput {
        weights: corrected,
        portfolios,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(entries: &[(AssetClass, Decimal)]) -> WeightMap {
        entries.iter().copied().collect()
    }

    fn all_classes() -> BTreeSet<AssetClass> {
        AssetClass::ALL.iter().copied().collect()
    }

    #[test]
    fn test_rounding_is_bankers() {
        let w = map(&[
            (AssetClass::KrStock, dec!(10.5)),
            (AssetClass::EmStock, dec!(11.5)),
            (AssetClass::Gold, dec!(2.7)),
            (AssetClass::Etc, dec!(3)),
        ]);
        let r = round_weights(&w);
        assert_eq!(
            r,
            map(&[
                (AssetClass::KrStock, dec!(10)),
                (AssetClass::EmStock, dec!(12)),
                (AssetClass::Gold, dec!(3)),
            ])
        );
    }

    #[test]
    fn test_rebalance_prefers_larger_fixed_income() {
        let mut w = map(&[
            (AssetClass::DmStock, dec!(40)),
            (AssetClass::KrStock, dec!(10)),
            (AssetClass::KrBond, dec!(44)),
            (AssetClass::DmBond, dec!(10)),
        ]);
        rebalance_to_hundred(&mut w).unwrap();
        assert_eq!(w[&AssetClass::DmStock], dec!(40));
        assert_eq!(w[&AssetClass::KrBond], dec!(40));
    }

    #[test]
    fn test_rebalance_alternates_after_equity() {
        let mut w = map(&[
            (AssetClass::DmStock, dec!(50)),
            (AssetClass::KrBond, dec!(40)),
            (AssetClass::DmBond, dec!(12)),
        ]);
        rebalance_to_hundred(&mut w).unwrap();
        assert_eq!(
            w,
            map(&[
                (AssetClass::DmStock, dec!(49)),
                (AssetClass::KrBond, dec!(39)),
                (AssetClass::DmBond, dec!(12)),
            ])
        );
    }

    #[test]
    fn test_rebalance_up_raises_smallest() {
        let mut w = map(&[
            (AssetClass::DmStock, dec!(30)),
            (AssetClass::KrStock, dec!(8)),
            (AssetClass::KrBond, dec!(50)),
            (AssetClass::DmBond, dec!(10)),
        ]);
        rebalance_to_hundred(&mut w).unwrap();
        assert_eq!(w[&AssetClass::KrStock], dec!(9));
        assert_eq!(w[&AssetClass::DmBond], dec!(11));
        assert_eq!(total_weight(&w), dec!(100));
    }

    #[test]
    fn test_rebalance_single_bucket() {
        let mut w = map(&[(AssetClass::DmStock, dec!(97)), (AssetClass::Gold, dec!(5))]);
        rebalance_to_hundred(&mut w).unwrap();
        assert_eq!(w[&AssetClass::DmStock], dec!(95));

        let mut empty = WeightMap::new();
        assert!(matches!(
            rebalance_to_hundred(&mut empty),
            Err(FrappeError::Configuration(_))
        ));
    }

    #[test]
    fn test_rounded_total_of_101_corrected() {
        // 100.4 before rounding, 101 after
        let w = map(&[
            (AssetClass::DmStock, dec!(30.6)),
            (AssetClass::KrStock, dec!(20.6)),
            (AssetClass::EmStock, dec!(10.2)),
            (AssetClass::KrBond, dec!(28.6)),
            (AssetClass::DmBond, dec!(10.4)),
        ]);
        assert_eq!(total_weight(&w), dec!(100.4));
        let c = correct_weights(&w, &all_classes(), &AllocationRules::default()).unwrap();
        assert_eq!(
            c,
            map(&[
                (AssetClass::DmStock, dec!(30)),
                (AssetClass::KrStock, dec!(21)),
                (AssetClass::EmStock, dec!(10)),
                (AssetClass::KrBond, dec!(29)),
                (AssetClass::DmBond, dec!(10)),
            ])
        );
    }

    #[test]
    fn test_orphan_em_stock_folds_into_sibling() {
        let w = map(&[
            (AssetClass::DmStock, dec!(28)),
            (AssetClass::EmStock, dec!(3)),
            (AssetClass::KrBond, dec!(69)),
        ]);
        let available: BTreeSet<AssetClass> =
            [AssetClass::DmStock, AssetClass::KrBond].into_iter().collect();
        let c = correct_weights(&w, &available, &AllocationRules::default()).unwrap();
        assert_eq!(
            c,
            map(&[(AssetClass::DmStock, dec!(31)), (AssetClass::KrBond, dec!(69))])
        );
    }

    #[test]
    fn test_orphans_split_evenly_with_remainder_to_default() {
        let mut w = map(&[
            (AssetClass::KrStock, dec!(20)),
            (AssetClass::DmStock, dec!(20)),
            (AssetClass::EmStock, dec!(20)),
            (AssetClass::Gold, dec!(5)),
            (AssetClass::KrBond, dec!(35)),
        ]);
        let available: BTreeSet<AssetClass> = [
            AssetClass::KrStock,
            AssetClass::DmStock,
            AssetClass::EmStock,
            AssetClass::KrBond,
        ]
        .into_iter()
        .collect();
        fold_orphans(&mut w, &available).unwrap();
        assert_eq!(w[&AssetClass::KrStock], dec!(21));
        assert_eq!(w[&AssetClass::EmStock], dec!(21));
        assert_eq!(w[&AssetClass::DmStock], dec!(23));
        assert!(!w.contains_key(&AssetClass::Gold));
    }

    #[test]
    fn test_orphan_without_sibling_is_configuration_error() {
        let mut w = map(&[(AssetClass::DmStock, dec!(60)), (AssetClass::DmBond, dec!(40))]);
        let available: BTreeSet<AssetClass> = [AssetClass::DmStock].into_iter().collect();
        let err = fold_orphans(&mut w, &available).unwrap_err();
        assert!(matches!(err, FrappeError::Configuration(_)));
    }

    #[test]
    fn test_small_weights_fold_into_default() {
        let mut w = map(&[
            (AssetClass::DmStock, dec!(40)),
            (AssetClass::Gold, dec!(4)),
            (AssetClass::KrStock, dec!(5)),
            (AssetClass::KrBond, dec!(2)),
            (AssetClass::EmBond, dec!(3)),
            (AssetClass::DmBond, dec!(46)),
        ]);
        fold_small(&mut w, dec!(5));
        assert_eq!(
            w,
            map(&[
                (AssetClass::KrStock, dec!(5)),
                (AssetClass::DmStock, dec!(44)),
                (AssetClass::KrBond, dec!(5)),
                (AssetClass::DmBond, dec!(46)),
            ])
        );
    }

    #[test]
    fn test_correction_invariants_and_idempotence() {
        let rules = AllocationRules::default();
        let available: BTreeSet<AssetClass> = [
            AssetClass::KrStock,
            AssetClass::DmStock,
            AssetClass::Gold,
            AssetClass::KrBond,
            AssetClass::DmBond,
        ]
        .into_iter()
        .collect();
        let raw = map(&[
            (AssetClass::KrStock, dec!(10.8)),
            (AssetClass::EmStock, dec!(10.8)),
            (AssetClass::Gold, dec!(2.7)),
            (AssetClass::DmStock, dec!(29.7)),
            (AssetClass::DmBond, dec!(13.8)),
            (AssetClass::EmBond, dec!(4.6)),
            (AssetClass::KrBond, dec!(27.6)),
        ]);
        let once = correct_weights(&raw, &available, &rules).unwrap();
        assert_eq!(total_weight(&once), dec!(100));
        for (class, w) in &once {
            assert!(*w >= Decimal::ZERO);
            assert_eq!(*w, w.round());
            let is_default = [AssetClass::DmStock, AssetClass::KrBond].contains(class);
            assert!(is_default || w.is_zero() || *w >= rules.min_weight, "{class}: {w}");
            assert!(available.contains(class));
        }
        let twice = correct_weights(&once, &available, &rules).unwrap();
        assert_eq!(once, twice);
    }
}
