//! Post-selection: the best performers of each asset class.

use std::collections::BTreeMap;
use tracing::info;

use crate::types::{AssetClass, PreselectedFund};

/// Group funds by asset class, each group sorted by period return
/// descending. The sort is stable: equal returns keep their input order.
pub fn rank_by_class(funds: &[PreselectedFund]) -> BTreeMap<AssetClass, Vec<PreselectedFund>> {
    let mut groups: BTreeMap<AssetClass, Vec<PreselectedFund>> = BTreeMap::new();
    for fund in funds {
        groups
            .entry(fund.asset_class_symbol)
            .or_default()
            .push(fund.clone());
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| b.period_return.cmp(&a.period_return));
    }
    groups
}

/// Keep the `top_n` highest-return funds of every asset class. Output is
/// ordered by asset class, then period return descending.
pub fn run_postselection(funds: &[PreselectedFund], top_n: usize) -> Vec<PreselectedFund> {
    let mut selected = Vec::new();
    for (class, mut group) in rank_by_class(funds) {
        let available = group.len();
        group.truncate(top_n);
        info!(%class, available, kept = group.len(), "post-selection ranked");
        selected.extend(group);
    }
    selected
}
