//! Rank correlation between funds and their benchmark.
//!
//! Series are aligned on a common date axis (forward-filled, then cut to the
//! dates where every column has a value), resampled to weekly frequency
//! anchored on the weekday of the latest observation, restricted to a
//! trailing window and ranked. Ties receive the average of their ranks.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::FrappeError;
use crate::types::PricePoint;
use crate::FrappeResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One row of an aligned price table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub values: Vec<Decimal>,
}

/// Several price series on a shared date axis, ascending by date. Every row
/// carries a value for every column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceTable {
    pub columns: Vec<String>,
    pub rows: Vec<PriceRow>,
}

/// Symmetric pairwise correlation matrix. Entries are `None` where a
/// column is constant over the window or fewer than two rows remain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<Decimal>>>,
    /// Weekly observations the coefficients were computed over.
    pub observations: usize,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<Decimal> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}

// ---------------------------------------------------------------------------
// Alignment
// ---------------------------------------------------------------------------

impl PriceTable {
    /// Align named series on the union of their dates, forward-fill gaps and
    /// keep only the dates where every column has a value.
    pub fn align(series: Vec<(String, Vec<PricePoint>)>) -> Self {
        let dates: BTreeSet<NaiveDate> = series
            .iter()
            .flat_map(|(_, pts)| pts.iter().map(|p| p.date))
            .collect();

        let lookups: Vec<BTreeMap<NaiveDate, Decimal>> = series
            .iter()
            .map(|(_, pts)| pts.iter().map(|p| (p.date, p.price)).collect())
            .collect();

        let mut last_seen: Vec<Option<Decimal>> = vec![None; series.len()];
        let mut rows = Vec::new();
        for date in dates {
            for (slot, lookup) in last_seen.iter_mut().zip(&lookups) {
                if let Some(v) = lookup.get(&date) {
                    *slot = Some(*v);
                }
            }
            if let Some(values) = last_seen.iter().copied().collect::<Option<Vec<_>>>() {
                rows.push(PriceRow { date, values });
            }
        }

        Self {
            columns: series.into_iter().map(|(name, _)| name).collect(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    /// Weekly samples ending on the latest date, each holding the most
    /// recent row on or before the sample date.
    pub fn resample_weekly(&self) -> Self {
        let (first, last) = match (self.rows.first(), self.rows.last()) {
            (Some(f), Some(l)) => (f.date, l.date),
            _ => return self.clone(),
        };

        let mut labels = Vec::new();
        let mut label = last;
        while label >= first {
            labels.push(label);
            label -= Duration::weeks(1);
        }
        labels.reverse();

        let mut rows = Vec::with_capacity(labels.len());
        let mut cursor = 0;
        for label in labels {
            while cursor + 1 < self.rows.len() && self.rows[cursor + 1].date <= label {
                cursor += 1;
            }
            rows.push(PriceRow {
                date: label,
                values: self.rows[cursor].values.clone(),
            });
        }

        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Rows dated within `[start, end]`.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| r.date >= start && r.date <= end)
                .cloned()
                .collect(),
        }
    }

    fn column(&self, idx: usize) -> Vec<Decimal> {
        self.rows.iter().map(|r| r.values[idx]).collect()
    }

    /// Pairwise Spearman correlation of every column.
    pub fn spearman(&self) -> CorrelationMatrix {
        let ranks: Vec<Vec<Decimal>> = (0..self.columns.len())
            .map(|i| average_ranks(&self.column(i)))
            .collect();

        let n = self.columns.len();
        let mut values = vec![vec![None; n]; n];
        for i in 0..n {
            for j in i..n {
                let rho = pearson(&ranks[i], &ranks[j]);
                values[i][j] = rho;
                values[j][i] = rho;
            }
        }

        CorrelationMatrix {
            columns: self.columns.clone(),
            values,
            observations: self.rows.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Weekly Spearman correlation matrix over
/// `[latest - window_weeks, latest - skip_recent_weeks]`.
pub fn spearman_correlation(
    table: &PriceTable,
    window_weeks: i64,
    skip_recent_weeks: i64,
) -> FrappeResult<CorrelationMatrix> {
    let latest = table.latest_date().ok_or_else(|| {
        FrappeError::InsufficientData("Price table has no common observations".into())
    })?;

    let weekly = table.resample_weekly();
    let start = latest - Duration::weeks(window_weeks);
    let end = latest - Duration::weeks(skip_recent_weeks);
    Ok(weekly.window(start, end).spearman())
}

/// 1-based ranks; tied values share the mean of the ranks they span.
pub fn average_ranks(values: &[Decimal]) -> Vec<Decimal> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].cmp(&values[b]));

    let mut ranks = vec![Decimal::ZERO; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // positions i..=j share ranks i+1 ..= j+1
        let avg = Decimal::from((i + j + 2) as u64) / Decimal::TWO;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

fn pearson(a: &[Decimal], b: &[Decimal]) -> Option<Decimal> {
    let n = a.len();
    if n < 2 || n != b.len() {
        return None;
    }
    let n_dec = Decimal::from(n as u64);
    let mean_a: Decimal = a.iter().copied().sum::<Decimal>() / n_dec;
    let mean_b: Decimal = b.iter().copied().sum::<Decimal>() / n_dec;

    let mut cov = Decimal::ZERO;
    let mut var_a = Decimal::ZERO;
    let mut var_b = Decimal::ZERO;
    for (x, y) in a.iter().zip(b) {
        let da = *x - mean_a;
        let db = *y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    if var_a.is_zero() || var_b.is_zero() {
        return None;
    }
    let denom = (var_a * var_b).sqrt()?;
    if denom.is_zero() {
        return None;
    }
    let rho = cov / denom;
    Some(rho.max(-Decimal::ONE).min(Decimal::ONE))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
