//! The recommendation pipeline.
//!
//! [`Engine`] wires the stages together over a [`DataProvider`]:
//! screening -> pre-selection -> post-selection -> weighting ->
//! portfolio selection -> correction. Every stage is also exposed on its
//! own so callers can inspect intermediate tables.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

use crate::allocation::correction::{self, CorrectionOutput};
use crate::allocation::portfolio::{self, SelectionMode};
use crate::allocation::weighting;
use crate::config::EngineConfig;
use crate::error::FrappeError;
use crate::provider::DataProvider;
use crate::selection::postselection;
use crate::selection::preselection::{self, FundStatistics, PreselectionOutput};
use crate::selection::screening::{self, ScreeningOutput};
use crate::types::*;
use crate::FrappeResult;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub target_date: NaiveDate,
    pub universe_size: usize,
    pub screening: ScreeningOutput,
    pub preselection: PreselectionOutput,
    pub postselected: Vec<PreselectedFund>,
    pub macro_score: Decimal,
    /// Weights straight out of the weighting stage.
    pub target_weights: ByRiskProfile<WeightMap>,
    /// Integer weights after correction.
    pub weights: ByRiskProfile<WeightMap>,
    pub portfolios: ByRiskProfile<Vec<PortfolioEntry>>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine<P: DataProvider> {
    provider: P,
    config: EngineConfig,
}

impl<P: DataProvider> Engine<P> {
    pub fn new(provider: P, config: EngineConfig) -> FrappeResult<Self> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A recommendation can only be made for a date that has happened.
    pub fn validate_target_date(target: NaiveDate, today: NaiveDate) -> FrappeResult<()> {
        if target > today {
            return Err(FrappeError::Validation {
                field: "target_date".into(),
                reason: format!("Target date {target} is after today ({today})"),
            });
        }
        Ok(())
    }

    /// Risk profiles to run: all configured ones, or a single named one.
    pub fn select_profiles(&self, name: Option<&str>) -> FrappeResult<BTreeMap<String, Decimal>> {
        match name {
            None => Ok(self.config.risk_profiles.clone()),
            Some(name) => {
                let fraction = self.config.risk_profile(name)?;
                Ok(BTreeMap::from([(name.to_string(), fraction)]))
            }
        }
    }

    pub fn load_universe(&self, date: NaiveDate) -> FrappeResult<Vec<FundRecord>> {
        let universe = self.provider.fund_universe(date)?;
        info!(%date, funds = universe.len(), "universe loaded");
        Ok(universe)
    }

    pub fn run_screening(
        &self,
        universe: &[FundRecord],
        date: NaiveDate,
    ) -> FrappeResult<ScreeningOutput> {
        screening::run_screening(&self.provider, universe, date, &self.config.screening)
    }

    pub fn run_preselection(
        &self,
        funds: &[FundRecord],
        date: NaiveDate,
    ) -> FrappeResult<PreselectionOutput> {
        preselection::run_preselection(&self.provider, funds, date, &self.config)
    }

    pub fn run_postselection(&self, funds: &[PreselectedFund]) -> Vec<PreselectedFund> {
        postselection::run_postselection(funds, self.config.allocation.top_n)
    }

    /// Macro score for `date`, or `MissingMacroScore` naming the month it
    /// should have been published for.
    pub fn macro_score(&self, date: NaiveDate) -> FrappeResult<Decimal> {
        self.provider.macro_score(date)?.ok_or_else(|| {
            let month_start = date.with_day(1).unwrap_or(date);
            let previous = month_start - Duration::days(1);
            FrappeError::MissingMacroScore {
                month: previous.format("%Y-%m").to_string(),
            }
        })
    }

    pub fn run_weighting(
        &self,
        date: NaiveDate,
        profiles: &BTreeMap<String, Decimal>,
    ) -> FrappeResult<ByRiskProfile<WeightMap>> {
        let score = self.macro_score(date)?;
        weighting::run_weighting(score, profiles, &self.config.weighting)
    }

    pub fn run_portfolio_selection(
        &self,
        funds: &[PreselectedFund],
        weights: &ByRiskProfile<WeightMap>,
    ) -> ByRiskProfile<Vec<PortfolioEntry>> {
        portfolio::run_portfolio_selection(
            funds,
            weights,
            &self.config.allocation,
            SelectionMode::Normal,
        )
    }

    pub fn run_correction(
        &self,
        funds: &[PreselectedFund],
        weights: &ByRiskProfile<WeightMap>,
    ) -> FrappeResult<CorrectionOutput> {
        correction::run_correction(funds, weights, &self.config.allocation)
    }

    /// Period return and benchmark correlation of a single fund.
    pub fn fund_benchmark_correlation(
        &self,
        asset_id: &str,
        class: AssetClass,
        date: NaiveDate,
    ) -> FrappeResult<FundStatistics> {
        preselection::fund_benchmark_correlation(&self.provider, asset_id, class, date, &self.config)
    }

    /// Run every stage for `date` and the selected risk profiles.
    pub fn recommend(
        &self,
        date: NaiveDate,
        today: NaiveDate,
        profile: Option<&str>,
    ) -> FrappeResult<ComputationOutput<Recommendation>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();

        Self::validate_target_date(date, today)?;
        let profiles = self.select_profiles(profile)?;

        let universe = self.load_universe(date)?;
        let screened = self.run_screening(&universe, date)?;
        if screened.refreshed {
            warnings.push("Trading data was refreshed before screening".into());
        }
        if screened.survivors.is_empty() {
            return Err(FrappeError::InsufficientData(format!(
                "No fund survived screening on {date}"
            )));
        }

        let preselected = self.run_preselection(&screened.survivors, date)?;
        let postselected = self.run_postselection(&preselected.selected);

        let macro_score = self.macro_score(date)?;
        let target_weights =
            weighting::run_weighting(macro_score, &profiles, &self.config.weighting)?;

        for class in AssetClass::ALL.iter().filter(|c| c.bucket().is_some()) {
            if !postselected.iter().any(|f| f.asset_class_symbol == *class) {
                warnings.push(format!(
                    "No eligible fund for {class}; its weight was redistributed"
                ));
            }
        }

        let corrected = self.run_correction(&postselected, &target_weights)?;
        info!(
            %date,
            profiles = corrected.weights.len(),
            funds = postselected.len(),
            "recommendation finished"
        );

        let assumptions = serde_json::json!({
            "target_date": date.to_string(),
            "correlation_threshold": self.config.preselection.correlation_threshold.to_string(),
            "window_weeks": self.config.preselection.window_weeks,
            "skip_recent_weeks": self.config.preselection.skip_recent_weeks,
            "top_n": self.config.allocation.top_n,
            "max_weight": self.config.allocation.max_weight.to_string(),
            "min_weight": self.config.allocation.min_weight.to_string(),
            "risk_profiles": profiles,
        });

        let result = Recommendation {
            target_date: date,
            universe_size: universe.len(),
            screening: screened,
            preselection: preselected,
            postselected,
            macro_score,
            target_weights,
            weights: corrected.weights,
            portfolios: corrected.portfolios,
        };

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Fund screening, Spearman pre-selection, return ranking, macro weighting and integer correction",
            &assumptions,
            warnings,
            elapsed,
            result,
        ))
    }
}
