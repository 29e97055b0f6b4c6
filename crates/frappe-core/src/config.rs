//! Engine configuration.
//!
//! Every business constant of the pipeline lives here so a deployment can
//! tune thresholds and weighting tables without recompiling. Configs load
//! from YAML (feature `yaml`, on by default) or JSON and are validated on
//! load.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::FrappeError;
use crate::selection::screening::ScreeningPatterns;
use crate::types::{AssetClass, Bucket};
use crate::FrappeResult;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Exclusion rules of the screening stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningRules {
    /// Minimum share-class AUM on the latest trading row.
    pub aum_floor: Decimal,
    /// Track-record length a fund must have at the target date.
    pub inception_weeks: i64,
    pub inception_buffer_weeks: i64,
    /// Regex fragments; a fund whose name matches any of them is dropped.
    pub name_denylist: Vec<String>,
    /// Regex a retail C-class fund name must match.
    pub class_pattern: String,
}

impl Default for ScreeningRules {
    fn default() -> Self {
        let denylist = [
            "사모", "모투자", "상장지수", "ELS", "지분증권", "연금", "퇴직", "변액",
            "장기주택마련", "재형", "소득공제", "목표", "월지급", "법인", "레버리지", "BULL",
            "1.5배", "2배", "두배", "불마켓", "인버스", "리버스", "BEAR", "경매", "프랭클린",
            "템플턴", "공모주", r"\(UH\)",
        ];
        Self {
            aum_floor: dec!(5000000000),
            inception_weeks: 104,
            inception_buffer_weeks: 5,
            name_denylist: denylist.iter().map(|s| s.to_string()).collect(),
            class_pattern: r"([Cc]([0-9]|-?[Ee])?.?)$".to_string(),
        }
    }
}

/// Correlation gate of the pre-selection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreselectionRules {
    pub correlation_threshold: Decimal,
    /// Length of the return/correlation window.
    pub window_weeks: i64,
    /// Most recent weeks left out of the window.
    pub skip_recent_weeks: i64,
    pub domestic_lag_weeks: i64,
    pub foreign_lag_weeks: i64,
}

impl Default for PreselectionRules {
    fn default() -> Self {
        Self {
            correlation_threshold: dec!(0.80),
            window_weeks: 104,
            skip_recent_weeks: 4,
            domestic_lag_weeks: 1,
            foreign_lag_weeks: 2,
        }
    }
}

impl PreselectionRules {
    pub fn benchmark_lag_weeks(&self, class: AssetClass) -> i64 {
        if class.is_domestic() {
            self.domestic_lag_weeks
        } else {
            self.foreign_lag_weeks
        }
    }
}

/// Fund-level allocation bounds, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationRules {
    pub max_weight: Decimal,
    pub min_weight: Decimal,
    /// Funds kept per asset class after post-selection.
    pub top_n: usize,
}

impl Default for AllocationRules {
    fn default() -> Self {
        Self {
            max_weight: dec!(30),
            min_weight: dec!(5),
            top_n: 5,
        }
    }
}

/// Weighting tables indexed by the macro score index.
///
/// The default classes of each bucket (`DM_STOCK`, `KR_BOND`) have no table:
/// they absorb whatever the other classes of their bucket leave over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightingRules {
    /// Share of the profile's equity fraction actually invested in equity.
    pub total_equity: Vec<Decimal>,
    pub equity: BTreeMap<AssetClass, Vec<Decimal>>,
    pub fixed_income: BTreeMap<AssetClass, Vec<Decimal>>,
}

impl Default for WeightingRules {
    fn default() -> Self {
        let mut equity = BTreeMap::new();
        equity.insert(
            AssetClass::KrStock,
            vec![dec!(0.35), dec!(0.30), dec!(0.25), dec!(0.20), dec!(0.20)],
        );
        equity.insert(
            AssetClass::EmStock,
            vec![dec!(0.05), dec!(0.10), dec!(0.15), dec!(0.20), dec!(0.20)],
        );
        equity.insert(
            AssetClass::Gold,
            vec![dec!(0.10), dec!(0.10), dec!(0.05), dec!(0.05), dec!(0.00)],
        );

        let mut fixed_income = BTreeMap::new();
        fixed_income.insert(
            AssetClass::DmBond,
            vec![dec!(0.20), dec!(0.25), dec!(0.30), dec!(0.30), dec!(0.35)],
        );
        fixed_income.insert(
            AssetClass::EmBond,
            vec![dec!(0.05), dec!(0.05), dec!(0.10), dec!(0.10), dec!(0.10)],
        );

        Self {
            total_equity: vec![dec!(0.60), dec!(0.70), dec!(0.80), dec!(0.90), dec!(1.00)],
            equity,
            fixed_income,
        }
    }
}

impl WeightingRules {
    /// Number of macro score rows every table must provide.
    pub fn rows(&self) -> usize {
        self.total_equity.len()
    }
}

// ---------------------------------------------------------------------------
// Engine config
// ---------------------------------------------------------------------------

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub screening: ScreeningRules,
    pub preselection: PreselectionRules,
    pub allocation: AllocationRules,
    pub weighting: WeightingRules,
    /// Risk profile name -> equity fraction (0 to 1).
    pub risk_profiles: BTreeMap<String, Decimal>,
    /// Asset class -> benchmark symbol.
    pub benchmarks: BTreeMap<AssetClass, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let risk_profiles = [
            ("stable", dec!(0.2)),
            ("stability_seeking", dec!(0.4)),
            ("risk_neutral", dec!(0.6)),
            ("active", dec!(0.8)),
            ("aggressive", dec!(1.0)),
        ]
        .into_iter()
        .map(|(name, fraction)| (name.to_string(), fraction))
        .collect();

        let benchmarks = [
            (AssetClass::KrStock, "I04781"),
            (AssetClass::DmStock, "I00010"),
            (AssetClass::EmStock, "I00020"),
            (AssetClass::Gold, "SPGCGC"),
            (AssetClass::KrBond, "MLG0SK"),
            (AssetClass::DmBond, "MLG0D0"),
            (AssetClass::EmBond, "MLEMGB"),
        ]
        .into_iter()
        .map(|(class, symbol)| (class, symbol.to_string()))
        .collect();

        Self {
            screening: ScreeningRules::default(),
            preselection: PreselectionRules::default(),
            allocation: AllocationRules::default(),
            weighting: WeightingRules::default(),
            risk_profiles,
            benchmarks,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> FrappeResult<Self> {
        let config: EngineConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(s: &str) -> FrappeResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, choosing the format from its extension.
    pub fn load(path: &Path) -> FrappeResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            FrappeError::Configuration(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            #[cfg(feature = "yaml")]
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            _ => Err(FrappeError::Configuration(format!(
                "Unsupported config format: {}",
                path.display()
            ))),
        }
    }

    /// Benchmark symbol tracked by an asset class.
    pub fn benchmark_symbol(&self, class: AssetClass) -> FrappeResult<&str> {
        self.benchmarks
            .get(&class)
            .map(String::as_str)
            .ok_or_else(|| {
                FrappeError::Configuration(format!("No benchmark configured for {class}"))
            })
    }

    /// Equity fraction of a named risk profile.
    pub fn risk_profile(&self, name: &str) -> FrappeResult<Decimal> {
        self.risk_profiles
            .get(name)
            .copied()
            .ok_or_else(|| FrappeError::Validation {
                field: "risk_profile".into(),
                reason: format!("Unknown risk profile: {name}"),
            })
    }

    pub fn validate(&self) -> FrappeResult<()> {
        ScreeningPatterns::compile(&self.screening)?;

        if self.allocation.max_weight <= Decimal::ZERO {
            return Err(FrappeError::Configuration(
                "allocation.max_weight must be positive".into(),
            ));
        }
        if self.allocation.min_weight < Decimal::ZERO
            || self.allocation.min_weight > self.allocation.max_weight
        {
            return Err(FrappeError::Configuration(
                "allocation.min_weight must lie between 0 and max_weight".into(),
            ));
        }
        if self.allocation.top_n == 0 {
            return Err(FrappeError::Configuration(
                "allocation.top_n must be at least 1".into(),
            ));
        }
        if self.preselection.window_weeks <= self.preselection.skip_recent_weeks {
            return Err(FrappeError::Configuration(
                "preselection.window_weeks must exceed skip_recent_weeks".into(),
            ));
        }

        let rows = self.weighting.rows();
        if rows == 0 {
            return Err(FrappeError::Configuration(
                "weighting.total_equity must have at least one row".into(),
            ));
        }
        validate_ratio_tables(&self.weighting.equity, Bucket::Equity, rows)?;
        validate_ratio_tables(&self.weighting.fixed_income, Bucket::FixedIncome, rows)?;

        for (name, fraction) in &self.risk_profiles {
            if *fraction < Decimal::ZERO || *fraction > Decimal::ONE {
                return Err(FrappeError::Configuration(format!(
                    "Equity fraction of risk profile '{name}' must be between 0 and 1"
                )));
            }
        }
        Ok(())
    }
}

fn validate_ratio_tables(
    tables: &BTreeMap<AssetClass, Vec<Decimal>>,
    bucket: Bucket,
    rows: usize,
) -> FrappeResult<()> {
    for (class, table) in tables {
        if class.bucket() != Some(bucket) {
            return Err(FrappeError::Configuration(format!(
                "{class} cannot carry a {bucket} ratio table"
            )));
        }
        if *class == bucket.default_class() {
            return Err(FrappeError::Configuration(format!(
                "{class} absorbs the {bucket} remainder and takes no ratio table"
            )));
        }
        if table.len() != rows {
            return Err(FrappeError::Configuration(format!(
                "{class} ratio table has {} rows, expected {rows}",
                table.len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.allocation.max_weight, dec!(30));
        assert_eq!(config.preselection.correlation_threshold, dec!(0.80));
        assert_eq!(config.screening.aum_floor, dec!(5000000000));
    }

    #[test]
    fn test_lag_by_market() {
        let rules = PreselectionRules::default();
        assert_eq!(rules.benchmark_lag_weeks(AssetClass::KrStock), 1);
        assert_eq!(rules.benchmark_lag_weeks(AssetClass::DmBond), 2);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"allocation": {"max_weight": 25}}"#).unwrap();
        assert_eq!(config.allocation.max_weight, dec!(25));
        assert_eq!(config.allocation.min_weight, dec!(5));
        assert_eq!(config.risk_profiles.len(), 5);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_yaml_config() {
        let yaml = r#"
risk_profiles:
  conservative: 0.3
  aggressive: 0.9
weighting:
  total_equity: [0.5, 1.0]
  equity:
    KR_STOCK: [0.5, 0.4]
  fixed_income:
    DM_BOND: [0.3, 0.3]
"#;
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.risk_profile("aggressive").unwrap(), dec!(0.9));
        assert_eq!(config.weighting.rows(), 2);
    }

    #[test]
    fn test_reject_ragged_tables() {
        let mut config = EngineConfig::default();
        config
            .weighting
            .equity
            .insert(AssetClass::KrStock, vec![dec!(0.1)]);
        assert!(matches!(
            config.validate(),
            Err(FrappeError::Configuration(_))
        ));
    }

    #[test]
    fn test_reject_table_for_default_class() {
        let mut config = EngineConfig::default();
        let rows = config.weighting.rows();
        config
            .weighting
            .equity
            .insert(AssetClass::DmStock, vec![dec!(0.1); rows]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_bond_in_equity_table() {
        let mut config = EngineConfig::default();
        let rows = config.weighting.rows();
        config
            .weighting
            .equity
            .insert(AssetClass::DmBond, vec![dec!(0.1); rows]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_bad_pattern() {
        let mut config = EngineConfig::default();
        config.screening.class_pattern = "([".into();
        assert!(matches!(
            config.validate(),
            Err(FrappeError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_risk_profile() {
        let config = EngineConfig::default();
        assert!(matches!(
            config.risk_profile("reckless"),
            Err(FrappeError::Validation { .. })
        ));
    }
}
