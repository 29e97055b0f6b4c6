use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::error::Error;

use frappe_core::{AssetClass, ByRiskProfile, PortfolioEntry, PreselectedFund, WeightMap};

use super::{today, CliEngine, DataArgs};

/// Arguments for the allocation commands
#[derive(Args)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Restrict to one risk profile (all configured profiles when omitted)
    #[arg(long)]
    pub profile: Option<String>,
}

#[derive(Debug, Serialize)]
struct WeightRow<'a> {
    risk_profile: &'a str,
    asset_class: AssetClass,
    weight: Decimal,
}

#[derive(Debug, Serialize)]
struct PortfolioRow<'a> {
    risk_profile: &'a str,
    #[serde(flatten)]
    entry: &'a PortfolioEntry,
}

fn weight_rows(weights: &ByRiskProfile<WeightMap>) -> Vec<WeightRow<'_>> {
    weights
        .iter()
        .flat_map(|(profile, map)| {
            map.iter().map(move |(class, weight)| WeightRow {
                risk_profile: profile,
                asset_class: *class,
                weight: *weight,
            })
        })
        .collect()
}

fn portfolio_rows(portfolios: &ByRiskProfile<Vec<PortfolioEntry>>) -> Vec<PortfolioRow<'_>> {
    portfolios
        .iter()
        .flat_map(|(profile, entries)| {
            entries.iter().map(move |entry| PortfolioRow {
                risk_profile: profile,
                entry,
            })
        })
        .collect()
}

fn postselected(engine: &CliEngine, date: NaiveDate) -> Result<Vec<PreselectedFund>, Box<dyn Error>> {
    let universe = engine.load_universe(date)?;
    let screened = engine.run_screening(&universe, date)?;
    let preselected = engine.run_preselection(&screened.survivors, date)?;
    Ok(engine.run_postselection(&preselected.selected))
}

fn weights(
    engine: &CliEngine,
    date: NaiveDate,
    profile: Option<&str>,
) -> Result<ByRiskProfile<WeightMap>, Box<dyn Error>> {
    let profiles = engine.select_profiles(profile)?;
    Ok(engine.run_weighting(date, &profiles)?)
}

pub fn run_universe(args: DataArgs) -> Result<Value, Box<dyn Error>> {
    let date = args.target_date()?;
    let engine = args.engine()?;
    Ok(serde_json::to_value(engine.load_universe(date)?)?)
}

pub fn run_screen(args: DataArgs) -> Result<Value, Box<dyn Error>> {
    let date = args.target_date()?;
    let engine = args.engine()?;
    let universe = engine.load_universe(date)?;
    let screened = engine.run_screening(&universe, date)?;
    Ok(serde_json::to_value(screened)?)
}

pub fn run_preselect(args: DataArgs) -> Result<Value, Box<dyn Error>> {
    let date = args.target_date()?;
    let engine = args.engine()?;
    let universe = engine.load_universe(date)?;
    let screened = engine.run_screening(&universe, date)?;
    let preselected = engine.run_preselection(&screened.survivors, date)?;
    Ok(serde_json::to_value(preselected)?)
}

pub fn run_postselect(args: DataArgs) -> Result<Value, Box<dyn Error>> {
    let date = args.target_date()?;
    let engine = args.engine()?;
    Ok(serde_json::to_value(postselected(&engine, date)?)?)
}

pub fn run_weight(args: ProfileArgs) -> Result<Value, Box<dyn Error>> {
    let date = args.data.target_date()?;
    let engine = args.data.engine()?;
    let weights = weights(&engine, date, args.profile.as_deref())?;
    Ok(serde_json::to_value(weight_rows(&weights))?)
}

pub fn run_allocate(args: ProfileArgs) -> Result<Value, Box<dyn Error>> {
    let date = args.data.target_date()?;
    let engine = args.data.engine()?;
    let funds = postselected(&engine, date)?;
    let weights = weights(&engine, date, args.profile.as_deref())?;
    let portfolios = engine.run_portfolio_selection(&funds, &weights);
    Ok(serde_json::to_value(portfolio_rows(&portfolios))?)
}

pub fn run_correct(args: ProfileArgs) -> Result<Value, Box<dyn Error>> {
    let date = args.data.target_date()?;
    let engine = args.data.engine()?;
    let funds = postselected(&engine, date)?;
    let weights = weights(&engine, date, args.profile.as_deref())?;
    let corrected = engine.run_correction(&funds, &weights)?;
    Ok(json!({
        "weights": weight_rows(&corrected.weights),
        "portfolios": portfolio_rows(&corrected.portfolios),
    }))
}

pub fn run_recommend(args: ProfileArgs) -> Result<Value, Box<dyn Error>> {
    let date = args.data.date.unwrap_or_else(today);
    let engine = args.data.engine()?;
    let output = engine.recommend(date, today(), args.profile.as_deref())?;
    Ok(serde_json::to_value(output)?)
}
