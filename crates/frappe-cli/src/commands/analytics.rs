use chrono::{Duration, NaiveDate};
use clap::Args;
use serde_json::{json, Value};
use std::error::Error;

use frappe_core::analytics::returns::period_return;
use frappe_core::provider::DataProvider;
use frappe_core::AssetClass;

use super::{CliEngine, DataArgs};

/// Arguments for a single fund's period return
#[derive(Args)]
pub struct PeriodReturnArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Fund identifier
    #[arg(long)]
    pub asset_id: String,

    /// Window start (defaults to the ranking window start)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Window end (defaults to the ranking window end)
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

/// Arguments for a single fund's benchmark correlation
#[derive(Args)]
pub struct CorrelationArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Fund identifier
    #[arg(long)]
    pub asset_id: String,

    /// Asset class (looked up in the universe when omitted)
    #[arg(long)]
    pub asset_class: Option<AssetClass>,
}

fn asset_class_of(
    engine: &CliEngine,
    asset_id: &str,
    date: NaiveDate,
) -> Result<AssetClass, Box<dyn Error>> {
    engine
        .load_universe(date)?
        .into_iter()
        .find(|f| f.asset_id == asset_id)
        .map(|f| f.asset_class_symbol)
        .ok_or_else(|| format!("Fund '{asset_id}' is not in the universe on {date}").into())
}

pub fn run_period_return(args: PeriodReturnArgs) -> Result<Value, Box<dyn Error>> {
    let date = args.data.target_date()?;
    let engine = args.data.engine()?;
    let rules = &engine.config().preselection;

    let start = args
        .start
        .unwrap_or(date - Duration::weeks(rules.window_weeks));
    let end = args
        .end
        .unwrap_or(date - Duration::weeks(rules.skip_recent_weeks));

    let series = engine.provider().price_series(&args.asset_id, date)?;
    let ret = period_return(&series.adjusted_nav(), start, end)?;

    Ok(json!({
        "asset_id": args.asset_id,
        "start": start.to_string(),
        "end": end.to_string(),
        "period_return": ret.to_string(),
    }))
}

pub fn run_correlation(args: CorrelationArgs) -> Result<Value, Box<dyn Error>> {
    let date = args.data.target_date()?;
    let engine = args.data.engine()?;
    let class = match args.asset_class {
        Some(class) => class,
        None => asset_class_of(&engine, &args.asset_id, date)?,
    };

    let stats = engine.fund_benchmark_correlation(&args.asset_id, class, date)?;
    let benchmark = engine.config().benchmark_symbol(class)?;

    Ok(json!({
        "asset_id": args.asset_id,
        "asset_class": class,
        "benchmark": benchmark,
        "correlation": stats.correlation.map(|c| c.to_string()),
        "period_return": stats.period_return.to_string(),
        "threshold": engine.config().preselection.correlation_threshold.to_string(),
    }))
}
