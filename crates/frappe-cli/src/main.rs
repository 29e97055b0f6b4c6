mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::analytics::{CorrelationArgs, PeriodReturnArgs};
use commands::pipeline::ProfileArgs;
use commands::DataArgs;

/// Fund screening, selection and allocation
#[derive(Parser)]
#[command(
    name = "frappe",
    version,
    about = "Fund screening, selection and allocation",
    long_about = "Runs the fund recommendation pipeline over a JSON dataset: screening, \
                  benchmark-correlation pre-selection, return ranking, macro-driven \
                  asset-class weighting and integer weight correction, with decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log pipeline decisions to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fund universe snapshot for the target date
    Universe(DataArgs),
    /// Run the screening filters
    Screen(DataArgs),
    /// Screen, then keep funds tracking their benchmark
    Preselect(DataArgs),
    /// Pre-select, then keep the top funds of each asset class
    Postselect(DataArgs),
    /// Asset-class weights per risk profile
    Weight(ProfileArgs),
    /// Fund-level portfolio from uncorrected weights
    Allocate(ProfileArgs),
    /// Integer weights summing to 100 and the corrected portfolio
    Correct(ProfileArgs),
    /// Full recommendation with audit trail
    Recommend(ProfileArgs),
    /// Period return of one fund
    PeriodReturn(PeriodReturnArgs),
    /// Spearman correlation of one fund against its benchmark
    Correlation(CorrelationArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Universe(args) => commands::pipeline::run_universe(args),
        Commands::Screen(args) => commands::pipeline::run_screen(args),
        Commands::Preselect(args) => commands::pipeline::run_preselect(args),
        Commands::Postselect(args) => commands::pipeline::run_postselect(args),
        Commands::Weight(args) => commands::pipeline::run_weight(args),
        Commands::Allocate(args) => commands::pipeline::run_allocate(args),
        Commands::Correct(args) => commands::pipeline::run_correct(args),
        Commands::Recommend(args) => commands::pipeline::run_recommend(args),
        Commands::PeriodReturn(args) => commands::analytics::run_period_return(args),
        Commands::Correlation(args) => commands::analytics::run_correlation(args),
        Commands::Version => {
            println!("frappe {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
