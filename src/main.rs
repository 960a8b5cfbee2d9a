use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::RoundingStrategy;
use tracing_subscriber::EnvFilter;

use soltax::base::{load_events_from_json, save_events_to_json};
use soltax::config::Config;
use soltax::report::{calculate_tax_reports_for_period, TaxReport};
use soltax::{export, load_events, sources};

#[derive(Parser)]
#[clap(version, about)]
struct Cli {
    #[clap(subcommand)]
    subcommand: Command,
}

/// Limits the reported dates, overriding `start` and `end` from the config
#[derive(Args)]
struct PeriodArgs {
    /// First day to report on, as YYYY-MM-DD
    #[clap(long)]
    start: Option<NaiveDate>,
    /// Last day to report on, as YYYY-MM-DD
    #[clap(long)]
    end: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Command {
    /// Calculate capital gains and income, export them as CSV files and
    /// print a summary per year
    Report {
        /// The JSON file listing the sources and settings
        #[clap(long)]
        config: PathBuf,
        /// Use previously saved events instead of loading the sources
        #[clap(long)]
        events: Option<PathBuf>,
        /// Directory for the CSV files
        #[clap(long, default_value = "reports")]
        output: PathBuf,
        #[clap(flatten)]
        period: PeriodArgs,
    },
    /// Normalize all sources and save the resulting events as JSON. With
    /// --start the earlier events are left out, so keep a full dump for
    /// `report --events`
    Events {
        /// The JSON file listing the sources and settings
        #[clap(long)]
        config: PathBuf,
        /// The JSON file to write
        #[clap(long, default_value = "events.json")]
        output: PathBuf,
        #[clap(flatten)]
        period: PeriodArgs,
    },
    /// List the supported source types
    Sources,
}

fn print_report(report: &TaxReport) {
    let round = |value: rust_decimal::Decimal| value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    println!("{}", report.year);
    println!("  Short-term gains:  {:>14}", round(report.short_term_capital_gains));
    println!("  Long-term gains:   {:>14}", round(report.long_term_capital_gains));
    println!("  Losses:            {:>14}", round(report.total_capital_losses));
    println!("  Net capital gains: {:>14}", round(report.net_capital_gains()));
    println!("  Income:            {:>14}", round(report.total_income));
    for summary in &report.assets {
        println!("    {:<10} proceeds {:>12}  cost {:>12}  income {:>10}  balance {}",
            summary.asset, round(summary.proceeds), round(summary.cost), round(summary.income), summary.balance_end.normalize());
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.subcommand {
        Command::Report { config, events, output, period } => {
            let config = Config::load(&config)?;
            let period = config.report_period(period.start, period.end)?;
            let events = match events {
                Some(events_file) => load_events_from_json(&events_file)?,
                None => load_events(&config, &config.price_history()?)?,
            };

            let reports = calculate_tax_reports_for_period(&events, &period);
            let written = export::export_reports(&reports, config.timezone()?, &output)?;

            reports.iter().for_each(print_report);
            for path in written {
                println!("Saved {}", path.display());
            }
        }
        Command::Events { config, output, period } => {
            let config = Config::load(&config)?;
            let period = config.report_period(period.start, period.end)?;
            let mut events = load_events(&config, &config.price_history()?)?;
            events.retain(|event| period.contains(event.timestamp));
            save_events_to_json(&events, &output)?;
            println!("Saved {} events to {}", events.len(), output.display());
        }
        Command::Sources => {
            for source in sources::TRANSACTION_SOURCES.iter() {
                println!("{:<14} {}", source.id, source.label);
            }
        }
    }

    Ok(())
}
