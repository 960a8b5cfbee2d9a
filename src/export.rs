use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::base::{CapitalGainRecord, IncomeRecord};
use crate::report::{AssetSummary, TaxReport};
use crate::time::serialize_date_time;

fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn local_time(timestamp: NaiveDateTime, timezone: Tz) -> NaiveDateTime {
    timestamp.and_utc().with_timezone(&timezone).naive_local()
}

pub fn save_capital_gains_to_csv(gains: &[CapitalGainRecord], timezone: Tz, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    #[derive(Serialize)]
    struct CsvCapitalGain<'a> {
        #[serde(rename = "Asset")]
        asset: &'a str,
        #[serde(rename = "Amount")]
        amount: Decimal,
        #[serde(rename = "Date Acquired", serialize_with = "serialize_date_time")]
        acquired: NaiveDateTime,
        #[serde(rename = "Date Disposed", serialize_with = "serialize_date_time")]
        disposed: NaiveDateTime,
        #[serde(rename = "Cost Basis")]
        cost_basis: Decimal,
        #[serde(rename = "Proceeds")]
        proceeds: Decimal,
        #[serde(rename = "Gain/Loss")]
        gain_or_loss: Decimal,
        #[serde(rename = "Short Term")]
        short_term: &'a str,
        #[serde(rename = "Unmatched Amount")]
        unmatched_amount: Decimal,
        #[serde(rename = "Signature")]
        signature: &'a str,
    }

    for gain in gains {
        wtr.serialize(CsvCapitalGain {
            asset: &gain.asset,
            amount: gain.amount,
            acquired: local_time(gain.acquired, timezone),
            disposed: local_time(gain.disposed, timezone),
            cost_basis: round_cents(gain.cost_basis),
            proceeds: round_cents(gain.proceeds),
            gain_or_loss: round_cents(gain.gain_or_loss),
            short_term: if gain.is_short_term { "Yes" } else { "No" },
            unmatched_amount: gain.unmatched_amount,
            signature: &gain.signature,
        })?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn save_income_to_csv(income: &[IncomeRecord], timezone: Tz, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    #[derive(Serialize)]
    struct CsvIncome<'a> {
        #[serde(rename = "Wallet")]
        wallet: &'a str,
        #[serde(rename = "Asset")]
        asset: &'a str,
        #[serde(rename = "Amount")]
        amount: Decimal,
        #[serde(rename = "Date Received", serialize_with = "serialize_date_time")]
        received: NaiveDateTime,
        #[serde(rename = "USD Value")]
        usd_value: Decimal,
        #[serde(rename = "Signature")]
        signature: &'a str,
    }

    for record in income {
        wtr.serialize(CsvIncome {
            wallet: &record.wallet,
            asset: &record.asset,
            amount: record.amount,
            received: local_time(record.timestamp, timezone),
            usd_value: round_cents(record.usd_value),
            signature: &record.signature,
        })?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn save_summary_to_csv(assets: &[AssetSummary], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    #[derive(Serialize)]
    struct CsvSummary<'a> {
        #[serde(rename = "Asset")]
        asset: &'a str,
        #[serde(rename = "Proceeds")]
        proceeds: Decimal,
        #[serde(rename = "Cost")]
        cost: Decimal,
        #[serde(rename = "Capital Gains")]
        capital_gains: Decimal,
        #[serde(rename = "Income")]
        income: Decimal,
        #[serde(rename = "Total Gains")]
        total_gains: Decimal,
        #[serde(rename = "Opening Balance")]
        opening_balance: Decimal,
        #[serde(rename = "Quantity Disposed")]
        quantity_disposed: Decimal,
        #[serde(rename = "Quantity Income")]
        quantity_income: Decimal,
        #[serde(rename = "Closing Balance")]
        closing_balance: Decimal,
    }

    for summary in assets {
        wtr.serialize(CsvSummary {
            asset: &summary.asset,
            proceeds: round_cents(summary.proceeds),
            cost: round_cents(summary.cost),
            capital_gains: round_cents(summary.capital_profit_loss),
            income: round_cents(summary.income),
            total_gains: round_cents(summary.total_profit_loss),
            opening_balance: summary.balance_start,
            quantity_disposed: summary.quantity_disposed,
            quantity_income: summary.quantity_income,
            closing_balance: summary.balance_end,
        })?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes the capital gains, the income and one summary per year into
/// `output_dir`, returning the paths of the written files.
pub fn export_reports(reports: &[TaxReport], timezone: Tz, output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let gains: Vec<CapitalGainRecord> = reports.iter().flat_map(|report| report.gains.iter().cloned()).collect();
    let income: Vec<IncomeRecord> = reports.iter().flat_map(|report| report.income.iter().cloned()).collect();

    let mut written = Vec::new();

    let path = output_dir.join("capital_gains.csv");
    save_capital_gains_to_csv(&gains, timezone, &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    written.push(path);

    let path = output_dir.join("staking_income.csv");
    save_income_to_csv(&income, timezone, &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    written.push(path);

    for report in reports {
        let path = output_dir.join(format!("summary_{}.csv", report.year));
        save_summary_to_csv(&report.assets, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    tracing::info!("Exported {} capital gains and {} income records to {}", gains.len(), income.len(), output_dir.display());
    Ok(written)
}
