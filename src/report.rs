use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use slice_group_by::GroupBy;

use crate::base::{CapitalGainRecord, IncomeRecord, LedgerEvent, TaxError};
use crate::fifo::Fifo;

/// Inclusive range of UTC dates a run reports on. Either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ReportPeriod {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, TaxError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(TaxError::InvalidInput(format!("report period starts on {} after it ends on {}", start, end)));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        let date = timestamp.date();
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }

    fn is_after_end(&self, timestamp: NaiveDateTime) -> bool {
        self.end.is_some_and(|end| timestamp.date() > end)
    }

    fn overlaps_year(&self, year: i32) -> bool {
        self.start.map_or(true, |start| year >= start.year()) && self.end.map_or(true, |end| year <= end.year())
    }
}

/// Per-asset totals for one tax year.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssetSummary {
    pub asset: String,
    pub balance_start: Decimal,
    pub balance_end: Decimal,
    pub quantity_disposed: Decimal,
    pub quantity_income: Decimal,
    pub cost: Decimal,
    pub proceeds: Decimal,
    pub capital_profit_loss: Decimal,
    pub income: Decimal,
    pub total_profit_loss: Decimal,
}

impl AssetSummary {
    fn new(asset: &str) -> Self {
        Self {
            asset: asset.to_owned(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxReport {
    pub year: i32,
    pub long_term_capital_gains: Decimal,
    pub short_term_capital_gains: Decimal,
    pub total_capital_losses: Decimal,
    pub total_income: Decimal,
    pub assets: Vec<AssetSummary>,
    pub gains: Vec<CapitalGainRecord>,
    pub income: Vec<IncomeRecord>,
}

impl TaxReport {
    pub fn net_capital_gains(&self) -> Decimal {
        self.long_term_capital_gains + self.short_term_capital_gains - self.total_capital_losses
    }
}

fn summary_for<'a>(assets: &'a mut Vec<AssetSummary>, asset: &str) -> &'a mut AssetSummary {
    match assets.iter().position(|s| s.asset == asset) {
        Some(index) => &mut assets[index],
        None => {
            assets.push(AssetSummary::new(asset));
            let last = assets.len() - 1;
            &mut assets[last]
        }
    }
}

/// Runs the matcher over `events` one calendar year at a time, carrying open
/// lots into the following years.
pub fn calculate_tax_reports(events: &[LedgerEvent]) -> Vec<TaxReport> {
    calculate_tax_reports_for_period(events, &ReportPeriod::default())
}

/// Like [`calculate_tax_reports`], but only reports the disposals and income
/// that fall within `period`. Events before the start still open and consume
/// lots, so the cost basis of later disposals is unaffected.
pub fn calculate_tax_reports_for_period(events: &[LedgerEvent], period: &ReportPeriod) -> Vec<TaxReport> {
    let mut events = events.to_vec();
    events.retain(|event| !period.is_after_end(event.timestamp));
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.signature.cmp(&b.signature)));

    let mut assets = Vec::<AssetSummary>::new();
    let mut fifo = Fifo::new();

    events.linear_group_by_key(|event| event.timestamp.year()).filter_map(|year_events| {
        // carry the closing balances into the new year
        assets.retain_mut(|summary| {
            *summary = AssetSummary {
                balance_start: summary.balance_end,
                ..AssetSummary::new(&summary.asset)
            };

            summary.balance_start > Decimal::ZERO
        });

        let year = year_events[0].timestamp.year();
        let mut calculation = fifo.process(year_events);
        calculation.capital_gains.retain(|gain| period.contains(gain.disposed));
        calculation.income.retain(|income| period.contains(income.timestamp));

        let mut long_term_capital_gains = Decimal::ZERO;
        let mut short_term_capital_gains = Decimal::ZERO;
        let mut total_capital_losses = Decimal::ZERO;
        let mut total_income = Decimal::ZERO;

        for gain in &calculation.capital_gains {
            if gain.gain_or_loss.is_sign_positive() {
                if gain.is_short_term {
                    short_term_capital_gains += gain.gain_or_loss;
                } else {
                    long_term_capital_gains += gain.gain_or_loss;
                }
            } else {
                total_capital_losses -= gain.gain_or_loss;
            }

            let summary = summary_for(&mut assets, &gain.asset);
            summary.quantity_disposed += gain.amount;
            summary.cost += gain.cost_basis;
            summary.proceeds += gain.proceeds;
        }

        for income in &calculation.income {
            total_income += income.usd_value;

            let summary = summary_for(&mut assets, &income.asset);
            summary.quantity_income += income.amount;
            summary.income += income.usd_value;
        }

        for (asset, inventory) in fifo.holdings() {
            if !inventory.is_empty() {
                summary_for(&mut assets, asset);
            }
        }

        assets.iter_mut().for_each(|summary| {
            summary.balance_end = fifo.asset_balance(&summary.asset);
            summary.capital_profit_loss = summary.proceeds - summary.cost;
            summary.total_profit_loss = summary.capital_profit_loss + summary.income;
        });

        assets.sort_by(|a, b| b.cost.cmp(&a.cost).then_with(|| a.asset.cmp(&b.asset)));

        tracing::debug!("{}: {} capital gains, {} income records", year, calculation.capital_gains.len(), calculation.income.len());

        // years before the period only carry their balances forward
        period.overlaps_year(year).then(|| TaxReport {
            year,
            long_term_capital_gains,
            short_term_capital_gains,
            total_capital_losses,
            total_income,
            assets: assets.clone(),
            gains: calculation.capital_gains,
            income: calculation.income,
        })
    }).collect()
}
