use std::collections::HashMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::base::{CapitalGainRecord, EventKind, IncomeRecord, LedgerEvent, TaxError};
use crate::lots::LotInventory;

/// Longest holding period, in whole days, that still counts as short term.
pub const SHORT_TERM_DAYS: i64 = 365;

pub fn is_short_term(acquired: NaiveDateTime, disposed: NaiveDateTime) -> bool {
    (disposed - acquired).num_days() <= SHORT_TERM_DAYS
}

/// Output of one matcher run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxCalculation {
    pub capital_gains: Vec<CapitalGainRecord>,
    pub income: Vec<IncomeRecord>,
}

/// Matches disposals against the oldest open lots.
///
/// Each run owns its inventories; nothing is carried between calculations
/// unless the same `Fifo` is fed again.
#[derive(Debug, Default)]
pub struct Fifo {
    /// Holdings represented as a map of asset -> lots.
    holdings: HashMap<String, LotInventory>,
}

impl Fifo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes `events` in `(timestamp, signature, position)` order.
    ///
    /// The position in `events` only breaks ties, so the two legs of a swap
    /// keep the order the normalizer emitted them in.
    pub fn process(&mut self, events: &[LedgerEvent]) -> TaxCalculation {
        let mut ordered: Vec<&LedgerEvent> = events.iter().collect();
        // stable sort, equal keys keep their emission order
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.signature.cmp(&b.signature)));

        let mut calculation = TaxCalculation::default();

        for event in ordered {
            match event.kind {
                EventKind::Acquisition | EventKind::Income => {
                    self.holdings_for_asset(&event.asset).push(event.amount, event.usd_value, event.timestamp);

                    if event.kind == EventKind::Income {
                        calculation.income.push(IncomeRecord {
                            wallet: event.wallet.clone(),
                            signature: event.signature.clone(),
                            asset: event.asset.clone(),
                            amount: event.amount,
                            timestamp: event.timestamp,
                            usd_value: event.usd_value,
                        });
                    }
                }
                EventKind::Disposal => {
                    calculation.capital_gains.push(self.dispose(event));
                }
            }
        }

        tracing::info!(
            "Matched {} events into {} capital gains and {} income records",
            events.len(), calculation.capital_gains.len(), calculation.income.len(),
        );

        calculation
    }

    fn dispose(&mut self, event: &LedgerEvent) -> CapitalGainRecord {
        let consumed = self.holdings_for_asset(&event.asset).consume(event.amount, event.timestamp);

        if consumed.unmatched > Decimal::ZERO {
            tracing::warn!("{}", TaxError::EmptyInventoryOnDisposal {
                asset: event.asset.clone(),
                missing: consumed.unmatched,
                timestamp: event.timestamp,
            });
        }

        CapitalGainRecord {
            signature: event.signature.clone(),
            asset: event.asset.clone(),
            amount: event.amount,
            acquired: consumed.acquired,
            disposed: event.timestamp,
            cost_basis: consumed.cost_basis,
            proceeds: event.usd_value,
            gain_or_loss: event.usd_value - consumed.cost_basis,
            is_short_term: is_short_term(consumed.acquired, event.timestamp),
            unmatched_amount: consumed.unmatched,
        }
    }

    fn holdings_for_asset(&mut self, asset: &str) -> &mut LotInventory {
        self.holdings.entry(asset.to_owned()).or_default()
    }

    pub fn asset_balance(&self, asset: &str) -> Decimal {
        self.holdings.get(asset).map_or(Decimal::ZERO, LotInventory::balance)
    }

    pub fn asset_cost_basis(&self, asset: &str) -> Decimal {
        self.holdings.get(asset).map_or(Decimal::ZERO, LotInventory::cost_basis)
    }

    /// Read-only access to the holdings.
    pub fn holdings(&self) -> &HashMap<String, LotInventory> {
        &self.holdings
    }
}

/// Runs a fresh matcher over `events`.
pub fn calculate_taxes(events: &[LedgerEvent]) -> (Vec<CapitalGainRecord>, Vec<IncomeRecord>) {
    let calculation = Fifo::new().process(events);
    (calculation.capital_gains, calculation.income)
}
