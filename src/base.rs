use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::time::parse_date_time;

/// Symbol of the chain's native asset, used when a transfer carries no mint.
pub const NATIVE_ASSET: &str = "SOL";

/// Sentinel symbol for mints missing from the asset table.
pub const UNKNOWN_ASSET: &str = "Unknown";

/// Conditions the engine can run into. Only [`TaxError::InvalidInput`] is
/// ever returned to the caller, the other variants describe records that are
/// skipped or degraded and end up in the log.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaxError {
    #[error("malformed record in {signature}: {reason}")]
    MalformedRecord { signature: String, reason: String },
    #[error("unknown mint {0}, treating it as Unknown")]
    UnknownAsset(String),
    #[error("no {asset} price known at {timestamp}, valuing at 0")]
    UnknownPrice { asset: String, timestamp: NaiveDateTime },
    #[error("value of {amount} {asset} at {timestamp} is out of range, valuing at 0")]
    ValueOverflow { asset: String, amount: Decimal, timestamp: NaiveDateTime },
    #[error("at {timestamp} a disposed amount of {missing} {asset} was not found in the holdings, assuming zero cost")]
    EmptyInventoryOnDisposal { asset: String, missing: Decimal, timestamp: NaiveDateTime },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// The timestamp of a raw record, as delivered by the data provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTimestamp {
    /// Seconds since the unix epoch.
    Unix(i64),
    Text(String),
}

impl RawTimestamp {
    /// Interprets the timestamp as UTC.
    pub fn parse(&self) -> Option<NaiveDateTime> {
        match self {
            RawTimestamp::Unix(seconds) => DateTime::from_timestamp(*seconds, 0).map(|t| t.naive_utc()),
            RawTimestamp::Text(raw) => parse_date_time(raw),
        }
    }
}

/// Transaction type tag attached by the data provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum TxKind {
    Transfer,
    Swap,
    #[strum(default)]
    Other(String),
}

/// One observed value movement, belonging to a parent transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransfer {
    pub signature: String,
    pub timestamp: RawTimestamp,
    /// `None` for the native asset.
    pub mint: Option<String>,
    pub amount: Decimal,
    /// When set, `amount` is in smallest units with this many decimals.
    pub decimals: Option<u32>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub description: Option<String>,
    pub kind: Option<TxKind>,
}

impl RawTransfer {
    pub fn new(signature: impl Into<String>, timestamp: RawTimestamp, amount: Decimal) -> Self {
        Self {
            signature: signature.into(),
            timestamp,
            mint: None,
            amount,
            decimals: None,
            from: None,
            to: None,
            description: None,
            kind: None,
        }
    }

    /// The transferred amount in whole units.
    pub(crate) fn whole_amount(&self) -> Result<Decimal, TaxError> {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(self.malformed(format!("negative amount {}", self.amount)));
        }

        let mut amount = self.amount;
        if let Some(decimals) = self.decimals {
            amount.set_scale(amount.scale() + decimals)
                .map_err(|e| self.malformed(format!("amount {} with {} decimals: {}", self.amount, decimals, e)))?;
        }
        Ok(amount.normalize())
    }

    pub(crate) fn parsed_timestamp(&self) -> Result<NaiveDateTime, TaxError> {
        self.timestamp.parse()
            .ok_or_else(|| self.malformed(format!("unparseable timestamp {:?}", self.timestamp)))
    }

    fn malformed(&self, reason: String) -> TaxError {
        TaxError::MalformedRecord { signature: self.signature.clone(), reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum EventKind {
    Acquisition,
    Disposal,
    /// Taxable receipt that also opens a lot.
    Income,
}

/// Canonical unit consumed by the gain/loss matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Origin transaction; shared by both legs of a swap.
    pub signature: String,
    pub timestamp: NaiveDateTime,
    pub asset: String,
    pub amount: Decimal,
    pub kind: EventKind,
    pub usd_value: Decimal,
    pub wallet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalGainRecord {
    pub signature: String,
    pub asset: String,
    pub amount: Decimal,
    /// Acquisition time of the oldest lot consumed, or the disposal time when
    /// no lot was available.
    pub acquired: NaiveDateTime,
    pub disposed: NaiveDateTime,
    pub cost_basis: Decimal,
    pub proceeds: Decimal,
    pub gain_or_loss: Decimal,
    pub is_short_term: bool,
    /// Part of `amount` that found no lot and was given zero cost.
    pub unmatched_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub wallet: String,
    pub signature: String,
    pub asset: String,
    pub amount: Decimal,
    pub timestamp: NaiveDateTime,
    pub usd_value: Decimal,
}

pub fn save_events_to_json(events: &[LedgerEvent], output_path: impl AsRef<Path>) -> Result<()> {
    tracing::info!("Saving {} events to {}", events.len(), output_path.as_ref().display());

    let json = serde_json::to_string_pretty(events)?;
    std::fs::write(output_path.as_ref(), json)
        .with_context(|| format!("writing {}", output_path.as_ref().display()))?;

    Ok(())
}

pub fn load_events_from_json(input_path: &Path) -> Result<Vec<LedgerEvent>> {
    let json = std::fs::read_to_string(input_path)
        .with_context(|| format!("reading {}", input_path.display()))?;
    let events: Vec<LedgerEvent> = serde_json::from_str(&json)?;
    Ok(events)
}
