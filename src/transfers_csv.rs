//! Importer for flat CSV files holding one raw transfer per row.

use std::{io::Read, path::Path, str::FromStr};

use anyhow::{Context, Result};
use linkme::distributed_slice;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    base::{RawTimestamp, RawTransfer, TxKind},
    sources::{TransactionSource, TRANSACTION_SOURCES},
};

#[derive(Debug, Deserialize)]
struct TransferRecord {
    signature: String,
    timestamp: String,
    mint: Option<String>,
    amount: String,
    decimals: Option<u32>,
    from: Option<String>,
    to: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl TryFrom<TransferRecord> for RawTransfer {
    type Error = anyhow::Error;

    fn try_from(record: TransferRecord) -> Result<Self, Self::Error> {
        let amount = Decimal::from_str_exact(&record.amount)
            .or_else(|_| Decimal::from_scientific(&record.amount))
            .with_context(|| format!("invalid amount {:?}", record.amount))?;

        let mut transfer = RawTransfer::new(record.signature, RawTimestamp::Text(record.timestamp), amount);
        transfer.mint = record.mint;
        transfer.decimals = record.decimals;
        transfer.from = record.from;
        transfer.to = record.to;
        transfer.description = record.description;
        transfer.kind = record.kind.map(|kind| TxKind::from_str(&kind)).transpose()?;
        Ok(transfer)
    }
}

fn parse_transfers_csv(reader: impl Read) -> Result<Vec<RawTransfer>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut transfers = Vec::new();
    for (index, result) in rdr.deserialize::<TransferRecord>().enumerate() {
        // header is line 1
        let line = index + 2;
        match result.map_err(anyhow::Error::from).and_then(RawTransfer::try_from) {
            Ok(transfer) => transfers.push(transfer),
            Err(err) => tracing::warn!("Skipping transfer on line {}: {:#}", line, err),
        }
    }

    Ok(transfers)
}

fn load_transfers_csv(input_path: &Path) -> Result<Vec<RawTransfer>> {
    let file = std::fs::File::open(input_path)
        .with_context(|| format!("Failed to open {}", input_path.display()))?;
    parse_transfers_csv(file)
}

#[distributed_slice(TRANSACTION_SOURCES)]
static TRANSFERS_CSV: TransactionSource = TransactionSource {
    id: "TransfersCsv",
    label: "Raw transfers (CSV)",
    load: load_transfers_csv,
};
