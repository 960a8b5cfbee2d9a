//! Importer for Helius enhanced transaction JSON exports.

use std::{fs::File, io::{BufReader, Read}, path::Path};

use anyhow::{Context, Result};
use linkme::distributed_slice;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    base::{RawTimestamp, RawTransfer, TxKind},
    sources::{TransactionSource, TRANSACTION_SOURCES},
};

/// Native transfers are denominated in lamports.
const LAMPORT_DECIMALS: u32 = 9;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransfer {
    mint: Option<String>,
    /// Already in whole units.
    token_amount: Decimal,
    from_user_account: Option<String>,
    to_user_account: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeTransfer {
    amount: Decimal,
    from_user_account: Option<String>,
    to_user_account: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeliusTransaction {
    signature: Option<String>,
    timestamp: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    description: Option<String>,
    token_transfers: Option<Vec<TokenTransfer>>,
    native_transfers: Option<Vec<NativeTransfer>>,
}

impl HeliusTransaction {
    fn into_transfers(self) -> Vec<RawTransfer> {
        let (Some(signature), Some(timestamp)) = (self.signature, self.timestamp) else {
            tracing::warn!("Skipping Helius transaction without signature or timestamp");
            return Vec::new();
        };

        let kind = self.kind.as_deref()
            .filter(|kind| !kind.is_empty())
            .and_then(|kind| kind.parse::<TxKind>().ok());
        let description = self.description.filter(|description| !description.trim().is_empty());

        let new_transfer = |amount: Decimal, from: Option<String>, to: Option<String>| {
            let mut transfer = RawTransfer::new(signature.clone(), RawTimestamp::Unix(timestamp), amount);
            transfer.from = from;
            transfer.to = to;
            transfer.kind = kind.clone();
            transfer.description = description.clone();
            transfer
        };

        let mut transfers = Vec::new();

        for token in self.token_transfers.unwrap_or_default() {
            let mut transfer = new_transfer(token.token_amount, token.from_user_account, token.to_user_account);
            transfer.mint = token.mint.filter(|mint| !mint.is_empty());
            transfers.push(transfer);
        }

        for native in self.native_transfers.unwrap_or_default() {
            let mut transfer = new_transfer(native.amount, native.from_user_account, native.to_user_account);
            transfer.decimals = Some(LAMPORT_DECIMALS);
            transfers.push(transfer);
        }

        // Keep transactions that only carry a description, so that it can
        // still be interpreted during classification
        if transfers.is_empty() && description.is_some() {
            transfers.push(new_transfer(Decimal::ZERO, None, None));
        }

        transfers
    }
}

fn parse_helius_json(reader: impl Read) -> Result<Vec<RawTransfer>> {
    let transactions: Vec<HeliusTransaction> = serde_json::from_reader(reader)?;
    Ok(transactions.into_iter().flat_map(HeliusTransaction::into_transfers).collect())
}

fn load_helius_json(input_path: &Path) -> Result<Vec<RawTransfer>> {
    let file = File::open(input_path)
        .with_context(|| format!("Failed to open {}", input_path.display()))?;
    parse_helius_json(BufReader::new(file))
        .with_context(|| format!("Failed to parse Helius transactions from {}", input_path.display()))
}

#[distributed_slice(TRANSACTION_SOURCES)]
static HELIUS_JSON: TransactionSource = TransactionSource {
    id: "HeliusJson",
    label: "Helius enhanced transactions (JSON)",
    load: load_helius_json,
};
