#![allow(dead_code)]

use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use soltax::{RawTimestamp, RawTransfer, TxKind};

pub const WALLET: &str = "C1GPhEkpXyzAbc5Wallet1111111111111111111111";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// 2024-01-01 00:00:00 UTC
pub const T0: i64 = 1_704_067_200;
pub const DAY: i64 = 86_400;

pub fn at(seconds: i64) -> NaiveDateTime {
    DateTime::from_timestamp(seconds, 0).unwrap().naive_utc()
}

pub fn transfer(signature: &str, timestamp: i64, mint: Option<&str>, amount: Decimal, from: &str, to: &str) -> RawTransfer {
    let mut transfer = RawTransfer::new(signature, RawTimestamp::Unix(timestamp), amount);
    transfer.mint = mint.map(str::to_owned);
    transfer.from = Some(from.to_owned());
    transfer.to = Some(to.to_owned());
    transfer
}

pub fn swap(signature: &str, timestamp: i64, description: &str) -> RawTransfer {
    let mut transfer = transfer(signature, timestamp, Some(USDC_MINT), dec!(1), WALLET, "Pool");
    transfer.kind = Some(TxKind::Swap);
    transfer.description = Some(description.to_owned());
    transfer
}

/// SOL trades at 100 in the first ten days of 2024 and at 120 afterwards.
pub fn prices(asset: &str, timestamp: NaiveDateTime) -> Option<Decimal> {
    match asset {
        "SOL" if timestamp < at(T0 + 10 * DAY) => Some(dec!(100)),
        "SOL" => Some(dec!(120)),
        "USDC" => Some(Decimal::ONE),
        _ => None,
    }
}
