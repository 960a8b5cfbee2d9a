//! Historical USD prices loaded from local CSV files.
//!
//! Each asset has its own `<SYMBOL>.csv` file with `timestamp,price` rows.
//! Prices between two points are linearly interpolated. A price is only
//! returned when the nearest known point is within the configured gap.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::price::PriceOracle;
use crate::time::{deserialize_date_time, TIMESTAMP_FORMAT};

/// Assets pegged to the US dollar.
const USD_STABLE_COINS: &[&str] = &["USD", "USDC", "USDT"];

/// Default limit on the distance to the nearest price point.
pub const DEFAULT_MAX_GAP_HOURS: i64 = 24;

/// A single price point with timestamp and price.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct PricePoint {
    #[serde(deserialize_with = "deserialize_date_time")]
    pub timestamp: NaiveDateTime,
    pub price: Decimal,
}

impl PartialOrd for PricePoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PricePoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

#[derive(Debug, Clone)]
pub struct PriceHistory {
    /// Sorted price points per asset symbol.
    prices: HashMap<String, Vec<PricePoint>>,
    max_gap: Duration,
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceHistory {
    pub fn new() -> Self {
        Self {
            prices: HashMap::new(),
            max_gap: Duration::hours(DEFAULT_MAX_GAP_HOURS),
        }
    }

    pub fn with_max_gap(mut self, max_gap: Duration) -> Self {
        self.max_gap = max_gap;
        self
    }

    /// Loads every `<SYMBOL>.csv` file in `dir`. A missing directory yields
    /// an empty history.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut history = Self::new();
        if !dir.exists() {
            tracing::warn!("Price history directory {} does not exist", dir.display());
            return Ok(history);
        }

        for entry in fs::read_dir(dir).with_context(|| format!("Failed to read price history directory {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
                continue;
            }
            let Some(symbol) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let points = load_price_history_data(&path)
                .with_context(|| format!("Failed to load prices from {}", path.display()))?;
            tracing::debug!("Loaded {} price points for {}", points.len(), symbol);
            history.insert_price_points(symbol, points);
        }

        Ok(history)
    }

    /// Saves every asset as `<SYMBOL>.csv` in `dir`.
    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).context("Failed to create price history directory")?;

        for (symbol, points) in &self.prices {
            save_price_history_data(points, &dir.join(format!("{}.csv", symbol)))?;
        }

        Ok(())
    }

    /// Adds price points for an asset, replacing points with equal timestamps.
    pub fn insert_price_points(&mut self, symbol: &str, points: Vec<PricePoint>) {
        let existing = self.prices.entry(symbol.to_uppercase()).or_default();
        existing.extend(points);
        // keep the last inserted point for each timestamp
        existing.reverse();
        existing.sort();
        existing.dedup_by_key(|point| point.timestamp);
    }

    /// Estimate the price of an asset at a given timestamp.
    pub fn estimate_price(&self, timestamp: NaiveDateTime, symbol: &str) -> Option<Decimal> {
        self.estimate_price_with_accuracy(timestamp, symbol)
            .and_then(|(price, accuracy)| (accuracy <= self.max_gap).then_some(price))
    }

    /// Estimate the price along with the distance to the nearest point used.
    pub fn estimate_price_with_accuracy(&self, timestamp: NaiveDateTime, symbol: &str) -> Option<(Decimal, Duration)> {
        if USD_STABLE_COINS.contains(&symbol) {
            return Some((Decimal::ONE, Duration::zero()));
        }

        let points = self.prices.get(symbol)?;
        let next_idx = points.partition_point(|point| point.timestamp < timestamp);

        let prev = next_idx.checked_sub(1).map(|idx| &points[idx]);
        let next = points.get(next_idx);

        match (prev, next) {
            (None, None) => None,
            (Some(prev), None) => Some((prev.price, timestamp - prev.timestamp)),
            (None, Some(next)) => Some((next.price, next.timestamp - timestamp)),
            (Some(prev), Some(next)) => {
                let total_duration: Decimal = (next.timestamp - prev.timestamp).num_seconds().into();
                let time_since_prev: Decimal = (timestamp - prev.timestamp).num_seconds().into();

                let accuracy = (timestamp - prev.timestamp).min(next.timestamp - timestamp);

                if total_duration > Decimal::ZERO {
                    // Linear interpolation
                    let ratio = time_since_prev / total_duration;
                    Some((prev.price + ratio * (next.price - prev.price), accuracy))
                } else {
                    Some((next.price, accuracy))
                }
            }
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.prices.keys().map(String::as_str)
    }
}

impl PriceOracle for PriceHistory {
    fn usd_price(&self, asset: &str, timestamp: NaiveDateTime) -> Option<Decimal> {
        self.estimate_price(timestamp, asset)
    }
}

pub(crate) fn save_price_history_data(prices: &[PricePoint], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["timestamp", "price"])?;
    for point in prices {
        wtr.write_record([point.timestamp.format(TIMESTAMP_FORMAT).to_string(), point.price.to_string()])?;
    }
    wtr.flush()?;

    Ok(())
}

pub(crate) fn load_price_history_data(path: &Path) -> Result<Vec<PricePoint>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut prices: Vec<PricePoint> = Vec::new();
    for result in rdr.deserialize() {
        let record: PricePoint = result?;
        prices.push(record);
    }

    Ok(prices)
}
