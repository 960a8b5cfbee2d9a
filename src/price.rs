use std::collections::HashMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::base::TaxError;

/// Source of historical USD prices.
///
/// `None` means the price is unknown; the normalizer values such events at
/// zero rather than failing.
pub trait PriceOracle {
    fn usd_price(&self, asset: &str, timestamp: NaiveDateTime) -> Option<Decimal>;
}

impl<F> PriceOracle for F
where
    F: Fn(&str, NaiveDateTime) -> Option<Decimal>,
{
    fn usd_price(&self, asset: &str, timestamp: NaiveDateTime) -> Option<Decimal> {
        self(asset, timestamp)
    }
}

/// An oracle that knows no prices at all.
pub struct NoPrices;

impl PriceOracle for NoPrices {
    fn usd_price(&self, _asset: &str, _timestamp: NaiveDateTime) -> Option<Decimal> {
        None
    }
}

/// Memoizes oracle answers for one or more normalization runs.
///
/// The cache belongs to whoever drives normalization and is handed in
/// explicitly, so two runs never share prices unless the caller wants them to.
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: HashMap<(String, NaiveDateTime), Option<Decimal>>,
    lookups: usize,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit price of `asset` at `timestamp`, asking the oracle on a miss.
    /// Negative prices are treated as unknown.
    pub fn usd_price(&mut self, oracle: &dyn PriceOracle, asset: &str, timestamp: NaiveDateTime) -> Option<Decimal> {
        let key = (asset.to_owned(), timestamp);
        if let Some(price) = self.prices.get(&key) {
            return *price;
        }

        self.lookups += 1;
        let price = oracle.usd_price(asset, timestamp).filter(|price| !price.is_sign_negative());
        if price.is_none() {
            tracing::warn!("{}", TaxError::UnknownPrice { asset: asset.to_owned(), timestamp });
        }
        self.prices.insert(key, price);
        price
    }

    /// USD value of `amount` units, zero when the price is unknown or the
    /// value does not fit a decimal.
    pub fn usd_value(&mut self, oracle: &dyn PriceOracle, asset: &str, amount: Decimal, timestamp: NaiveDateTime) -> Decimal {
        let Some(price) = self.usd_price(oracle, asset, timestamp) else {
            return Decimal::ZERO;
        };

        price.checked_mul(amount).unwrap_or_else(|| {
            tracing::warn!("{}", TaxError::ValueOverflow { asset: asset.to_owned(), amount, timestamp });
            Decimal::ZERO
        })
    }

    /// Number of times the oracle was actually consulted.
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_cache_hits() {
        let oracle = |asset: &str, _: NaiveDateTime| (asset == "SOL").then_some(dec!(150));
        let mut cache = PriceCache::new();

        assert_eq!(cache.usd_value(&oracle, "SOL", dec!(2), at(1)), dec!(300));
        assert_eq!(cache.usd_value(&oracle, "SOL", dec!(3), at(1)), dec!(450));
        assert_eq!(cache.lookups(), 1);

        assert_eq!(cache.usd_value(&oracle, "SOL", dec!(1), at(2)), dec!(150));
        assert_eq!(cache.lookups(), 2);
    }

    #[test]
    fn test_unknown_prices_are_zero() {
        let mut cache = PriceCache::new();
        assert_eq!(cache.usd_value(&NoPrices, "BONK", dec!(1000), at(1)), Decimal::ZERO);
        assert_eq!(cache.usd_price(&NoPrices, "BONK", at(1)), None);
        assert_eq!(cache.lookups(), 1);

        let negative = |_: &str, _: NaiveDateTime| Some(dec!(-1));
        assert_eq!(cache.usd_value(&negative, "SOL", dec!(1), at(1)), Decimal::ZERO);
    }

    #[test]
    fn test_overflowing_value_is_zero() {
        let oracle = |_: &str, _: NaiveDateTime| Some(dec!(1000000000000000));
        let mut cache = PriceCache::new();
        assert_eq!(cache.usd_value(&oracle, "SOL", dec!(1000000000000000), at(1)), Decimal::ZERO);
        assert_eq!(cache.usd_value(&oracle, "SOL", dec!(2), at(1)), dec!(2000000000000000));
    }
}
