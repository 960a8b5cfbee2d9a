use std::collections::VecDeque;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

/// Decimal places kept for the value taken out of a split lot. Far below a
/// cent, and short enough that subtracting it from the lot stays exact.
const SPLIT_VALUE_SCALE: u32 = 18;

/// An open acquisition position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lot {
    pub remaining: Decimal,
    /// USD cost of the remaining amount.
    pub value: Decimal,
    pub acquired: NaiveDateTime,
}

/// Result of consuming lots for a disposal.
#[derive(Debug, Clone, PartialEq)]
pub struct Consumption {
    pub cost_basis: Decimal,
    /// Acquisition time of the oldest lot touched, or the disposal time when
    /// no lot was available.
    pub acquired: NaiveDateTime,
    pub matched: Decimal,
    /// Amount for which no lot was left.
    pub unmatched: Decimal,
}

/// FIFO-ordered open lots of a single asset.
#[derive(Debug, Clone, Default)]
pub struct LotInventory {
    lots: VecDeque<Lot>,
}

impl LotInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a lot. Lots are never merged, each keeps its own acquisition
    /// time for the holding period.
    pub fn push(&mut self, amount: Decimal, usd_value: Decimal, acquired: NaiveDateTime) {
        // Refuse to add zero balances (and protect against division by zero)
        if amount <= Decimal::ZERO {
            return;
        }

        self.lots.push_back(Lot {
            remaining: amount,
            value: usd_value.max(Decimal::ZERO),
            acquired,
        });
    }

    /// Removes `amount` from the oldest lots and returns the cost attributed
    /// to it. When the lots run out the remainder gets zero cost.
    pub fn consume(&mut self, amount: Decimal, disposed: NaiveDateTime) -> Consumption {
        let mut needed = amount.max(Decimal::ZERO);
        let mut cost_basis = Decimal::ZERO;
        let mut acquired = None;

        while needed > Decimal::ZERO {
            let Some(lot) = self.lots.front_mut() else {
                break;
            };
            acquired.get_or_insert(lot.acquired);

            if lot.remaining <= needed {
                // consume the lot and keep processing the remaining amount
                needed -= lot.remaining;
                cost_basis += lot.value;
                self.lots.pop_front();
            } else {
                // split the lot; what is not consumed stays with it, so the
                // two parts always add up to the original value. The fraction
                // is below one, so the product never exceeds the lot's value.
                let consumed_value = (lot.value * (needed / lot.remaining))
                    .round_dp(SPLIT_VALUE_SCALE)
                    .min(lot.value);
                lot.value -= consumed_value;
                lot.remaining -= needed;
                cost_basis += consumed_value;
                needed = Decimal::ZERO;
            }
        }

        Consumption {
            cost_basis,
            acquired: acquired.unwrap_or(disposed),
            matched: amount.max(Decimal::ZERO) - needed,
            unmatched: needed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn balance(&self) -> Decimal {
        self.lots.iter().map(|lot| lot.remaining).sum()
    }

    pub fn cost_basis(&self) -> Decimal {
        self.lots.iter().map(|lot| lot.value).sum()
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rust_decimal_macros::dec;

    fn day(n: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap() + Duration::days(n)
    }

    #[test]
    fn test_exact_consumption() {
        let mut inventory = LotInventory::new();
        inventory.push(dec!(3), dec!(30), day(0));

        let consumed = inventory.consume(dec!(3), day(1));
        assert_eq!(consumed.cost_basis, dec!(30));
        assert_eq!(consumed.acquired, day(0));
        assert_eq!(consumed.unmatched, Decimal::ZERO);
        assert!(inventory.is_empty());
    }

    #[test]
    fn test_partial_consumption() {
        let mut inventory = LotInventory::new();
        inventory.push(dec!(10), dec!(100), day(0));

        let consumed = inventory.consume(dec!(4), day(1));
        assert_eq!(consumed.cost_basis, dec!(40));
        assert_eq!(consumed.matched, dec!(4));

        let lot = inventory.lots().next().unwrap();
        assert_eq!(lot.remaining, dec!(6));
        assert_eq!(lot.value, dec!(60));
    }

    #[test]
    fn test_split_of_large_lot() {
        let mut inventory = LotInventory::new();
        inventory.push(dec!(1000000000000000), dec!(1000000000000000), day(0));

        let consumed = inventory.consume(dec!(500000000000000), day(1));
        assert_eq!(consumed.cost_basis, dec!(500000000000000));
        assert_eq!(inventory.balance(), dec!(500000000000000));
        assert_eq!(inventory.cost_basis(), dec!(500000000000000));
    }

    #[test]
    fn test_split_keeps_total_value() {
        let mut inventory = LotInventory::new();
        inventory.push(dec!(3), dec!(100), day(0));

        let consumed = inventory.consume(dec!(1), day(1));
        assert_eq!(consumed.cost_basis + inventory.cost_basis(), dec!(100));
    }

    #[test]
    fn test_fifo_order() {
        let mut inventory = LotInventory::new();
        inventory.push(dec!(5), dec!(50), day(0));
        inventory.push(dec!(5), dec!(100), day(1));

        let consumed = inventory.consume(dec!(5), day(2));
        assert_eq!(consumed.cost_basis, dec!(50));
        assert_eq!(consumed.acquired, day(0));
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.cost_basis(), dec!(100));
    }

    #[test]
    fn test_spanning_lots() {
        let mut inventory = LotInventory::new();
        inventory.push(dec!(1), dec!(10), day(0));
        inventory.push(dec!(2), dec!(40), day(5));

        let consumed = inventory.consume(dec!(2), day(9));
        assert_eq!(consumed.cost_basis, dec!(30));
        assert_eq!(consumed.acquired, day(0));
        assert_eq!(inventory.balance(), dec!(1));
        assert_eq!(inventory.cost_basis(), dec!(20));
    }

    #[test]
    fn test_exhausted_inventory() {
        let mut inventory = LotInventory::new();
        inventory.push(dec!(1), dec!(10), day(0));

        let consumed = inventory.consume(dec!(3), day(9));
        assert_eq!(consumed.cost_basis, dec!(10));
        assert_eq!(consumed.matched, dec!(1));
        assert_eq!(consumed.unmatched, dec!(2));
        assert_eq!(consumed.acquired, day(0));

        let consumed = inventory.consume(dec!(1), day(10));
        assert_eq!(consumed.cost_basis, Decimal::ZERO);
        assert_eq!(consumed.acquired, day(10));
    }

    #[test]
    fn test_many_small_disposals_keep_basis() {
        let mut inventory = LotInventory::new();
        inventory.push(dec!(3), dec!(100), day(0));

        let mut total = Decimal::ZERO;
        for _ in 0..30 {
            total += inventory.consume(dec!(0.1), day(1)).cost_basis;
        }

        // basis consumed plus basis still open is the original cost
        assert_eq!(total + inventory.cost_basis(), dec!(100));
        assert_eq!(inventory.balance(), dec!(0));
        assert!(inventory.is_empty());
    }

    #[test]
    fn test_zero_amount_push_is_ignored() {
        let mut inventory = LotInventory::new();
        inventory.push(Decimal::ZERO, dec!(5), day(0));
        assert!(inventory.is_empty());
    }
}
