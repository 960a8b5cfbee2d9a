//! Strategies turning a parent transaction into ledger legs.
//!
//! Every heuristic sits behind the [`Classifier`] trait. The normalizer asks
//! each strategy in turn and the first one that recognizes the transaction
//! decides its legs, so a new description grammar is one more implementation
//! pushed onto [`Classifiers`].

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::{Regex, RegexSet};
use rust_decimal::Decimal;

use crate::assets::AssetTable;
use crate::base::{EventKind, TxKind};

/// A transfer that passed validation, with its amount in whole units.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTransfer {
    pub mint: Option<String>,
    pub amount: Decimal,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// All valid transfers sharing one signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentTransaction {
    pub signature: String,
    pub timestamp: NaiveDateTime,
    pub kind: Option<TxKind>,
    pub description: Option<String>,
    pub transfers: Vec<ValidTransfer>,
}

/// A classified movement, not valued yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub asset: String,
    pub amount: Decimal,
    pub kind: EventKind,
}

impl Leg {
    fn new(asset: String, amount: Decimal, kind: EventKind) -> Self {
        Self { asset, amount, kind }
    }
}

pub trait Classifier {
    fn name(&self) -> &'static str;

    /// Returns `None` when this strategy does not recognize the transaction,
    /// handing it to the next strategy.
    fn classify(&self, wallet: &str, tx: &ParentTransaction, assets: &AssetTable) -> Option<Vec<Leg>>;
}

/// Source-address patterns identifying staking payouts.
#[derive(Debug, Clone)]
pub struct StakingPatterns {
    set: RegexSet,
}

pub const DEFAULT_STAKING_PATTERNS: &[&str] = &[
    "(?i)stake",
    "(?i)validator",
    "^Vote111111111111111111111111111111111111111$",
];

impl Default for StakingPatterns {
    fn default() -> Self {
        Self::new(DEFAULT_STAKING_PATTERNS).expect("default staking patterns are valid")
    }
}

impl StakingPatterns {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self { set: RegexSet::new(patterns)? })
    }

    pub fn matches(&self, address: &str) -> bool {
        self.set.is_match(address)
    }
}

/// Applies the address-role rules to one movement:
///
/// 1. native asset received from a staking address is income
/// 2. anything else received is an acquisition
/// 3. anything sent is a disposal
/// 4. movements between other parties are irrelevant
fn endpoint_kind(wallet: &str, native: bool, from: Option<&str>, to: Option<&str>, staking: &StakingPatterns) -> Option<EventKind> {
    if to == Some(wallet) {
        if native && from.is_some_and(|from| staking.matches(from)) {
            Some(EventKind::Income)
        } else {
            Some(EventKind::Acquisition)
        }
    } else if from == Some(wallet) {
        Some(EventKind::Disposal)
    } else {
        None
    }
}

/// Parses amounts like `1,234.5`.
fn parse_amount(raw: &str) -> Option<Decimal> {
    let amount = Decimal::from_str(&raw.replace(',', "")).ok()?;
    (amount > Decimal::ZERO).then_some(amount)
}

fn clean_token(raw: &str) -> &str {
    raw.trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ')'))
}

/// Classifies each transfer by the wallet's role in it.
pub struct TransferRules {
    staking: StakingPatterns,
}

impl TransferRules {
    pub fn new(staking: StakingPatterns) -> Self {
        Self { staking }
    }
}

impl Classifier for TransferRules {
    fn name(&self) -> &'static str {
        "transfer rules"
    }

    fn classify(&self, wallet: &str, tx: &ParentTransaction, assets: &AssetTable) -> Option<Vec<Leg>> {
        let legs: Vec<Leg> = tx.transfers.iter().filter_map(|transfer| {
            // Zero amounts are dropped whatever their role
            if transfer.amount.is_zero() {
                return None;
            }
            let kind = endpoint_kind(wallet, transfer.mint.is_none(), transfer.from.as_deref(), transfer.to.as_deref(), &self.staking)?;
            Some(Leg::new(assets.symbol(transfer.mint.as_deref()), transfer.amount, kind))
        }).collect();

        (!legs.is_empty()).then_some(legs)
    }
}

static SWAP_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<actor>\S+) swapped (?P<amount_in>[\d,]*\.?\d+) (?P<asset_in>\S+) for (?P<amount_out>[\d,]*\.?\d+) (?P<asset_out>\S+)")
        .expect("valid swap regex")
});

/// Recognizes "`<wallet>` swapped `<amount>` `<asset>` for `<amount>` `<asset>`"
/// on transactions tagged as swaps, yielding a disposal followed by an
/// acquisition.
pub struct SwapDescription;

impl Classifier for SwapDescription {
    fn name(&self) -> &'static str {
        "swap description"
    }

    fn classify(&self, wallet: &str, tx: &ParentTransaction, assets: &AssetTable) -> Option<Vec<Leg>> {
        if tx.kind != Some(TxKind::Swap) {
            return None;
        }

        let captures = SWAP_DESCRIPTION.captures_iter(tx.description.as_deref()?)
            .find(|captures| &captures["actor"] == wallet)?;

        let amount_in = parse_amount(&captures["amount_in"])?;
        let amount_out = parse_amount(&captures["amount_out"])?;
        let asset_in = assets.description_symbol(clean_token(&captures["asset_in"]));
        let asset_out = assets.description_symbol(clean_token(&captures["asset_out"]));

        Some(vec![
            Leg::new(asset_in, amount_in, EventKind::Disposal),
            Leg::new(asset_out, amount_out, EventKind::Acquisition),
        ])
    }
}

static TRANSFER_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<from>\S+) transferred (?P<amount>[\d,]*\.?\d+) (?P<asset>\S+) to (?P<to>\S+)")
        .expect("valid transfer regex")
});

/// Reads "`<from>` transferred `<amount>` `<asset>` to `<to>`" clauses from
/// transfer descriptions. Only consulted when the raw transfers said nothing
/// about the wallet.
pub struct TransferDescription {
    staking: StakingPatterns,
}

impl TransferDescription {
    pub fn new(staking: StakingPatterns) -> Self {
        Self { staking }
    }
}

impl Classifier for TransferDescription {
    fn name(&self) -> &'static str {
        "transfer description"
    }

    fn classify(&self, wallet: &str, tx: &ParentTransaction, assets: &AssetTable) -> Option<Vec<Leg>> {
        if tx.kind != Some(TxKind::Transfer) {
            return None;
        }

        let legs: Vec<Leg> = TRANSFER_DESCRIPTION.captures_iter(tx.description.as_deref()?).filter_map(|captures| {
            let amount = parse_amount(&captures["amount"])?;
            let asset = assets.description_symbol(clean_token(&captures["asset"]));
            let native = asset == crate::base::NATIVE_ASSET;
            let to = clean_token(&captures["to"]);
            let kind = endpoint_kind(wallet, native, Some(&captures["from"]), Some(to), &self.staking)?;
            Some(Leg::new(asset, amount, kind))
        }).collect();

        (!legs.is_empty()).then_some(legs)
    }
}

/// Ordered list of strategies; the first to recognize a transaction wins.
pub struct Classifiers {
    strategies: Vec<Box<dyn Classifier>>,
}

impl Default for Classifiers {
    fn default() -> Self {
        Self::standard(StakingPatterns::default())
    }
}

impl Classifiers {
    pub fn empty() -> Self {
        Self { strategies: Vec::new() }
    }

    /// Swap descriptions first, then the per-transfer rules, then transfer
    /// descriptions as a last resort.
    pub fn standard(staking: StakingPatterns) -> Self {
        let mut classifiers = Self::empty();
        classifiers.push(SwapDescription);
        classifiers.push(TransferRules::new(staking.clone()));
        classifiers.push(TransferDescription::new(staking));
        classifiers
    }

    pub fn push(&mut self, classifier: impl Classifier + 'static) {
        self.strategies.push(Box::new(classifier));
    }

    pub fn classify(&self, wallet: &str, tx: &ParentTransaction, assets: &AssetTable) -> Vec<Leg> {
        for strategy in &self.strategies {
            if let Some(legs) = strategy.classify(wallet, tx, assets) {
                tracing::debug!("{} classified {} into {} legs", strategy.name(), tx.signature, legs.len());
                return legs;
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    const WALLET: &str = "W";

    fn parent(kind: Option<TxKind>, description: Option<&str>, transfers: Vec<ValidTransfer>) -> ParentTransaction {
        ParentTransaction {
            signature: "sig".to_owned(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            kind,
            description: description.map(str::to_owned),
            transfers,
        }
    }

    fn transfer(mint: Option<&str>, amount: Decimal, from: &str, to: &str) -> ValidTransfer {
        ValidTransfer {
            mint: mint.map(str::to_owned),
            amount,
            from: Some(from.to_owned()),
            to: Some(to.to_owned()),
        }
    }

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[test]
    fn test_transfer_rules() {
        let rules = TransferRules::new(StakingPatterns::default());
        let assets = AssetTable::new();
        let tx = parent(None, None, vec![
            transfer(None, dec!(1), "StakeAccount111", WALLET),
            transfer(Some(USDC), dec!(5), "Other", WALLET),
            transfer(None, dec!(2), "Exchange", WALLET),
            transfer(None, dec!(3), WALLET, "Other"),
            transfer(None, dec!(4), "Other", "Someone"),
            transfer(None, dec!(0), "Other", WALLET),
        ]);

        let legs = rules.classify(WALLET, &tx, &assets).unwrap();
        assert_eq!(legs, vec![
            Leg::new("SOL".to_owned(), dec!(1), EventKind::Income),
            Leg::new("USDC".to_owned(), dec!(5), EventKind::Acquisition),
            Leg::new("SOL".to_owned(), dec!(2), EventKind::Acquisition),
            Leg::new("SOL".to_owned(), dec!(3), EventKind::Disposal),
        ]);
    }

    #[test]
    fn test_staking_requires_native_asset() {
        let rules = TransferRules::new(StakingPatterns::default());
        let tx = parent(None, None, vec![transfer(Some(USDC), dec!(1), "StakePool", WALLET)]);
        let legs = rules.classify(WALLET, &tx, &AssetTable::new()).unwrap();
        assert_eq!(legs[0].kind, EventKind::Acquisition);
    }

    #[test]
    fn test_irrelevant_transfers_are_not_recognized() {
        let rules = TransferRules::new(StakingPatterns::default());
        let tx = parent(None, None, vec![transfer(None, dec!(1), "A", "B")]);
        assert_eq!(rules.classify(WALLET, &tx, &AssetTable::new()), None);
    }

    #[test]
    fn test_swap_description() {
        let tx = parent(Some(TxKind::Swap), Some("W swapped 10 TOKENX for 5 SOL"), vec![]);
        let legs = SwapDescription.classify(WALLET, &tx, &AssetTable::new()).unwrap();
        assert_eq!(legs, vec![
            Leg::new("TOKENX".to_owned(), dec!(10), EventKind::Disposal),
            Leg::new("SOL".to_owned(), dec!(5), EventKind::Acquisition),
        ]);
    }

    #[test]
    fn test_swap_description_resolves_mints() {
        let description = format!("W swapped 1,250.5 {} for 0.75 SOL.", USDC);
        let tx = parent(Some(TxKind::Swap), Some(&description), vec![]);
        let legs = SwapDescription.classify(WALLET, &tx, &AssetTable::new()).unwrap();
        assert_eq!(legs[0].asset, "USDC");
        assert_eq!(legs[0].amount, dec!(1250.5));
        assert_eq!(legs[1].asset, "SOL");
    }

    #[test]
    fn test_swap_description_rejects_other_actor_and_kind() {
        let assets = AssetTable::new();
        let tx = parent(Some(TxKind::Swap), Some("X swapped 10 TOKENX for 5 SOL"), vec![]);
        assert_eq!(SwapDescription.classify(WALLET, &tx, &assets), None);

        let tx = parent(Some(TxKind::Transfer), Some("W swapped 10 TOKENX for 5 SOL"), vec![]);
        assert_eq!(SwapDescription.classify(WALLET, &tx, &assets), None);

        let tx = parent(Some(TxKind::Swap), Some("W swapped 0 TOKENX for 5 SOL"), vec![]);
        assert_eq!(SwapDescription.classify(WALLET, &tx, &assets), None);
    }

    #[test]
    fn test_transfer_description() {
        let strategy = TransferDescription::new(StakingPatterns::default());
        let assets = AssetTable::new();

        let tx = parent(Some(TxKind::Transfer), Some("W transferred 12.5 USDC to Merchant."), vec![]);
        assert_eq!(strategy.classify(WALLET, &tx, &assets).unwrap(), vec![
            Leg::new("USDC".to_owned(), dec!(12.5), EventKind::Disposal),
        ]);

        let tx = parent(Some(TxKind::Transfer), Some("Friend transferred 0.1 SOL to W."), vec![]);
        assert_eq!(strategy.classify(WALLET, &tx, &assets).unwrap(), vec![
            Leg::new("SOL".to_owned(), dec!(0.1), EventKind::Acquisition),
        ]);

        let tx = parent(Some(TxKind::Transfer), Some("Friend transferred 0.1 SOL to Other."), vec![]);
        assert_eq!(strategy.classify(WALLET, &tx, &assets), None);
    }

    #[test]
    fn test_chain_falls_back_to_transfer_rules() {
        let classifiers = Classifiers::default();
        let assets = AssetTable::new();
        // Unparseable swap description, so the raw transfers decide
        let tx = parent(Some(TxKind::Swap), Some("W did something"), vec![
            transfer(Some(USDC), dec!(10), WALLET, "Pool"),
            transfer(None, dec!(0.1), "Pool", WALLET),
        ]);
        let legs = classifiers.classify(WALLET, &tx, &assets);
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].kind, EventKind::Disposal);
        assert_eq!(legs[1].kind, EventKind::Acquisition);
    }

    #[test]
    fn test_custom_staking_patterns() {
        let staking = StakingPatterns::new(["^Validat0r"]).unwrap();
        assert!(staking.matches("Validat0rXYZ"));
        assert!(!staking.matches("StakeAccount"));
        assert!(StakingPatterns::new(["("]).is_err());
    }
}
