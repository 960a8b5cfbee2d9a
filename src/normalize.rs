use std::collections::HashMap;

use crate::assets::AssetTable;
use crate::base::{LedgerEvent, RawTransfer, TaxError};
use crate::classify::{Classifiers, ParentTransaction, ValidTransfer};
use crate::price::{PriceCache, PriceOracle};

/// Turns raw transfers into ledger events for one wallet.
#[derive(Default)]
pub struct Normalizer {
    assets: AssetTable,
    classifiers: Classifiers,
}

impl Normalizer {
    pub fn new(assets: AssetTable, classifiers: Classifiers) -> Self {
        Self { assets, classifiers }
    }

    /// Classifies and values every transfer relevant to `wallet`.
    ///
    /// Malformed transfers are logged and skipped. Events come out sorted by
    /// timestamp and signature, with the legs of one transaction in the order
    /// the classifier produced them. Fails only for a blank wallet address.
    pub fn normalize(
        &self,
        wallet: &str,
        transfers: &[RawTransfer],
        oracle: &dyn PriceOracle,
        cache: &mut PriceCache,
    ) -> Result<Vec<LedgerEvent>, TaxError> {
        let wallet = wallet.trim();
        if wallet.is_empty() {
            return Err(TaxError::InvalidInput("wallet address is empty".to_owned()));
        }

        let (mut parents, skipped) = group_transfers(transfers);
        parents.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.signature.cmp(&b.signature)));

        let mut events = Vec::new();
        for parent in &mut parents {
            // Fix the order of legs within a transaction independently of the
            // order the provider listed them in, outgoing first
            parent.transfers.sort_by(|a, b| {
                (a.from.as_deref() != Some(wallet), &a.mint, &a.from, &a.to, a.amount)
                    .cmp(&(b.from.as_deref() != Some(wallet), &b.mint, &b.from, &b.to, b.amount))
            });

            for leg in self.classifiers.classify(wallet, parent, &self.assets) {
                let usd_value = cache.usd_value(oracle, &leg.asset, leg.amount, parent.timestamp);
                tracing::debug!("{} {}: {} {} {} (${})", parent.timestamp, parent.signature, leg.kind, leg.amount, leg.asset, usd_value);

                events.push(LedgerEvent {
                    signature: parent.signature.clone(),
                    timestamp: parent.timestamp,
                    asset: leg.asset,
                    amount: leg.amount,
                    kind: leg.kind,
                    usd_value,
                    wallet: wallet.to_owned(),
                });
            }
        }

        tracing::info!(
            "Normalized {} transfers in {} transactions into {} events for {} ({} skipped)",
            transfers.len(), parents.len(), events.len(), wallet, skipped,
        );

        Ok(events)
    }
}

/// Validates transfers and groups them by signature. Returns the parent
/// transactions and the number of transfers that were skipped.
fn group_transfers(transfers: &[RawTransfer]) -> (Vec<ParentTransaction>, usize) {
    let mut parents: Vec<ParentTransaction> = Vec::new();
    let mut index_by_signature: HashMap<&str, usize> = HashMap::new();
    let mut skipped = 0;

    for transfer in transfers {
        let validated = transfer.parsed_timestamp()
            .and_then(|timestamp| transfer.whole_amount().map(|amount| (timestamp, amount)));
        let (timestamp, amount) = match validated {
            Ok(valid) => valid,
            Err(err) => {
                tracing::warn!("{}", err);
                skipped += 1;
                continue;
            }
        };

        let index = *index_by_signature.entry(transfer.signature.as_str()).or_insert_with(|| {
            parents.push(ParentTransaction {
                signature: transfer.signature.clone(),
                timestamp,
                kind: None,
                description: None,
                transfers: Vec::new(),
            });
            parents.len() - 1
        });

        let parent = &mut parents[index];
        if timestamp != parent.timestamp {
            tracing::warn!("{}", conflict(&parent.signature, "timestamps", &parent.timestamp, &timestamp));
            parent.timestamp = parent.timestamp.min(timestamp);
        }
        merge_field(&parent.signature, "types", &mut parent.kind, transfer.kind.as_ref());
        merge_field(&parent.signature, "descriptions", &mut parent.description, transfer.description.as_ref());
        parent.transfers.push(ValidTransfer {
            mint: transfer.mint.clone(),
            amount,
            from: transfer.from.clone(),
            to: transfer.to.clone(),
        });
    }

    (parents, skipped)
}

fn conflict(signature: &str, field: &str, kept: &dyn std::fmt::Debug, other: &dyn std::fmt::Debug) -> TaxError {
    TaxError::MalformedRecord {
        signature: signature.to_owned(),
        reason: format!("transfers disagree on {}: {:?} and {:?}", field, kept, other),
    }
}

/// Folds a field that every transfer of a transaction repeats. On a
/// disagreement the smaller value wins, so the result does not depend on the
/// order the transfers arrived in.
fn merge_field<T: Ord + Clone + std::fmt::Debug>(signature: &str, field: &str, current: &mut Option<T>, incoming: Option<&T>) {
    let Some(incoming) = incoming else {
        return;
    };
    let Some(value) = current.as_mut() else {
        *current = Some(incoming.clone());
        return;
    };
    if *value != *incoming {
        tracing::warn!("{}", conflict(signature, field, &*value, incoming));
        if *incoming < *value {
            *value = incoming.clone();
        }
    }
}
