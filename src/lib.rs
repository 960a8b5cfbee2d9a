//! Capital gains and staking income for Solana wallets.
//!
//! Raw transfers are classified and valued into [`LedgerEvent`]s by the
//! [`Normalizer`], then matched first-in first-out by the [`Fifo`] matcher
//! into [`CapitalGainRecord`]s and [`IncomeRecord`]s.

pub mod assets;
pub mod base;
pub mod classify;
pub mod config;
pub mod export;
pub mod fifo;
pub mod helius;
pub mod lots;
pub mod normalize;
pub mod price;
pub mod price_history;
pub mod report;
pub mod sources;
pub mod transfers_csv;
mod time;

use anyhow::Context;

pub use base::{CapitalGainRecord, EventKind, IncomeRecord, LedgerEvent, RawTimestamp, RawTransfer, TaxError, TxKind};
pub use fifo::{calculate_taxes, Fifo};
pub use normalize::Normalizer;
pub use price::{PriceCache, PriceOracle};

use config::Config;

/// Normalizes the transfers of one wallet with the default asset table and
/// classifiers and a fresh price cache.
pub fn normalize(wallet: &str, transfers: &[RawTransfer], oracle: &dyn PriceOracle) -> Result<Vec<LedgerEvent>, TaxError> {
    Normalizer::default().normalize(wallet, transfers, oracle, &mut PriceCache::new())
}

/// Loads and normalizes every enabled source in `config` and merges the
/// events of all wallets into one list.
pub fn load_events(config: &Config, oracle: &dyn PriceOracle) -> anyhow::Result<Vec<LedgerEvent>> {
    let normalizer = config.normalizer()?;
    let mut cache = PriceCache::new();
    let mut events = Vec::new();

    for source in config.enabled_sources() {
        let transfers = sources::load_transfers(&source.source_type, &source.full_path)
            .with_context(|| format!("Failed to load source {}", source.display_name()))?;
        let wallet_events = normalizer.normalize(&source.wallet, &transfers, oracle, &mut cache)
            .with_context(|| format!("Failed to normalize source {}", source.display_name()))?;
        events.extend(wallet_events);
    }

    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.signature.cmp(&b.signature)));
    tracing::info!("{} events from {} sources ({} price lookups)", events.len(), config.enabled_sources().count(), cache.lookups());

    Ok(events)
}
