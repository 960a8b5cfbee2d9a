use std::path::Path;

use anyhow::{anyhow, Result};
use linkme::distributed_slice;

use crate::base::RawTransfer;

/// A loader for one input format, registered in [`TRANSACTION_SOURCES`].
pub struct TransactionSource {
    pub id: &'static str,
    pub label: &'static str,
    pub load: fn(&Path) -> Result<Vec<RawTransfer>>,
}

#[distributed_slice]
pub static TRANSACTION_SOURCES: [TransactionSource];

pub fn source_by_id(id: &str) -> Option<&'static TransactionSource> {
    TRANSACTION_SOURCES.iter().find(|source| source.id == id)
}

/// Loads raw transfers from `path` with the source registered as `id`.
pub fn load_transfers(id: &str, path: &Path) -> Result<Vec<RawTransfer>> {
    let source = source_by_id(id).ok_or_else(|| {
        let known: Vec<&str> = TRANSACTION_SOURCES.iter().map(|source| source.id).collect();
        anyhow!("unknown source type {}, expected one of: {}", id, known.join(", "))
    })?;

    let transfers = (source.load)(path)?;
    tracing::info!("Loaded {} transfers from {} ({})", transfers.len(), path.display(), source.label);
    Ok(transfers)
}
