use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::base::{NATIVE_ASSET, TaxError, UNKNOWN_ASSET};

/// A base58 public key, the shape of every mint address.
static MINT_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("valid mint regex")
});

/// Maps well-known mints to their symbols
const KNOWN_MINTS: &[(&str, &str)] = &[
    ("4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", "RAY"),
    ("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", "BONK"),
    ("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "USDC"),
    ("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", "USDT"),
    ("JUPyiwrYJFskUPiHa7heLRXtzEKkeR9JkePStAqVxAB", "JUP"),
    ("So11111111111111111111111111111111111111112", "SOL"),
    ("mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So", "MSOL"),
];

/// Resolves mint addresses to asset symbols.
///
/// Owned by the caller and passed to the normalizer explicitly, so extra
/// mints can be registered per run without any process-wide state.
#[derive(Debug, Clone)]
pub struct AssetTable {
    symbols: HashMap<String, String>,
}

impl Default for AssetTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetTable {
    pub fn new() -> Self {
        Self {
            symbols: KNOWN_MINTS.iter().map(|(mint, symbol)| (mint.to_string(), symbol.to_string())).collect(),
        }
    }

    pub fn insert(&mut self, mint: impl Into<String>, symbol: impl Into<String>) {
        self.symbols.insert(mint.into(), symbol.into());
    }

    /// Symbol for a transfer's mint. A missing mint is the native asset and
    /// unrecognized mints resolve to the `Unknown` sentinel.
    pub fn symbol(&self, mint: Option<&str>) -> String {
        match mint {
            None => NATIVE_ASSET.to_owned(),
            Some(mint) => match self.symbols.get(mint) {
                Some(symbol) => symbol.clone(),
                None => {
                    tracing::warn!("{}", TaxError::UnknownAsset(mint.to_owned()));
                    UNKNOWN_ASSET.to_owned()
                }
            },
        }
    }

    /// Resolves an asset token found in a transaction description, which
    /// may be a symbol or a mint address. Unrecognized mint addresses share
    /// the `Unknown` sentinel with raw transfers of the same mint, while
    /// plain tickers are kept as written.
    pub fn description_symbol(&self, token: &str) -> String {
        if let Some(symbol) = self.symbols.get(token) {
            return symbol.clone();
        }
        if MINT_ADDRESS.is_match(token) {
            tracing::warn!("{}", TaxError::UnknownAsset(token.to_owned()));
            return UNKNOWN_ASSET.to_owned();
        }
        token.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol() {
        let table = AssetTable::new();
        assert_eq!(table.symbol(None), "SOL");
        assert_eq!(table.symbol(Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")), "USDC");
        assert_eq!(table.symbol(Some("So11111111111111111111111111111111111111112")), "SOL");
        assert_eq!(table.symbol(Some("9359LVZJs8bf2FXcTdHvwcMnvg2ZCf6DUZ5ABDcJKx52")), "Unknown");
    }

    #[test]
    fn test_insert() {
        let mut table = AssetTable::new();
        table.insert("9359LVZJs8bf2FXcTdHvwcMnvg2ZCf6DUZ5ABDcJKx52", "TOKENX");
        assert_eq!(table.symbol(Some("9359LVZJs8bf2FXcTdHvwcMnvg2ZCf6DUZ5ABDcJKx52")), "TOKENX");
        assert_eq!(table.description_symbol("9359LVZJs8bf2FXcTdHvwcMnvg2ZCf6DUZ5ABDcJKx52"), "TOKENX");
    }

    #[test]
    fn test_description_symbol() {
        let table = AssetTable::new();
        assert_eq!(table.description_symbol("TOKENX"), "TOKENX");
        assert_eq!(table.description_symbol("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"), "USDC");
        assert_eq!(table.description_symbol("SOL"), "SOL");
    }

    #[test]
    fn test_description_mint_uses_sentinel() {
        let table = AssetTable::new();
        let mint = "9359LVZJs8bf2FXcTdHvwcMnvg2ZCf6DUZ5ABDcJKx52";
        assert_eq!(table.description_symbol(mint), table.symbol(Some(mint)));
        assert_eq!(table.description_symbol(mint), "Unknown");
        // too short for an address
        assert_eq!(table.description_symbol("BONKBONK"), "BONKBONK");
    }
}
