//! Run configuration, read from a JSON sources file.
//!
//! ```json
//! {
//!   "sources": [
//!     { "source_type": "HeliusJson", "path": "main.json", "wallet": "C1GP...", "name": "Main" }
//!   ],
//!   "price_history": "prices",
//!   "timezone": "Europe/Berlin",
//!   "staking_patterns": ["(?i)stake"],
//!   "assets": { "9359LVZJs8bf2FXcTdHvwcMnvg2ZCf6DUZ5ABDcJKx52": "TOKENX" },
//!   "max_price_gap_hours": 12,
//!   "start": "2024-01-01",
//!   "end": "2024-12-31"
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::assets::AssetTable;
use crate::classify::{Classifiers, StakingPatterns};
use crate::normalize::Normalizer;
use crate::price_history::{PriceHistory, DEFAULT_MAX_GAP_HOURS};
use crate::report::ReportPeriod;

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Id of a registered transaction source, like `HeliusJson`.
    pub source_type: String,
    pub path: String,
    /// Address whose point of view the source is normalized from.
    pub wallet: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(skip)]
    pub full_path: PathBuf,
}

impl SourceConfig {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.path } else { &self.name }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_history: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staking_patterns: Option<Vec<String>>,
    /// Extra mint to symbol mappings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price_gap_hours: Option<i64>,
    /// First day reported on, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    /// Last day reported on, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

impl Config {
    /// Reads the config and resolves relative paths against its directory.
    pub fn load(config_file: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(config_file)
            .with_context(|| format!("Failed to read {}", config_file.display()))?;
        let mut config: Config = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", config_file.display()))?;

        let base_dir = config_file.parent().unwrap_or(Path::new(""));
        config.resolve_paths(base_dir);
        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        self.sources.iter_mut().for_each(|source| {
            source.full_path = base_dir.join(&source.path);
        });
        if let Some(price_history) = &mut self.price_history {
            *price_history = base_dir.join(&*price_history);
        }
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|source| source.enabled)
    }

    /// Timezone used when presenting dates, UTC unless configured.
    pub fn timezone(&self) -> Result<Tz> {
        match &self.timezone {
            None => Ok(Tz::UTC),
            Some(name) => name.parse::<Tz>().map_err(|e| anyhow!("invalid timezone {}: {}", name, e)),
        }
    }

    /// Directory holding the price CSV files. Defaults to the platform data
    /// directory.
    pub fn price_history_dir(&self) -> PathBuf {
        match &self.price_history {
            Some(dir) => dir.clone(),
            None => ProjectDirs::from("org", "soltax", "soltax")
                .map(|dirs| dirs.data_dir().join("price_history"))
                .unwrap_or_else(|| PathBuf::from("price_history")),
        }
    }

    /// The configured reporting period, with `start` and `end` overriding
    /// the values from the file when given.
    pub fn report_period(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<ReportPeriod> {
        Ok(ReportPeriod::new(start.or(self.start), end.or(self.end))?)
    }

    pub fn max_price_gap(&self) -> Duration {
        Duration::hours(self.max_price_gap_hours.unwrap_or(DEFAULT_MAX_GAP_HOURS))
    }

    pub fn staking_patterns(&self) -> Result<StakingPatterns> {
        match &self.staking_patterns {
            None => Ok(StakingPatterns::default()),
            Some(patterns) => StakingPatterns::new(patterns).context("invalid staking pattern"),
        }
    }

    pub fn asset_table(&self) -> AssetTable {
        let mut table = AssetTable::new();
        for (mint, symbol) in &self.assets {
            table.insert(mint, symbol);
        }
        table
    }

    pub fn normalizer(&self) -> Result<Normalizer> {
        Ok(Normalizer::new(self.asset_table(), Classifiers::standard(self.staking_patterns()?)))
    }

    pub fn price_history(&self) -> Result<PriceHistory> {
        Ok(PriceHistory::load_from_dir(&self.price_history_dir())?.with_max_gap(self.max_price_gap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_resolves_paths() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config_file = dir.path().join("sources.json");
        std::fs::write(&config_file, r#"{
            "sources": [
                {"source_type": "HeliusJson", "path": "main.json", "wallet": "W1", "name": "Main"},
                {"source_type": "TransfersCsv", "path": "/data/other.csv", "wallet": "W2", "enabled": false}
            ],
            "price_history": "prices",
            "timezone": "Europe/Berlin",
            "assets": {"9359LVZJs8bf2FXcTdHvwcMnvg2ZCf6DUZ5ABDcJKx52": "TOKENX"},
            "max_price_gap_hours": 6
        }"#)?;

        let config = Config::load(&config_file)?;
        assert_eq!(config.sources[0].full_path, dir.path().join("main.json"));
        assert_eq!(config.sources[0].display_name(), "Main");
        assert_eq!(config.sources[1].full_path, PathBuf::from("/data/other.csv"));
        assert_eq!(config.sources[1].display_name(), "/data/other.csv");
        assert_eq!(config.enabled_sources().count(), 1);
        assert_eq!(config.price_history_dir(), dir.path().join("prices"));
        assert_eq!(config.timezone()?, chrono_tz::Europe::Berlin);
        assert_eq!(config.max_price_gap(), Duration::hours(6));
        assert_eq!(config.asset_table().symbol(Some("9359LVZJs8bf2FXcTdHvwcMnvg2ZCf6DUZ5ABDcJKx52")), "TOKENX");
        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config: Config = serde_json::from_str("{}")?;
        assert!(config.sources.is_empty());
        assert_eq!(config.timezone()?, Tz::UTC);
        assert_eq!(config.max_price_gap(), Duration::hours(DEFAULT_MAX_GAP_HOURS));
        assert!(config.staking_patterns()?.matches("StakeAccount"));
        Ok(())
    }

    #[test]
    fn test_report_period() -> Result<()> {
        let config: Config = serde_json::from_str(r#"{"start": "2024-01-01", "end": "2024-06-30"}"#)?;
        let period = config.report_period(None, None)?;
        assert_eq!(period.start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(period.end, NaiveDate::from_ymd_opt(2024, 6, 30));

        let period = config.report_period(NaiveDate::from_ymd_opt(2024, 3, 1), None)?;
        assert_eq!(period.start, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(period.end, NaiveDate::from_ymd_opt(2024, 6, 30));

        assert!(config.report_period(NaiveDate::from_ymd_opt(2025, 1, 1), None).is_err());
        assert_eq!(Config::default().report_period(None, None)?, ReportPeriod::default());
        Ok(())
    }

    #[test]
    fn test_invalid_settings() {
        let config = Config {
            timezone: Some("Mars/Olympus".to_owned()),
            staking_patterns: Some(vec!["(".to_owned()]),
            ..Default::default()
        };
        assert!(config.timezone().is_err());
        assert!(config.staking_patterns().is_err());
        assert!(config.normalizer().is_err());
    }
}
