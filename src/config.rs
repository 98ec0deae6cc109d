//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section and field has a default, so a partial (or empty) file is
//! a valid configuration.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub http: HttpConfig,
    pub sources: SourcesConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    /// Seconds between periodic cycles.
    pub scan_interval_secs: u64,
    /// Minimum seconds between a finished cycle and an on-demand scan.
    pub cooldown_secs: u64,
    /// Capacity of the recent-items buffer sent to new subscribers.
    pub recent_capacity: usize,
    /// Random pause between two marketplaces of a "both" agent.
    pub inter_source_delay_ms: DelayRange,
    /// Forget seen identifiers after this many hours. Unset keeps them for
    /// the life of the process.
    pub seen_retention_hours: Option<u64>,
    /// Broadcast channel capacity for subscriber events.
    pub event_capacity: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            cooldown_secs: 10,
            recent_capacity: 50,
            inter_source_delay_ms: DelayRange { min: 1000, max: 3000 },
            seen_retention_hours: None,
            event_capacity: 256,
        }
    }
}

/// Largest accepted cooldown, one day.
const MAX_COOLDOWN_SECS: u64 = 86_400;
/// Largest accepted seen retention, one year.
const MAX_SEEN_RETENTION_HOURS: u64 = 24 * 365;

impl ScannerConfig {
    fn validate(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            bail!("scanner.scan_interval_secs must be greater than zero");
        }
        if self.cooldown_secs > MAX_COOLDOWN_SECS {
            bail!(
                "scanner.cooldown_secs must be at most {MAX_COOLDOWN_SECS}, got {}",
                self.cooldown_secs
            );
        }
        if let Some(hours) = self.seen_retention_hours {
            if hours == 0 || hours > MAX_SEEN_RETENTION_HOURS {
                bail!(
                    "scanner.seen_retention_hours must be between 1 and {MAX_SEEN_RETENTION_HOURS}, got {hours}"
                );
            }
        }
        if self.inter_source_delay_ms.min > self.inter_source_delay_ms.max {
            bail!("scanner.inter_source_delay_ms.min must not exceed max");
        }
        Ok(())
    }


    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    pub fn seen_retention(&self) -> Option<chrono::Duration> {
        self.seen_retention_hours
            .map(|h| chrono::Duration::hours(h as i64))
    }
}

/// Inclusive millisecond range for randomized pauses.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl DelayRange {
    pub const NONE: DelayRange = DelayRange { min: 0, max: 0 };
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    /// Upper bound for every outbound request.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SourcesConfig {
    pub kleinanzeigen: KleinanzeigenConfig,
    pub vinted: VintedConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KleinanzeigenConfig {
    pub enabled: bool,
    pub base_url: String,
    pub request_delay_ms: DelayRange,
}

impl Default for KleinanzeigenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://www.kleinanzeigen.de".into(),
            request_delay_ms: DelayRange { min: 500, max: 2000 },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VintedConfig {
    pub enabled: bool,
    pub base_url: String,
    pub request_delay_ms: DelayRange,
    /// Token cache lifetime. Vinted tokens live for two hours; refresh
    /// well before that.
    pub token_ttl_secs: u64,
    pub per_page: u32,
}

impl Default for VintedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://www.vinted.de".into(),
            request_delay_ms: DelayRange { min: 300, max: 1500 },
            token_ttl_secs: 60 * 60,
            per_page: 30,
        }
    }
}

impl VintedConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub agents_path: PathBuf,
    pub favorites_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            agents_path: PathBuf::from("config/agents.json"),
            favorites_path: PathBuf::from("config/favorites.json"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.scanner.validate()?;
        Ok(config)
    }
}
