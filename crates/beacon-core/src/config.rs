//! Configuration system for Beacon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BEACON_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/beacon/config.toml
//!   3. ~/.config/beacon/config.toml

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub store: StoreConfig,
    pub discovery: DiscoveryConfig,
    pub monitor: MonitorConfig,
    pub probe: ProbeConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database holding the endpoint → status table.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Discovery endpoint. Empty = discovery disabled, seed list only.
    pub url: String,
    pub request_timeout_secs: u64,
    /// Base interval between refreshes; a random extra delay is added.
    pub refresh_secs: u64,
    pub refresh_jitter_min_secs: u64,
    pub refresh_jitter_max_secs: u64,
    /// Locality ids are round-robined over `0..locality_count`.
    pub locality_count: u32,
    /// Locality fetched alongside every `extra_every`-th refresh and merged in.
    pub extra_locality: Option<u32>,
    pub extra_every: u32,
    /// Walk every locality once per `sweep_interval_secs`.
    pub sweep: bool,
    pub sweep_interval_secs: u64,
    pub sweep_delay_min_secs: u64,
    pub sweep_delay_max_secs: u64,
}

/// Thresholds of the per-endpoint state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tick_interval_ms: u64,
    /// Re-issue a connect if no session event arrived within this window.
    pub connect_fallback_secs: u64,
    pub retry_min_secs: u64,
    pub retry_max_secs: u64,
    /// Upper bound of the retry delay for the first failure after being healthy.
    pub first_retry_max_secs: u64,
    /// Proactive reconnect window after a successful logon.
    pub rehome_min_secs: u64,
    pub rehome_max_secs: u64,
    /// Remove an endpoint unseen by discovery for this long...
    pub unseen_retention_secs: u64,
    /// ...and not authenticated for this long.
    pub unauthenticated_retention_secs: u64,
    /// Discovery may move an endpoint to a new port once it failed more than
    /// this many attempts in a row.
    pub migrate_after_attempts: u32,
    /// From this attempt on, failure reports carry last-seen/last-success detail.
    pub detailed_report_after_attempts: u32,
    /// New endpoints start `(index % stagger_modulus)` seconds apart.
    pub stagger_modulus: u32,
    /// Fixed jitter seed. Unset = seeded from OS entropy.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub connect_timeout_secs: u64,
    pub logon_timeout_secs: u64,
    /// Bytes written on logon; any reply counts as authenticated.
    pub greeting: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("beacon.db"),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            request_timeout_secs: 30,
            refresh_secs: 11 * 60,
            refresh_jitter_min_secs: 10,
            refresh_jitter_max_secs: 120,
            locality_count: 220,
            extra_locality: Some(47),
            extra_every: 10,
            sweep: false,
            sweep_interval_secs: 6 * 60 * 60,
            sweep_delay_min_secs: 1,
            sweep_delay_max_secs: 10,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            connect_fallback_secs: 60,
            retry_min_secs: 10,
            retry_max_secs: 30,
            first_retry_max_secs: 60,
            rehome_min_secs: 5 * 60,
            rehome_max_secs: 10 * 60,
            unseen_retention_secs: 24 * 60 * 60,
            unauthenticated_retention_secs: 24 * 60 * 60,
            migrate_after_attempts: 2,
            detailed_report_after_attempts: 10,
            stagger_modulus: 40,
            seed: None,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            logon_timeout_secs: 10,
            greeting: "HELLO beacon\r\n".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9101,
        }
    }
}

// ── Derived durations ─────────────────────────────────────────────────────────

impl MonitorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn connect_fallback(&self) -> Duration {
        Duration::from_secs(self.connect_fallback_secs)
    }

    /// Retry delay range. `first` selects the wider window used for the
    /// first failure after a healthy period.
    pub fn retry_range(&self, first: bool) -> Range<Duration> {
        let max = if first {
            self.first_retry_max_secs
        } else {
            self.retry_max_secs
        };
        Duration::from_secs(self.retry_min_secs)..Duration::from_secs(max)
    }

    pub fn rehome_range(&self) -> Range<Duration> {
        Duration::from_secs(self.rehome_min_secs)..Duration::from_secs(self.rehome_max_secs)
    }

    pub fn unseen_retention(&self) -> Duration {
        Duration::from_secs(self.unseen_retention_secs)
    }

    pub fn unauthenticated_retention(&self) -> Duration {
        Duration::from_secs(self.unauthenticated_retention_secs)
    }

    /// Connect delay for the `index`-th (1-based) new endpoint of a batch.
    pub fn stagger(&self, index: u32) -> Duration {
        Duration::from_secs(u64::from(index % self.stagger_modulus.max(1)))
    }
}

impl DiscoveryConfig {
    pub fn enabled(&self) -> bool {
        !self.url.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_base(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn refresh_jitter(&self) -> Range<Duration> {
        Duration::from_secs(self.refresh_jitter_min_secs)
            ..Duration::from_secs(self.refresh_jitter_max_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn sweep_delay(&self) -> Range<Duration> {
        Duration::from_secs(self.sweep_delay_min_secs)..Duration::from_secs(self.sweep_delay_max_secs)
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn logon_timeout(&self) -> Duration {
        Duration::from_secs(self.logon_timeout_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("beacon")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("beacon")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BeaconConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            BeaconConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BEACON_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BeaconConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply BEACON_* overrides from an arbitrary lookup (the process
    /// environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("BEACON_STORE__PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BEACON_DISCOVERY__URL") {
            self.discovery.url = v;
        }
        if let Some(v) = lookup("BEACON_DISCOVERY__SWEEP") {
            self.discovery.sweep = v == "true" || v == "1";
        }
        if let Some(p) = lookup("BEACON_MONITOR__TICK_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.monitor.tick_interval_ms = p;
        }
        if let Some(s) = lookup("BEACON_MONITOR__SEED").and_then(|v| v.parse().ok()) {
            self.monitor.seed = Some(s);
        }
        if let Some(v) = lookup("BEACON_API__ENABLED") {
            self.api.enabled = v == "true" || v == "1";
        }
        if let Some(p) = lookup("BEACON_API__PORT").and_then(|v| v.parse().ok()) {
            self.api.port = p;
        }
    }
}
