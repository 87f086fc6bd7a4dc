//! Configuration file parser for ~/.config/filter-catalog/config.toml.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted and logged as warnings.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::catalog::{FilterId, TagId};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database location. `None` means `<config dir>/filters.db`.
    pub database_path: Option<PathBuf>,

    /// Hidden filter surfaced as the "allow acceptable ads" switch.
    pub self_promo_filter_id: FilterId,

    /// UI locale, matched against `lang:` tags when picking recommended filters.
    pub locale: String,

    /// Tag that marks a filter as recommended.
    pub recommended_tag_id: TagId,

    /// Tags that disqualify a filter from being recommended.
    pub excluded_tag_ids: Vec<TagId>,

    /// Download URL for catalog filters; `{filter_id}` is substituted.
    pub filter_url_template: String,

    /// Total enabled rules above which the content blocker is over its limit.
    pub rules_limit: u64,

    /// Per-request timeout when probing filter lists.
    pub fetch_timeout_secs: u64,

    /// Maximum filter list body size in bytes.
    pub max_list_size: usize,

    /// Fallback `tracing` directive when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            self_promo_filter_id: 10,
            locale: "en".to_string(),
            recommended_tag_id: 10,
            excluded_tag_ids: vec![19],
            filter_url_template: "https://filters.adtidy.org/mac_v2/filters/{filter_id}.txt"
                .to_string(),
            rules_limit: 50_000,
            fetch_timeout_secs: 10,
            max_list_size: 16 * 1024 * 1024,
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "database_path",
        "self_promo_filter_id",
        "locale",
        "recommended_tag_id",
        "excluded_tag_ids",
        "filter_url_template",
        "rules_limit",
        "fetch_timeout_secs",
        "max_list_size",
        "log_filter",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            locale = %config.locale,
            rules_limit = config.rules_limit,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Database path, defaulting to `filters.db` inside `config_dir`.
    pub fn database_path_in(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("filters.db"))
    }

    /// Download URL for a catalog filter.
    pub fn filter_url(&self, filter_id: FilterId) -> String {
        self.filter_url_template
            .replace("{filter_id}", &filter_id.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
