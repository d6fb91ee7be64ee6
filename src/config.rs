//! Settings loaded from the environment (and `.env`).

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::bot::conversation::ConversationLimits;
use crate::scan::ScanLimits;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Telegram API id from my.telegram.org.
    pub api_id: i32,
    pub api_hash: String,
    pub bot_token: String,
    /// Phone of the search account; prompted for when missing.
    pub phone: Option<String>,

    /// Candidate groups per directory lookup.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Links wanted before a search is considered done.
    #[serde(default = "default_links_required")]
    pub links_required: usize,
    /// Scan time budget, in minutes.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// How long to wait for a retry keyword, in seconds.
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout: u64,

    pub data_dir: Option<PathBuf>,
}

fn default_search_limit() -> usize {
    50
}

fn default_links_required() -> usize {
    20
}

fn default_timeout() -> u64 {
    10
}

fn default_history_limit() -> usize {
    500
}

fn default_scan_concurrency() -> usize {
    5
}

fn default_max_retries() -> usize {
    3
}

fn default_reply_timeout() -> u64 {
    300
}

impl Settings {
    /// Load settings from environment variables (`API_ID`, `BOT_TOKEN`, ...).
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a required value is missing or invalid.
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Environment::default() maps UPPER_SNAKE_CASE to snake_case;
            // empty variables count as unset.
            .add_source(Environment::default().ignore_empty(true))
            .build()?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_id == 0 {
            return Err(ConfigError::Message("API_ID must be set".to_string()));
        }
        if self.api_hash.trim().is_empty() {
            return Err(ConfigError::Message("API_HASH must be set".to_string()));
        }
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Message("BOT_TOKEN must be set".to_string()));
        }
        for (name, value) in [
            ("SEARCH_LIMIT", self.search_limit),
            ("LINKS_REQUIRED", self.links_required),
            ("HISTORY_LIMIT", self.history_limit),
            ("SCAN_CONCURRENCY", self.scan_concurrency),
        ] {
            if value == 0 {
                return Err(ConfigError::Message(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(crate::collector::default_data_dir)
    }

    pub fn scan_limits(&self) -> ScanLimits {
        ScanLimits {
            global_target: self.links_required,
            time_budget: Duration::from_secs(self.timeout * 60),
            concurrency_cap: self.scan_concurrency,
            history_limit: self.history_limit,
        }
    }

    pub fn conversation_limits(&self) -> ConversationLimits {
        ConversationLimits {
            max_groups: self.search_limit,
            max_retries: self.max_retries,
            reply_timeout: Duration::from_secs(self.reply_timeout),
        }
    }
}
