use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_url() -> String {
    "https://www.esunbank.com.tw/info/goldpassbook.aspx".into()
}

fn default_table_selector() -> String {
    ".datatable".into()
}

fn default_cell_selector() -> String {
    ".default-color7".into()
}

fn default_table_index() -> usize {
    1
}

fn default_buy_index() -> usize {
    1
}

fn default_sell_index() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_interval_secs() -> u64 {
    300
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TelegramConfig {
    /// Overridden by `--token` / `TELEGRAM_BOT_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
}

/// Where the gold quote is scraped from.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_table_selector")]
    pub table_selector: String,
    #[serde(default = "default_table_index")]
    pub table_index: usize,
    #[serde(default = "default_cell_selector")]
    pub cell_selector: String,
    #[serde(default = "default_buy_index")]
    pub buy_index: usize,
    #[serde(default = "default_sell_index")]
    pub sell_index: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            table_selector: default_table_selector(),
            table_index: default_table_index(),
            cell_selector: default_cell_selector(),
            buy_index: default_buy_index(),
            sell_index: default_sell_index(),
            timeout_secs: default_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Apply the command-line token, if any, and validate the result.
    pub fn with_token(mut self, token: Option<String>) -> Result<Self, Report<ConfigError>> {
        if token.is_some() {
            self.telegram.token = token;
        }
        validate(&self)?;
        Ok(self)
    }

    /// Bot token; only call after `with_token` succeeded.
    pub fn token(&self) -> &str {
        self.telegram.token.as_deref().unwrap_or_default()
    }
}

/// Load an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_token(config)?;
    validate_general(config)?;
    validate_source(config)?;
    validate_scheduler(config)?;
    Ok(())
}

fn validate_token(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    match config.telegram.token.as_deref() {
        Some(token) if !token.trim().is_empty() => Ok(()),
        _ => Err(Report::new(ConfigError::Validation {
            field: "telegram.token is required (config, --token or TELEGRAM_BOT_TOKEN)".into(),
        })),
    }
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "general.log_format \"{}\" is not one of text, json",
                config.general.log_format
            ),
        }));
    }
    Ok(())
}

fn validate_source(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let source = &config.source;
    if source.url.trim().is_empty() {
        return Err(Report::new(ConfigError::Validation {
            field: "source.url must not be empty".into(),
        }));
    }
    if source.timeout_secs == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "source.timeout_secs must be greater than 0".into(),
        }));
    }
    if source.buy_index == source.sell_index {
        return Err(Report::new(ConfigError::Validation {
            field: "source.buy_index and source.sell_index must differ".into(),
        }));
    }
    Ok(())
}

fn validate_scheduler(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.scheduler.interval_secs == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "scheduler.interval_secs must be greater than 0".into(),
        }));
    }
    Ok(())
}
