use crate::common::constants::{
    API_KEY_ENV, BASE_URL_ENV, DEFAULT_BACKOFF_MS, DEFAULT_BASE_URL, DEFAULT_CONFIG_FILE,
    DEFAULT_MAX_RETRIES, DEFAULT_PACING_MS, DEFAULT_PROGRESS_FILE, MAX_BATCH_SIZE,
};
use crate::common::error::{EnricherError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration, loaded from `trending.toml` and then overridden
/// by environment variables and CLI flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub youtube: YoutubeConfig,
    pub enrich: EnrichSettings,
    pub normalize: NormalizeSettings,
    pub csv: CsvSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Per-request timeout; `None` keeps the transport default
    pub timeout_seconds: Option<u64>,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichSettings {
    pub batch_size: usize,
    pub pacing_ms: u64,
    pub backoff_ms: u64,
    pub max_retries: u32,
    pub progress_file: String,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            pacing_ms: DEFAULT_PACING_MS,
            backoff_ms: DEFAULT_BACKOFF_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            progress_file: DEFAULT_PROGRESS_FILE.to_string(),
        }
    }
}

impl EnrichSettings {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeSettings {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        // One year of trending data, April to April
        Self {
            start_date: NaiveDate::from_ymd_opt(2023, 4, 15).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 4, 15).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CsvSettings {
    /// Escape character accepted inside quoted input fields
    pub escape: Option<char>,
}

impl Default for CsvSettings {
    fn default() -> Self {
        Self { escape: Some('\\') }
    }
}

impl CsvSettings {
    pub fn escape_byte(&self) -> Result<Option<u8>> {
        match self.escape {
            None => Ok(None),
            Some(c) if c.is_ascii() => Ok(Some(c as u8)),
            Some(c) => Err(EnricherError::Config(format!(
                "CSV escape must be a single ASCII character, got '{}'",
                c
            ))),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from `trending.toml` in the working
    /// directory when no path is given. A missing default file yields defaults;
    /// a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EnricherError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Environment overrides file values
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.youtube.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.youtube.base_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.enrich.batch_size == 0 || self.enrich.batch_size > MAX_BATCH_SIZE {
            return Err(EnricherError::Config(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.enrich.batch_size
            )));
        }
        if self.normalize.start_date > self.normalize.end_date {
            return Err(EnricherError::Config(format!(
                "start_date {} is after end_date {}",
                self.normalize.start_date, self.normalize.end_date
            )));
        }
        self.csv.escape_byte()?;
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str> {
        self.youtube
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                EnricherError::Config(format!(
                    "No API key configured; set {} or youtube.api_key",
                    API_KEY_ENV
                ))
            })
    }
}
