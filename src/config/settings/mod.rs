
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_EMBEDDING_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const MAX_TOP_K: usize = 1000;
pub const MAX_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            dimensions: None,
            timeout_secs: DEFAULT_EMBEDDING_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_EMBEDDING_CONNECT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
    pub min_score: f32,
    pub batch_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_timeout_secs: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            min_score: 0.25,
            batch_size: 500,
            scan_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid API key environment variable name: {0:?}")]
    InvalidApiKeyEnv(String),
    #[error("Invalid embedding dimensions: {0} (must be between 1 and 8192)")]
    InvalidDimensions(u32),
    #[error("Invalid embedding timeout: {0}s (must be between 1 and 120 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid connect timeout: {0}s (must be between 1 and the request timeout)")]
    InvalidConnectTimeout(u64),
    #[error("Invalid top_k: {0} (must be at most 1000)")]
    InvalidTopK(usize),
    #[error("Invalid min_score: {0} (must be a finite value between -1 and 1)")]
    InvalidMinScore(f32),
    #[error("Invalid batch size: {0} (must be between 1 and 10000)")]
    InvalidBatchSize(usize),
    #[error("Invalid scan timeout: {0}s (must be greater than 0)")]
    InvalidScanTimeout(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory, `~/.archive-search`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".archive-search"))
            .or_else(|| dirs::data_dir().map(|data| data.join("archive-search")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.search.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Path of the SQLite archive database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("archive.db"))
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.api_key.is_none() && !is_valid_env_name(&self.api_key_env) {
            return Err(ConfigError::InvalidApiKeyEnv(self.api_key_env.clone()));
        }

        if let Some(dimensions) = self.dimensions {
            if !(1..=8192).contains(&dimensions) {
                return Err(ConfigError::InvalidDimensions(dimensions));
            }
        }

        if !(1..=120).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > self.timeout_secs {
            return Err(ConfigError::InvalidConnectTimeout(
                self.connect_timeout_secs,
            ));
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url =
            Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }
        Ok(url)
    }

    /// Inline key if configured, otherwise the configured environment variable
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Option<String>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        self.api_key
            .clone()
            .or_else(|| lookup(&self.api_key_env))
            .filter(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        let temp_config = EmbeddingConfig {
            base_url: base_url.clone(),
            ..self.clone()
        };
        temp_config.base_url()?;
        self.base_url = base_url;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_api_key_env(&mut self, api_key_env: String) -> Result<(), ConfigError> {
        if !is_valid_env_name(&api_key_env) {
            return Err(ConfigError::InvalidApiKeyEnv(api_key_env));
        }
        self.api_key_env = api_key_env;
        Ok(())
    }

    pub fn set_timeout_secs(&mut self, timeout_secs: u64) -> Result<(), ConfigError> {
        if !(1..=120).contains(&timeout_secs) {
            return Err(ConfigError::InvalidTimeout(timeout_secs));
        }
        self.timeout_secs = timeout_secs;
        self.connect_timeout_secs = self.connect_timeout_secs.min(timeout_secs);
        Ok(())
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k > MAX_TOP_K {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if !self.min_score.is_finite() || !(-1.0..=1.0).contains(&self.min_score) {
            return Err(ConfigError::InvalidMinScore(self.min_score));
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if self.scan_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidScanTimeout(0));
        }

        Ok(())
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_secs.map(Duration::from_secs)
    }

    pub fn set_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if top_k > MAX_TOP_K {
            return Err(ConfigError::InvalidTopK(top_k));
        }
        self.top_k = top_k;
        Ok(())
    }

    pub fn set_min_score(&mut self, min_score: f32) -> Result<(), ConfigError> {
        if !min_score.is_finite() || !(-1.0..=1.0).contains(&min_score) {
            return Err(ConfigError::InvalidMinScore(min_score));
        }
        self.min_score = min_score;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}

fn is_valid_env_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
