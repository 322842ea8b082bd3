use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants;
use crate::error::{RefineryError, Result};

const CONFIG_PATH_VAR: &str = "REFINERY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "refinery.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage_dir: PathBuf,
    pub blob_dir: PathBuf,
    pub auth_token: String,
    pub rate_limit_per_minute: u32,
    pub port: u16,
    pub metrics_port: Option<u16>,
    pub sentiment_url: Option<String>,
    pub ner_url: Option<String>,
    pub engine_timeout_secs: u64,
    pub alpha: f64,
    pub gamma: f64,
    pub fallback_names: Vec<String>,
    pub default_rating: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./storage"),
            blob_dir: PathBuf::from("./blob_storage"),
            auth_token: String::new(),
            rate_limit_per_minute: 10,
            port: 8000,
            metrics_port: None,
            sentiment_url: None,
            ner_url: None,
            engine_timeout_secs: 10,
            alpha: constants::DEFAULT_ALPHA,
            gamma: constants::DEFAULT_GAMMA,
            fallback_names: constants::default_fallback_names(),
            default_rating: constants::DEFAULT_RATING,
        }
    }
}

impl Settings {
    /// Load settings from the optional TOML file, then `.env`, then `REFINERY_*` variables.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let config_path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut settings = Self::from_file(Path::new(&config_path))?;
        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            RefineryError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REFINERY_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("REFINERY_BLOB_DIR") {
            self.blob_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("REFINERY_AUTH_TOKEN") {
            self.auth_token = v;
        }
        if let Some(v) = lookup("REFINERY_RATE_LIMIT_PER_MINUTE") {
            self.rate_limit_per_minute = parse_var("REFINERY_RATE_LIMIT_PER_MINUTE", &v)?;
        }
        if let Some(v) = lookup("REFINERY_PORT") {
            self.port = parse_var("REFINERY_PORT", &v)?;
        }
        if let Some(v) = lookup("REFINERY_METRICS_PORT") {
            self.metrics_port = Some(parse_var("REFINERY_METRICS_PORT", &v)?);
        }
        if let Some(v) = lookup("REFINERY_SENTIMENT_URL") {
            self.sentiment_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("REFINERY_NER_URL") {
            self.ner_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("REFINERY_ENGINE_TIMEOUT_SECS") {
            self.engine_timeout_secs = parse_var("REFINERY_ENGINE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("REFINERY_ALPHA") {
            self.alpha = parse_var("REFINERY_ALPHA", &v)?;
        }
        if let Some(v) = lookup("REFINERY_GAMMA") {
            self.gamma = parse_var("REFINERY_GAMMA", &v)?;
        }
        if let Some(v) = lookup("REFINERY_FALLBACK_NAMES") {
            self.fallback_names = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(RefineryError::Config(format!(
                "alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(RefineryError::Config(format!(
                "gamma must be within [0, 1], got {}",
                self.gamma
            )));
        }
        if !(constants::MIN_RATING..=constants::MAX_RATING).contains(&self.default_rating) {
            return Err(RefineryError::Config(format!(
                "default_rating must be within [0, 10], got {}",
                self.default_rating
            )));
        }
        Ok(())
    }

    pub fn cleaned_file(&self) -> PathBuf {
        self.storage_dir.join(constants::CLEANED_FILE)
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.storage_dir.join(constants::METADATA_FILE)
    }

    pub fn final_file(&self) -> PathBuf {
        self.storage_dir.join(constants::FINAL_FILE)
    }

    pub fn qtable_file(&self) -> PathBuf {
        self.storage_dir.join(constants::QTABLE_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.storage_dir.join(constants::LOG_DIR)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RefineryError::Config(format!("Invalid value for {}: '{}'", key, value)))
}
