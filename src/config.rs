use crate::error::{AppError, Result};
use crate::pacing::{RetryPolicy, Throttle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use yaml_rust2::{Yaml, YamlLoader};

pub const API_KEY_ENV: &str = "STEAM_API_KEY";

/// A Steam Web API key. Loaded once at startup and passed to every call that
/// hits the Web API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    api_key: String,
}

impl Credential {
    pub fn new(raw: &str) -> Option<Self> {
        let api_key = raw.trim();
        if api_key.is_empty() {
            return None;
        }
        if api_key.len() != 32 {
            log::warn!(
                "Steam API key has {} characters, expected 32; using it anyway",
                api_key.len()
            );
        }
        Some(Self {
            api_key: api_key.to_string(),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// First key found, in order: key file, environment, settings, `.env` file.
    pub fn resolve(
        key_file: Option<&Path>,
        env_value: Option<String>,
        settings: &Settings,
        dotenv: &Path,
    ) -> Result<Option<Self>> {
        if let Some(path) = key_file {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!("cannot read API key file {}: {e}", path.display()))
            })?;
            let credential = Self::new(&raw);
            if credential.is_none() {
                return Err(AppError::Config(format!(
                    "API key file {} is empty",
                    path.display()
                )));
            }
            log::debug!("Using API key from {}", path.display());
            return Ok(credential);
        }

        if let Some(credential) = env_value.as_deref().and_then(Self::new) {
            log::debug!("Using API key from ${API_KEY_ENV}");
            return Ok(Some(credential));
        }

        if let Some(credential) = settings.api_key.as_deref().and_then(Self::new) {
            log::debug!("Using API key from the config file");
            return Ok(Some(credential));
        }

        let Ok(contents) = std::fs::read_to_string(dotenv) else {
            return Ok(None);
        };
        let credential = contents
            .lines()
            .filter_map(|line| line.trim().strip_prefix(API_KEY_ENV))
            .filter_map(|rest| rest.trim_start().strip_prefix('='))
            .find_map(|value| Self::new(value.trim().trim_matches('"')));
        if credential.is_some() {
            log::debug!("Using API key from {}", dotenv.display());
        }
        Ok(credential)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Credential").field("api_key", &"<redacted>").finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub steam_id: Option<String>,
    pub account_name: Option<String>,
    pub cache_dir: PathBuf,
    pub country: String,
    /// Minutes of play per currency unit a game should reach.
    pub target_ratio: f64,
    pub stale_after_days: i64,
    pub checkpoint_every: usize,
    pub retry: RetryPolicy,
    pub throttle: Throttle,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            steam_id: None,
            account_name: None,
            cache_dir: PathBuf::from("cache"),
            country: "FR".to_string(),
            target_ratio: 25.0,
            stale_after_days: 7,
            checkpoint_every: 10,
            retry: RetryPolicy::default(),
            throttle: Throttle::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let docs = YamlLoader::load_from_str(text)
            .map_err(|e| AppError::Config(format!("invalid YAML: {e}")))?;
        let mut settings = Self::default();
        let Some(doc) = docs.first() else {
            return Ok(settings);
        };

        settings.api_key = string(&doc["api_key"]);
        settings.steam_id = string(&doc["steam_id"]);
        settings.account_name = string(&doc["account_name"]);
        if let Some(dir) = string(&doc["cache_dir"]) {
            settings.cache_dir = PathBuf::from(dir);
        }
        if let Some(country) = string(&doc["country"]) {
            settings.country = country.to_uppercase();
        }
        if let Some(target) = number(&doc["target_ratio"]) {
            if target <= 0.0 {
                return Err(AppError::Config("target_ratio must be positive".into()));
            }
            settings.target_ratio = target;
        }
        if let Some(days) = doc["stale_after_days"].as_i64() {
            settings.stale_after_days = days.max(0);
        }
        if let Some(every) = doc["checkpoint_every"].as_i64() {
            settings.checkpoint_every = usize::try_from(every.max(1)).unwrap_or(1);
        }

        let retry = &doc["retry"];
        if let Some(attempts) = retry["max_attempts"].as_i64() {
            settings.retry.max_attempts = u32::try_from(attempts.max(1)).unwrap_or(1);
        }
        if let Some(delay) = millis(&retry["base_delay_ms"]) {
            settings.retry.base_delay = delay;
        }
        if let Some(delay) = millis(&retry["max_delay_ms"]) {
            settings.retry.max_delay = delay;
        }
        if let Some(delay) = millis(&retry["rate_limit_delay_ms"]) {
            settings.retry.rate_limit_delay = delay;
        }

        let pacing = &doc["pacing"];
        if let Some(threshold) = pacing["throttle_threshold"].as_i64() {
            settings.throttle.threshold = usize::try_from(threshold.max(0)).unwrap_or(0);
        }
        if let Some(interval) = millis(&pacing["min_interval_ms"]) {
            settings.throttle.min_interval = interval;
        }

        Ok(settings)
    }
}

fn string(yaml: &Yaml) -> Option<String> {
    match yaml {
        Yaml::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        // unquoted Steam IDs parse as integers
        Yaml::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn number(yaml: &Yaml) -> Option<f64> {
    yaml.as_f64().or_else(|| yaml.as_i64().map(|i| i as f64))
}

fn millis(yaml: &Yaml) -> Option<Duration> {
    yaml.as_i64()
        .and_then(|ms| u64::try_from(ms).ok())
        .map(Duration::from_millis)
}
