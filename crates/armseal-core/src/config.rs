//! Startup configuration
//!
//! Read once from the environment. Missing secrets or unparseable values
//! are fatal: the process must not start serving with a partial config.

use crate::catalog::ScenarioCatalog;
use crate::error::ConfigError;
use crate::intake::OpeningMode;
use crate::model::{ModelSettings, DEFAULT_TEMPERATURE};
use crate::prompt::DEFAULT_LANGUAGE;
use armseal_token::SigningKey;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_SIGNING_KEY: &str = "ARMSEAL_SIGNING_KEY";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "ARMSEAL_MODEL";
pub const ENV_MODEL_URL: &str = "ARMSEAL_MODEL_URL";
pub const ENV_TEMPERATURE: &str = "ARMSEAL_TEMPERATURE";
pub const ENV_MODEL_TIMEOUT_SECS: &str = "ARMSEAL_MODEL_TIMEOUT_SECS";
pub const ENV_DISCLOSE_CONDITION: &str = "ARMSEAL_DISCLOSE_CONDITION";
pub const ENV_OPENING_MODE: &str = "ARMSEAL_OPENING_MODE";
pub const ENV_RESPONSE_LANGUAGE: &str = "ARMSEAL_RESPONSE_LANGUAGE";
pub const ENV_CATALOG_PATH: &str = "ARMSEAL_CATALOG_PATH";
pub const ENV_MAX_BODY_BYTES: &str = "ARMSEAL_MAX_BODY_BYTES";

/// Default request body limit
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Everything needed to build an [`Experiment`](crate::Experiment)
#[derive(Clone)]
pub struct ExperimentConfig {
    pub signing_key: SigningKey,
    pub model: ModelSettings,
    pub temperature: f32,
    /// Return the assigned condition from `start`
    pub disclose_condition: bool,
    pub opening_mode: OpeningMode,
    pub response_language: String,
    /// TOML catalog; `None` means the built-in scenarios
    pub catalog_path: Option<PathBuf>,
    pub max_body_bytes: usize,
}

impl ExperimentConfig {
    /// Config with defaults for everything but the two secrets
    #[must_use]
    pub fn new(signing_key: SigningKey, api_key: impl Into<String>) -> Self {
        Self {
            signing_key,
            model: ModelSettings::new(api_key),
            temperature: DEFAULT_TEMPERATURE,
            disclose_condition: false,
            opening_mode: OpeningMode::default(),
            response_language: DEFAULT_LANGUAGE.to_string(),
            catalog_path: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_disclose_condition(mut self, disclose: bool) -> Self {
        self.disclose_condition = disclose;
        self
    }

    #[must_use]
    pub fn with_opening_mode(mut self, mode: OpeningMode) -> Self {
        self.opening_mode = mode;
        self
    }

    #[must_use]
    pub fn with_response_language(mut self, language: impl Into<String>) -> Self {
        self.response_language = language.into();
        self
    }

    #[must_use]
    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Load from the process environment
    ///
    /// # Errors
    /// See [`ExperimentConfig::from_lookup`]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a secret is missing, the signing key is
    /// too short, or any optional variable fails to parse
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let secret = get(ENV_SIGNING_KEY).ok_or(ConfigError::Missing(ENV_SIGNING_KEY))?;
        let signing_key = SigningKey::from_secret(secret.as_bytes())?;
        let api_key = get(ENV_API_KEY).ok_or(ConfigError::Missing(ENV_API_KEY))?;

        let mut config = Self::new(signing_key, api_key);

        if let Some(model) = get(ENV_MODEL) {
            config.model.model = model;
        }
        if let Some(url) = get(ENV_MODEL_URL) {
            config.model.url = url;
        }
        if let Some(secs) = parse_var::<u64>(&get, ENV_MODEL_TIMEOUT_SECS)? {
            if secs == 0 {
                return Err(invalid(ENV_MODEL_TIMEOUT_SECS, "must be at least 1"));
            }
            config.model.timeout = Duration::from_secs(secs);
        }
        if let Some(temperature) = parse_var::<f32>(&get, ENV_TEMPERATURE)? {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(invalid(ENV_TEMPERATURE, "must be between 0.0 and 2.0"));
            }
            config.temperature = temperature;
        }
        if let Some(raw) = get(ENV_DISCLOSE_CONDITION) {
            config.disclose_condition = parse_bool(&raw)
                .ok_or_else(|| invalid(ENV_DISCLOSE_CONDITION, "expected true or false"))?;
        }
        if let Some(raw) = get(ENV_OPENING_MODE) {
            config.opening_mode =
                OpeningMode::from_str(&raw).map_err(|reason| invalid(ENV_OPENING_MODE, reason))?;
        }
        if let Some(language) = get(ENV_RESPONSE_LANGUAGE) {
            config.response_language = language.trim().to_string();
        }
        if let Some(path) = get(ENV_CATALOG_PATH) {
            config.catalog_path = Some(PathBuf::from(path));
        }
        if let Some(bytes) = parse_var::<usize>(&get, ENV_MAX_BODY_BYTES)? {
            if bytes == 0 {
                return Err(invalid(ENV_MAX_BODY_BYTES, "must be at least 1"));
            }
            config.max_body_bytes = bytes;
        }

        Ok(config)
    }

    /// The configured catalog, or the built-in one
    ///
    /// # Errors
    /// Returns [`ConfigError::Catalog`] if the catalog file cannot be loaded
    pub fn load_catalog(&self) -> Result<ScenarioCatalog, ConfigError> {
        match &self.catalog_path {
            Some(path) => Ok(ScenarioCatalog::load(path)?),
            None => Ok(ScenarioCatalog::builtin()),
        }
    }
}

impl fmt::Debug for ExperimentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentConfig")
            .field("signing_key", &self.signing_key)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("disclose_condition", &self.disclose_condition)
            .field("opening_mode", &self.opening_mode)
            .field("response_language", &self.response_language)
            .field("catalog_path", &self.catalog_path)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.into(),
    }
}

fn parse_var<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    get(var)
        .map(|raw| raw.trim().parse::<T>().map_err(|err| invalid(var, err.to_string())))
        .transpose()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
