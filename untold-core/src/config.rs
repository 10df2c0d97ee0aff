//! Runtime configuration.
//!
//! Values come from the process environment (after `.env` has been loaded by
//! the binary). Anything unset falls back to a default; anything set but
//! unparseable is an error.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 256;

/// Errors from reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Configuration for a story session.
#[derive(Clone)]
pub struct Config {
    /// Deployment-level key used when the user has not saved one.
    pub default_credential: Option<String>,

    /// Model id to generate with.
    pub model: String,

    /// API root.
    pub api_base: String,

    /// Sampling temperature. `None` leaves the service default.
    pub temperature: Option<f32>,

    /// Maximum tokens per reply.
    pub max_output_tokens: usize,

    /// Overall deadline per request. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,

    /// Where the user's key is kept. `None` uses the platform config directory.
    pub credential_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_credential: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: None,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            request_timeout: None,
            credential_file: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "default_credential",
                &self.default_credential.as_ref().map(|_| "<redacted>"),
            )
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("request_timeout", &self.request_timeout)
            .field("credential_file", &self.credential_file)
            .finish()
    }
}

impl Config {
    /// Read configuration from environment variables.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `GEMINI_API_KEY` / `GOOGLE_API_KEY` | default key |
    /// | `UNTOLD_MODEL` | model id |
    /// | `UNTOLD_API_BASE` | API root |
    /// | `UNTOLD_TEMPERATURE` | float in `0.0..=2.0` |
    /// | `UNTOLD_MAX_OUTPUT_TOKENS` | positive integer |
    /// | `UNTOLD_REQUEST_TIMEOUT_SECS` | positive integer |
    /// | `UNTOLD_CREDENTIAL_FILE` | path of the key file |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.default_credential = get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY"));

        if let Some(model) = get("UNTOLD_MODEL") {
            config.model = model.trim().to_string();
        }
        if let Some(base) = get("UNTOLD_API_BASE") {
            config.api_base = base.trim().to_string();
        }
        if let Some(value) = get("UNTOLD_TEMPERATURE") {
            config.temperature = Some(parse_temperature(&value)?);
        }
        if let Some(value) = get("UNTOLD_MAX_OUTPUT_TOKENS") {
            config.max_output_tokens = parse_positive("UNTOLD_MAX_OUTPUT_TOKENS", &value)?;
        }
        if let Some(value) = get("UNTOLD_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Some(Duration::from_secs(parse_positive(
                "UNTOLD_REQUEST_TIMEOUT_SECS",
                &value,
            )?));
        }
        config.credential_file = get("UNTOLD_CREDENTIAL_FILE").map(PathBuf::from);

        Ok(config)
    }

    pub fn with_default_credential(mut self, credential: impl Into<String>) -> Self {
        self.default_credential = Some(credential.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: usize) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_credential_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential_file = Some(path.into());
        self
    }
}

fn parse_temperature(value: &str) -> Result<f32, ConfigError> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|t| (0.0..=2.0).contains(t))
        .ok_or_else(|| ConfigError::Invalid {
            var: "UNTOLD_TEMPERATURE",
            expected: "a number between 0.0 and 2.0",
            value: value.to_string(),
        })
}

fn parse_positive<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialOrd,
{
    value
        .trim()
        .parse::<T>()
        .ok()
        .filter(|n| *n > T::default())
        .ok_or_else(|| ConfigError::Invalid {
            var,
            expected: "a positive integer",
            value: value.to_string(),
        })
}
