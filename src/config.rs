//! Runtime configuration from environment variables

use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_TIMEOUT};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_DB_PATH: &str = "chat_history.db";
pub const DEFAULT_LOG_PATH: &str = "log.txt";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub base_url: String,
    pub model: String,
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables
    /// fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let timeout = match var("OLLAMA_CHAT_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("OLLAMA_CHAT_TIMEOUT_SECS", &v)?),
            None => defaults.timeout,
        };
        let max_tokens = match var("OLLAMA_CHAT_MAX_TOKENS") {
            Some(v) => parse_number("OLLAMA_CHAT_MAX_TOKENS", &v)?,
            None => defaults.max_tokens,
        };

        Ok(Self {
            base_url: var("OLLAMA_HOST").map_or(defaults.base_url, |h| normalize_host(&h)),
            model: var("OLLAMA_CHAT_MODEL").unwrap_or(defaults.model),
            db_path: var("OLLAMA_CHAT_DB_PATH").map_or(defaults.db_path, PathBuf::from),
            log_path: var("OLLAMA_CHAT_LOG_PATH").map_or(defaults.log_path, PathBuf::from),
            timeout,
            max_tokens,
        })
    }
}

/// `OLLAMA_HOST` is commonly set as a bare `host:port`
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

fn parse_number<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
