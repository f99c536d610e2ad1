//! # Configuration Management
//!
//! Runtime configuration for the entrypoints, read from `VEST_*` environment
//! variables. Provider configuration lives next to each provider
//! (see [`VaultConfig`](crate::secrets::VaultConfig)).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::environ::OutputFormat;
use crate::errors::{Error, Result};

/// Comma-separated provider names.
pub const PROVIDERS_ENV: &str = "VEST_PROVIDERS";
/// Optional output file written by `vest` before exec.
pub const OUTPUT_FILE_ENV: &str = "VEST_OUTPUT_FILE";
/// Output file encoding.
pub const OUTPUT_FORMAT_ENV: &str = "VEST_OUTPUT_FORMAT";
/// Uppercase keys in read views.
pub const UPCASE_KEYS_ENV: &str = "VEST_UPCASE_KEYS";
/// Log level used when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "VEST_LOG_LEVEL";
/// `text` or `json`.
pub const LOG_FORMAT_ENV: &str = "VEST_LOG_FORMAT";

/// Log output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" | "compact" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Error::config(format!("Invalid log format: {}", other))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Entrypoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub providers: Vec<String>,
    pub output_file: Option<PathBuf>,
    pub output_format: OutputFormat,
    pub upcase_keys: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            providers: vec!["vault".to_string()],
            output_file: None,
            output_format: OutputFormat::Json,
            upcase_keys: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let providers = get(PROVIDERS_ENV).map(|v| split_list(&v, ',')).unwrap_or(defaults.providers);

        let upcase_keys = match get(UPCASE_KEYS_ENV) {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                Error::config(format!("Invalid {}: {}", UPCASE_KEYS_ENV, v))
            })?,
            None => defaults.upcase_keys,
        };

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(v) => v.parse()?,
            None => defaults.log_format,
        };

        Ok(Self {
            providers,
            output_file: get(OUTPUT_FILE_ENV).map(PathBuf::from),
            output_format: get(OUTPUT_FORMAT_ENV)
                .map(|v| OutputFormat::from_name_or_default(&v))
                .unwrap_or(defaults.output_format),
            upcase_keys,
            log_level: get(LOG_LEVEL_ENV).unwrap_or(defaults.log_level),
            log_format,
        })
    }
}

/// Split `value` on `sep`, trimming entries and dropping blanks.
pub fn split_list(value: &str, sep: char) -> Vec<String> {
    value.split(sep).map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

/// Parse the usual spellings of a boolean flag.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.providers, vec!["vault"]);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (PROVIDERS_ENV, "vault, dotenv,,"),
            (OUTPUT_FILE_ENV, "/tmp/secrets.env"),
            (OUTPUT_FORMAT_ENV, "dotenv"),
            (UPCASE_KEYS_ENV, "false"),
            (LOG_LEVEL_ENV, "debug"),
            (LOG_FORMAT_ENV, "json"),
        ]))
        .unwrap();

        assert_eq!(config.providers, vec!["vault", "dotenv"]);
        assert_eq!(config.output_file, Some(PathBuf::from("/tmp/secrets.env")));
        assert_eq!(config.output_format, OutputFormat::Dotenv);
        assert!(!config.upcase_keys);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_output_format_falls_back_to_json() {
        let config = RuntimeConfig::from_lookup(lookup(&[(OUTPUT_FORMAT_ENV, "xml")])).unwrap();
        assert_eq!(config.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_invalid_values() {
        assert!(RuntimeConfig::from_lookup(lookup(&[(UPCASE_KEYS_ENV, "maybe")])).is_err());
        assert!(RuntimeConfig::from_lookup(lookup(&[(LOG_FORMAT_ENV, "xml")])).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("sure"), None);
    }
}
