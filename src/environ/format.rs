//! Output encodings for the normalised KeyStore view.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result};

/// Characters that force escaping inside a double-quoted dotenv value.
const DOTENV_SPECIAL: &[char] = &['\\', '\n', '\r', '"', '!', '$', '`'];

/// Serialization format selected for [`Environ::write_to`](super::Environ::write_to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Toml,
    Dotenv,
}

impl OutputFormat {
    /// Every accepted name, sorted.
    pub fn names() -> &'static [&'static str] {
        &["dotenv", "env", "json", "toml", "yaml", "yml"]
    }

    /// Parse `name`, falling back to JSON for anything unrecognised.
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(format = %name, "Unknown output format, using json");
            Self::Json
        })
    }

    /// Canonical name of this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Dotenv => "dotenv",
        }
    }

    /// Encode a normalised key/value view.
    pub fn encode(&self, map: &BTreeMap<String, String>) -> Result<Vec<u8>> {
        let encoded = match self {
            Self::Json => serde_json::to_vec(map).map_err(|e| self.error(e))?,
            Self::Yaml => serde_yaml::to_string(map).map_err(|e| self.error(e))?.into_bytes(),
            Self::Toml => toml::to_string(map).map_err(|e| self.error(e))?.into_bytes(),
            Self::Dotenv => encode_dotenv(map).into_bytes(),
        };
        Ok(encoded)
    }

    fn error(&self, err: impl fmt::Display) -> Error {
        Error::serialization(self.as_str(), err.to_string())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "env" | "dotenv" => Ok(Self::Dotenv),
            other => Err(Error::config(format!(
                "unknown output format '{}', expected one of {}",
                other,
                Self::names().join(", ")
            ))),
        }
    }
}

/// One `KEY="value"` line per entry. Integer values are written bare.
fn encode_dotenv(map: &BTreeMap<String, String>) -> String {
    if map.is_empty() {
        return String::new();
    }
    let mut lines = Vec::with_capacity(map.len());
    for (key, value) in map {
        if !value.is_empty() && value.parse::<i64>().is_ok() {
            lines.push(format!("{}={}", key, value));
        } else {
            lines.push(format!("{}=\"{}\"", key, escape_dotenv(value)));
        }
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn escape_dotenv(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if DOTENV_SPECIAL.contains(&c) {
            match c {
                '\n' => escaped.push_str("\\n"),
                '\r' => escaped.push_str("\\r"),
                other => {
                    escaped.push('\\');
                    escaped.push(other);
                }
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}
