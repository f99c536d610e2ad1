//! Key material resolution with the versioned to legacy KV fallback.
//!
//! A configured key such as `secret/app/db` is first read at the versioned
//! path `secret/data/app/db`. When that read fails or returns nothing, the
//! second segment is dropped again and the legacy path `secret/app/db` is read
//! once.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use tracing::debug;

use super::client::VaultHttpClient;
use super::config::VAULT_KV_KEYS_ENV;
use crate::secrets::{Result, SecretString, SecretsError};

/// Separates entries in the key list.
pub const KEYS_SEPARATOR: char = ':';
/// Separates a path from its version.
pub const VERSION_SEPARATOR: char = '@';

/// One `path[@version]` entry of the key list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvKey {
    pub path: String,
    /// `None` reads the latest version.
    pub version: Option<u64>,
}

impl KvKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), version: None }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }
}

impl FromStr for KvKey {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self> {
        let (path, version) = match s.split_once(VERSION_SEPARATOR) {
            Some((path, version)) => {
                let version = version.trim().parse::<u64>().map_err(|e| {
                    SecretsError::config_error(format!(
                        "Invalid version in {} entry '{}': {}",
                        VAULT_KV_KEYS_ENV, s, e
                    ))
                })?;
                (path, Some(version))
            }
            None => (s, None),
        };

        Ok(Self { path: path.trim().trim_start_matches('/').to_string(), version })
    }
}

impl fmt::Display for KvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}{}{}", self.path, VERSION_SEPARATOR, v),
            None => f.write_str(&self.path),
        }
    }
}

/// Parse a colon-separated key list. Blank entries are skipped.
pub fn parse_keys(list: &str) -> Result<Vec<KvKey>> {
    list.split(KEYS_SEPARATOR).filter(|k| !k.trim().is_empty()).map(str::parse).collect()
}

/// Request paths for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPaths {
    pub versioned: String,
    pub legacy: String,
}

/// Normalise `path` into its versioned and legacy request paths.
///
/// Empty segments are dropped. `data` is inserted as the second segment unless
/// already there; the legacy path is the versioned one without that segment.
/// Paths with fewer than two segments are rejected.
pub fn kv_paths(path: &str) -> Result<KvPaths> {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return Err(SecretsError::invalid_key(path, "expected at least <mount>/<path>"));
    }

    if segments[1] != "data" {
        segments.insert(1, "data");
    }
    let versioned = segments.join("/");

    segments.remove(1);
    let legacy = segments.join("/");

    Ok(KvPaths { versioned, legacy })
}

/// Turn a read response into secret pairs.
///
/// A payload with both `metadata` and `data` is the versioned envelope and
/// `data` is unwrapped; anything else is taken as the secret map itself. Only
/// string values are kept.
pub fn extract_secrets(path: &str, mut payload: Map<String, Value>) -> Result<BTreeMap<String, String>> {
    let secrets = if payload.contains_key("metadata") && payload.contains_key("data") {
        match payload.remove("data") {
            Some(Value::Object(inner)) => inner,
            Some(Value::Null) => Map::new(),
            _ => return Err(SecretsError::unexpected_response(path, "data is not an object")),
        }
    } else {
        payload
    };

    Ok(secrets
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect())
}

/// Resolve one key, falling back to the legacy read at most once.
pub async fn read_key(
    client: &VaultHttpClient,
    token: &SecretString,
    key: &KvKey,
) -> Result<BTreeMap<String, String>> {
    let paths = kv_paths(&key.path)?;
    let query: Vec<(&str, String)> =
        key.version.map(|v| vec![("version", v.to_string())]).unwrap_or_default();

    debug!(path = %paths.versioned, version = ?key.version, "Fetching versioned secret");
    let fallback_reason = match client.read(token, &paths.versioned, &query).await {
        Ok(Some(payload)) => return extract_secrets(&paths.versioned, payload),
        Ok(None) => "no data".to_string(),
        Err(e) => e.to_string(),
    };

    debug!(
        path = %paths.versioned,
        legacy_path = %paths.legacy,
        reason = %fallback_reason,
        "Versioned read failed, trying legacy path"
    );
    match client.read(token, &paths.legacy, &[]).await? {
        Some(payload) => extract_secrets(&paths.legacy, payload),
        None => Err(SecretsError::not_found(paths.legacy)),
    }
}
