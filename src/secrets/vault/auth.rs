//! Session token acquisition.
//!
//! Resolution order for the login payload:
//!
//! 1. role + secret: approle `{role_id, secret_id}`
//! 2. role + jwt: `{role, jwt}`
//! 3. explicit auth data: sent as given
//! 4. kubernetes: `{role, jwt}` with the mounted service account token
//!
//! The method name and login path are derived independently, see
//! [`resolve_method`] and [`login_path`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use super::client::VaultHttpClient;
use super::config::{AuthConfig, VAULT_AUTH_DATA_ENV, VAULT_AUTH_PATH_ENV};
use crate::secrets::{Result, SecretString, SecretsError, REDACTED};

/// Payload fields that never appear in logs.
pub const SENSITIVE_FIELDS: &[&str] =
    &["jwt", "secret_id", "role_id", "password", "identity", "signature", "pkcs7", "token"];

/// Copy of `payload` with every [`SENSITIVE_FIELDS`] value replaced by the redaction marker.
pub fn redact(payload: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    payload
        .iter()
        .map(|(k, v)| {
            if SENSITIVE_FIELDS.contains(&k.as_str()) {
                (k.clone(), REDACTED.to_string())
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}

/// Opaque login payload. Debug and Display only ever show the redacted form.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthData(BTreeMap<String, String>);

impl AuthData {
    pub fn new(data: BTreeMap<String, String>) -> Self {
        Self(data)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The real values. Never log the result.
    pub fn expose(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn redacted(&self) -> BTreeMap<String, String> {
        redact(&self.0)
    }
}

impl FromStr for AuthData {
    type Err = SecretsError;

    /// Parses a JSON object of string values.
    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str::<BTreeMap<String, String>>(s).map(Self::new).map_err(|e| {
            SecretsError::config_error(format!("failed to parse {}: {}", VAULT_AUTH_DATA_ENV, e))
        })
    }
}

impl fmt::Debug for AuthData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthData").field(&self.redacted()).finish()
    }
}

impl fmt::Display for AuthData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.redacted()) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.redacted()),
        }
    }
}

/// Auth method name: explicit, else derived from the credentials present.
pub fn resolve_method(auth: &AuthConfig) -> String {
    if let Some(method) = auth.method.as_deref().filter(|m| !m.trim().is_empty()) {
        return method.trim().to_string();
    }
    if auth.secret.is_some() {
        "approle".to_string()
    } else if auth.jwt.is_some() {
        "jwt".to_string()
    } else {
        "kubernetes".to_string()
    }
}

/// Returns `(method, login path)`.
///
/// An explicit path is prefixed with `auth/` when missing and gets a trailing
/// `login` segment when it names only the mount; its first segment after `auth`
/// then becomes the method name. A path with empty segments or without a mount
/// is a configuration error.
pub fn login_path(auth: &AuthConfig) -> Result<(String, String)> {
    let method = resolve_method(auth);

    let Some(path) = auth.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
        let path = format!("auth/{}/login", method);
        return Ok((method, path));
    };

    let mut parts: Vec<&str> = path.trim_matches('/').split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(invalid_auth_path(path, "empty path segment"));
    }
    if parts.first() != Some(&"auth") {
        parts.insert(0, "auth");
    }
    if parts.len() == 2 {
        parts.push("login");
    }

    let method = parts
        .get(1)
        .map(|m| m.to_string())
        .ok_or_else(|| invalid_auth_path(path, "expected auth/<mount>[/login]"))?;
    Ok((method, parts.join("/")))
}

fn invalid_auth_path(path: &str, reason: &str) -> SecretsError {
    SecretsError::config_error(format!("Invalid {} '{}': {}", VAULT_AUTH_PATH_ENV, path, reason))
}

/// Build the login payload from the configured credentials.
pub async fn login_payload(auth: &AuthConfig) -> Result<AuthData> {
    let mut data = AuthData::default();

    match (&auth.role, &auth.secret, &auth.jwt, &auth.data) {
        (Some(role), Some(secret), _, _) => {
            data.insert("role_id", role.expose_secret());
            data.insert("secret_id", secret.expose_secret());
        }
        (Some(role), None, Some(jwt), _) => {
            data.insert("role", role.expose_secret());
            data.insert("jwt", jwt.expose_secret());
        }
        (_, _, _, Some(explicit)) => data = explicit.clone(),
        _ => match tokio::fs::read_to_string(&auth.k8s_token_path).await {
            Ok(token) if !token.trim().is_empty() => {
                data.insert("role", auth.role.as_ref().map(|r| r.expose_secret()).unwrap_or(""));
                data.insert("jwt", token.trim());
            }
            result => match (&auth.role, auth.best_effort) {
                (Some(role), true) => {
                    debug!("No service account token, using approle without secret_id");
                    data.insert("role_id", role.expose_secret());
                }
                _ => {
                    let reason = match result {
                        Err(e) => e.to_string(),
                        Ok(_) => "file is empty".to_string(),
                    };
                    return Err(SecretsError::authentication_failed(format!(
                        "failed to read kubernetes service account token {}: {}",
                        auth.k8s_token_path.display(),
                        reason
                    )));
                }
            },
        },
    }

    Ok(data)
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    #[serde(default)]
    client_token: Option<SecretString>,
}

/// Log in and return the session token.
pub async fn login(client: &VaultHttpClient, auth: &AuthConfig) -> Result<SecretString> {
    let (method, path) = login_path(auth)?;
    let payload = login_payload(auth).await?;

    debug!(method = %method, path = %path, data = %payload, "Requesting session token");

    let body = client.write(None, &path, payload.expose()).await.map_err(|e| match e {
        SecretsError::Http { status, body, .. } if status == 400 || status == 403 => {
            SecretsError::authentication_failed(format!("{} rejected login ({}): {}", path, status, body))
        }
        other => other,
    })?;

    let response: LoginResponse = serde_json::from_value(body)
        .map_err(|e| SecretsError::unexpected_response(&path, e.to_string()))?;

    match response.auth.and_then(|a| a.client_token) {
        Some(token) if !token.is_blank() => {
            debug!(method = %method, "Obtained session token");
            Ok(token)
        }
        _ => Err(SecretsError::empty_response(path)),
    }
}
