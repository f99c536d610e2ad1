//! Cloud credential minting through the trust broker.
//!
//! AWS STS credentials are written into a profile section of the shared
//! credentials file; GCP service account keys are written to a key file and
//! GCP access tokens go straight into the store.

use std::collections::BTreeMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ini::Ini;
use serde_json::{Map, Value};
use tracing::debug;

use super::client::VaultHttpClient;
use super::config::{
    AwsConfig, GcpConfig, GcpCredType, AWS_ACCESS_KEY_ID_ENV, AWS_SECRET_ACCESS_KEY_ENV,
    AWS_SESSION_TOKEN_ENV, AWS_SHARED_CREDENTIALS_FILE_ENV, GOOGLE_APPLICATION_CREDENTIALS_ENV,
    GOOGLE_OAUTH_ACCESS_TOKEN_ENV,
};
use crate::secrets::{Result, SecretString, SecretsError};
use crate::utils::write_private_file;

/// Short-lived AWS credentials.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: SecretString,
    pub secret_access_key: SecretString,
    pub session_token: SecretString,
}

impl AwsCredentials {
    /// Store entries for these credentials plus the file they were written to.
    pub fn to_env(&self, credentials_file: &Path) -> BTreeMap<String, String> {
        BTreeMap::from([
            (AWS_ACCESS_KEY_ID_ENV.to_string(), self.access_key_id.expose_secret().to_string()),
            (
                AWS_SECRET_ACCESS_KEY_ENV.to_string(),
                self.secret_access_key.expose_secret().to_string(),
            ),
            (AWS_SESSION_TOKEN_ENV.to_string(), self.session_token.expose_secret().to_string()),
            (
                AWS_SHARED_CREDENTIALS_FILE_ENV.to_string(),
                credentials_file.display().to_string(),
            ),
        ])
    }
}

fn string_field(data: &Map<String, Value>, field: &str) -> String {
    data.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Read STS credentials for the configured role.
pub async fn fetch_aws(
    client: &VaultHttpClient,
    token: &SecretString,
    config: &AwsConfig,
) -> Result<AwsCredentials> {
    let path = config.request_path();
    debug!(path = %path, "Requesting aws credentials");

    let data = client.read(token, &path, &[]).await?.ok_or_else(|| SecretsError::empty_response(&path))?;

    let creds = AwsCredentials {
        access_key_id: SecretString::new(string_field(&data, "access_key")),
        secret_access_key: SecretString::new(string_field(&data, "secret_key")),
        session_token: SecretString::new(string_field(&data, "security_token")),
    };
    if creds.access_key_id.is_blank() || creds.secret_access_key.is_blank() {
        return Err(SecretsError::empty_response(path));
    }
    Ok(creds)
}

/// Merge `creds` into the `profile` section of the INI file at `file`.
///
/// Other sections and unrelated keys are preserved. A stale session token is
/// removed when the new credentials carry none.
pub async fn write_aws_shared_file(file: &Path, profile: &str, creds: &AwsCredentials) -> Result<()> {
    let mut content = if file.exists() {
        Ini::load_from_file(file).map_err(|e| {
            SecretsError::decode(format!("aws shared credentials file {}", file.display()), e.to_string())
        })?
    } else {
        Ini::new()
    };

    content
        .with_section(Some(profile))
        .set(AWS_ACCESS_KEY_ID_ENV.to_lowercase(), creds.access_key_id.expose_secret())
        .set(AWS_SECRET_ACCESS_KEY_ENV.to_lowercase(), creds.secret_access_key.expose_secret());

    let session_key = AWS_SESSION_TOKEN_ENV.to_lowercase();
    if creds.session_token.is_blank() {
        content.delete_from(Some(profile), &session_key);
    } else {
        content.with_section(Some(profile)).set(session_key, creds.session_token.expose_secret());
    }

    let mut buf = Vec::new();
    content.write_to(&mut buf)?;
    write_private_file(file, &buf).await?;
    debug!(path = %file.display(), profile = %profile, "Wrote aws shared credentials file");
    Ok(())
}

/// Credential handed out by the GCP secrets engine.
#[derive(Debug)]
pub enum GcpCredential {
    Token(SecretString),
    /// Decoded service account key file contents.
    Key(Vec<u8>),
}

/// Read a GCP token or key for the configured roleset.
pub async fn fetch_gcp(
    client: &VaultHttpClient,
    token: &SecretString,
    config: &GcpConfig,
) -> Result<GcpCredential> {
    let path = config.request_path();
    debug!(path = %path, cred_type = %config.cred_type, "Requesting gcp credentials");

    let data = client.read(token, &path, &[]).await?.ok_or_else(|| SecretsError::empty_response(&path))?;

    match config.cred_type {
        GcpCredType::Token => {
            let value = SecretString::new(string_field(&data, "token"));
            if value.is_blank() {
                return Err(SecretsError::empty_response(path));
            }
            Ok(GcpCredential::Token(value))
        }
        GcpCredType::Key => {
            let encoded = string_field(&data, "private_key_data");
            let key = STANDARD
                .decode(encoded.trim())
                .map_err(|e| SecretsError::decode("gcp private_key_data", e.to_string()))?;
            if key.is_empty() {
                return Err(SecretsError::empty_response(path));
            }
            Ok(GcpCredential::Key(key))
        }
    }
}

/// Apply a GCP credential, returning the store entries it produced.
pub async fn apply_gcp(config: &GcpConfig, credential: GcpCredential) -> Result<BTreeMap<String, String>> {
    match credential {
        GcpCredential::Token(token) => Ok(BTreeMap::from([(
            GOOGLE_OAUTH_ACCESS_TOKEN_ENV.to_string(),
            token.expose_secret().to_string(),
        )])),
        GcpCredential::Key(key) => {
            write_private_file(&config.credentials_file, &key).await?;
            debug!(path = %config.credentials_file.display(), "Wrote gcp credentials file");
            Ok(BTreeMap::from([(
                GOOGLE_APPLICATION_CREDENTIALS_ENV.to_string(),
                config.credentials_file.display().to_string(),
            )]))
        }
    }
}
