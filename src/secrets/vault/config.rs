//! Trust broker provider configuration.
//!
//! Everything is read from environment variables. [`VaultConfig::from_lookup`]
//! takes the lookup as a closure so tests never touch the process environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::auth::AuthData;
use super::kv::{parse_keys, KvKey};
use crate::config::parse_bool;
use crate::secrets::{Result, SecretString, SecretsError};

pub const VAULT_ADDR_ENV: &str = "VAULT_ADDR";
pub const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";
pub const VAULT_NAMESPACE_ENV: &str = "VAULT_NAMESPACE";
pub const VAULT_CLIENT_TIMEOUT_ENV: &str = "VAULT_CLIENT_TIMEOUT";
pub const VAULT_KV_KEYS_ENV: &str = "VAULT_KV_KEYS";
pub const VAULT_AUTH_METHOD_ENV: &str = "VAULT_AUTH_METHOD";
pub const VAULT_AUTH_PATH_ENV: &str = "VAULT_AUTH_PATH";
pub const VAULT_AUTH_DATA_ENV: &str = "VAULT_AUTH_DATA";
pub const VAULT_APP_ROLE_ENV: &str = "VAULT_APP_ROLE";
pub const VAULT_APP_SECRET_ENV: &str = "VAULT_APP_SECRET";
pub const VAULT_APP_JWT_ENV: &str = "VAULT_APP_JWT";
pub const VAULT_AUTH_BEST_EFFORT_ENV: &str = "VAULT_AUTH_BEST_EFFORT";
pub const VAULT_K8S_TOKEN_PATH_ENV: &str = "VAULT_K8S_TOKEN_PATH";
pub const VAULT_AWS_ROLE_ENV: &str = "VAULT_AWS_ROLE";
pub const VAULT_IAM_ROLE_ENV: &str = "VAULT_IAM_ROLE";
pub const VAULT_AWS_PATH_ENV: &str = "VAULT_AWS_PATH";
pub const VAULT_GCP_ROLE_ENV: &str = "VAULT_GCP_ROLE";
pub const VAULT_GCP_PATH_ENV: &str = "VAULT_GCP_PATH";
pub const VAULT_GCP_CRED_TYPE_ENV: &str = "VAULT_GCP_CRED_TYPE";

pub const AWS_ACCESS_KEY_ID_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";
pub const AWS_SHARED_CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";
pub const AWS_PROFILE_ENV: &str = "AWS_PROFILE";
pub const GOOGLE_APPLICATION_CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const GOOGLE_OAUTH_ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Variables carrying credential material. They are purged from the store
/// before any contribution is merged.
pub const SENSITIVE_ENV_VARS: &[&str] = &[
    VAULT_TOKEN_ENV,
    VAULT_APP_ROLE_ENV,
    VAULT_APP_SECRET_ENV,
    VAULT_APP_JWT_ENV,
    VAULT_AUTH_DATA_ENV,
];

pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8200";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_K8S_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const DEFAULT_AWS_PATH: &str = "aws";
pub const DEFAULT_AWS_CREDENTIALS_FILE: &str = "/var/aws/credentials";
pub const DEFAULT_AWS_PROFILE: &str = "default";
pub const DEFAULT_GCP_PATH: &str = "gcp";
pub const DEFAULT_GCP_CREDENTIALS_FILE: &str = "/var/gcp/credentials.json";

/// Authentication inputs. Resolution happens in [`super::auth`].
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub method: Option<String>,
    pub path: Option<String>,
    pub data: Option<AuthData>,
    pub role: Option<SecretString>,
    pub secret: Option<SecretString>,
    pub jwt: Option<SecretString>,
    /// Allow a `role_id`-only approle login when nothing else is available.
    pub best_effort: bool,
    pub k8s_token_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            method: None,
            path: None,
            data: None,
            role: None,
            secret: None,
            jwt: None,
            best_effort: false,
            k8s_token_path: PathBuf::from(DEFAULT_K8S_TOKEN_PATH),
        }
    }
}

/// AWS STS credential minting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    pub role: String,
    pub mount: String,
    pub credentials_file: PathBuf,
    pub profile: String,
}

impl AwsConfig {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            mount: DEFAULT_AWS_PATH.to_string(),
            credentials_file: PathBuf::from(DEFAULT_AWS_CREDENTIALS_FILE),
            profile: DEFAULT_AWS_PROFILE.to_string(),
        }
    }

    /// `<mount>/sts/<role>`
    pub fn request_path(&self) -> String {
        format!("{}/sts/{}", self.mount.trim().trim_matches('/'), self.role.trim())
    }
}

/// What the GCP secrets engine should hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcpCredType {
    /// Service account key, written to a file.
    #[default]
    Key,
    /// OAuth2 access token, placed in the store.
    Token,
}

impl GcpCredType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Token => "token",
        }
    }
}

impl fmt::Display for GcpCredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GcpCredType {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "key" => Ok(Self::Key),
            "token" => Ok(Self::Token),
            other => Err(SecretsError::config_error(format!(
                "{} must be 'key' or 'token', got '{}'",
                VAULT_GCP_CRED_TYPE_ENV, other
            ))),
        }
    }
}

/// GCP credential minting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpConfig {
    pub role: String,
    pub mount: String,
    pub cred_type: GcpCredType,
    pub credentials_file: PathBuf,
}

impl GcpConfig {
    pub fn new(role: impl Into<String>, cred_type: GcpCredType) -> Self {
        Self {
            role: role.into(),
            mount: DEFAULT_GCP_PATH.to_string(),
            cred_type,
            credentials_file: PathBuf::from(DEFAULT_GCP_CREDENTIALS_FILE),
        }
    }

    /// `<mount>/<type>/<role>`
    pub fn request_path(&self) -> String {
        format!("{}/{}/{}", self.mount.trim().trim_matches('/'), self.cred_type, self.role.trim())
    }
}

/// Complete trust broker provider configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub address: String,
    /// Static session token. When present no login is attempted.
    pub token: Option<SecretString>,
    pub namespace: Option<String>,
    pub timeout: Duration,
    pub keys: Vec<KvKey>,
    pub auth: AuthConfig,
    pub aws: Option<AwsConfig>,
    pub gcp: Option<GcpConfig>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            token: None,
            namespace: None,
            timeout: DEFAULT_TIMEOUT,
            keys: Vec::new(),
            auth: AuthConfig::default(),
            aws: None,
            gcp: None,
        }
    }
}

impl VaultConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secret = |key: &str| get(key).map(SecretString::new);

        let timeout = match get(VAULT_CLIENT_TIMEOUT_ENV) {
            Some(v) => parse_timeout(&v)?,
            None => DEFAULT_TIMEOUT,
        };

        let keys = match get(VAULT_KV_KEYS_ENV) {
            Some(v) => parse_keys(&v)?,
            None => Vec::new(),
        };

        let data = match get(VAULT_AUTH_DATA_ENV) {
            Some(v) => Some(v.parse::<AuthData>()?),
            None => None,
        };

        let best_effort = match get(VAULT_AUTH_BEST_EFFORT_ENV) {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                SecretsError::config_error(format!("Invalid {}: {}", VAULT_AUTH_BEST_EFFORT_ENV, v))
            })?,
            None => false,
        };

        let auth = AuthConfig {
            method: get(VAULT_AUTH_METHOD_ENV),
            path: get(VAULT_AUTH_PATH_ENV),
            data,
            role: secret(VAULT_APP_ROLE_ENV),
            secret: secret(VAULT_APP_SECRET_ENV),
            jwt: secret(VAULT_APP_JWT_ENV),
            best_effort,
            k8s_token_path: get(VAULT_K8S_TOKEN_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_K8S_TOKEN_PATH)),
        };

        let aws = get(VAULT_AWS_ROLE_ENV).or_else(|| get(VAULT_IAM_ROLE_ENV)).map(|role| AwsConfig {
            role,
            mount: get(VAULT_AWS_PATH_ENV).unwrap_or_else(|| DEFAULT_AWS_PATH.to_string()),
            credentials_file: get(AWS_SHARED_CREDENTIALS_FILE_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_AWS_CREDENTIALS_FILE)),
            profile: get(AWS_PROFILE_ENV).unwrap_or_else(|| DEFAULT_AWS_PROFILE.to_string()),
        });

        let gcp = match get(VAULT_GCP_ROLE_ENV) {
            Some(role) => Some(GcpConfig {
                role,
                mount: get(VAULT_GCP_PATH_ENV).unwrap_or_else(|| DEFAULT_GCP_PATH.to_string()),
                cred_type: match get(VAULT_GCP_CRED_TYPE_ENV) {
                    Some(v) => v.parse()?,
                    None => GcpCredType::Key,
                },
                credentials_file: get(GOOGLE_APPLICATION_CREDENTIALS_ENV)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_GCP_CREDENTIALS_FILE)),
            }),
            None => None,
        };

        Ok(Self {
            address: get(VAULT_ADDR_ENV).unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            token: secret(VAULT_TOKEN_ENV),
            namespace: get(VAULT_NAMESPACE_ENV),
            timeout,
            keys,
            auth,
            aws,
            gcp,
        })
    }

    /// Check that a session token can be obtained without contacting the broker.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(SecretsError::config_error(format!("{} is empty", VAULT_ADDR_ENV)));
        }
        if self.token.is_some() {
            return Ok(());
        }

        let auth = &self.auth;
        super::auth::login_path(auth)?;

        let has_role = auth.role.is_some();
        let has_credential = (has_role && (auth.secret.is_some() || auth.jwt.is_some()))
            || auth.data.is_some()
            || auth.k8s_token_path.is_file()
            || (auth.best_effort && has_role);

        if !has_credential {
            return Err(SecretsError::config_error(format!(
                "no usable credential: set {} or {}/{} or {}/{} or {}, mount a service account token at {}, or set {}=true with {}",
                VAULT_TOKEN_ENV,
                VAULT_APP_ROLE_ENV,
                VAULT_APP_SECRET_ENV,
                VAULT_APP_ROLE_ENV,
                VAULT_APP_JWT_ENV,
                VAULT_AUTH_DATA_ENV,
                auth.k8s_token_path.display(),
                VAULT_AUTH_BEST_EFFORT_ENV,
                VAULT_APP_ROLE_ENV
            )));
        }
        Ok(())
    }
}

/// Seconds, optionally with an `s` suffix.
fn parse_timeout(value: &str) -> Result<Duration> {
    let secs = value.strip_suffix('s').unwrap_or(value);
    secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
        SecretsError::config_error(format!("Invalid {}: {} ({})", VAULT_CLIENT_TIMEOUT_ENV, value, e))
    })
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
    fn test_defaults() {
        let config = VaultConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert!(config.keys.is_empty());
        assert!(config.token.is_none());
        assert!(config.aws.is_none());
        assert!(config.gcp.is_none());
        assert_eq!(config.auth.k8s_token_path, PathBuf::from(DEFAULT_K8S_TOKEN_PATH));
    }

    #[test]
    fn test_full_config() {
        let config = VaultConfig::from_lookup(lookup(&[
            (VAULT_ADDR_ENV, "https://vault.internal:8200"),
            (VAULT_TOKEN_ENV, "s.static"),
            (VAULT_NAMESPACE_ENV, "team-a"),
            (VAULT_CLIENT_TIMEOUT_ENV, "10s"),
            (VAULT_KV_KEYS_ENV, "secret/app@2:/secret/shared"),
            (VAULT_IAM_ROLE_ENV, "deploy"),
            (AWS_PROFILE_ENV, "ci"),
            (VAULT_GCP_ROLE_ENV, "reader"),
            (VAULT_GCP_CRED_TYPE_ENV, "token"),
        ]))
        .unwrap();

        assert_eq!(config.token.as_ref().map(|t| t.expose_secret()), Some("s.static"));
        assert_eq!(config.namespace.as_deref(), Some("team-a"));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.keys.len(), 2);
        assert_eq!(config.keys[0].version, Some(2));
        assert_eq!(config.keys[1].path, "secret/shared");

        let aws = config.aws.unwrap();
        assert_eq!(aws.role, "deploy");
        assert_eq!(aws.profile, "ci");
        assert_eq!(aws.request_path(), "aws/sts/deploy");

        let gcp = config.gcp.unwrap();
        assert_eq!(gcp.cred_type, GcpCredType::Token);
        assert_eq!(gcp.request_path(), "gcp/token/reader");
    }

    #[test]
    fn test_aws_role_wins_over_iam_role() {
        let config = VaultConfig::from_lookup(lookup(&[
            (VAULT_AWS_ROLE_ENV, "primary"),
            (VAULT_IAM_ROLE_ENV, "legacy"),
            (VAULT_AWS_PATH_ENV, "/cloud/aws/"),
        ]))
        .unwrap();
        assert_eq!(config.aws.unwrap().request_path(), "cloud/aws/sts/primary");
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        for vars in [
            vec![(VAULT_GCP_ROLE_ENV, "r"), (VAULT_GCP_CRED_TYPE_ENV, "access_token")],
            vec![(VAULT_KV_KEYS_ENV, "secret/app@latest")],
            vec![(VAULT_AUTH_DATA_ENV, "{not json")],
            vec![(VAULT_CLIENT_TIMEOUT_ENV, "soon")],
            vec![(VAULT_AUTH_BEST_EFFORT_ENV, "perhaps")],
        ] {
            let err = VaultConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(err.is_configuration(), "{:?} should be a configuration error", vars);
        }
    }

    #[test]
    fn test_validate_credentials() {
        let mut config = VaultConfig::default();
        config.auth.k8s_token_path = PathBuf::from("/nonexistent/token");
        assert!(config.validate().unwrap_err().is_configuration());

        config.auth.role = Some(SecretString::new("role"));
        assert!(config.validate().is_err());

        config.auth.best_effort = true;
        assert!(config.validate().is_ok());

        config.auth.best_effort = false;
        config.auth.secret = Some(SecretString::new("secret"));
        assert!(config.validate().is_ok());

        let config = VaultConfig { token: Some(SecretString::new("t")), ..VaultConfig::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_auth_path() {
        let config = VaultConfig::from_lookup(lookup(&[
            (VAULT_APP_ROLE_ENV, "role"),
            (VAULT_APP_SECRET_ENV, "secret"),
            (VAULT_AUTH_PATH_ENV, "auth/"),
        ]))
        .unwrap();
        assert!(config.validate().unwrap_err().is_configuration());
    }
}
