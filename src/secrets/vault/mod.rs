//! Trust broker provider.
//!
//! Logs in to a HashiCorp Vault compatible broker once, then resolves every
//! configured KV key and the optional AWS and GCP credentials concurrently.
//! Each lookup fails on its own: a missing key or a failed credential mint is
//! logged and dropped without affecting the rest.
//!
//! # Configuration
//!
//! See [`VaultConfig::from_lookup`] for the environment variables read. The
//! credential variables (`VAULT_TOKEN`, `VAULT_APP_ROLE`, `VAULT_APP_SECRET`,
//! `VAULT_APP_JWT`, `VAULT_AUTH_DATA`) are deleted from the store before
//! anything is merged.

pub mod auth;
pub mod client;
pub mod cloud;
pub mod config;
pub mod kv;

pub use auth::{redact, AuthData};
pub use client::VaultHttpClient;
pub use config::{AuthConfig, AwsConfig, GcpConfig, GcpCredType, VaultConfig, SENSITIVE_ENV_VARS};
pub use kv::{kv_paths, KvKey, KvPaths};

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::environ::{Environ, Provider};
use crate::secrets::{Result, SecretString};

/// The `vault` provider.
#[derive(Debug)]
pub struct VaultProvider {
    config: VaultConfig,
    client: VaultHttpClient,
    token: OnceCell<SecretString>,
}

impl VaultProvider {
    /// Registry name.
    pub const NAME: &'static str = "vault";

    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::new(VaultConfig::from_env()?)
    }

    /// Build from an explicit configuration. No network calls are made.
    pub fn new(config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let client = VaultHttpClient::new(&config.address, config.namespace.clone(), config.timeout)?;
        debug!(address = %client.address(), keys = config.keys.len(), "Created vault provider");
        Ok(Self { config, client, token: OnceCell::new() })
    }

    /// Session token, logging in on first use.
    async fn session_token(&self) -> Result<&SecretString> {
        self.token
            .get_or_try_init(|| async {
                match &self.config.token {
                    Some(token) => Ok(token.clone()),
                    None => auth::login(&self.client, &self.config.auth).await,
                }
            })
            .await
    }

    async fn resolve_key(&self, token: &SecretString, key: &kv::KvKey) -> Option<BTreeMap<String, String>> {
        match kv::read_key(&self.client, token, key).await {
            Ok(secrets) => Some(secrets),
            Err(e) => {
                debug!(key = %key, error = %e, "Failed to get data for key");
                None
            }
        }
    }

    async fn mint_aws(&self, token: &SecretString, aws: &AwsConfig) -> Option<BTreeMap<String, String>> {
        let creds = match cloud::fetch_aws(&self.client, token, aws).await {
            Ok(creds) => creds,
            Err(e) => {
                debug!(path = %aws.request_path(), error = %e, "Failed to get aws credentials");
                return None;
            }
        };

        if let Err(e) = cloud::write_aws_shared_file(&aws.credentials_file, &aws.profile, &creds).await {
            info!(
                file = %aws.credentials_file.display(),
                error = %e,
                "Failed to write aws shared credentials file"
            );
            return None;
        }
        Some(creds.to_env(&aws.credentials_file))
    }

    async fn mint_gcp(&self, token: &SecretString, gcp: &GcpConfig) -> Option<BTreeMap<String, String>> {
        let result = match cloud::fetch_gcp(&self.client, token, gcp).await {
            Ok(credential) => cloud::apply_gcp(gcp, credential).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(env) => Some(env),
            Err(e) => {
                info!(path = %gcp.request_path(), error = %e, "Failed to get gcp credentials");
                None
            }
        }
    }
}

#[async_trait]
impl Provider for VaultProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn add_to_environ(&self, environ: &Environ) -> Result<()> {
        for key in SENSITIVE_ENV_VARS {
            environ.delete(key);
        }

        let token = self.session_token().await?;

        let mut lookups: Vec<BoxFuture<'_, Option<BTreeMap<String, String>>>> = self
            .config
            .keys
            .iter()
            .map(|key| self.resolve_key(token, key).boxed())
            .collect();
        if let Some(aws) = &self.config.aws {
            lookups.push(self.mint_aws(token, aws).boxed());
        }
        if let Some(gcp) = &self.config.gcp {
            lookups.push(self.mint_gcp(token, gcp).boxed());
        }

        // Each lookup commits on its own, in completion order
        let merged = join_all(lookups.into_iter().map(|lookup| async move {
            match lookup.await {
                Some(secrets) => {
                    environ.safe_merge(secrets);
                    true
                }
                None => false,
            }
        }))
        .await;

        debug!(
            resolved = merged.iter().filter(|ok| **ok).count(),
            failed = merged.iter().filter(|ok| !**ok).count(),
            "Vault lookups finished"
        );
        Ok(())
    }
}
