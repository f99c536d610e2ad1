//! Secret providers.
//!
//! Every provider implements [`Provider`](crate::environ::Provider) and is
//! reached through the [`ProviderRegistry`](crate::environ::ProviderRegistry):
//!
//! - **vault**: trust broker client with KV key resolution and AWS/GCP
//!   credential minting ([`VaultProvider`])
//! - **dotenv**: local `KEY=VALUE` files ([`DotenvProvider`])
//!
//! # Security Considerations
//!
//! - Credential inputs are held in [`SecretString`] and never reach logs
//! - Login payloads are only ever logged through [`vault::redact`]
//! - Credential files are written with mode 0600

pub mod dotenv;
pub mod error;
pub mod types;
pub mod vault;

pub use dotenv::DotenvProvider;
pub use error::{ErrorKind, Result, SecretsError};
pub use types::{SecretString, REDACTED};
pub use vault::{VaultConfig, VaultProvider};
