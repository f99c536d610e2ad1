//! # Vestibule
//!
//! Gathers secrets from pluggable providers into a process environment before
//! handing control to the real workload. Intended as a container entrypoint.
//!
//! ## Architecture
//!
//! ```text
//! provider names → ProviderRegistry → populate (one task per provider) → Environ
//!                                                                          ↓
//!                                                     exec (vest) / output file (bule)
//! ```
//!
//! ## Core Components
//!
//! - **Environ**: concurrency-safe store; providers only ever safe-merge into it
//! - **ProviderRegistry**: name to factory table, construction deferred until use
//! - **VaultProvider**: trust broker client with KV fallback and cloud credential minting
//! - **populate**: runs providers concurrently and tolerates any one of them failing
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vestibule::environ::{populate, Environ, ProviderRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let environ = Arc::new(Environ::new());
//!     let registry = ProviderRegistry::with_defaults();
//!     populate(&registry, Arc::clone(&environ), &["vault", "dotenv"]).await;
//!     for pair in environ.slice() {
//!         println!("{}", pair);
//!     }
//! }
//! ```

pub mod cli;
pub mod config;
pub mod environ;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod utils;

// Re-export commonly used types and traits
pub use environ::{populate, Environ, OutputFormat, PopulateReport, Provider, ProviderRegistry};
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
