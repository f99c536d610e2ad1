//! Provider trait
//!
//! The single capability every secret source implements.

use async_trait::async_trait;

use super::Environ;
use crate::secrets::Result;

/// A pluggable source of secrets.
///
/// Implementations must be Send + Sync so the aggregator can run them on
/// separate tasks against one shared [`Environ`].
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Name the provider was registered under, used in logs.
    fn name(&self) -> &str;

    /// Contribute discovered secrets into `environ`.
    ///
    /// Contributions go through [`Environ::safe_merge`] so a key already present
    /// is never overwritten. On error the store keeps whatever was merged
    /// before the failure.
    async fn add_to_environ(&self, environ: &Environ) -> Result<()>;
}
