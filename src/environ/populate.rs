//! Aggregator
//!
//! Resolves the requested providers and runs them concurrently against one
//! shared [`Environ`]. Every failure is logged and recorded; none of them stops
//! the other providers.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, info, Instrument};

use super::{Environ, ProviderRegistry};
use crate::provider_span;

/// Outcome of a [`populate`] run, per provider name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    /// Providers that finished without error.
    pub contributed: Vec<String>,
    /// Providers that were never run (unregistered or failed construction), with the reason.
    pub skipped: Vec<(String, String)>,
    /// Providers that ran and returned an error or panicked, with the reason.
    pub failed: Vec<(String, String)>,
}

impl PopulateReport {
    /// True when every requested provider contributed.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

enum Outcome {
    Contributed,
    Failed(String),
}

/// Resolve each of `names` through `registry` and run them concurrently.
///
/// Returns once every spawned provider task has finished. There is no global
/// timeout; each provider bounds its own network calls.
pub async fn populate<S: AsRef<str>>(
    registry: &ProviderRegistry,
    environ: Arc<Environ>,
    names: &[S],
) -> PopulateReport {
    let mut report = PopulateReport::default();
    let mut tasks = JoinSet::new();

    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }

        let provider = match registry.get(name) {
            Ok(provider) => provider,
            Err(e) => {
                info!(provider = %name, error = %e, "Skipping provider");
                report.skipped.push((name.to_string(), e.to_string()));
                continue;
            }
        };

        let environ = Arc::clone(&environ);
        let name = name.to_string();
        let span = provider_span!(name);
        tasks.spawn(
            async move {
                let run = AssertUnwindSafe(provider.add_to_environ(&environ)).catch_unwind();
                let outcome = match run.await {
                    Ok(Ok(())) => Outcome::Contributed,
                    Ok(Err(e)) => Outcome::Failed(e.to_string()),
                    Err(panic) => Outcome::Failed(panic_message(panic.as_ref())),
                };
                (name, outcome)
            }
            .instrument(span),
        );
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Outcome::Contributed)) => {
                debug!(provider = %name, "Provider finished");
                report.contributed.push(name);
            }
            Ok((name, Outcome::Failed(reason))) => {
                info!(provider = %name, error = %reason, "Provider failed");
                report.failed.push((name, reason));
            }
            // Only reachable if the runtime is shutting down
            Err(e) => {
                info!(error = %e, "Provider task aborted");
                report.failed.push(("unknown".to_string(), e.to_string()));
            }
        }
    }

    report.contributed.sort();
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("provider panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("provider panicked: {}", s)
    } else {
        "provider panicked".to_string()
    }
}
