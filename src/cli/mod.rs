//! # Command Line Interface
//!
//! Two entrypoints share the same pipeline:
//!
//! - `vest` gathers secrets, folds in the ambient environment and replaces
//!   itself with the target command
//! - `bule` gathers secrets and writes them to a file

pub mod bule;
pub mod vest;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::environ::{populate, Environ, OutputFormat, PopulateReport, ProviderRegistry};
use crate::errors::Result;
use crate::observability::{init_logging, log_config_info};
use crate::secrets::dotenv::DOTENV_FILES_ENV;
use crate::secrets::vault::SENSITIVE_ENV_VARS;
use crate::utils::write_private_file;

/// Flags shared by both entrypoints. Each overrides its `VEST_*` variable.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Secret provider. Can be used multiple times
    #[arg(short = 'p', long = "provider", value_name = "NAME")]
    pub providers: Vec<String>,

    /// Format of the output file
    #[arg(
        short = 'F',
        long,
        value_name = "FMT",
        value_parser = clap::builder::PossibleValuesParser::new(OutputFormat::names().iter().copied())
    )]
    pub format: Option<String>,

    /// Enable debug logging
    #[arg(short, long, alias = "verbose")]
    pub debug: bool,
}

impl CommonArgs {
    /// Load runtime configuration and apply the command line overrides.
    pub fn runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = RuntimeConfig::from_env()?;
        if !self.providers.is_empty() {
            config.providers = self.providers.clone();
        }
        if let Some(format) = &self.format {
            config.output_format = format.parse()?;
        }
        Ok(config)
    }
}

/// Initialise logging and run every configured provider against a fresh store.
pub async fn gather(config: &RuntimeConfig, debug: bool) -> (Arc<Environ>, PopulateReport) {
    init_logging(config, debug);
    log_config_info(config);

    let environ = Arc::new(
        Environ::new().with_upcase_keys(config.upcase_keys).with_format(config.output_format),
    );
    let registry = ProviderRegistry::with_defaults();
    let report = populate(&registry, Arc::clone(&environ), &config.providers).await;

    info!(
        contributed = ?report.contributed,
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        keys = environ.len(),
        "Gathered secrets"
    );
    (environ, report)
}

/// Encode the store and write it to `path` with owner-only permissions.
pub async fn write_output(environ: &Environ, path: &Path) -> Result<()> {
    let mut buf = Vec::new();
    environ.write_to(&mut buf)?;
    write_private_file(path, &buf).await?;
    info!(file = %path.display(), format = %environ.format(), "Wrote secrets to file");
    Ok(())
}

/// Like [`write_output`] but only logs a failure.
pub async fn write_output_logged(environ: &Environ, path: &Path) {
    if let Err(e) = write_output(environ, path).await {
        warn!(file = %path.display(), error = %e, "Failed to write secrets to file");
    }
}

/// Whether `key` carries provider credentials that must not reach the workload.
pub fn is_sensitive(key: &str) -> bool {
    key == DOTENV_FILES_ENV || SENSITIVE_ENV_VARS.contains(&key)
}

/// `KEY=VALUE` pairs of `vars` with credential-carrying variables removed.
pub fn filter_ambient<I>(vars: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter().filter(|(k, _)| !is_sensitive(k)).map(|(k, v)| format!("{}={}", k, v)).collect()
}
