//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.
//!
//! Logs always go to stderr: `vest` replaces itself with the workload, and
//! anything written to stdout before that would be mistaken for workload output.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{LogFormat, RuntimeConfig};

/// Create a tracing span for a single provider run.
///
/// ```rust,ignore
/// let span = provider_span!("vault");
/// let span = provider_span!("vault", keys = 3);
/// ```
#[macro_export]
macro_rules! provider_span {
    ($name:expr) => {
        tracing::info_span!("provider", provider = %$name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!("provider", provider = %$name, $($field)*)
    };
}

/// Create a tracing span for one trust broker request.
#[macro_export]
macro_rules! broker_span {
    ($method:expr, $path:expr) => {
        tracing::debug_span!("broker_request", method = %$method, path = %$path)
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level is used, raised to
/// `debug` when `verbose` is on. A subscriber that is already installed (for
/// example by a test harness) is left in place.
pub fn init_logging(config: &RuntimeConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Already set elsewhere (e.g. by a test harness) is fine
    let _ = match config.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .finish(),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .compact()
                .finish(),
        ),
    };
}

/// Log the effective runtime configuration at startup.
pub fn log_config_info(config: &RuntimeConfig) {
    tracing::debug!(
        providers = ?config.providers,
        output_file = ?config.output_file,
        output_format = %config.output_format,
        upcase_keys = %config.upcase_keys,
        "vestibule configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = provider_span!("vault");
        let _span = provider_span!("vault", keys = 3);
        let _span = broker_span!("GET", "secret/data/foo");
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let config = RuntimeConfig::default();
        init_logging(&config, false);
        init_logging(&config, true);
        log_config_info(&config);
    }
}
