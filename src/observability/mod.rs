//! # Observability Infrastructure
//!
//! Structured logging for the entrypoints and span helpers for provider tasks.

pub mod logging;

pub use logging::{init_logging, log_config_info};
