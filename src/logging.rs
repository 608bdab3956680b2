//! ==============================================================================
//! logging.rs - tracing subscriber setup
//! ==============================================================================
//!
//! RUST_LOG wins when set; otherwise the level from host.toml applies to
//! this crate and everything else stays at warn.
//!
//! ==============================================================================

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// install the global fmt subscriber
///
/// a second call (tests, embedding) is not an error.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("[LOGGING] subscriber already installed: {}", e);
    }
}

fn default_directives(level: &str) -> String {
    format!("warn,ht_logger={level}")
}
