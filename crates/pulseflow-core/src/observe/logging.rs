//! Logging bootstrap for pipeline hosts.
//!
//! The pipeline itself only emits `tracing` events: dropped samples at
//! debug, clamped configuration at warn, session lifecycle at info. It
//! never installs a subscriber. Embedding hosts usually bring their own;
//! standalone tools can call [`init_logging`] once at startup and get a
//! filtered stderr subscriber.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Subscriber settings for hosts without their own `tracing` setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `"info"` or `"pulseflow_core=debug"`.
    /// A `RUST_LOG` environment variable takes precedence when set.
    pub directive: String,
    /// Emit one JSON object per event instead of compact text.
    pub json: bool,
    /// Include the emitting module path in each event.
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directive: "info".to_string(),
            json: false,
            show_target: false,
        }
    }
}

/// Install the process-global subscriber.
///
/// A no-op when a subscriber is already installed, so library tests and
/// hosts with their own setup are never disturbed.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(config.show_target);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    if installed.is_err() {
        tracing::debug!("subscriber already installed, keeping it");
    }
}
