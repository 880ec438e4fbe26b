//! Observability support: structured logging configuration.

pub mod logging;

pub use logging::{init_logging, LogConfig};
