//! Structured logging setup.
//!
//! All components log through `tracing`; this module only decides how events
//! are rendered and which level is let through.

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use tracing_subscriber::fmt;

/// Install the global `tracing` subscriber described by `config`.
///
/// Returns `false` when a subscriber was already installed (tests, embedding
/// applications); the existing one is left in place.
pub fn init(config: &LogConfig) -> bool {
    let level = config.level.as_tracing();
    let result = match config.format {
        LogFormat::Json => fmt()
            .json()
            .with_max_level(level)
            .with_target(config.with_target)
            .try_init(),
        LogFormat::Text => fmt()
            .with_max_level(level)
            .with_target(config.with_target)
            .try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_a_no_op() {
        let config = LogConfig::default();
        init(&config);
        assert!(!init(&config));
    }
}
