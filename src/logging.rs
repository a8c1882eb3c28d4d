//! Logging setup for the command-line front ends
//!
//! The library only emits `tracing` events. Binaries call [`init_logging`]
//! once at startup; output goes to stderr so stdout stays reserved for
//! machine-readable results.
//!
//! - `warn`: per-row failures, dropped columns, aborted runs
//! - `info`: run stages and summaries
//! - `debug`: introspected tables, prepared statements
//! - `trace`: everything else

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub with_timestamps: bool,
    pub with_target: bool,
    pub with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            with_timestamps: false,
            with_target: false,
            with_ansi: true,
        }
    }
}

impl LogConfig {
    /// 0 → warn, 1 (`-v`) → info, 2 (`-vv`) → debug, more → trace
    #[must_use]
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.with_timestamps = enable;
        self
    }

    #[must_use]
    pub fn with_ansi(mut self, enable: bool) -> Self {
        self.with_ansi = enable;
        self
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured
/// level. A second call is a no-op.
pub fn init_logging(config: &LogConfig) {
    let layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(config.with_ansi)
        .with_target(config.with_target);

    let registry = tracing_subscriber::registry().with(build_env_filter(config.level));
    let result = if config.with_timestamps {
        registry.with(layer).try_init()
    } else {
        registry.with(layer.without_time()).try_init()
    };
    result.ok();
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Our crate at the requested level, dependencies at warn
fn default_directives(level: Level) -> String {
    format!("warn,ingot={}", level.as_str().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(LogConfig::from_verbosity(0).level, Level::WARN);
        assert_eq!(LogConfig::from_verbosity(1).level, Level::INFO);
        assert_eq!(LogConfig::from_verbosity(2).level, Level::DEBUG);
        assert_eq!(LogConfig::from_verbosity(9).level, Level::TRACE);
    }

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(Level::DEBUG), "warn,ingot=debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig::from_verbosity(1).with_ansi(false);
        init_logging(&config);
        init_logging(&config);
    }
}
