//! Process-wide `tracing` subscriber.
//!
//! `RUST_LOG` wins when set and valid; otherwise the configured level is
//! used, and `info` when that does not parse either.

use tracing_subscriber::EnvFilter;

const FALLBACK_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable single-line output for local runs.
    Compact,
}

/// JSON logging at `level` unless `RUST_LOG` says otherwise.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(level: &str) {
    init_with(level, LogFormat::Json);
}

pub fn init_with(level: &str, format: LogFormat) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(rust_log.as_deref(), level);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let installed = match format {
        LogFormat::Json => builder.json().try_init().is_ok(),
        LogFormat::Compact => builder.compact().try_init().is_ok(),
    };
    if installed {
        tracing::debug!(level, ?format, "logging initialised");
    }
}

fn build_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new(FALLBACK_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_takes_precedence() {
        let rendered = build_filter(Some("warn,algoshield_api=debug"), "info").to_string();
        assert!(rendered.contains("algoshield_api=debug"));
        assert!(rendered.contains("warn"));
        assert!(!rendered.contains("info"));
    }

    #[test]
    fn configured_level_is_the_fallback() {
        assert_eq!(build_filter(None, "debug").to_string(), "debug");
        assert_eq!(build_filter(Some("  "), "error").to_string(), "error");
    }

    #[test]
    fn garbage_level_falls_back_to_info() {
        assert_eq!(build_filter(None, "algoshield=loud").to_string(), "info");
    }

    #[test]
    fn init_twice_is_harmless() {
        init("info");
        init_with("debug", LogFormat::Compact);
    }
}
