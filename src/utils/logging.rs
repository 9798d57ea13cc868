//! Logging initialization for evogate.
//!
//! Supports three formats:
//! - `pretty`: default tracing pretty-print (human-readable, coloured)
//! - `component`: `[timestamp] [LEVEL] target message {fields}`, compact and grep-friendly;
//!   use the [`log_component!`] macro to add a `component` field for per-subsystem filtering
//! - `json`: structured JSON lines for log aggregators (e.g. Loki, CloudWatch)

use std::sync::Arc;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::Result;

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// Falls back to `RUST_LOG` env var; if unset, uses `cfg.level`.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let file = match &cfg.file {
        Some(path) => Some(Arc::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        )),
        None => None,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // try_init() only fails when a subscriber is already installed (tests, re-init).
    match (cfg.format, file) {
        (LogFormat::Json, Some(file)) => {
            let _ = builder.json().with_writer(file).try_init();
        }
        (LogFormat::Json, None) => {
            let _ = builder.json().try_init();
        }
        (LogFormat::Pretty, Some(file)) => {
            let _ = builder.pretty().with_ansi(false).with_writer(file).try_init();
        }
        (LogFormat::Pretty, None) => {
            let _ = builder.pretty().try_init();
        }
        (LogFormat::Component, Some(file)) => {
            let _ = builder
                .with_target(true)
                .compact()
                .with_ansi(false)
                .with_writer(file)
                .try_init();
        }
        (LogFormat::Component, None) => {
            let _ = builder.with_target(true).compact().try_init();
        }
    }

    Ok(())
}

/// Emit a component-tagged tracing event.
///
/// Works with any tracing level (`trace`, `debug`, `info`, `warn`, `error`).
/// The `component` field makes it easy to grep logs by subsystem:
///
/// ```
/// # use evogate::log_component;
/// log_component!(info, "session", "QR code received");
/// log_component!(warn, "gateway", "rate limited", ip = "10.0.0.1", limit = 60u32);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}

#[cfg(test)]
mod tests {
    use crate::config::{LogFormat, LoggingConfig};

    #[test]
    fn test_default_logging_config() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.format, LogFormat::Component);
        assert_eq!(cfg.level, "info");
        assert!(cfg.file.is_none());
    }

    #[test]
    fn test_log_format_deserialize_json() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"format":"json","level":"debug"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "debug");
    }

    #[test]
    fn test_log_format_deserialize_pretty() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"format":"pretty"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Pretty);
        assert_eq!(cfg.level, "info"); // default
    }

    #[test]
    fn test_log_format_partial_config_uses_defaults() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"level":"trace"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Component);
        assert!(cfg.file.is_none());
        assert_eq!(cfg.level, "trace");
    }

    #[test]
    fn test_init_logging_with_missing_dir_fails() {
        let cfg = LoggingConfig {
            format: LogFormat::Json,
            level: "info".to_string(),
            file: Some("/nonexistent-dir/evogate.log".to_string()),
        };
        assert!(super::init_logging(&cfg).is_err());
    }

    #[test]
    fn test_log_component_macro_compiles() {
        log_component!(debug, "test", "plain message");
        log_component!(info, "test", "with fields", count = 3u32, name = "x");
    }
}
