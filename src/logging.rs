//! Structured logging setup.
//!
//! - JSON formatting for scheduled/unattended runs
//! - Pretty formatting for interactive use
//! - File output with optional daily rotation

use anyhow::{Context, Result};
use std::env;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";

/// Configuration for logging setup.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log format: "json" or "pretty"
    pub format: LogFormat,
    /// Log output: "stdout", "stderr", or "file"
    pub output: LogOutput,
    /// Directory for log files (when output is "file")
    pub log_dir: PathBuf,
    /// Log file name prefix
    pub log_file_prefix: String,
    pub service_name: String,
    pub service_version: String,
    /// Environment (e.g., "dev", "production")
    pub environment: String,
    /// Rotate log files daily
    pub enable_rotation: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl LoggingConfig {
    /// Create a new logging configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("ENV"))
            .unwrap_or_else(|| "development".to_string());
        let is_production = environment == "production" || environment == "prod";

        let format = match lookup("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            _ if is_production => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let output = match lookup("LOG_OUTPUT").map(|v| v.to_lowercase()).as_deref() {
            Some("stdout") => LogOutput::Stdout,
            Some("file") => LogOutput::File,
            _ => LogOutput::Stderr,
        };

        let enable_rotation = lookup("LOG_ROTATION")
            .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "off" | "never"))
            .unwrap_or(true);

        Self {
            format,
            output,
            log_dir: lookup("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            log_file_prefix: "quality_report.log".to_string(),
            service_name: env!("CARGO_PKG_NAME").to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment,
            enable_rotation,
        }
    }
}

/// Initialize structured logging with the given configuration.
///
/// Returns a WorkerGuard that must be held until the run ends so buffered
/// lines are flushed.
pub fn init_logging(config: LoggingConfig) -> Result<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (writer, guard) = match config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
        LogOutput::File => {
            std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;

            let file_appender = if config.enable_rotation {
                tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix)
            } else {
                tracing_appender::rolling::never(&config.log_dir, &config.log_file_prefix)
            };
            tracing_appender::non_blocking(file_appender)
        }
    };

    let registry = tracing_subscriber::registry();

    match config.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_level(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_filter(env_filter);
            registry
                .with(fmt_layer)
                .try_init()
                .context("logging already initialized")?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_level(true)
                .with_span_events(FmtSpan::NONE)
                .with_ansi(config.output != LogOutput::File)
                .with_filter(env_filter);
            registry
                .with(fmt_layer)
                .try_init()
                .context("logging already initialized")?;
        }
    }

    tracing::debug!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        format = ?config.format,
        output = ?config.output,
        "logging initialized"
    );

    Ok(guard)
}

/// Span wrapping one report run
pub fn run_span(date: &str) -> tracing::Span {
    tracing::info_span!(
        "report_run",
        report.date = date,
        service = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.service_name, "quality-report");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(config.enable_rotation);
    }

    #[test]
    fn test_logging_config_overrides() {
        let config = LoggingConfig::from_lookup(lookup_from(&[
            ("LOG_FORMAT", "JSON"),
            ("LOG_OUTPUT", "file"),
            ("LOG_DIR", "/var/log/qr"),
            ("LOG_ROTATION", "never"),
        ]));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/qr"));
        assert!(!config.enable_rotation);
    }

    #[test]
    fn test_production_defaults_to_json() {
        let config = LoggingConfig::from_lookup(lookup_from(&[("ENVIRONMENT", "production")]));
        assert_eq!(config.format, LogFormat::Json);
        let config = LoggingConfig::from_lookup(lookup_from(&[
            ("ENV", "prod"),
            ("LOG_FORMAT", "pretty"),
        ]));
        assert_eq!(config.format, LogFormat::Pretty);
    }
}
