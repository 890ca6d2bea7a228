//! Logging configuration with file rotation
//!
//! This module provides:
//! - stderr and/or daily-rotated file output
//! - optional JSON formatting
//! - redaction of secrets from logged form bodies

use crate::config::LoggingConfig;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` does not say otherwise
    pub level: Level,

    /// Log to file (rotated daily)
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            json: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            if let Some(level) = level_from_directive(&rust_log) {
                config.level = level;
            }
        }

        if let Ok(log_file) = std::env::var("HEATPUMP_LOG_FILE") {
            config.file_path = Some(PathBuf::from(log_file));
        }

        if let Ok(json) = std::env::var("HEATPUMP_LOG_JSON") {
            config.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Create config from the `[logging]` section of the bridge config
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        Self {
            level: level_from_directive(&settings.level).unwrap_or(Level::INFO),
            file_path: settings.file.as_ref().map(PathBuf::from),
            stderr: true,
            json: settings.json_format,
        }
    }
}

/// Most verbose level named in an `EnvFilter`-style directive string
fn level_from_directive(directive: &str) -> Option<Level> {
    let directive = directive.to_lowercase();
    [
        ("trace", Level::TRACE),
        ("debug", Level::DEBUG),
        ("info", Level::INFO),
        ("warn", Level::WARN),
        ("error", Level::ERROR),
    ]
    .into_iter()
    .find(|(name, _)| directive.contains(name))
    .map(|(_, level)| level)
}

fn output_layer<W>(writer: W, json: bool, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .boxed()
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let mut layers = Vec::new();

    if config.stderr {
        layers.push(output_layer(std::io::stderr, config.json, true));
    }

    if let Some(file_path) = config.file_path {
        let directory = file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        std::fs::create_dir_all(directory)?;

        let file_appender = tracing_appender::rolling::daily(
            directory,
            file_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("heatpump-bridge.log")),
        );
        layers.push(output_layer(file_appender, config.json, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

/// Check if a form or JSON field name carries a secret
pub fn is_sensitive_field(field: &str) -> bool {
    let field_lower = field.to_lowercase();
    field_lower.contains("password")
        || field_lower.contains("secret")
        || field_lower.contains("token")
        || field_lower.contains("credential")
        || field_lower == "code"
        || field_lower == "session_state"
}

/// Render a form body for logging with secret values masked
pub fn redact_form(form: &[(String, String)]) -> String {
    form.iter()
        .map(|(name, value)| {
            if is_sensitive_field(name) {
                format!("{name}=***")
            } else {
                format!("{name}={value}")
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}
