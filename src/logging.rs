/*!
 * Logging and tracing initialization
 *
 * Stdout carries protocol responses, so console logs go to stderr.
 */

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;
use crate::error::{AgentError, Result};

/// Effective level after applying `--verbose`
pub fn effective_level(config: &LoggingConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

/// Filter directive used when `RUST_LOG` is not set
pub fn default_directive(config: &LoggingConfig) -> String {
    format!(
        "orbit_storage={}",
        effective_level(config).as_str().to_lowercase()
    )
}

/// Initialize structured logging based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(config)))
        .map_err(|e| AgentError::Config(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = config.log_file {
        init_file_logging(log_path, env_filter)?;
    } else {
        init_stderr_logging(env_filter)?;
    }

    Ok(())
}

fn init_stderr_logging(env_filter: EnvFilter) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AgentError::Config(format!("Failed to install subscriber: {}", e)))
}

/// JSON lines to a file, for unattended runs
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path)
        .map_err(|e| AgentError::Config(format!("Failed to create log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AgentError::Config(format!("Failed to install subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_default_directive() {
        let config = LoggingConfig {
            log_level: LogLevel::Warn,
            ..Default::default()
        };
        assert_eq!(default_directive(&config), "orbit_storage=warn");
    }

    #[test]
    fn test_verbose_overrides_log_level() {
        let config = LoggingConfig {
            log_level: LogLevel::Error,
            log_file: None,
            verbose: true,
        };
        assert_eq!(effective_level(&config), Level::DEBUG);
        assert_eq!(default_directive(&config), "orbit_storage=debug");
    }

    #[test]
    fn test_file_logging_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("agent.log");
        let filter = EnvFilter::new("orbit_storage=info");
        let err = init_file_logging(&path, filter).unwrap_err();
        assert!(matches!(err, AgentError::Config(ref m) if m.contains("log file")));
    }
}
