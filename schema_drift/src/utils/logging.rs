//! Logging setup for SchemaDrift

use std::fs::File;
use std::path::Path;
use tracing::Level;
use std::sync::Mutex;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Map a configured level name to a tracing level, falling back to INFO
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn env_filter(level: Level) -> Result<EnvFilter> {
    let directive = format!("schema_drift={}", level)
        .parse::<Directive>()
        .map_err(|e| Error::ConfigError(format!("Invalid log directive: {}", e)))?;

    Ok(EnvFilter::from_default_env().add_directive(directive))
}

fn install<S>(subscriber: S) -> Result<()>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::ConfigError(format!("Failed to install log subscriber: {}", e)))
}

/// Install the global subscriber described by `config`.
///
/// Without a logging section nothing is installed and the caller's own
/// subscriber, if any, stays in effect. A file target takes precedence over
/// stdout.
pub fn init_logging(config: &Option<LoggingConfig>) -> Result<()> {
    let Some(config) = config else {
        return Ok(());
    };

    let filter = env_filter(parse_level(&config.level))?;
    let json = config.format.eq_ignore_ascii_case("json");

    if let Some(file_path) = &config.file {
        if let Some(parent) = Path::new(file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(file_path)?;
        let builder = fmt::Subscriber::builder().with_env_filter(filter).with_writer(Mutex::new(file));

        if json {
            install(builder.json().finish())
        } else {
            install(builder.with_ansi(false).finish())
        }
    } else if config.stdout {
        let builder = fmt::Subscriber::builder().with_env_filter(filter);

        if json {
            install(builder.json().finish())
        } else {
            install(builder.finish())
        }
    } else {
        Ok(())
    }
}
