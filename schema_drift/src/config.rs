//! Configuration handling for SchemaDrift

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::extractor::{Dialect, SourceInfo};

/// Load configuration from a TOML or YAML file
pub fn load_from_file(path: &str) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let config: Config = match extension.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&config_str)?,
        _ => toml::from_str(&config_str)?,
    };

    config.validate()?;
    Ok(config)
}

/// Represents the complete SchemaDrift configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub source: DatabaseConfig,
    pub target: DatabaseConfig,
    pub comparison: ComparisonConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Check that both sides name a known dialect and that it is the same one
    pub fn validate(&self) -> Result<()> {
        let source = self.source.dialect()?;
        let target = self.target.dialect()?;

        if source != target {
            return Err(Error::ConfigError(format!(
                "Source dialect {} and target dialect {} differ; comparisons run within one dialect",
                source, target
            )));
        }

        Ok(())
    }
}

/// One side of a comparison
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub dialect: String,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub schema: Option<String>,
    pub label: Option<String>,
}

impl DatabaseConfig {
    /// Parse the configured dialect identifier
    pub fn dialect(&self) -> Result<Dialect> {
        self.dialect.parse()
    }

    /// Environment label used in comparison results
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.host)
    }

    /// Source identity handed to an extractor
    pub fn source_info(&self) -> SourceInfo {
        SourceInfo {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            default_schema: self.schema.clone(),
        }
    }
}

/// Comparison behaviour
///
/// `strict` has no default: whether default values count as drift must be
/// decided by whoever writes the configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ComparisonConfig {
    pub strict: bool,
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub format: String,
    pub stdout: bool,
}
