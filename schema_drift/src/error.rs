//! Error types for SchemaDrift

use thiserror::Error;

use crate::schema::extractor::Dialect;
use crate::schema::types::ObjectCategory;

/// Result type for SchemaDrift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for SchemaDrift
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("Metadata query failed ({dialect}, {category}, {object}): {message}")]
    MetadataQueryFailure {
        dialect: Dialect,
        category: ObjectCategory,
        object: String,
        message: String,
    },

    #[error("Table {schema}.{table} not found or has no visible columns")]
    TableNotFound { schema: String, table: String },

    #[error("Catalog value error: {0}")]
    CatalogValue(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(sqlx::Error),

    #[cfg(feature = "mssql")]
    #[error("SQL Server driver error: {0}")]
    TiberiusError(tiberius::error::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Whether this error means the connection itself is unusable
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Error::ConnectionFailure(_))
    }
}

/// Driver transport and pool failures are connection failures, everything
/// else is a query error for the extractor to put in context.
impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Error::ConnectionFailure(error.to_string()),
            other => Error::SqlxError(other),
        }
    }
}

#[cfg(feature = "mssql")]
impl From<tiberius::error::Error> for Error {
    fn from(error: tiberius::error::Error) -> Self {
        match error {
            tiberius::error::Error::Io { .. } | tiberius::error::Error::Tls(_) => {
                Error::ConnectionFailure(error.to_string())
            }
            other => Error::TiberiusError(other),
        }
    }
}

/// Convert Serde JSON errors to SchemaDrift errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors to SchemaDrift errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(format!("Failed to parse config file: {}", error))
    }
}

/// Convert YAML deserialization errors to SchemaDrift errors
impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::ConfigError(format!("Failed to parse config file: {}", error))
    }
}
