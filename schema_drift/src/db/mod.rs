//! Database module for SchemaDrift
//!
//! This module defines the catalog connection capability and its adapters.

pub mod connection;
pub mod memory;
#[cfg(feature = "mssql")]
pub mod mssql;

// Re-export key types
pub use connection::{CatalogConnection, CatalogRow, CatalogValue};
pub use memory::MemoryCatalog;
#[cfg(feature = "mssql")]
pub use mssql::{MssqlCatalog, MssqlSettings};
