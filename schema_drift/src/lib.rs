//! SchemaDrift: semantic table schema drift detection across database environments
//!
//! SchemaDrift reads table metadata from PostgreSQL, SQL Server, MySQL and
//! Oracle catalogs into one dialect-neutral model and compares two snapshots
//! of the same table, ignoring index and constraint names.

pub mod config;
pub mod db;
pub mod error;
pub mod schema;
pub mod utils;

// Re-export main types for easier access
pub use config::{Config, DatabaseConfig};
pub use db::{CatalogConnection, CatalogRow, CatalogValue, MemoryCatalog};
pub use error::{Error, Result};
pub use schema::diff::{compare_objects, ObjectDifference, SchemaComparator, SchemaComparisonResult};
pub use schema::extractor::{get_schema_extractor, Dialect, SchemaExtractor, SourceInfo};
pub use schema::types::{SchemaObjects, TableSchema};

/// Load a configuration file, install its logging and build a checker
pub fn init(config_path: &str) -> Result<DriftChecker> {
    let config = config::load_from_file(config_path)?;
    utils::logging::init_logging(&config.logging)?;
    Ok(DriftChecker::new(config))
}

/// Compares tables between the configured source and target environments
pub struct DriftChecker {
    config: Config,
    comparator: SchemaComparator,
}

impl DriftChecker {
    pub fn new(config: Config) -> Self {
        let comparator = SchemaComparator::new(config.comparison.strict);
        Self { config, comparator }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extract one table from both sides concurrently and compare the snapshots
    pub async fn compare_table(
        &self,
        source: &dyn CatalogConnection,
        target: &dyn CatalogConnection,
        table_name: &str,
    ) -> Result<SchemaComparisonResult> {
        let source_extractor = extractor_for(&self.config.source, source)?;
        let target_extractor = extractor_for(&self.config.target, target)?;

        let (source_schema, target_schema) = futures::try_join!(
            source_extractor.extract_table_schema(table_name, None),
            target_extractor.extract_table_schema(table_name, None),
        )?;

        let result = self.comparator.compare(
            &source_schema,
            &target_schema,
            self.config.source.label(),
            self.config.target.label(),
        );

        tracing::info!(
            table = table_name,
            source = self.config.source.label(),
            target = self.config.target.label(),
            is_match = result.is_match(),
            total_differences = result.total_differences(),
            "Compared table schema"
        );

        Ok(result)
    }

    /// Compare several tables one after another, stopping at the first error
    pub async fn compare_tables(
        &self,
        source: &dyn CatalogConnection,
        target: &dyn CatalogConnection,
        table_names: &[&str],
    ) -> Result<Vec<SchemaComparisonResult>> {
        let mut results = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            results.push(self.compare_table(source, target, table_name).await?);
        }
        Ok(results)
    }

    /// Procedures, views and triggers of the schema configured in `database`
    pub async fn extract_objects(
        &self,
        connection: &dyn CatalogConnection,
        database: &DatabaseConfig,
    ) -> Result<SchemaObjects> {
        extractor_for(database, connection)?.extract_objects(None).await
    }

    /// Extract both object inventories concurrently and diff them
    pub async fn compare_objects(
        &self,
        source: &dyn CatalogConnection,
        target: &dyn CatalogConnection,
    ) -> Result<Vec<ObjectDifference>> {
        let (source_objects, target_objects) = futures::try_join!(
            self.extract_objects(source, &self.config.source),
            self.extract_objects(target, &self.config.target),
        )?;

        Ok(compare_objects(&source_objects, &target_objects))
    }
}

fn extractor_for<'a>(
    database: &DatabaseConfig,
    connection: &'a dyn CatalogConnection,
) -> Result<Box<dyn SchemaExtractor + 'a>> {
    get_schema_extractor(&database.dialect, connection, database.source_info())
}
