//! Catalog extractors
//!
//! One [`SchemaExtractor`] per dialect reads the system catalog through a
//! borrowed [`CatalogConnection`] and normalizes it into the dialect-neutral
//! model in [`crate::schema::types`].

pub mod mssql;
pub mod mysql;
pub mod oracle;
pub mod postgres;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::connection::{CatalogConnection, CatalogRow};
use crate::error::{Error, Result};
use crate::schema::types::{
    definition_hash, CheckConstraintSchema, ColumnSchema, Extracted, ForeignKeySchema, IndexSchema, ObjectCategory,
    SchemaObjects, StoredProcedureSchema, TableSchema, TriggerSchema, ViewSchema,
};
use crate::utils::naming::{canonical_action, normalize_identifier};

pub use mssql::MssqlExtractor;
pub use mysql::MysqlExtractor;
pub use oracle::OracleExtractor;
pub use postgres::PostgresExtractor;

/// Supported catalog dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    PostgreSQL,
    SqlServer,
    MySql,
    Oracle,
}

/// Accepted dialect identifiers, matched case-insensitively
static DIALECT_ALIASES: &[(&str, Dialect)] = &[
    ("postgresql", Dialect::PostgreSQL),
    ("postgres", Dialect::PostgreSQL),
    ("pg", Dialect::PostgreSQL),
    ("mssql", Dialect::SqlServer),
    ("sqlserver", Dialect::SqlServer),
    ("sql_server", Dialect::SqlServer),
    ("mysql", Dialect::MySql),
    ("mariadb", Dialect::MySql),
    ("oracle", Dialect::Oracle),
    ("oracledb", Dialect::Oracle),
];

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::PostgreSQL => "PostgreSQL",
            Dialect::SqlServer => "SQL Server",
            Dialect::MySql => "MySQL",
            Dialect::Oracle => "Oracle",
        }
    }

    /// Every identifier that resolves to this dialect
    pub fn aliases(self) -> impl Iterator<Item = &'static str> {
        DIALECT_ALIASES
            .iter()
            .filter(move |(_, dialect)| *dialect == self)
            .map(|(alias, _)| *alias)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        DIALECT_ALIASES
            .iter()
            .find(|(alias, _)| *alias == wanted)
            .map(|(_, dialect)| *dialect)
            .ok_or_else(|| Error::UnsupportedDialect(s.to_string()))
    }
}

/// Where an extraction reads from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    /// Used when a call passes no schema
    pub default_schema: Option<String>,
}

impl SourceInfo {
    pub fn new(host: &str, database: &str) -> Self {
        Self {
            host: host.to_string(),
            port: None,
            database: database.to_string(),
            default_schema: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Host as reported in snapshots, with the port when one is configured
    pub fn address(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    pub fn with_default_schema(mut self, schema: &str) -> Self {
        self.default_schema = Some(schema.to_string());
        self
    }
}

/// Reads catalog metadata for one dialect
#[async_trait]
pub trait SchemaExtractor: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Schema used when `schema_name` is `None`, normalized for the catalog
    async fn resolve_schema(&self, schema_name: Option<&str>) -> Result<String>;

    /// Columns, keys, indexes and check constraints of one table.
    ///
    /// Fails when a column, primary key, index or foreign key query fails, or
    /// when the table has no visible columns. Check constraint failures leave
    /// the category listed in [`TableSchema::incomplete`].
    async fn extract_table_schema(&self, table_name: &str, schema_name: Option<&str>) -> Result<TableSchema>;

    async fn extract_stored_procedures(&self, schema_name: Option<&str>) -> Result<Extracted<StoredProcedureSchema>>;

    async fn extract_views(&self, schema_name: Option<&str>) -> Result<Extracted<ViewSchema>>;

    async fn extract_triggers(&self, schema_name: Option<&str>) -> Result<Extracted<TriggerSchema>>;

    /// Procedures, views and triggers of one schema
    async fn extract_objects(&self, schema_name: Option<&str>) -> Result<SchemaObjects> {
        let schema = self.resolve_schema(schema_name).await?;

        Ok(SchemaObjects {
            stored_procedures: self.extract_stored_procedures(Some(&schema)).await?,
            views: self.extract_views(Some(&schema)).await?,
            triggers: self.extract_triggers(Some(&schema)).await?,
            schema_name: schema,
        })
    }
}

/// Build the extractor for a dialect identifier
pub fn get_schema_extractor<'a>(
    dialect: &str,
    connection: &'a dyn CatalogConnection,
    source: SourceInfo,
) -> Result<Box<dyn SchemaExtractor + 'a>> {
    let extractor: Box<dyn SchemaExtractor + 'a> = match dialect.parse::<Dialect>()? {
        Dialect::PostgreSQL => Box::new(PostgresExtractor::new(connection, source)),
        Dialect::SqlServer => Box::new(MssqlExtractor::new(connection, source)),
        Dialect::MySql => Box::new(MysqlExtractor::new(connection, source)),
        Dialect::Oracle => Box::new(OracleExtractor::new(connection, source)),
    };

    Ok(extractor)
}

/// Explicit schema if given, else the configured default, normalized for the dialect
pub(crate) fn requested_schema(dialect: Dialect, schema_name: Option<&str>, source: &SourceInfo) -> Option<String> {
    schema_name
        .or(source.default_schema.as_deref())
        .map(|schema| normalize_identifier(dialect, schema))
}

/// Dialect, schema and table an extraction step works on; carried into
/// errors and log records.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub dialect: Dialect,
    pub schema: &'a str,
    pub table: Option<&'a str>,
}

impl<'a> Scope<'a> {
    pub fn table(dialect: Dialect, schema: &'a str, table: &'a str) -> Self {
        Self {
            dialect,
            schema,
            table: Some(table),
        }
    }

    pub fn schema(dialect: Dialect, schema: &'a str) -> Self {
        Self {
            dialect,
            schema,
            table: None,
        }
    }

    fn object(&self) -> String {
        match self.table {
            Some(table) => format!("{}.{}", self.schema, table),
            None => self.schema.to_string(),
        }
    }

    /// Wrap a query error with context; connection failures pass through
    pub fn query_failure(&self, category: ObjectCategory, error: Error) -> Error {
        match error {
            Error::ConnectionFailure(_) | Error::MetadataQueryFailure { .. } => error,
            other => Error::MetadataQueryFailure {
                dialect: self.dialect,
                category,
                object: self.object(),
                message: other.to_string(),
            },
        }
    }

    /// Run a catalog query and decode every row
    pub async fn fetch<T, F>(
        &self,
        connection: &dyn CatalogConnection,
        category: ObjectCategory,
        sql: &str,
        params: &[&str],
        decode: F,
    ) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&CatalogRow) -> Result<T> + Send,
    {
        tracing::debug!(
            dialect = %self.dialect,
            schema = self.schema,
            table = self.table.unwrap_or_default(),
            category = %category,
            "Running catalog query"
        );

        let rows = connection
            .fetch_all(sql, params)
            .await
            .map_err(|e| self.query_failure(category, e))?;

        rows.iter()
            .map(decode)
            .collect::<Result<Vec<T>>>()
            .map_err(|e| self.query_failure(category, e))
    }

    /// Degrade a failed best-effort category to an empty, flagged result
    pub fn best_effort<T>(&self, category: ObjectCategory, result: Result<Vec<T>>) -> Result<Extracted<T>> {
        match result {
            Ok(items) => Ok(Extracted::complete(items)),
            Err(error) if error.is_connection_failure() => Err(error),
            Err(error) => {
                tracing::warn!(
                    dialect = %self.dialect,
                    schema = self.schema,
                    table = self.table.unwrap_or_default(),
                    category = %category,
                    error = %error,
                    "Catalog query failed, category left undetermined"
                );
                Ok(Extracted::failed(error.to_string()))
            }
        }
    }

    pub fn require_columns(&self, columns: &IndexMap<String, ColumnSchema>) -> Result<()> {
        if columns.is_empty() {
            return Err(Error::TableNotFound {
                schema: self.schema.to_string(),
                table: self.table.unwrap_or_default().to_string(),
            });
        }
        Ok(())
    }
}

/// Log the one-line summary of a finished table extraction
pub(crate) fn log_table_summary(dialect: Dialect, table: &TableSchema) {
    tracing::info!(
        dialect = %dialect,
        schema = %table.schema_name,
        table = %table.table_name,
        columns = table.columns.len(),
        indexes = table.indexes.len(),
        foreign_keys = table.foreign_keys.len(),
        check_constraints = table.check_constraints.len(),
        complete = table.is_complete(),
        "Extracted table schema"
    );
}

/// Attach a best-effort check constraint result to a table
pub(crate) fn attach_checks(table: &mut TableSchema, checks: Extracted<CheckConstraintSchema>) {
    if !checks.is_complete() {
        table.incomplete.push(ObjectCategory::CheckConstraints);
    }
    table.check_constraints = checks.items;
}

/// Groups one-row-per-column index results by index name
#[derive(Debug, Default)]
pub(crate) struct IndexAccumulator {
    indexes: IndexMap<String, IndexSchema>,
}

impl IndexAccumulator {
    pub fn add(&mut self, name: &str, column: &str, is_unique: bool, index_type: &str) {
        self.indexes
            .entry(name.to_string())
            .or_insert_with(|| IndexSchema::new(name, &[], is_unique, index_type))
            .columns
            .push(column.to_string());
    }

    pub fn finish(self) -> Vec<IndexSchema> {
        self.indexes.into_values().collect()
    }
}

/// One column pair of a foreign key
#[derive(Debug, Clone)]
pub(crate) struct ForeignKeyRow {
    pub name: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

/// Groups one-row-per-column-pair foreign key results by constraint name
#[derive(Debug, Default)]
pub(crate) struct ForeignKeyAccumulator {
    foreign_keys: IndexMap<String, ForeignKeySchema>,
}

impl ForeignKeyAccumulator {
    pub fn add(&mut self, row: ForeignKeyRow) {
        let fk = self.foreign_keys.entry(row.name.clone()).or_insert_with(|| ForeignKeySchema {
            name: row.name.clone(),
            columns: Vec::new(),
            referenced_table: row.referenced_table.clone(),
            referenced_columns: Vec::new(),
            on_delete: canonical_action(row.on_delete.as_deref()),
            on_update: canonical_action(row.on_update.as_deref()),
        });
        fk.columns.push(row.column);
        fk.referenced_columns.push(row.referenced_column);
    }

    pub fn finish(self) -> Vec<ForeignKeySchema> {
        self.foreign_keys.into_values().collect()
    }
}

/// One event row of a trigger
#[derive(Debug, Clone)]
pub(crate) struct TriggerRow {
    pub name: String,
    pub table_name: String,
    pub event: String,
    pub timing: String,
    pub definition: Option<String>,
}

/// Merges per-event trigger rows into one trigger per table and name
#[derive(Debug)]
pub(crate) struct TriggerAccumulator {
    schema_name: String,
    triggers: IndexMap<(String, String), (TriggerSchema, Vec<String>)>,
}

impl TriggerAccumulator {
    pub fn new(schema_name: &str) -> Self {
        Self {
            schema_name: schema_name.to_string(),
            triggers: IndexMap::new(),
        }
    }

    pub fn add(&mut self, row: TriggerRow) {
        let schema_name = &self.schema_name;
        let (_, events) = self
            .triggers
            .entry((row.table_name.clone(), row.name.clone()))
            .or_insert_with(|| {
                let trigger = TriggerSchema {
                    name: row.name.clone(),
                    schema_name: schema_name.clone(),
                    table_name: row.table_name.clone(),
                    event: String::new(),
                    timing: row.timing.trim().to_uppercase(),
                    definition_hash: definition_hash(row.definition.as_deref().unwrap_or_default()),
                };
                (trigger, Vec::new())
            });

        for event in row.event.split(',').map(|e| e.trim().to_uppercase()) {
            if !event.is_empty() && !events.contains(&event) {
                events.push(event);
            }
        }
    }

    pub fn finish(self) -> Vec<TriggerSchema> {
        self.triggers
            .into_values()
            .map(|(mut trigger, events)| {
                trigger.event = events.join(",");
                trigger
            })
            .collect()
    }
}
