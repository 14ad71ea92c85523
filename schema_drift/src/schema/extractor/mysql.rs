//! MySQL catalog extractor
//!
//! In MySQL a schema is a database, so the configured database is the default
//! schema and also the reported database name. Several `information_schema`
//! columns come back as binary strings; they are decoded by the row accessors.

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{
    attach_checks, log_table_summary, requested_schema, Dialect, ForeignKeyAccumulator, ForeignKeyRow,
    IndexAccumulator, SchemaExtractor, Scope, SourceInfo, TriggerAccumulator, TriggerRow,
};
use crate::db::connection::{CatalogConnection, CatalogRow};
use crate::error::Result;
use crate::schema::types::{
    definition_hash, CheckConstraintSchema, ColumnSchema, Extracted, ObjectCategory, StoredProcedureSchema,
    TableSchema, TriggerSchema, ViewSchema,
};
use crate::utils::naming::{is_implicit_not_null, normalize_identifier};

const COLUMNS_SQL: &str = r#"
    SELECT
        COLUMN_NAME,
        DATA_TYPE,
        IS_NULLABLE,
        COLUMN_DEFAULT,
        CHARACTER_MAXIMUM_LENGTH,
        NUMERIC_PRECISION,
        NUMERIC_SCALE,
        COLUMN_TYPE
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

const PRIMARY_KEY_SQL: &str = r#"
    SELECT kcu.COLUMN_NAME
    FROM information_schema.TABLE_CONSTRAINTS tc
    JOIN information_schema.KEY_COLUMN_USAGE kcu
        ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
        AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
        AND tc.TABLE_NAME = kcu.TABLE_NAME
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
        AND tc.TABLE_SCHEMA = ?
        AND tc.TABLE_NAME = ?
    ORDER BY kcu.ORDINAL_POSITION
"#;

// Functional key parts (8.0.13+) have a NULL COLUMN_NAME and carry the expression
const INDEXES_SQL: &str = r#"
    SELECT INDEX_NAME, COALESCE(COLUMN_NAME, EXPRESSION), NON_UNIQUE, INDEX_TYPE
    FROM information_schema.STATISTICS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        AND INDEX_NAME <> 'PRIMARY'
    ORDER BY INDEX_NAME, SEQ_IN_INDEX
"#;

// MariaDB and MySQL before 8.0.13 have no EXPRESSION column
const LEGACY_INDEXES_SQL: &str = r#"
    SELECT INDEX_NAME, COLUMN_NAME, NON_UNIQUE, INDEX_TYPE
    FROM information_schema.STATISTICS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        AND INDEX_NAME <> 'PRIMARY'
    ORDER BY INDEX_NAME, SEQ_IN_INDEX
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        kcu.CONSTRAINT_NAME,
        kcu.COLUMN_NAME,
        kcu.REFERENCED_TABLE_NAME,
        kcu.REFERENCED_COLUMN_NAME,
        rc.DELETE_RULE,
        rc.UPDATE_RULE
    FROM information_schema.KEY_COLUMN_USAGE kcu
    JOIN information_schema.REFERENTIAL_CONSTRAINTS rc
        ON kcu.CONSTRAINT_NAME = rc.CONSTRAINT_NAME
        AND kcu.CONSTRAINT_SCHEMA = rc.CONSTRAINT_SCHEMA
    WHERE kcu.TABLE_SCHEMA = ? AND kcu.TABLE_NAME = ?
        AND kcu.REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
"#;

// CHECK_CONSTRAINTS exists from MySQL 8.0.16 on
const CHECKS_SQL: &str = r#"
    SELECT cc.CONSTRAINT_NAME, cc.CHECK_CLAUSE
    FROM information_schema.CHECK_CONSTRAINTS cc
    JOIN information_schema.TABLE_CONSTRAINTS tc
        ON cc.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
        AND cc.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
    WHERE tc.TABLE_SCHEMA = ?
        AND tc.TABLE_NAME = ?
        AND tc.CONSTRAINT_TYPE = 'CHECK'
    ORDER BY cc.CONSTRAINT_NAME
"#;

const ROUTINES_SQL: &str = r#"
    SELECT
        r.ROUTINE_NAME,
        r.ROUTINE_TYPE,
        r.ROUTINE_BODY,
        r.DTD_IDENTIFIER,
        r.ROUTINE_DEFINITION,
        (
            SELECT GROUP_CONCAT(
                CONCAT_WS(' ', p.PARAMETER_MODE, p.PARAMETER_NAME, p.DTD_IDENTIFIER)
                ORDER BY p.ORDINAL_POSITION SEPARATOR ', ')
            FROM information_schema.PARAMETERS p
            WHERE p.SPECIFIC_SCHEMA = r.ROUTINE_SCHEMA
                AND p.SPECIFIC_NAME = r.SPECIFIC_NAME
                AND p.ORDINAL_POSITION > 0
        )
    FROM information_schema.ROUTINES r
    WHERE r.ROUTINE_SCHEMA = ?
    ORDER BY r.ROUTINE_NAME
"#;

const VIEWS_SQL: &str = r#"
    SELECT TABLE_NAME, VIEW_DEFINITION
    FROM information_schema.VIEWS
    WHERE TABLE_SCHEMA = ?
    ORDER BY TABLE_NAME
"#;

const VIEW_COLUMNS_SQL: &str = r#"
    SELECT COLUMN_NAME
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

const TRIGGERS_SQL: &str = r#"
    SELECT TRIGGER_NAME, EVENT_OBJECT_TABLE, EVENT_MANIPULATION, ACTION_TIMING, ACTION_STATEMENT
    FROM information_schema.TRIGGERS
    WHERE TRIGGER_SCHEMA = ?
    ORDER BY TRIGGER_NAME, EVENT_OBJECT_TABLE
"#;

/// Reads table metadata from MySQL's `information_schema`
pub struct MysqlExtractor<'a> {
    connection: &'a dyn CatalogConnection,
    source: SourceInfo,
}

impl<'a> MysqlExtractor<'a> {
    pub fn new(connection: &'a dyn CatalogConnection, source: SourceInfo) -> Self {
        Self { connection, source }
    }

    fn schema_for(&self, schema_name: Option<&str>) -> String {
        requested_schema(Dialect::MySql, schema_name, &self.source)
            .unwrap_or_else(|| self.source.database.clone())
    }

    async fn checks(&self, scope: &Scope<'_>) -> Result<Vec<CheckConstraintSchema>> {
        let params = [scope.schema, scope.table.unwrap_or_default()];
        let checks = scope
            .fetch(self.connection, ObjectCategory::CheckConstraints, CHECKS_SQL, &params, |row| {
                Ok(CheckConstraintSchema::new(&row.text(0)?, &row.opt_text(1)?.unwrap_or_default()))
            })
            .await?;

        Ok(checks
            .into_iter()
            .filter(|c| !c.expression.trim().is_empty() && !is_implicit_not_null(&c.expression))
            .collect())
    }

    async fn index_rows(&self, scope: &Scope<'_>) -> Result<Vec<(String, String, bool, Option<String>)>> {
        let params = [scope.schema, scope.table.unwrap_or_default()];
        let decode = |row: &CatalogRow| -> Result<(String, String, bool, Option<String>)> {
            Ok((row.text(0)?, row.text(1)?, !row.flag(2)?, row.opt_text(3)?))
        };

        match scope
            .fetch(self.connection, ObjectCategory::Indexes, INDEXES_SQL, &params, decode)
            .await
        {
            Err(error) if !error.is_connection_failure() => {
                tracing::debug!(
                    schema = scope.schema,
                    table = scope.table.unwrap_or_default(),
                    error = %error,
                    "Index query without expression support"
                );
                scope
                    .fetch(self.connection, ObjectCategory::Indexes, LEGACY_INDEXES_SQL, &params, decode)
                    .await
            }
            result => result,
        }
    }

    async fn views(&self, scope: &Scope<'_>) -> Result<Vec<ViewSchema>> {
        let rows = scope
            .fetch(self.connection, ObjectCategory::Views, VIEWS_SQL, &[scope.schema], |row| {
                Ok((row.text(0)?, row.opt_text(1)?.unwrap_or_default()))
            })
            .await?;

        let mut views = Vec::with_capacity(rows.len());
        for (name, definition) in rows {
            let columns = scope
                .fetch(self.connection, ObjectCategory::Views, VIEW_COLUMNS_SQL, &[scope.schema, name.as_str()], |row| {
                    row.text(0)
                })
                .await?;

            views.push(ViewSchema {
                schema_name: scope.schema.to_string(),
                definition_hash: definition_hash(&definition),
                is_materialized: false,
                columns,
                name,
            });
        }

        Ok(views)
    }
}

fn decode_column(row: &CatalogRow) -> Result<ColumnSchema> {
    let data_type = row
        .opt_text(7)?
        .filter(|column_type| !column_type.is_empty())
        .map_or_else(|| row.text(1), Ok)?;

    Ok(ColumnSchema {
        name: row.text(0)?,
        data_type,
        is_nullable: row.flag(2)?,
        default_value: row.opt_text(3)?,
        max_length: row.opt_i64(4)?,
        numeric_precision: row.opt_i64(5)?,
        numeric_scale: row.opt_i64(6)?,
    })
}

#[async_trait]
impl SchemaExtractor for MysqlExtractor<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn resolve_schema(&self, schema_name: Option<&str>) -> Result<String> {
        Ok(self.schema_for(schema_name))
    }

    async fn extract_table_schema(&self, table_name: &str, schema_name: Option<&str>) -> Result<TableSchema> {
        let schema = self.schema_for(schema_name);
        let table = normalize_identifier(Dialect::MySql, table_name);
        let scope = Scope::table(Dialect::MySql, &schema, &table);
        let params = [schema.as_str(), table.as_str()];

        let columns: IndexMap<String, ColumnSchema> = scope
            .fetch(self.connection, ObjectCategory::Columns, COLUMNS_SQL, &params, decode_column)
            .await?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        scope.require_columns(&columns)?;

        let primary_key = scope
            .fetch(self.connection, ObjectCategory::PrimaryKey, PRIMARY_KEY_SQL, &params, |row| row.text(0))
            .await?;

        let mut indexes = IndexAccumulator::default();
        let index_rows = self.index_rows(&scope).await?;
        for (name, column, is_unique, index_type) in index_rows {
            indexes.add(&name, &column, is_unique, index_type.as_deref().unwrap_or("BTREE"));
        }

        let mut foreign_keys = ForeignKeyAccumulator::default();
        let fk_rows = scope
            .fetch(self.connection, ObjectCategory::ForeignKeys, FOREIGN_KEYS_SQL, &params, |row| {
                Ok(ForeignKeyRow {
                    name: row.text(0)?,
                    column: row.text(1)?,
                    referenced_table: row.text(2)?,
                    referenced_column: row.text(3)?,
                    on_delete: row.opt_text(4)?,
                    on_update: row.opt_text(5)?,
                })
            })
            .await?;
        fk_rows.into_iter().for_each(|fk| foreign_keys.add(fk));

        let checks = scope.best_effort(ObjectCategory::CheckConstraints, self.checks(&scope).await)?;

        let mut result = TableSchema {
            columns,
            primary_key: Some(primary_key).filter(|pk| !pk.is_empty()),
            indexes: indexes.finish(),
            foreign_keys: foreign_keys.finish(),
            ..TableSchema::new(&table, &self.source.address(), &schema, &schema)
        };
        attach_checks(&mut result, checks);

        log_table_summary(Dialect::MySql, &result);
        Ok(result)
    }

    async fn extract_stored_procedures(&self, schema_name: Option<&str>) -> Result<Extracted<StoredProcedureSchema>> {
        let schema = self.schema_for(schema_name);
        let scope = Scope::schema(Dialect::MySql, &schema);

        let routines = scope
            .fetch(self.connection, ObjectCategory::StoredProcedures, ROUTINES_SQL, &[schema.as_str()], |row| {
                let routine_type = row.opt_text(1)?.unwrap_or_default();
                let return_type = if routine_type.eq_ignore_ascii_case("FUNCTION") {
                    row.opt_text(3)?.unwrap_or_default()
                } else {
                    String::new()
                };

                Ok(StoredProcedureSchema {
                    name: row.text(0)?,
                    schema_name: schema.clone(),
                    language: row.opt_text(2)?.unwrap_or_default(),
                    parameter_list: row.opt_text(5)?.unwrap_or_default(),
                    return_type,
                    definition_hash: definition_hash(&row.opt_text(4)?.unwrap_or_default()),
                })
            })
            .await;

        scope.best_effort(ObjectCategory::StoredProcedures, routines)
    }

    async fn extract_views(&self, schema_name: Option<&str>) -> Result<Extracted<ViewSchema>> {
        let schema = self.schema_for(schema_name);
        let scope = Scope::schema(Dialect::MySql, &schema);

        let views = self.views(&scope).await;
        scope.best_effort(ObjectCategory::Views, views)
    }

    async fn extract_triggers(&self, schema_name: Option<&str>) -> Result<Extracted<TriggerSchema>> {
        let schema = self.schema_for(schema_name);
        let scope = Scope::schema(Dialect::MySql, &schema);

        let triggers = scope
            .fetch(self.connection, ObjectCategory::Triggers, TRIGGERS_SQL, &[schema.as_str()], |row| {
                Ok(TriggerRow {
                    name: row.text(0)?,
                    table_name: row.text(1)?,
                    event: row.text(2)?,
                    timing: row.opt_text(3)?.unwrap_or_default(),
                    definition: row.opt_text(4)?,
                })
            })
            .await
            .map(|rows| {
                let mut acc = TriggerAccumulator::new(&schema);
                rows.into_iter().for_each(|row| acc.add(row));
                acc.finish()
            });

        scope.best_effort(ObjectCategory::Triggers, triggers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_row;
    use crate::db::memory::MemoryCatalog;
    use pretty_assertions::assert_eq;

    fn source() -> SourceInfo {
        SourceInfo::new("mysql-prod", "shop")
    }

    #[tokio::test]
    async fn test_byte_strings_decoded() {
        let catalog = MemoryCatalog::new()
            .respond(
                "COLUMN_TYPE",
                vec![
                    catalog_row![b"id".to_vec(), b"int".to_vec(), "NO", None::<&str>, None::<i64>, 10i64, 0i64, b"int unsigned".to_vec()],
                    catalog_row![b"email".to_vec(), b"varchar".to_vec(), "YES", b"NULL".to_vec(), 255i64, None::<i64>, None::<i64>, b"varchar(255)".to_vec()],
                ],
            )
            .respond("PRIMARY KEY", vec![catalog_row![b"id".to_vec()]])
            .respond(
                "information_schema.STATISTICS",
                vec![catalog_row![b"uq_email".to_vec(), b"email".to_vec(), 0i64, b"BTREE".to_vec()]],
            );
        let extractor = MysqlExtractor::new(&catalog, source());

        let table = extractor.extract_table_schema("customers", None).await.unwrap();

        assert_eq!(table.schema_name, "shop");
        assert_eq!(table.database_name, "shop");
        assert_eq!(table.columns["id"].data_type, "int unsigned");
        assert_eq!(table.columns["email"].data_type, "varchar(255)");
        assert_eq!(table.columns["email"].max_length, Some(255));
        assert_eq!(table.columns["email"].default_value.as_deref(), Some("NULL"));
        assert_eq!(table.primary_key, Some(vec!["id".to_string()]));
        assert_eq!(table.indexes.len(), 1);
        assert!(table.indexes[0].is_unique);
        assert_eq!(table.indexes[0].index_type, "BTREE");
    }

    #[tokio::test]
    async fn test_multi_column_index_and_foreign_key() {
        let catalog = MemoryCatalog::new()
            .respond(
                "COLUMN_TYPE",
                vec![catalog_row!["order_id", "int", "NO", None::<&str>, None::<i64>, 10i64, 0i64, "int"]],
            )
            .respond(
                "information_schema.STATISTICS",
                vec![
                    catalog_row!["idx_lookup", "store_id", 1i64, "BTREE"],
                    catalog_row!["idx_lookup", "sku", 1i64, "BTREE"],
                ],
            )
            .respond(
                "REFERENTIAL_CONSTRAINTS",
                vec![
                    catalog_row!["fk_item", "store_id", "items", "store_id", "CASCADE", "RESTRICT"],
                    catalog_row!["fk_item", "sku", "items", "sku", "CASCADE", "RESTRICT"],
                ],
            );
        let extractor = MysqlExtractor::new(&catalog, source());

        let table = extractor.extract_table_schema("order_lines", Some("archive")).await.unwrap();

        assert_eq!(table.schema_name, "archive");
        assert_eq!(table.primary_key, None);
        assert_eq!(table.indexes[0].columns, vec!["store_id", "sku"]);
        assert!(!table.indexes[0].is_unique);
        assert_eq!(table.foreign_keys[0].columns, vec!["store_id", "sku"]);
        assert_eq!(table.foreign_keys[0].on_update, "RESTRICT");
    }

    #[tokio::test]
    async fn test_functional_index_key_part() {
        let catalog = MemoryCatalog::new()
            .respond(
                "COLUMN_TYPE",
                vec![catalog_row!["email", "varchar", "NO", None::<&str>, 255i64, None::<i64>, None::<i64>, "varchar(255)"]],
            )
            .respond(
                "COALESCE(COLUMN_NAME, EXPRESSION)",
                vec![catalog_row!["idx_lower_email", "lower(`email`)", 1i64, "BTREE"]],
            );
        let extractor = MysqlExtractor::new(&catalog, source());

        let table = extractor.extract_table_schema("users", None).await.unwrap();

        assert_eq!(table.indexes.len(), 1);
        assert_eq!(table.indexes[0].columns, vec!["lower(`email`)"]);
        assert_eq!(catalog.queries_matching("EXPRESSION").len(), 1);
    }

    #[tokio::test]
    async fn test_index_query_falls_back_without_expression_column() {
        let catalog = MemoryCatalog::new()
            .respond(
                "COLUMN_TYPE",
                vec![catalog_row!["email", "varchar", "NO", None::<&str>, 255i64, None::<i64>, None::<i64>, "varchar(255)"]],
            )
            .respond("information_schema.STATISTICS", vec![catalog_row!["idx_email", "email", 0i64, "BTREE"]])
            .fail("COALESCE(COLUMN_NAME, EXPRESSION)", "Unknown column 'EXPRESSION' in 'field list'");
        let extractor = MysqlExtractor::new(&catalog, SourceInfo::new("mariadb-prod", "shop"));

        let table = extractor.extract_table_schema("users", None).await.unwrap();

        assert_eq!(table.indexes.len(), 1);
        assert_eq!(table.indexes[0].columns, vec!["email"]);
        assert!(table.indexes[0].is_unique);
    }

    #[tokio::test]
    async fn test_old_server_without_check_constraints() {
        let catalog = MemoryCatalog::new()
            .respond(
                "COLUMN_TYPE",
                vec![catalog_row!["id", "int", "NO", None::<&str>, None::<i64>, 10i64, 0i64, "int"]],
            )
            .fail("CHECK_CONSTRAINTS", "Unknown table 'CHECK_CONSTRAINTS' in information_schema");
        let extractor = MysqlExtractor::new(&catalog, source());

        let table = extractor.extract_table_schema("legacy", None).await.unwrap();

        assert!(!table.is_complete());
        assert_eq!(table.incomplete, vec![ObjectCategory::CheckConstraints]);
    }

    #[tokio::test]
    async fn test_routines_return_type_only_for_functions() {
        let catalog = MemoryCatalog::new().respond(
            "information_schema.ROUTINES",
            vec![
                catalog_row!["calc_tax", "FUNCTION", "SQL", "decimal(10,2)", "RETURN amount * 0.2", "amount decimal(10,2)"],
                catalog_row!["refresh_stats", "PROCEDURE", "SQL", None::<&str>, "BEGIN END", "IN since date"],
            ],
        );
        let extractor = MysqlExtractor::new(&catalog, source());

        let routines = extractor.extract_stored_procedures(None).await.unwrap();

        assert_eq!(routines.items[0].return_type, "decimal(10,2)");
        assert_eq!(routines.items[0].language, "SQL");
        assert_eq!(routines.items[1].return_type, "");
        assert_eq!(routines.items[1].parameter_list, "IN since date");
    }

    #[tokio::test]
    async fn test_views_with_nested_column_queries() {
        let catalog = MemoryCatalog::new()
            .respond("information_schema.VIEWS", vec![catalog_row![b"v_orders".to_vec(), b"select 1".to_vec()]])
            .respond("information_schema.COLUMNS", vec![catalog_row![b"id".to_vec()], catalog_row![b"total".to_vec()]]);
        let extractor = MysqlExtractor::new(&catalog, source());

        let views = extractor.extract_views(None).await.unwrap();

        assert_eq!(views.items[0].name, "v_orders");
        assert_eq!(views.items[0].columns, vec!["id", "total"]);
        assert_eq!(views.items[0].definition_hash, definition_hash("select 1"));
    }
}
