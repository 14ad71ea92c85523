//! PostgreSQL catalog extractor

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

const DEFAULT_SCHEMA: &str = "public";

const COLUMNS_SQL: &str = r#"
    SELECT
        column_name::text,
        udt_name::text,
        data_type::text,
        is_nullable::text,
        column_default::text,
        character_maximum_length::int8,
        numeric_precision::int8,
        numeric_scale::int8
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position
"#;

const PRIMARY_KEY_SQL: &str = r#"
    SELECT kcu.column_name::text
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
    WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema = $1
        AND tc.table_name = $2
    ORDER BY kcu.ordinal_position
"#;

const INDEXES_SQL: &str = r#"
    SELECT
        i.relname::text AS index_name,
        a.attname::text AS column_name,
        ix.indisunique AS is_unique,
        am.amname::text AS index_type
    FROM pg_class t
    JOIN pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_index ix ON ix.indrelid = t.oid
    JOIN pg_class i ON i.oid = ix.indexrelid
    JOIN pg_am am ON am.oid = i.relam
    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
    WHERE n.nspname = $1
        AND t.relname = $2
        AND NOT ix.indisprimary
    ORDER BY i.relname, array_position(ix.indkey::int2[], a.attnum)
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        c.conname::text AS constraint_name,
        la.attname::text AS column_name,
        rt.relname::text AS referenced_table,
        ra.attname::text AS referenced_column,
        CASE c.confdeltype
            WHEN 'a' THEN 'NO ACTION' WHEN 'r' THEN 'RESTRICT' WHEN 'c' THEN 'CASCADE'
            WHEN 'n' THEN 'SET NULL' WHEN 'd' THEN 'SET DEFAULT'
        END AS on_delete,
        CASE c.confupdtype
            WHEN 'a' THEN 'NO ACTION' WHEN 'r' THEN 'RESTRICT' WHEN 'c' THEN 'CASCADE'
            WHEN 'n' THEN 'SET NULL' WHEN 'd' THEN 'SET DEFAULT'
        END AS on_update
    FROM pg_constraint c
    JOIN pg_class t ON t.oid = c.conrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_class rt ON rt.oid = c.confrelid
    CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(local_attnum, referenced_attnum, position)
    JOIN pg_attribute la ON la.attrelid = c.conrelid AND la.attnum = k.local_attnum
    JOIN pg_attribute ra ON ra.attrelid = c.confrelid AND ra.attnum = k.referenced_attnum
    WHERE c.contype = 'f'
        AND n.nspname = $1
        AND t.relname = $2
    ORDER BY c.conname, k.position
"#;

const CHECKS_SQL: &str = r#"
    SELECT cc.constraint_name::text, cc.check_clause::text
    FROM information_schema.check_constraints cc
    JOIN information_schema.table_constraints tc
        ON cc.constraint_name = tc.constraint_name
        AND cc.constraint_schema = tc.table_schema
    WHERE tc.table_schema = $1
        AND tc.table_name = $2
        AND tc.constraint_type = 'CHECK'
    ORDER BY cc.constraint_name
"#;

const PROCEDURES_SQL: &str = r#"
    SELECT
        p.proname::text,
        l.lanname::text,
        pg_get_function_arguments(p.oid)::text,
        COALESCE(pg_get_function_result(p.oid), '')::text,
        pg_get_functiondef(p.oid)::text
    FROM pg_proc p
    JOIN pg_namespace n ON n.oid = p.pronamespace
    JOIN pg_language l ON l.oid = p.prolang
    WHERE n.nspname = $1 AND p.prokind IN ('f', 'p')
    ORDER BY p.proname
"#;

const VIEWS_SQL: &str = r#"
    SELECT table_name::text, view_definition::text, false
    FROM information_schema.views
    WHERE table_schema = $1
    UNION ALL
    SELECT matviewname::text, definition::text, true
    FROM pg_matviews
    WHERE schemaname = $1
    ORDER BY 1
"#;

const VIEW_COLUMNS_SQL: &str = r#"
    SELECT a.attname::text
    FROM pg_attribute a
    JOIN pg_class c ON c.oid = a.attrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
        AND c.relname = $2
        AND a.attnum > 0
        AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

const TRIGGERS_SQL: &str = r#"
    SELECT
        trigger_name::text,
        event_object_table::text,
        event_manipulation::text,
        action_timing::text,
        action_statement::text
    FROM information_schema.triggers
    WHERE trigger_schema = $1
    ORDER BY trigger_name, event_object_table, event_manipulation
"#;

/// Reads table metadata from `information_schema` and `pg_catalog`
pub struct PostgresExtractor<'a> {
    connection: &'a dyn CatalogConnection,
    source: SourceInfo,
}

impl<'a> PostgresExtractor<'a> {
    pub fn new(connection: &'a dyn CatalogConnection, source: SourceInfo) -> Self {
        Self { connection, source }
    }

    fn schema_for(&self, schema_name: Option<&str>) -> String {
        requested_schema(Dialect::PostgreSQL, schema_name, &self.source)
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string())
    }

    async fn columns(&self, scope: &Scope<'_>, table: &str) -> Result<IndexMap<String, ColumnSchema>> {
        let columns = scope
            .fetch(self.connection, ObjectCategory::Columns, COLUMNS_SQL, &[scope.schema, table], decode_column)
            .await?;

        Ok(columns.into_iter().map(|c| (c.name.clone(), c)).collect())
    }

    async fn primary_key(&self, scope: &Scope<'_>, table: &str) -> Result<Option<Vec<String>>> {
        let columns = scope
            .fetch(self.connection, ObjectCategory::PrimaryKey, PRIMARY_KEY_SQL, &[scope.schema, table], |row| {
                row.text(0)
            })
            .await?;

        Ok(Some(columns).filter(|c| !c.is_empty()))
    }

    async fn checks(&self, scope: &Scope<'_>, table: &str) -> Result<Vec<CheckConstraintSchema>> {
        let checks = scope
            .fetch(self.connection, ObjectCategory::CheckConstraints, CHECKS_SQL, &[scope.schema, table], |row| {
                Ok(CheckConstraintSchema::new(&row.text(0)?, &row.opt_text(1)?.unwrap_or_default()))
            })
            .await?;

        Ok(checks
            .into_iter()
            .filter(|c| !c.expression.trim().is_empty() && !is_implicit_not_null(&c.expression))
            .collect())
    }

    async fn views(&self, scope: &Scope<'_>) -> Result<Vec<ViewSchema>> {
        let rows = scope
            .fetch(self.connection, ObjectCategory::Views, VIEWS_SQL, &[scope.schema], |row| {
                Ok((row.text(0)?, row.opt_text(1)?.unwrap_or_default(), row.flag(2)?))
            })
            .await?;

        let mut views = Vec::with_capacity(rows.len());
        for (name, definition, is_materialized) in rows {
            let columns = scope
                .fetch(self.connection, ObjectCategory::Views, VIEW_COLUMNS_SQL, &[scope.schema, name.as_str()], |row| {
                    row.text(0)
                })
                .await?;

            views.push(ViewSchema {
                schema_name: scope.schema.to_string(),
                definition_hash: definition_hash(&definition),
                is_materialized,
                columns,
                name,
            });
        }

        Ok(views)
    }
}

fn decode_column(row: &CatalogRow) -> Result<ColumnSchema> {
    let name = row.text(0)?;
    let udt_name = row.opt_text(1)?;
    let data_type = row.text(2)?;
    let max_length = row.opt_i64(5)?;
    let precision = row.opt_i64(6)?;
    let scale = row.opt_i64(7)?;

    let base = udt_name.filter(|udt| !udt.is_empty()).unwrap_or_else(|| data_type.clone());
    let full_type = match (max_length, precision) {
        (Some(len), _) if len > 0 => format!("{}({})", base, len),
        (_, Some(p)) if matches!(data_type.as_str(), "numeric" | "decimal") => {
            format!("{}({},{})", base, p, scale.unwrap_or(0))
        }
        _ => base,
    };

    Ok(ColumnSchema {
        name,
        data_type: full_type,
        is_nullable: row.flag(3)?,
        default_value: row.opt_text(4)?,
        max_length: max_length.filter(|len| *len > 0),
        numeric_precision: precision,
        numeric_scale: scale,
    })
}

#[async_trait]
impl SchemaExtractor for PostgresExtractor<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSQL
    }

    async fn resolve_schema(&self, schema_name: Option<&str>) -> Result<String> {
        Ok(self.schema_for(schema_name))
    }

    async fn extract_table_schema(&self, table_name: &str, schema_name: Option<&str>) -> Result<TableSchema> {
        let schema = self.schema_for(schema_name);
        let table = normalize_identifier(Dialect::PostgreSQL, table_name);
        let scope = Scope::table(Dialect::PostgreSQL, &schema, &table);

        let columns = self.columns(&scope, &table).await?;
        scope.require_columns(&columns)?;

        let primary_key = self.primary_key(&scope, &table).await?;

        let mut indexes = IndexAccumulator::default();
        let index_rows = scope
            .fetch(self.connection, ObjectCategory::Indexes, INDEXES_SQL, &[schema.as_str(), table.as_str()], |row| {
                Ok((row.text(0)?, row.text(1)?, row.flag(2)?, row.opt_text(3)?))
            })
            .await?;
        for (name, column, is_unique, index_type) in index_rows {
            indexes.add(&name, &column, is_unique, index_type.as_deref().unwrap_or("btree"));
        }

        let mut foreign_keys = ForeignKeyAccumulator::default();
        let fk_rows = scope
            .fetch(self.connection, ObjectCategory::ForeignKeys, FOREIGN_KEYS_SQL, &[schema.as_str(), table.as_str()], |row| {
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
        for fk in fk_rows {
            foreign_keys.add(fk);
        }

        let checks = scope.best_effort(
            ObjectCategory::CheckConstraints,
            self.checks(&scope, &table).await,
        )?;

        let mut result = TableSchema {
            columns,
            primary_key,
            indexes: indexes.finish(),
            foreign_keys: foreign_keys.finish(),
            ..TableSchema::new(&table, &self.source.address(), &self.source.database, &schema)
        };
        attach_checks(&mut result, checks);

        log_table_summary(Dialect::PostgreSQL, &result);
        Ok(result)
    }

    async fn extract_stored_procedures(&self, schema_name: Option<&str>) -> Result<Extracted<StoredProcedureSchema>> {
        let schema = self.schema_for(schema_name);
        let scope = Scope::schema(Dialect::PostgreSQL, &schema);

        let procedures = scope
            .fetch(self.connection, ObjectCategory::StoredProcedures, PROCEDURES_SQL, &[schema.as_str()], |row| {
                Ok(StoredProcedureSchema {
                    name: row.text(0)?,
                    schema_name: schema.clone(),
                    language: row.opt_text(1)?.unwrap_or_default(),
                    parameter_list: row.opt_text(2)?.unwrap_or_default(),
                    return_type: row.opt_text(3)?.unwrap_or_default(),
                    definition_hash: definition_hash(&row.opt_text(4)?.unwrap_or_default()),
                })
            })
            .await;

        scope.best_effort(ObjectCategory::StoredProcedures, procedures)
    }

    async fn extract_views(&self, schema_name: Option<&str>) -> Result<Extracted<ViewSchema>> {
        let schema = self.schema_for(schema_name);
        let scope = Scope::schema(Dialect::PostgreSQL, &schema);

        let views = self.views(&scope).await;
        scope.best_effort(ObjectCategory::Views, views)
    }

    async fn extract_triggers(&self, schema_name: Option<&str>) -> Result<Extracted<TriggerSchema>> {
        let schema = self.schema_for(schema_name);
        let scope = Scope::schema(Dialect::PostgreSQL, &schema);

        let rows = scope
            .fetch(self.connection, ObjectCategory::Triggers, TRIGGERS_SQL, &[schema.as_str()], |row| {
                Ok(TriggerRow {
                    name: row.text(0)?,
                    table_name: row.text(1)?,
                    event: row.text(2)?,
                    timing: row.opt_text(3)?.unwrap_or_default(),
                    definition: row.opt_text(4)?,
                })
            })
            .await;

        let triggers = rows.map(|rows| {
            let mut acc = TriggerAccumulator::new(&schema);
            rows.into_iter().for_each(|row| acc.add(row));
            acc.finish()
        });

        scope.best_effort(ObjectCategory::Triggers, triggers)
    }
}
