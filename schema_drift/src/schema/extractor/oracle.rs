//! Oracle catalog extractor
//!
//! Reads the `ALL_*` dictionary views, so only objects visible to the
//! connected user are reported. Owners and object names are stored upper-case
//! unless they were created quoted.

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{
    attach_checks, log_table_summary, requested_schema, Dialect, ForeignKeyAccumulator, ForeignKeyRow,
    IndexAccumulator, SchemaExtractor, Scope, SourceInfo, TriggerAccumulator, TriggerRow,
};
use crate::db::connection::{CatalogConnection, CatalogRow};
use crate::error::{Error, Result};
use crate::schema::types::{
    definition_hash, CheckConstraintSchema, ColumnSchema, Extracted, ObjectCategory, SchemaObjects,
    StoredProcedureSchema, TableSchema, TriggerSchema, ViewSchema,
};
use crate::utils::naming::{is_implicit_not_null, normalize_identifier};

const CURRENT_SCHEMA_SQL: &str = "SELECT SYS_CONTEXT('USERENV', 'CURRENT_SCHEMA') FROM dual";

// Object name reported while the session schema is unresolved
const SESSION_SCHEMA: &str = "CURRENT_SCHEMA";

const COLUMNS_SQL: &str = r#"
    SELECT
        column_name,
        data_type,
        nullable,
        data_default,
        char_length,
        data_precision,
        data_scale
    FROM all_tab_columns
    WHERE owner = :1 AND table_name = :2
    ORDER BY column_id
"#;

const PRIMARY_KEY_SQL: &str = r#"
    SELECT cc.column_name
    FROM all_constraints c
    JOIN all_cons_columns cc
        ON cc.owner = c.owner
        AND cc.constraint_name = c.constraint_name
    WHERE c.constraint_type = 'P'
        AND c.owner = :1
        AND c.table_name = :2
    ORDER BY cc.position
"#;

const INDEXES_SQL: &str = r#"
    SELECT i.index_name, ic.column_name, i.uniqueness, i.index_type
    FROM all_indexes i
    JOIN all_ind_columns ic
        ON ic.index_owner = i.owner
        AND ic.index_name = i.index_name
    WHERE i.table_owner = :1
        AND i.table_name = :2
        AND NOT EXISTS (
            SELECT 1
            FROM all_constraints pk
            WHERE pk.constraint_type = 'P'
                AND pk.owner = i.table_owner
                AND pk.table_name = i.table_name
                AND pk.index_name = i.index_name
        )
    ORDER BY i.index_name, ic.column_position
"#;

// Oracle has no ON UPDATE clause, so only the delete rule is read
const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        c.constraint_name,
        cc.column_name,
        rc.table_name,
        rcc.column_name,
        c.delete_rule
    FROM all_constraints c
    JOIN all_cons_columns cc
        ON cc.owner = c.owner
        AND cc.constraint_name = c.constraint_name
    JOIN all_constraints rc
        ON rc.owner = c.r_owner
        AND rc.constraint_name = c.r_constraint_name
    JOIN all_cons_columns rcc
        ON rcc.owner = rc.owner
        AND rcc.constraint_name = rc.constraint_name
        AND rcc.position = cc.position
    WHERE c.constraint_type = 'R'
        AND c.owner = :1
        AND c.table_name = :2
    ORDER BY c.constraint_name, cc.position
"#;

const CHECKS_SQL: &str = r#"
    SELECT c.constraint_name, c.search_condition
    FROM all_constraints c
    WHERE c.constraint_type = 'C'
        AND c.owner = :1
        AND c.table_name = :2
    ORDER BY c.constraint_name
"#;

const SOURCE_SQL: &str = r#"
    SELECT name, type, text
    FROM all_source
    WHERE owner = :1 AND type IN ('PROCEDURE', 'FUNCTION')
    ORDER BY name, type, line
"#;

const ARGUMENTS_SQL: &str = r#"
    SELECT object_name, argument_name, in_out, data_type, position
    FROM all_arguments
    WHERE owner = :1 AND package_name IS NULL AND data_level = 0
    ORDER BY object_name, sequence
"#;

const VIEWS_SQL: &str = r#"
    SELECT view_name, text
    FROM all_views
    WHERE owner = :1
    ORDER BY view_name
"#;

const MATERIALIZED_VIEWS_SQL: &str = r#"
    SELECT mview_name, query
    FROM all_mviews
    WHERE owner = :1
    ORDER BY mview_name
"#;

const VIEW_COLUMNS_SQL: &str = r#"
    SELECT column_name
    FROM all_tab_columns
    WHERE owner = :1 AND table_name = :2
    ORDER BY column_id
"#;

const TRIGGERS_SQL: &str = r#"
    SELECT trigger_name, table_name, triggering_event, trigger_type, trigger_body
    FROM all_triggers
    WHERE owner = :1
    ORDER BY trigger_name
"#;

/// Reads table metadata from the Oracle data dictionary
pub struct OracleExtractor<'a> {
    connection: &'a dyn CatalogConnection,
    source: SourceInfo,
}

impl<'a> OracleExtractor<'a> {
    pub fn new(connection: &'a dyn CatalogConnection, source: SourceInfo) -> Self {
        Self { connection, source }
    }

    /// Explicit or configured schema, else the session's current schema
    async fn schema_for(&self, schema_name: Option<&str>, category: ObjectCategory) -> Result<String> {
        if let Some(schema) = requested_schema(Dialect::Oracle, schema_name, &self.source) {
            return Ok(schema);
        }

        let scope = Scope::schema(Dialect::Oracle, SESSION_SCHEMA);
        scope
            .fetch(self.connection, category, CURRENT_SCHEMA_SQL, &[], |row| row.text(0))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                scope.query_failure(category, Error::CatalogValue("Session has no current schema".to_string()))
            })
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

    async fn routines(&self, scope: &Scope<'_>) -> Result<Vec<StoredProcedureSchema>> {
        let lines = scope
            .fetch(self.connection, ObjectCategory::StoredProcedures, SOURCE_SQL, &[scope.schema], |row| {
                Ok((row.text(0)?, row.text(1)?, row.opt_text(2)?.unwrap_or_default()))
            })
            .await?;

        let arguments = scope
            .fetch(self.connection, ObjectCategory::StoredProcedures, ARGUMENTS_SQL, &[scope.schema], |row| {
                Ok(ArgumentRow {
                    object_name: row.text(0)?,
                    argument_name: row.opt_text(1)?,
                    in_out: row.opt_text(2)?.unwrap_or_default(),
                    data_type: row.opt_text(3)?.unwrap_or_default(),
                    position: row.opt_i64(4)?.unwrap_or_default(),
                })
            })
            .await?;

        let mut sources = SourceAccumulator::default();
        for (name, kind, text) in lines {
            sources.add(&name, &kind, &text);
        }

        Ok(sources.finish(scope.schema, &arguments))
    }

    async fn views(&self, scope: &Scope<'_>) -> Result<Vec<ViewSchema>> {
        let decode = |row: &CatalogRow| -> Result<(String, String)> {
            Ok((row.text(0)?, row.opt_text(1)?.unwrap_or_default()))
        };
        let plain = scope
            .fetch(self.connection, ObjectCategory::Views, VIEWS_SQL, &[scope.schema], decode)
            .await?;
        let materialized = scope
            .fetch(self.connection, ObjectCategory::Views, MATERIALIZED_VIEWS_SQL, &[scope.schema], decode)
            .await?;

        let all = plain
            .into_iter()
            .map(|view| (view, false))
            .chain(materialized.into_iter().map(|view| (view, true)));

        let mut views = Vec::new();
        for ((name, definition), is_materialized) in all {
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
    let base = row.text(1)?;
    let char_length = row.opt_i64(4)?.filter(|len| *len > 0);
    let precision = row.opt_i64(5)?;
    let scale = row.opt_i64(6)?;

    let data_type = match (base.as_str(), char_length, precision) {
        ("VARCHAR2" | "NVARCHAR2" | "CHAR" | "NCHAR" | "RAW", Some(len), _) => format!("{base}({len})"),
        ("NUMBER", _, Some(p)) => format!("{base}({p},{})", scale.unwrap_or_default()),
        _ => base,
    };

    Ok(ColumnSchema {
        name: row.text(0)?,
        data_type,
        is_nullable: row.flag(2)?,
        default_value: row
            .opt_text(3)?
            .map(|default| default.trim().to_string())
            .filter(|default| !default.is_empty()),
        max_length: char_length,
        numeric_precision: precision,
        numeric_scale: scale,
    })
}

/// `INSERT OR UPDATE` becomes `INSERT,UPDATE`
fn trigger_events(triggering_event: &str) -> String {
    triggering_event
        .split(" OR ")
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
}

/// `BEFORE EACH ROW` becomes `BEFORE`; `INSTEAD OF` is kept whole
fn trigger_timing(trigger_type: &str) -> String {
    let trigger_type = trigger_type.trim().to_uppercase();
    if trigger_type.starts_with("INSTEAD OF") {
        return "INSTEAD OF".to_string();
    }
    trigger_type.split_whitespace().next().unwrap_or_default().to_string()
}

#[derive(Debug, Clone)]
struct ArgumentRow {
    object_name: String,
    argument_name: Option<String>,
    in_out: String,
    data_type: String,
    position: i64,
}

/// Reassembles routine source from `all_source` lines keyed by name and type
#[derive(Debug, Default)]
struct SourceAccumulator {
    sources: IndexMap<(String, String), String>,
}

impl SourceAccumulator {
    fn add(&mut self, name: &str, kind: &str, text: &str) {
        self.sources
            .entry((name.to_string(), kind.to_string()))
            .or_default()
            .push_str(text);
    }

    fn finish(self, schema_name: &str, arguments: &[ArgumentRow]) -> Vec<StoredProcedureSchema> {
        self.sources
            .into_iter()
            .map(|((name, kind), source)| {
                let own = arguments.iter().filter(|arg| arg.object_name == name);

                let parameter_list = own
                    .clone()
                    .filter_map(|arg| {
                        arg.argument_name
                            .as_ref()
                            .map(|arg_name| format!("{} {} {}", arg_name, arg.in_out, arg.data_type))
                    })
                    .collect::<Vec<_>>()
                    .join(", ");

                let return_type = if kind == "FUNCTION" {
                    own.clone()
                        .find(|arg| arg.position == 0 && arg.argument_name.is_none())
                        .map(|arg| arg.data_type.clone())
                        .unwrap_or_default()
                } else {
                    String::new()
                };

                StoredProcedureSchema {
                    name,
                    schema_name: schema_name.to_string(),
                    language: "PL/SQL".to_string(),
                    parameter_list,
                    return_type,
                    definition_hash: definition_hash(&source),
                }
            })
            .collect()
    }
}

#[async_trait]
impl SchemaExtractor for OracleExtractor<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::Oracle
    }

    async fn resolve_schema(&self, schema_name: Option<&str>) -> Result<String> {
        self.schema_for(schema_name, ObjectCategory::Columns).await
    }

    async fn extract_table_schema(&self, table_name: &str, schema_name: Option<&str>) -> Result<TableSchema> {
        let schema = self.schema_for(schema_name, ObjectCategory::Columns).await?;
        let table = normalize_identifier(Dialect::Oracle, table_name);
        let scope = Scope::table(Dialect::Oracle, &schema, &table);
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
        let index_rows = scope
            .fetch(self.connection, ObjectCategory::Indexes, INDEXES_SQL, &params, |row| {
                let uniqueness = row.opt_text(2)?.unwrap_or_default();
                Ok((row.text(0)?, row.text(1)?, uniqueness.eq_ignore_ascii_case("UNIQUE"), row.opt_text(3)?))
            })
            .await?;
        for (name, column, is_unique, index_type) in index_rows {
            indexes.add(&name, &column, is_unique, index_type.as_deref().unwrap_or("NORMAL"));
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
                    on_update: None,
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
            ..TableSchema::new(&table, &self.source.address(), &self.source.database, &schema)
        };
        attach_checks(&mut result, checks);

        log_table_summary(Dialect::Oracle, &result);
        Ok(result)
    }

    async fn extract_stored_procedures(&self, schema_name: Option<&str>) -> Result<Extracted<StoredProcedureSchema>> {
        let schema = match self.schema_for(schema_name, ObjectCategory::StoredProcedures).await {
            Ok(schema) => schema,
            Err(error) => {
                return Scope::schema(Dialect::Oracle, SESSION_SCHEMA).best_effort(ObjectCategory::StoredProcedures, Err(error))
            }
        };
        let scope = Scope::schema(Dialect::Oracle, &schema);

        let routines = self.routines(&scope).await;
        scope.best_effort(ObjectCategory::StoredProcedures, routines)
    }

    async fn extract_views(&self, schema_name: Option<&str>) -> Result<Extracted<ViewSchema>> {
        let schema = match self.schema_for(schema_name, ObjectCategory::Views).await {
            Ok(schema) => schema,
            Err(error) => {
                return Scope::schema(Dialect::Oracle, SESSION_SCHEMA).best_effort(ObjectCategory::Views, Err(error))
            }
        };
        let scope = Scope::schema(Dialect::Oracle, &schema);

        let views = self.views(&scope).await;
        scope.best_effort(ObjectCategory::Views, views)
    }

    async fn extract_triggers(&self, schema_name: Option<&str>) -> Result<Extracted<TriggerSchema>> {
        let schema = match self.schema_for(schema_name, ObjectCategory::Triggers).await {
            Ok(schema) => schema,
            Err(error) => {
                return Scope::schema(Dialect::Oracle, SESSION_SCHEMA).best_effort(ObjectCategory::Triggers, Err(error))
            }
        };
        let scope = Scope::schema(Dialect::Oracle, &schema);

        let triggers = scope
            .fetch(self.connection, ObjectCategory::Triggers, TRIGGERS_SQL, &[schema.as_str()], |row| {
                Ok(TriggerRow {
                    name: row.text(0)?,
                    table_name: row.opt_text(1)?.unwrap_or_default(),
                    event: trigger_events(&row.opt_text(2)?.unwrap_or_default()),
                    timing: trigger_timing(&row.opt_text(3)?.unwrap_or_default()),
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

    /// An unresolvable session schema leaves all three inventories undetermined
    async fn extract_objects(&self, schema_name: Option<&str>) -> Result<SchemaObjects> {
        let schema = match self.schema_for(schema_name, ObjectCategory::StoredProcedures).await {
            Ok(schema) => schema,
            Err(error) if error.is_connection_failure() => return Err(error),
            Err(error) => {
                let message = error.to_string();
                let scope = Scope::schema(Dialect::Oracle, SESSION_SCHEMA);
                return Ok(SchemaObjects {
                    schema_name: String::new(),
                    stored_procedures: scope.best_effort(ObjectCategory::StoredProcedures, Err(error))?,
                    views: Extracted::failed(message.clone()),
                    triggers: Extracted::failed(message),
                });
            }
        };

        Ok(SchemaObjects {
            stored_procedures: self.extract_stored_procedures(Some(&schema)).await?,
            views: self.extract_views(Some(&schema)).await?,
            triggers: self.extract_triggers(Some(&schema)).await?,
            schema_name: schema,
        })
    }
}
