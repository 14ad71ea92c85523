//! SQL Server catalog extractor

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
use crate::utils::naming::{is_implicit_not_null, normalize_identifier, split_list};

const DEFAULT_SCHEMA: &str = "dbo";

const COLUMNS_SQL: &str = r#"
    SELECT
        COLUMN_NAME,
        DATA_TYPE,
        IS_NULLABLE,
        COLUMN_DEFAULT,
        CAST(CHARACTER_MAXIMUM_LENGTH AS BIGINT),
        CAST(NUMERIC_PRECISION AS BIGINT),
        CAST(NUMERIC_SCALE AS BIGINT)
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
    ORDER BY ORDINAL_POSITION
"#;

const PRIMARY_KEY_SQL: &str = r#"
    SELECT kcu.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
        ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
        AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
        AND tc.TABLE_SCHEMA = @P1
        AND tc.TABLE_NAME = @P2
    ORDER BY kcu.ORDINAL_POSITION
"#;

const INDEXES_SQL: &str = r#"
    SELECT i.name, c.name, i.is_unique, i.type_desc
    FROM sys.indexes i
    JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
    JOIN sys.tables t ON t.object_id = i.object_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    WHERE s.name = @P1
        AND t.name = @P2
        AND i.is_primary_key = 0
        AND i.type > 0
        AND ic.is_included_column = 0
    ORDER BY i.name, ic.key_ordinal
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        fk.name,
        c.name,
        OBJECT_NAME(fk.referenced_object_id),
        rc.name,
        fk.delete_referential_action_desc,
        fk.update_referential_action_desc
    FROM sys.foreign_keys fk
    JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
    JOIN sys.columns c ON c.object_id = fkc.parent_object_id AND c.column_id = fkc.parent_column_id
    JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
    JOIN sys.tables t ON t.object_id = fk.parent_object_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    WHERE s.name = @P1 AND t.name = @P2
    ORDER BY fk.name, fkc.constraint_column_id
"#;

const CHECKS_SQL: &str = r#"
    SELECT cc.name, cc.definition
    FROM sys.check_constraints cc
    JOIN sys.tables t ON t.object_id = cc.parent_object_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    WHERE s.name = @P1 AND t.name = @P2
    ORDER BY cc.name
"#;

const PROCEDURES_SQL: &str = r#"
    SELECT
        o.name,
        CAST((
            SELECT STRING_AGG(CAST(p.name + ' ' + TYPE_NAME(p.user_type_id) AS NVARCHAR(MAX)), ', ')
                WITHIN GROUP (ORDER BY p.parameter_id)
            FROM sys.parameters p
            WHERE p.object_id = o.object_id AND p.parameter_id > 0
        ) AS NVARCHAR(MAX)),
        CASE
            WHEN o.type IN ('IF', 'TF') THEN N'TABLE'
            ELSE (
                SELECT TYPE_NAME(p.user_type_id)
                FROM sys.parameters p
                WHERE p.object_id = o.object_id AND p.parameter_id = 0
            )
        END,
        m.definition
    FROM sys.objects o
    JOIN sys.schemas s ON s.schema_id = o.schema_id
    JOIN sys.sql_modules m ON m.object_id = o.object_id
    WHERE s.name = @P1 AND o.type IN ('P', 'FN', 'IF', 'TF')
    ORDER BY o.name
"#;

const VIEWS_SQL: &str = r#"
    SELECT
        v.name,
        m.definition,
        CAST(OBJECTPROPERTY(v.object_id, 'IsIndexed') AS BIT),
        (
            SELECT STRING_AGG(CAST(c.name AS NVARCHAR(MAX)), ',') WITHIN GROUP (ORDER BY c.column_id)
            FROM sys.columns c
            WHERE c.object_id = v.object_id
        )
    FROM sys.views v
    JOIN sys.schemas s ON s.schema_id = v.schema_id
    LEFT JOIN sys.sql_modules m ON m.object_id = v.object_id
    WHERE s.name = @P1
    ORDER BY v.name
"#;

const TRIGGERS_SQL: &str = r#"
    SELECT
        tr.name,
        t.name,
        te.type_desc,
        CASE WHEN tr.is_instead_of_trigger = 1 THEN 'INSTEAD OF' ELSE 'AFTER' END,
        m.definition
    FROM sys.triggers tr
    JOIN sys.tables t ON t.object_id = tr.parent_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    JOIN sys.trigger_events te ON te.object_id = tr.object_id
    LEFT JOIN sys.sql_modules m ON m.object_id = tr.object_id
    WHERE s.name = @P1
    ORDER BY tr.name, t.name, te.type
"#;

/// Reads table metadata from `INFORMATION_SCHEMA` and the `sys` catalog views
pub struct MssqlExtractor<'a> {
    connection: &'a dyn CatalogConnection,
    source: SourceInfo,
}

impl<'a> MssqlExtractor<'a> {
    pub fn new(connection: &'a dyn CatalogConnection, source: SourceInfo) -> Self {
        Self { connection, source }
    }

    fn schema_for(&self, schema_name: Option<&str>) -> String {
        requested_schema(Dialect::SqlServer, schema_name, &self.source)
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string())
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
}

fn decode_column(row: &CatalogRow) -> Result<ColumnSchema> {
    let data_type = row.text(1)?;
    let max_length = row.opt_i64(4)?;
    let precision = row.opt_i64(5)?;
    let scale = row.opt_i64(6)?;

    let full_type = match (max_length, precision) {
        (Some(-1), _) => format!("{}(max)", data_type),
        (Some(len), _) if len > 0 => format!("{}({})", data_type, len),
        (_, Some(p)) if matches!(data_type.as_str(), "numeric" | "decimal") => {
            format!("{}({},{})", data_type, p, scale.unwrap_or(0))
        }
        _ => data_type,
    };

    Ok(ColumnSchema {
        name: row.text(0)?,
        data_type: full_type,
        is_nullable: row.flag(2)?,
        default_value: row.opt_text(3)?,
        max_length: max_length.filter(|len| *len > 0),
        numeric_precision: precision,
        numeric_scale: scale,
    })
}

#[async_trait]
impl SchemaExtractor for MssqlExtractor<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    async fn resolve_schema(&self, schema_name: Option<&str>) -> Result<String> {
        Ok(self.schema_for(schema_name))
    }

    async fn extract_table_schema(&self, table_name: &str, schema_name: Option<&str>) -> Result<TableSchema> {
        let schema = self.schema_for(schema_name);
        let table = normalize_identifier(Dialect::SqlServer, table_name);
        let scope = Scope::table(Dialect::SqlServer, &schema, &table);
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
                Ok((row.text(0)?, row.text(1)?, row.flag(2)?, row.opt_text(3)?))
            })
            .await?;
        for (name, column, is_unique, index_type) in index_rows {
            indexes.add(&name, &column, is_unique, index_type.as_deref().unwrap_or("NONCLUSTERED"));
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
            ..TableSchema::new(&table, &self.source.address(), &self.source.database, &schema)
        };
        attach_checks(&mut result, checks);

        log_table_summary(Dialect::SqlServer, &result);
        Ok(result)
    }

    async fn extract_stored_procedures(&self, schema_name: Option<&str>) -> Result<Extracted<StoredProcedureSchema>> {
        let schema = self.schema_for(schema_name);
        let scope = Scope::schema(Dialect::SqlServer, &schema);

        let procedures = scope
            .fetch(self.connection, ObjectCategory::StoredProcedures, PROCEDURES_SQL, &[schema.as_str()], |row| {
                Ok(StoredProcedureSchema {
                    name: row.text(0)?,
                    schema_name: schema.clone(),
                    language: "tsql".to_string(),
                    parameter_list: row.opt_text(1)?.unwrap_or_default(),
                    return_type: row.opt_text(2)?.unwrap_or_default(),
                    definition_hash: definition_hash(&row.opt_text(3)?.unwrap_or_default()),
                })
            })
            .await;

        scope.best_effort(ObjectCategory::StoredProcedures, procedures)
    }

    async fn extract_views(&self, schema_name: Option<&str>) -> Result<Extracted<ViewSchema>> {
        let schema = self.schema_for(schema_name);
        let scope = Scope::schema(Dialect::SqlServer, &schema);

        let views = scope
            .fetch(self.connection, ObjectCategory::Views, VIEWS_SQL, &[schema.as_str()], |row| {
                Ok(ViewSchema {
                    name: row.text(0)?,
                    schema_name: schema.clone(),
                    definition_hash: definition_hash(&row.opt_text(1)?.unwrap_or_default()),
                    is_materialized: row.flag(2)?,
                    columns: split_list(&row.opt_text(3)?.unwrap_or_default()),
                })
            })
            .await;

        scope.best_effort(ObjectCategory::Views, views)
    }

    async fn extract_triggers(&self, schema_name: Option<&str>) -> Result<Extracted<TriggerSchema>> {
        let schema = self.schema_for(schema_name);
        let scope = Scope::schema(Dialect::SqlServer, &schema);

        let triggers = scope
            .fetch(self.connection, ObjectCategory::Triggers, TRIGGERS_SQL, &[schema.as_str()], |row| {
                Ok(TriggerRow {
                    name: row.text(0)?,
                    table_name: row.text(1)?,
                    event: row.text(2)?,
                    timing: row.text(3)?,
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
        SourceInfo::new("sql-uat", "Sales")
    }

    #[tokio::test]
    async fn test_extract_table_schema() {
        let catalog = MemoryCatalog::new()
            .respond(
                "INFORMATION_SCHEMA.COLUMNS",
                vec![
                    catalog_row!["OrderId", "int", "NO", None::<&str>, None::<i64>, 10i64, 0i64],
                    catalog_row!["Notes", "nvarchar", "YES", None::<&str>, -1i64, None::<i64>, None::<i64>],
                    catalog_row!["Code", "varchar", "NO", "('X')", 12i64, None::<i64>, None::<i64>],
                    catalog_row!["Total", "decimal", "NO", "((0))", None::<i64>, 18i64, 4i64],
                ],
            )
            .respond("PRIMARY KEY", vec![catalog_row!["OrderId"]])
            .respond(
                "sys.indexes",
                vec![
                    catalog_row!["IX_Orders_Customer", "CustomerId", false, "NONCLUSTERED"],
                    catalog_row!["IX_Orders_Customer", "OrderDate", false, "NONCLUSTERED"],
                ],
            )
            .respond(
                "sys.foreign_keys",
                vec![catalog_row!["FK_Orders_Customers", "CustomerId", "Customers", "Id", "SET_NULL", "NO_ACTION"]],
            )
            .respond(
                "sys.check_constraints",
                vec![
                    catalog_row!["CK_Orders_Total", "([Total]>=(0))"],
                    catalog_row!["CK_Orders_Code", "([Code] IS NOT NULL)"],
                ],
            );
        let extractor = MssqlExtractor::new(&catalog, source());

        let table = extractor.extract_table_schema("[Orders]", None).await.unwrap();

        assert_eq!(table.table_name, "Orders");
        assert_eq!(table.schema_name, "dbo");
        assert_eq!(table.columns["Notes"].data_type, "nvarchar(max)");
        assert_eq!(table.columns["Notes"].max_length, None);
        assert_eq!(table.columns["Code"].data_type, "varchar(12)");
        assert_eq!(table.columns["Total"].data_type, "decimal(18,4)");
        assert_eq!(table.columns["OrderId"].data_type, "int");
        assert_eq!(table.primary_key, Some(vec!["OrderId".to_string()]));
        assert_eq!(table.indexes[0].columns, vec!["CustomerId", "OrderDate"]);
        assert_eq!(table.indexes[0].index_type, "NONCLUSTERED");
        assert_eq!(table.foreign_keys[0].on_delete, "SET NULL");
        assert_eq!(table.foreign_keys[0].on_update, "NO ACTION");
        assert_eq!(table.check_constraints.len(), 1);
        assert_eq!(table.check_constraints[0].name, "CK_Orders_Total");

        let query = &catalog.queries_matching("INFORMATION_SCHEMA.COLUMNS")[0];
        assert_eq!(query.params, vec!["dbo".to_string(), "Orders".to_string()]);
    }

    #[tokio::test]
    async fn test_views_split_column_list() {
        let catalog = MemoryCatalog::new().respond(
            "sys.views",
            vec![catalog_row!["vw_ActiveOrders", "CREATE VIEW vw_ActiveOrders AS SELECT id, name FROM Orders", 0i64, "id,name"]],
        );
        let extractor = MssqlExtractor::new(&catalog, source());

        let views = extractor.extract_views(Some("[sales]")).await.unwrap();

        assert_eq!(views.items[0].columns, vec!["id", "name"]);
        assert!(!views.items[0].is_materialized);
        assert_eq!(views.items[0].schema_name, "sales");

        let query = &catalog.queries_matching("sys.views")[0];
        assert!(query.sql.contains("STRING_AGG(CAST(c.name AS NVARCHAR(MAX)), ',')"));
    }

    #[tokio::test]
    async fn test_triggers_and_procedures() {
        let catalog = MemoryCatalog::new()
            .respond(
                "sys.triggers",
                vec![
                    catalog_row!["trg_Orders_Audit", "Orders", "INSERT", "AFTER", "CREATE TRIGGER trg_Orders_Audit ..."],
                    catalog_row!["trg_Orders_Audit", "Orders", "UPDATE", "AFTER", "CREATE TRIGGER trg_Orders_Audit ..."],
                    catalog_row!["trg_Orders_Block", "Orders", "DELETE", "INSTEAD OF", "CREATE TRIGGER trg_Orders_Block ..."],
                ],
            )
            .respond(
                "sys.objects",
                vec![catalog_row!["usp_GetOrder", "@OrderId int", None::<&str>, "CREATE PROCEDURE usp_GetOrder @OrderId int AS SELECT 1"]],
            );
        let extractor = MssqlExtractor::new(&catalog, source());

        let triggers = extractor.extract_triggers(None).await.unwrap();
        assert_eq!(triggers.items.len(), 2);
        assert_eq!(triggers.items[0].event, "INSERT,UPDATE");
        assert_eq!(triggers.items[1].timing, "INSTEAD OF");

        let procedures = extractor.extract_stored_procedures(None).await.unwrap();
        assert_eq!(procedures.items[0].language, "tsql");
        assert_eq!(procedures.items[0].parameter_list, "@OrderId int");
        assert_eq!(procedures.items[0].return_type, "");
    }

    #[tokio::test]
    async fn test_view_failure_degrades() {
        let catalog = MemoryCatalog::new().fail("sys.views", "VIEW DEFINITION permission denied");
        let extractor = MssqlExtractor::new(&catalog, source());

        let views = extractor.extract_views(None).await.unwrap();

        assert!(views.items.is_empty());
        assert!(views.failure.unwrap().contains("permission denied"));
    }
}
