use pretty_assertions::assert_eq;
use rstest::rstest;

use schema_drift::catalog_row;
use schema_drift::schema::ObjectCategory;
use schema_drift::{get_schema_extractor, CatalogRow, Dialect, Error, MemoryCatalog, SchemaComparator, SourceInfo};

fn scripted(dialect: Dialect) -> MemoryCatalog {
    match dialect {
        Dialect::PostgreSQL => MemoryCatalog::new()
            .respond(
                "information_schema.columns",
                vec![
                    catalog_row!["id", "int8", "bigint", "NO", None::<&str>, None::<i64>, 64i64, 0i64],
                    catalog_row!["total", "numeric", "numeric", "YES", "0", None::<i64>, 10i64, 2i64],
                ],
            )
            .respond("PRIMARY KEY", vec![catalog_row!["id"]])
            .respond("pg_index", vec![catalog_row!["orders_total_idx", "total", false, "btree"]]),
        Dialect::SqlServer => MemoryCatalog::new()
            .respond(
                "INFORMATION_SCHEMA.COLUMNS",
                vec![
                    catalog_row!["id", "bigint", "NO", None::<&str>, None::<i64>, 19i64, 0i64],
                    catalog_row!["note", "nvarchar", "YES", None::<&str>, -1i64, None::<i64>, None::<i64>],
                ],
            )
            .respond("PRIMARY KEY", vec![catalog_row!["id"]]),
        Dialect::MySql => MemoryCatalog::new()
            .respond(
                "COLUMN_TYPE",
                vec![catalog_row![
                    b"id".to_vec(), b"bigint".to_vec(), b"NO".to_vec(), None::<&str>, None::<i64>, 19i64, 0i64, b"bigint".to_vec()
                ]],
            )
            .respond("PRIMARY KEY", vec![catalog_row![b"id".to_vec()]]),
        Dialect::Oracle => MemoryCatalog::new()
            .respond(
                "data_precision",
                vec![catalog_row!["ID", "NUMBER", "N", None::<&str>, 0i64, 19i64, 0i64]],
            )
            .respond("c.constraint_type = 'P'", vec![catalog_row!["ID"]]),
    }
}

#[rstest]
#[case("postgres", Dialect::PostgreSQL, "public")]
#[case("sqlserver", Dialect::SqlServer, "dbo")]
#[case("mariadb", Dialect::MySql, "shop")]
#[case("oracledb", Dialect::Oracle, "SHOP")]
#[tokio::test]
async fn test_extraction_is_stable(#[case] identifier: &str, #[case] dialect: Dialect, #[case] schema: &str) {
    let catalog = scripted(dialect);
    let mut source = SourceInfo::new("db-host", "shop");
    if dialect == Dialect::Oracle {
        source = source.with_default_schema("shop");
    }
    let extractor = get_schema_extractor(identifier, &catalog, source).unwrap();

    let first = extractor.extract_table_schema("orders", None).await.unwrap();
    let second = extractor.extract_table_schema("orders", None).await.unwrap();

    assert_eq!(first.schema_name, schema);
    assert!(first.primary_key.is_some());
    assert_eq!(first, second);

    let result = SchemaComparator::new(true).compare(&first, &second, "before", "after");
    assert!(result.is_match());
    assert_eq!(result.total_differences(), 0);
}

#[tokio::test]
async fn test_sql_server_max_length() {
    let catalog = scripted(Dialect::SqlServer);
    let extractor = get_schema_extractor("mssql", &catalog, SourceInfo::new("mssql-prod", "Sales")).unwrap();

    let table = extractor.extract_table_schema("[orders]", None).await.unwrap();

    assert_eq!(table.table_name, "orders");
    assert_eq!(table.columns["note"].data_type, "nvarchar(max)");
    assert_eq!(table.columns["note"].max_length, None);
}

#[tokio::test]
async fn test_mandatory_failure_aborts_extraction() {
    let catalog = scripted(Dialect::PostgreSQL).fail("pg_constraint", "permission denied for table pg_constraint");
    let extractor = get_schema_extractor("pg", &catalog, SourceInfo::new("pg-prod", "app")).unwrap();

    match extractor.extract_table_schema("orders", None).await.unwrap_err() {
        Error::MetadataQueryFailure { dialect, category, object, .. } => {
            assert_eq!(dialect, Dialect::PostgreSQL);
            assert_eq!(category, ObjectCategory::ForeignKeys);
            assert_eq!(object, "public.orders");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_is_never_degraded() {
    let catalog = MemoryCatalog::new().disconnect("information_schema.TRIGGERS", "Lost connection to MySQL server");
    let extractor = get_schema_extractor("mysql", &catalog, SourceInfo::new("mysql-prod", "shop")).unwrap();

    let err = extractor.extract_triggers(None).await.unwrap_err();
    assert!(err.is_connection_failure());
}

#[test]
fn test_unsupported_dialect() {
    let catalog = MemoryCatalog::new();
    let result = get_schema_extractor("sqlite", &catalog, SourceInfo::new("localhost", "app"));

    assert!(matches!(result, Err(Error::UnsupportedDialect(name)) if name == "sqlite"));
}

#[test]
fn test_catalog_rows_decode_bytes() {
    let row: CatalogRow = catalog_row![b"varchar(255)".to_vec(), None::<&str>];
    assert_eq!(row.text(0).unwrap(), "varchar(255)");
    assert_eq!(row.opt_text(1).unwrap(), None);
}
