//! Catalog connection handling
//!
//! Extractors only ever need one thing from a database: run a parameterized
//! catalog query and hand back the rows. [`CatalogConnection`] is that
//! capability. Driver values are converted into [`CatalogValue`] at this
//! boundary so byte buffers and driver types never reach the schema model.

use async_trait::async_trait;
use sqlx::{
    mysql::MySqlRow, postgres::PgRow, Column, MySql, Pool, Postgres, Row, TypeInfo, ValueRef,
};

use crate::error::{Error, Result};

/// A single value read from a catalog query
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl CatalogValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CatalogValue::Null)
    }

    /// Textual form of the value; byte strings must be valid UTF-8
    pub fn as_text(&self) -> Result<Option<String>> {
        match self {
            CatalogValue::Null => Ok(None),
            CatalogValue::Bool(b) => Ok(Some(b.to_string())),
            CatalogValue::Int(i) => Ok(Some(i.to_string())),
            CatalogValue::Text(s) => Ok(Some(s.clone())),
            CatalogValue::Bytes(bytes) => String::from_utf8(bytes.clone())
                .map(Some)
                .map_err(|e| Error::CatalogValue(format!("Invalid UTF-8 in catalog value: {}", e))),
        }
    }

    pub fn as_i64(&self) -> Result<Option<i64>> {
        match self {
            CatalogValue::Null => Ok(None),
            CatalogValue::Bool(b) => Ok(Some(i64::from(*b))),
            CatalogValue::Int(i) => Ok(Some(*i)),
            CatalogValue::Text(_) | CatalogValue::Bytes(_) => {
                let text = self.as_text()?.unwrap_or_default();
                text.trim()
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|_| Error::CatalogValue(format!("Expected an integer, got '{}'", text)))
            }
        }
    }

    /// Truthiness of catalog flags: booleans, non-zero integers, and the
    /// `YES`/`Y`/`TRUE`/`1` spellings catalogs use for yes/no columns
    pub fn as_flag(&self) -> Result<bool> {
        match self {
            CatalogValue::Null => Ok(false),
            CatalogValue::Bool(b) => Ok(*b),
            CatalogValue::Int(i) => Ok(*i != 0),
            CatalogValue::Text(_) | CatalogValue::Bytes(_) => {
                let text = self.as_text()?.unwrap_or_default();
                Ok(matches!(
                    text.trim().to_ascii_uppercase().as_str(),
                    "YES" | "Y" | "TRUE" | "T" | "1"
                ))
            }
        }
    }
}

impl From<&str> for CatalogValue {
    fn from(value: &str) -> Self {
        CatalogValue::Text(value.to_string())
    }
}

impl From<String> for CatalogValue {
    fn from(value: String) -> Self {
        CatalogValue::Text(value)
    }
}

impl From<i64> for CatalogValue {
    fn from(value: i64) -> Self {
        CatalogValue::Int(value)
    }
}

impl From<i32> for CatalogValue {
    fn from(value: i32) -> Self {
        CatalogValue::Int(i64::from(value))
    }
}

impl From<bool> for CatalogValue {
    fn from(value: bool) -> Self {
        CatalogValue::Bool(value)
    }
}

impl From<Vec<u8>> for CatalogValue {
    fn from(value: Vec<u8>) -> Self {
        CatalogValue::Bytes(value)
    }
}

impl From<&[u8]> for CatalogValue {
    fn from(value: &[u8]) -> Self {
        CatalogValue::Bytes(value.to_vec())
    }
}

impl<T: Into<CatalogValue>> From<Option<T>> for CatalogValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CatalogValue::Null, Into::into)
    }
}

/// One positional row of a catalog query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogRow {
    values: Vec<CatalogValue>,
}

impl CatalogRow {
    pub fn new(values: Vec<CatalogValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[CatalogValue] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Result<&CatalogValue> {
        self.values.get(idx).ok_or_else(|| {
            Error::CatalogValue(format!(
                "Catalog row has {} values, column {} requested",
                self.values.len(),
                idx
            ))
        })
    }

    /// Required text value; NULL is an error
    pub fn text(&self, idx: usize) -> Result<String> {
        self.get(idx)?
            .as_text()?
            .ok_or_else(|| Error::CatalogValue(format!("Unexpected NULL in column {}", idx)))
    }

    pub fn opt_text(&self, idx: usize) -> Result<Option<String>> {
        self.get(idx)?.as_text()
    }

    pub fn opt_i64(&self, idx: usize) -> Result<Option<i64>> {
        self.get(idx)?.as_i64()
    }

    /// Boolean flag; NULL reads as false
    pub fn flag(&self, idx: usize) -> Result<bool> {
        self.get(idx)?.as_flag()
    }
}

impl From<Vec<CatalogValue>> for CatalogRow {
    fn from(values: Vec<CatalogValue>) -> Self {
        Self::new(values)
    }
}

/// Build a [`CatalogRow`] from anything convertible into [`CatalogValue`]
#[macro_export]
macro_rules! catalog_row {
    ($($value:expr),* $(,)?) => {
        $crate::db::connection::CatalogRow::new(vec![
            $($crate::db::connection::CatalogValue::from($value)),*
        ])
    };
}

/// Execute a parameterized catalog query and fetch every row.
///
/// Parameters are bound positionally as text using the dialect's own
/// placeholder syntax. Transport and pool failures surface as
/// [`Error::ConnectionFailure`].
#[async_trait]
pub trait CatalogConnection: Send + Sync {
    async fn fetch_all(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>>;
}

#[async_trait]
impl CatalogConnection for Pool<Postgres> {
    async fn fetch_all(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.to_string());
        }

        let rows = query.fetch_all(self).await?;
        rows.iter().map(pg_row).collect()
    }
}

fn pg_row(row: &PgRow) -> Result<CatalogRow> {
    let mut values = Vec::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(idx)?.is_null() {
            values.push(CatalogValue::Null);
            continue;
        }

        let value = match column.type_info().name() {
            "BOOL" => CatalogValue::Bool(row.try_get::<bool, _>(idx)?),
            "INT2" => CatalogValue::Int(i64::from(row.try_get::<i16, _>(idx)?)),
            "INT4" => CatalogValue::Int(i64::from(row.try_get::<i32, _>(idx)?)),
            "INT8" => CatalogValue::Int(row.try_get::<i64, _>(idx)?),
            "BYTEA" => CatalogValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?),
            other => match row.try_get::<String, _>(idx) {
                Ok(text) => CatalogValue::Text(text),
                Err(_) => {
                    return Err(Error::CatalogValue(format!(
                        "Unsupported PostgreSQL type {} in column {}",
                        other,
                        column.name()
                    )))
                }
            },
        };
        values.push(value);
    }

    Ok(CatalogRow::new(values))
}

#[async_trait]
impl CatalogConnection for Pool<MySql> {
    async fn fetch_all(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.to_string());
        }

        let rows = query.fetch_all(self).await?;
        rows.iter().map(mysql_row).collect()
    }
}

fn mysql_row(row: &MySqlRow) -> Result<CatalogRow> {
    let mut values = Vec::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(idx)?.is_null() {
            values.push(CatalogValue::Null);
            continue;
        }

        let type_name = column.type_info().name();
        let value = if type_name.ends_with("UNSIGNED") {
            let unsigned = row.try_get::<u64, _>(idx)?;
            CatalogValue::Int(i64::try_from(unsigned).map_err(|_| {
                Error::CatalogValue(format!("Value {} in column {} overflows i64", unsigned, column.name()))
            })?)
        } else if matches!(type_name, "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT") {
            CatalogValue::Int(row.try_get::<i64, _>(idx)?)
        } else if type_name == "BOOLEAN" {
            CatalogValue::Bool(row.try_get::<bool, _>(idx)?)
        } else if type_name.contains("BINARY") || type_name.contains("BLOB") {
            // information_schema exposes several columns with binary collation
            CatalogValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?)
        } else {
            match row.try_get::<String, _>(idx) {
                Ok(text) => CatalogValue::Text(text),
                Err(_) => CatalogValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?),
            }
        };
        values.push(value);
    }

    Ok(CatalogRow::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_bytes_decoded_as_text() {
        let row = catalog_row![b"user_id".to_vec(), "int", 11i64, None::<&str>];

        assert_eq!(row.text(0).unwrap(), "user_id");
        assert_eq!(row.text(1).unwrap(), "int");
        assert_eq!(row.opt_i64(2).unwrap(), Some(11));
        assert_eq!(row.opt_text(3).unwrap(), None);
        assert!(row.text(3).is_err());
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let row = catalog_row![vec![0xffu8, 0xfe]];
        assert!(matches!(row.text(0), Err(Error::CatalogValue(_))));
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let row = catalog_row!["only"];
        assert!(matches!(row.opt_text(4), Err(Error::CatalogValue(_))));
    }

    #[rstest]
    #[case(CatalogValue::from("YES"), true)]
    #[case(CatalogValue::from("no"), false)]
    #[case(CatalogValue::from("Y"), true)]
    #[case(CatalogValue::from("N"), false)]
    #[case(CatalogValue::from(b"1".to_vec()), true)]
    #[case(CatalogValue::Int(0), false)]
    #[case(CatalogValue::Int(2), true)]
    #[case(CatalogValue::Bool(true), true)]
    #[case(CatalogValue::Null, false)]
    fn test_flag(#[case] value: CatalogValue, #[case] expected: bool) {
        assert_eq!(value.as_flag().unwrap(), expected);
    }

    #[test]
    fn test_integer_from_text() {
        assert_eq!(CatalogValue::from(" 42 ").as_i64().unwrap(), Some(42));
        assert!(CatalogValue::from("forty").as_i64().is_err());
    }
}
