//! Type definitions for database schema objects

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Digest of a normalized object definition.
///
/// Line endings are unified, trailing whitespace is dropped from every line
/// and the whole text is trimmed before hashing. Empty definitions hash to an
/// empty string.
pub fn definition_hash(definition: &str) -> String {
    let normalized = definition
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let normalized = normalized.trim();

    if normalized.is_empty() {
        return String::new();
    }

    format!("{:x}", md5::compute(normalized.as_bytes()))
}

/// Categories of catalog metadata an extractor reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectCategory {
    Columns,
    PrimaryKey,
    Indexes,
    ForeignKeys,
    CheckConstraints,
    StoredProcedures,
    Views,
    Triggers,
}

impl ObjectCategory {
    /// Mandatory categories abort an extraction when their query fails
    pub fn is_mandatory(self) -> bool {
        matches!(
            self,
            ObjectCategory::Columns
                | ObjectCategory::PrimaryKey
                | ObjectCategory::Indexes
                | ObjectCategory::ForeignKeys
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectCategory::Columns => "columns",
            ObjectCategory::PrimaryKey => "primary_key",
            ObjectCategory::Indexes => "indexes",
            ObjectCategory::ForeignKeys => "foreign_keys",
            ObjectCategory::CheckConstraints => "check_constraints",
            ObjectCategory::StoredProcedures => "stored_procedures",
            ObjectCategory::Views => "views",
            ObjectCategory::Triggers => "triggers",
        }
    }
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a database column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub max_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
}

impl ColumnSchema {
    /// Create a new non-nullable column with the given name and type
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: false,
            default_value: None,
            max_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }

    /// Set whether the column is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.is_nullable = nullable;
        self
    }

    /// Set a default value for the column
    pub fn default_value(mut self, default: &str) -> Self {
        self.default_value = Some(default.to_string());
        self
    }

    pub fn max_length(mut self, max_length: i64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn numeric(mut self, precision: i64, scale: i64) -> Self {
        self.numeric_precision = Some(precision);
        self.numeric_scale = Some(scale);
        self
    }

    /// Attribute-level differences against another column.
    ///
    /// The default value only counts when `strict` is set.
    pub fn differences(&self, other: &ColumnSchema, strict: bool) -> Vec<String> {
        let mut differences = Vec::new();

        if !self.data_type.eq_ignore_ascii_case(&other.data_type) {
            differences.push(format!("data_type: {} vs {}", self.data_type, other.data_type));
        }

        if self.is_nullable != other.is_nullable {
            differences.push(format!("nullable: {} vs {}", self.is_nullable, other.is_nullable));
        }

        if self.max_length != other.max_length {
            differences.push(format!(
                "max_length: {} vs {}",
                display_opt(&self.max_length),
                display_opt(&other.max_length)
            ));
        }

        if self.numeric_precision != other.numeric_precision {
            differences.push(format!(
                "precision: {} vs {}",
                display_opt(&self.numeric_precision),
                display_opt(&other.numeric_precision)
            ));
        }

        if self.numeric_scale != other.numeric_scale {
            differences.push(format!(
                "scale: {} vs {}",
                display_opt(&self.numeric_scale),
                display_opt(&other.numeric_scale)
            ));
        }

        if strict && self.default_value != other.default_value {
            differences.push(format!(
                "default: {} vs {}",
                display_opt(&self.default_value),
                display_opt(&other.default_value)
            ));
        }

        differences
    }
}

fn display_opt<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "None".to_string(),
    }
}

/// Structural identity of an index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexSignature {
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub index_type: String,
}

/// Represents an index
///
/// The name is carried for display only; equality across environments is
/// decided by [`IndexSchema::signature`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub index_type: String,
}

impl IndexSchema {
    pub fn new(name: &str, columns: &[&str], is_unique: bool, index_type: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            is_unique,
            index_type: index_type.to_string(),
        }
    }

    pub fn signature(&self) -> IndexSignature {
        IndexSignature {
            columns: self.columns.clone(),
            is_unique: self.is_unique,
            index_type: self.index_type.to_lowercase(),
        }
    }

    pub fn matches_semantically(&self, other: &IndexSchema) -> bool {
        self.signature() == other.signature()
    }
}

/// Structural identity of a foreign key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForeignKeySignature {
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: String,
    pub on_update: String,
}

/// Represents a foreign key constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySchema {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: String,
    pub on_update: String,
}

impl ForeignKeySchema {
    /// Foreign key with `NO ACTION` on delete and update
    pub fn new(name: &str, columns: &[&str], referenced_table: &str, referenced_columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_table: referenced_table.to_string(),
            referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
            on_delete: "NO ACTION".to_string(),
            on_update: "NO ACTION".to_string(),
        }
    }

    pub fn actions(mut self, on_delete: &str, on_update: &str) -> Self {
        self.on_delete = on_delete.to_string();
        self.on_update = on_update.to_string();
        self
    }

    pub fn signature(&self) -> ForeignKeySignature {
        ForeignKeySignature {
            columns: self.columns.clone(),
            referenced_table: self.referenced_table.to_lowercase(),
            referenced_columns: self.referenced_columns.clone(),
            on_delete: self.on_delete.to_uppercase(),
            on_update: self.on_update.to_uppercase(),
        }
    }

    pub fn matches_semantically(&self, other: &ForeignKeySchema) -> bool {
        self.signature() == other.signature()
    }
}

/// Represents a check constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConstraintSchema {
    pub name: String,
    pub expression: String,
}

impl CheckConstraintSchema {
    pub fn new(name: &str, expression: &str) -> Self {
        Self {
            name: name.to_string(),
            expression: expression.to_string(),
        }
    }

    /// Expression with whitespace collapsed and upper-cased
    pub fn normalized_expression(&self) -> String {
        self.expression
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase()
    }

    pub fn matches_semantically(&self, other: &CheckConstraintSchema) -> bool {
        self.normalized_expression() == other.normalized_expression()
    }
}

/// Represents a stored procedure or function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProcedureSchema {
    pub name: String,
    pub schema_name: String,
    pub language: String,
    pub parameter_list: String,
    pub return_type: String,
    pub definition_hash: String,
}

/// Represents a database view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSchema {
    pub name: String,
    pub schema_name: String,
    pub definition_hash: String,
    pub is_materialized: bool,
    pub columns: Vec<String>,
}

/// Represents a trigger; `event` lists every firing event, comma separated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSchema {
    pub name: String,
    pub schema_name: String,
    pub table_name: String,
    pub event: String,
    pub timing: String,
    pub definition_hash: String,
}

/// Outcome of a best-effort extraction.
///
/// An empty `items` list only means "none exist" when `failure` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extracted<T> {
    pub items: Vec<T>,
    pub failure: Option<String>,
}

impl<T> Extracted<T> {
    pub fn complete(items: Vec<T>) -> Self {
        Self { items, failure: None }
    }

    pub fn failed(failure: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            failure: Some(failure.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Procedures, views and triggers of one schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaObjects {
    pub schema_name: String,
    pub stored_procedures: Extracted<StoredProcedureSchema>,
    pub views: Extracted<ViewSchema>,
    pub triggers: Extracted<TriggerSchema>,
}

/// Complete structure of one table as seen in one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub database_host: String,
    pub database_name: String,
    pub schema_name: String,
    pub columns: IndexMap<String, ColumnSchema>,
    pub primary_key: Option<Vec<String>>,
    pub indexes: Vec<IndexSchema>,
    pub foreign_keys: Vec<ForeignKeySchema>,
    pub check_constraints: Vec<CheckConstraintSchema>,
    /// Best-effort categories whose catalog query failed
    #[serde(default)]
    pub incomplete: Vec<ObjectCategory>,
}

impl TableSchema {
    /// Create a new table with no columns
    pub fn new(table_name: &str, database_host: &str, database_name: &str, schema_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            database_host: database_host.to_string(),
            database_name: database_name.to_string(),
            schema_name: schema_name.to_string(),
            columns: IndexMap::new(),
            primary_key: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            check_constraints: Vec::new(),
            incomplete: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnSchema) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKeySchema) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn with_check_constraint(mut self, check: CheckConstraintSchema) -> Self {
        self.check_constraints.push(check);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
