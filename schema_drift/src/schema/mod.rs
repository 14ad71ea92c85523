//! Schema module for SchemaDrift
//!
//! Catalog extraction into the dialect-neutral model and semantic comparison
//! of two extracted snapshots.

pub mod diff;
pub mod extractor;
pub mod types;

pub use diff::{
    compare_objects, CheckDifference, ColumnDifference, DifferenceKind, ForeignKeyDifference, IndexDifference,
    ObjectDifference, SchemaComparator, SchemaComparisonResult,
};
pub use extractor::{get_schema_extractor, Dialect, SchemaExtractor, SourceInfo};
pub use types::{
    definition_hash, CheckConstraintSchema, ColumnSchema, Extracted, ForeignKeySchema, IndexSchema, ObjectCategory,
    SchemaObjects, StoredProcedureSchema, TableSchema, TriggerSchema, ViewSchema,
};
