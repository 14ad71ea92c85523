//! Schema difference calculator
//!
//! Compares two table snapshots semantically: indexes, foreign keys and check
//! constraints are matched on structure, never on their names.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::Result;
use crate::schema::types::{
    ForeignKeySchema, ForeignKeySignature, IndexSchema, IndexSignature, ObjectCategory,
    SchemaObjects, TableSchema,
};

/// How one side differs from the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    MissingInTarget,
    MissingInSource,
    Mismatch,
}

impl fmt::Display for DifferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DifferenceKind::MissingInTarget => "missing_in_target",
            DifferenceKind::MissingInSource => "missing_in_source",
            DifferenceKind::Mismatch => "mismatch",
        })
    }
}

/// Represents a difference in column schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDifference {
    pub column_name: String,
    pub difference_type: DifferenceKind,
    pub source_value: Option<String>,
    pub target_value: Option<String>,
    pub details: Vec<String>,
}

/// Represents an index present on one side only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDifference {
    pub difference_type: DifferenceKind,
    pub index_columns: Vec<String>,
    pub is_unique: bool,
    pub index_type: String,
    pub source_name: Option<String>,
    pub target_name: Option<String>,
}

/// Represents a foreign key present on one side only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDifference {
    pub difference_type: DifferenceKind,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: String,
    pub on_update: String,
    pub source_name: Option<String>,
    pub target_name: Option<String>,
}

/// A normalized check expression present on one side only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDifference {
    pub difference_type: DifferenceKind,
    pub expression: String,
}

impl fmt::Display for CheckDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.difference_type {
            DifferenceKind::MissingInSource => write!(f, "Missing in source: {}", self.expression),
            _ => write!(f, "Missing in target: {}", self.expression),
        }
    }
}

/// Result of comparing two table schemas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaComparisonResult {
    pub table_name: String,
    pub source_env: String,
    pub target_env: String,
    pub source_host: String,
    pub target_host: String,

    is_match: bool,
    total_differences: usize,

    pub columns_match: bool,
    pub column_differences: Vec<ColumnDifference>,

    pub pk_match: bool,
    pub source_pk: Option<Vec<String>>,
    pub target_pk: Option<Vec<String>>,

    pub indexes_match: bool,
    pub index_differences: Vec<IndexDifference>,

    pub fks_match: bool,
    pub fk_differences: Vec<ForeignKeyDifference>,

    pub checks_match: bool,
    pub check_differences: Vec<CheckDifference>,
}

impl SchemaComparisonResult {
    pub fn is_match(&self) -> bool {
        self.is_match
    }

    pub fn total_differences(&self) -> usize {
        self.total_differences
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Recompute the per-category flags and totals from the difference lists
    fn finalize(&mut self) {
        self.columns_match = self.column_differences.is_empty();
        self.indexes_match = self.index_differences.is_empty();
        self.fks_match = self.fk_differences.is_empty();
        self.checks_match = self.check_differences.is_empty();

        self.total_differences = self.column_differences.len()
            + self.index_differences.len()
            + self.fk_differences.len()
            + self.check_differences.len()
            + usize::from(!self.pk_match);
        self.is_match = self.total_differences == 0;
    }
}

/// Compares two table schemas semantically
#[derive(Debug, Clone, Copy)]
pub struct SchemaComparator {
    strict: bool,
}

impl SchemaComparator {
    /// `strict` makes column default values part of the comparison
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Compare a source snapshot against a target snapshot.
    ///
    /// Difference lists come out sorted: missing-in-target entries first,
    /// then missing-in-source, then mismatches, each ordered by name or
    /// signature.
    pub fn compare(
        &self,
        source: &TableSchema,
        target: &TableSchema,
        source_env: &str,
        target_env: &str,
    ) -> SchemaComparisonResult {
        let mut result = SchemaComparisonResult {
            table_name: source.table_name.clone(),
            source_env: source_env.to_string(),
            target_env: target_env.to_string(),
            source_host: source.database_host.clone(),
            target_host: target.database_host.clone(),
            is_match: true,
            total_differences: 0,
            columns_match: true,
            column_differences: self.compare_columns(source, target),
            pk_match: source.primary_key == target.primary_key,
            source_pk: source.primary_key.clone(),
            target_pk: target.primary_key.clone(),
            indexes_match: true,
            index_differences: compare_indexes(&source.indexes, &target.indexes),
            fks_match: true,
            fk_differences: compare_foreign_keys(&source.foreign_keys, &target.foreign_keys),
            checks_match: true,
            check_differences: compare_check_constraints(source, target),
        };

        result.finalize();

        if !source.is_complete() || !target.is_complete() {
            tracing::warn!(
                table = %source.table_name,
                source_incomplete = ?source.incomplete,
                target_incomplete = ?target.incomplete,
                "Comparing snapshots with undetermined categories"
            );
        }

        tracing::debug!(
            table = %result.table_name,
            source_env,
            target_env,
            total_differences = result.total_differences,
            "Schema comparison finished"
        );

        result
    }

    fn compare_columns(&self, source: &TableSchema, target: &TableSchema) -> Vec<ColumnDifference> {
        let source_cols: BTreeSet<&String> = source.columns.keys().collect();
        let target_cols: BTreeSet<&String> = target.columns.keys().collect();
        let mut differences = Vec::new();

        for name in source_cols.difference(&target_cols) {
            differences.push(ColumnDifference {
                column_name: (*name).clone(),
                difference_type: DifferenceKind::MissingInTarget,
                source_value: Some(source.columns[*name].data_type.clone()),
                target_value: None,
                details: Vec::new(),
            });
        }

        for name in target_cols.difference(&source_cols) {
            differences.push(ColumnDifference {
                column_name: (*name).clone(),
                difference_type: DifferenceKind::MissingInSource,
                source_value: None,
                target_value: Some(target.columns[*name].data_type.clone()),
                details: Vec::new(),
            });
        }

        for name in source_cols.intersection(&target_cols) {
            let source_col = &source.columns[*name];
            let target_col = &target.columns[*name];
            let details = source_col.differences(target_col, self.strict);

            if !details.is_empty() {
                differences.push(ColumnDifference {
                    column_name: (*name).clone(),
                    difference_type: DifferenceKind::Mismatch,
                    source_value: Some(source_col.data_type.clone()),
                    target_value: Some(target_col.data_type.clone()),
                    details,
                });
            }
        }

        differences
    }
}

fn compare_indexes(source: &[IndexSchema], target: &[IndexSchema]) -> Vec<IndexDifference> {
    let source_sigs: BTreeMap<IndexSignature, &IndexSchema> =
        source.iter().map(|idx| (idx.signature(), idx)).collect();
    let target_sigs: BTreeMap<IndexSignature, &IndexSchema> =
        target.iter().map(|idx| (idx.signature(), idx)).collect();

    let missing_in_target = source_sigs
        .iter()
        .filter(|(sig, _)| !target_sigs.contains_key(*sig))
        .map(|(_, idx)| IndexDifference {
            difference_type: DifferenceKind::MissingInTarget,
            index_columns: idx.columns.clone(),
            is_unique: idx.is_unique,
            index_type: idx.index_type.clone(),
            source_name: Some(idx.name.clone()),
            target_name: None,
        });

    let missing_in_source = target_sigs
        .iter()
        .filter(|(sig, _)| !source_sigs.contains_key(*sig))
        .map(|(_, idx)| IndexDifference {
            difference_type: DifferenceKind::MissingInSource,
            index_columns: idx.columns.clone(),
            is_unique: idx.is_unique,
            index_type: idx.index_type.clone(),
            source_name: None,
            target_name: Some(idx.name.clone()),
        });

    missing_in_target.chain(missing_in_source).collect()
}

fn compare_foreign_keys(
    source: &[ForeignKeySchema],
    target: &[ForeignKeySchema],
) -> Vec<ForeignKeyDifference> {
    let source_sigs: BTreeMap<ForeignKeySignature, &ForeignKeySchema> =
        source.iter().map(|fk| (fk.signature(), fk)).collect();
    let target_sigs: BTreeMap<ForeignKeySignature, &ForeignKeySchema> =
        target.iter().map(|fk| (fk.signature(), fk)).collect();

    let difference = |kind: DifferenceKind, fk: &ForeignKeySchema| ForeignKeyDifference {
        difference_type: kind,
        columns: fk.columns.clone(),
        referenced_table: fk.referenced_table.clone(),
        referenced_columns: fk.referenced_columns.clone(),
        on_delete: fk.on_delete.clone(),
        on_update: fk.on_update.clone(),
        source_name: (kind == DifferenceKind::MissingInTarget).then(|| fk.name.clone()),
        target_name: (kind == DifferenceKind::MissingInSource).then(|| fk.name.clone()),
    };

    let mut differences: Vec<ForeignKeyDifference> = source_sigs
        .iter()
        .filter(|(sig, _)| !target_sigs.contains_key(*sig))
        .map(|(_, fk)| difference(DifferenceKind::MissingInTarget, fk))
        .collect();

    differences.extend(
        target_sigs
            .iter()
            .filter(|(sig, _)| !source_sigs.contains_key(*sig))
            .map(|(_, fk)| difference(DifferenceKind::MissingInSource, fk)),
    );

    differences
}

fn compare_check_constraints(source: &TableSchema, target: &TableSchema) -> Vec<CheckDifference> {
    let source_exprs: BTreeSet<String> = source
        .check_constraints
        .iter()
        .map(|c| c.normalized_expression())
        .collect();
    let target_exprs: BTreeSet<String> = target
        .check_constraints
        .iter()
        .map(|c| c.normalized_expression())
        .collect();

    let missing_in_target = source_exprs.difference(&target_exprs).map(|expr| CheckDifference {
        difference_type: DifferenceKind::MissingInTarget,
        expression: expr.clone(),
    });
    let missing_in_source = target_exprs.difference(&source_exprs).map(|expr| CheckDifference {
        difference_type: DifferenceKind::MissingInSource,
        expression: expr.clone(),
    });

    missing_in_target.chain(missing_in_source).collect()
}

/// A procedure, view or trigger that differs between two inventories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDifference {
    pub category: ObjectCategory,
    pub name: String,
    pub table_name: Option<String>,
    /// Set for procedures, so overloads stay apart
    pub parameter_list: Option<String>,
    pub difference_type: DifferenceKind,
    pub source_hash: Option<String>,
    pub target_hash: Option<String>,
}

/// Identity of an object within one inventory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ObjectKey {
    table_name: Option<String>,
    name: String,
    parameter_list: Option<String>,
}

impl ObjectKey {
    fn named(name: &str) -> Self {
        Self {
            table_name: None,
            name: name.to_string(),
            parameter_list: None,
        }
    }
}

type Inventory = IndexMap<ObjectKey, String>;

/// Compare procedure, view and trigger inventories by identity and definition hash.
///
/// Procedures are identified by name and parameter list, views by name,
/// triggers by table and name.
pub fn compare_objects(source: &SchemaObjects, target: &SchemaObjects) -> Vec<ObjectDifference> {
    let mut differences = Vec::new();

    let procedures = |objects: &SchemaObjects| -> Inventory {
        objects
            .stored_procedures
            .items
            .iter()
            .map(|p| {
                let key = ObjectKey {
                    parameter_list: Some(p.parameter_list.clone()),
                    ..ObjectKey::named(&p.name)
                };
                (key, p.definition_hash.clone())
            })
            .collect()
    };
    let views = |objects: &SchemaObjects| -> Inventory {
        objects
            .views
            .items
            .iter()
            .map(|v| (ObjectKey::named(&v.name), v.definition_hash.clone()))
            .collect()
    };
    let triggers = |objects: &SchemaObjects| -> Inventory {
        objects
            .triggers
            .items
            .iter()
            .map(|t| {
                let key = ObjectKey {
                    table_name: Some(t.table_name.clone()),
                    ..ObjectKey::named(&t.name)
                };
                (key, t.definition_hash.clone())
            })
            .collect()
    };

    diff_inventory(ObjectCategory::StoredProcedures, procedures(source), procedures(target), &mut differences);
    diff_inventory(ObjectCategory::Views, views(source), views(target), &mut differences);
    diff_inventory(ObjectCategory::Triggers, triggers(source), triggers(target), &mut differences);

    differences
}

fn diff_inventory(category: ObjectCategory, source: Inventory, target: Inventory, differences: &mut Vec<ObjectDifference>) {
    let keys: BTreeSet<&ObjectKey> = source.keys().chain(target.keys()).collect();

    for key in keys {
        let source_hash = source.get(key);
        let target_hash = target.get(key);

        let difference_type = match (source_hash, target_hash) {
            (Some(_), None) => DifferenceKind::MissingInTarget,
            (None, Some(_)) => DifferenceKind::MissingInSource,
            (Some(a), Some(b)) if a != b => DifferenceKind::Mismatch,
            _ => continue,
        };

        differences.push(ObjectDifference {
            category,
            name: key.name.clone(),
            table_name: key.table_name.clone(),
            parameter_list: key.parameter_list.clone(),
            difference_type,
            source_hash: source_hash.cloned(),
            target_hash: target_hash.cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{
        CheckConstraintSchema, ColumnSchema, Extracted, StoredProcedureSchema, TriggerSchema, ViewSchema,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn users(schema: &str) -> TableSchema {
        TableSchema::new("users", "localhost", "app", schema)
            .with_column(ColumnSchema::new("id", "int4"))
            .with_column(ColumnSchema::new("username", "varchar(50)").max_length(50))
            .with_primary_key(&["id"])
    }

    #[test]
    fn test_identical_tables_match() {
        let result = SchemaComparator::new(true).compare(&users("prod"), &users("uat"), "prod", "uat");

        assert!(result.is_match());
        assert_eq!(result.total_differences(), 0);
        assert!(result.columns_match && result.pk_match && result.indexes_match);
    }

    #[test]
    fn test_missing_columns_both_directions() {
        let source = users("prod").with_column(ColumnSchema::new("legacy", "text"));
        let target = users("uat").with_column(ColumnSchema::new("middle_name", "varchar(50)"));

        let result = SchemaComparator::new(false).compare(&source, &target, "prod", "uat");

        assert_eq!(result.total_differences(), 2);
        assert_eq!(result.column_differences[0].column_name, "legacy");
        assert_eq!(result.column_differences[0].difference_type, DifferenceKind::MissingInTarget);
        assert_eq!(result.column_differences[0].source_value.as_deref(), Some("text"));
        assert_eq!(result.column_differences[1].column_name, "middle_name");
        assert_eq!(result.column_differences[1].difference_type, DifferenceKind::MissingInSource);
    }

    #[test]
    fn test_one_mismatch_record_per_column() {
        let source = users("prod");
        let mut target = users("uat");
        target.columns.insert(
            "username".to_string(),
            ColumnSchema::new("username", "varchar(50)").nullable(true).max_length(80),
        );

        let result = SchemaComparator::new(false).compare(&source, &target, "prod", "uat");

        assert_eq!(result.column_differences.len(), 1);
        let diff = &result.column_differences[0];
        assert_eq!(diff.difference_type, DifferenceKind::Mismatch);
        assert_eq!(diff.details.len(), 2);
        assert!(diff.details.iter().any(|d| d.starts_with("nullable")));
        assert!(diff.details.iter().any(|d| d.starts_with("max_length")));
    }

    #[test]
    fn test_data_type_compared_case_insensitively() {
        let source = TableSchema::new("t", "h", "d", "s").with_column(ColumnSchema::new("c", "VARCHAR(10)"));
        let target = TableSchema::new("t", "h", "d", "s").with_column(ColumnSchema::new("c", "varchar(10)"));

        assert!(SchemaComparator::new(true).compare(&source, &target, "a", "b").is_match());
    }

    #[rstest]
    #[case(true, 1)]
    #[case(false, 0)]
    fn test_strict_mode_default_values(#[case] strict: bool, #[case] expected: usize) {
        let source = TableSchema::new("t", "h", "d", "s")
            .with_column(ColumnSchema::new("flag", "int").default_value("0"));
        let target = TableSchema::new("t", "h", "d", "s")
            .with_column(ColumnSchema::new("flag", "int").default_value("1"));

        let result = SchemaComparator::new(strict).compare(&source, &target, "a", "b");

        assert_eq!(result.total_differences(), expected);
        assert_eq!(result.is_match(), expected == 0);
    }

    #[test]
    fn test_primary_key_order_matters() {
        let source = users("prod").with_primary_key(&["id", "tenant_id"]);
        let target = users("uat").with_primary_key(&["tenant_id", "id"]);

        let result = SchemaComparator::new(true).compare(&source, &target, "prod", "uat");

        assert!(!result.pk_match);
        assert_eq!(result.total_differences(), 1);
        assert_eq!(result.source_pk, Some(vec!["id".to_string(), "tenant_id".to_string()]));
    }

    #[test]
    fn test_missing_primary_key_on_both_sides_is_a_match() {
        let mut source = users("prod");
        let mut target = users("uat");
        source.primary_key = None;
        target.primary_key = None;

        assert!(SchemaComparator::new(true).compare(&source, &target, "a", "b").pk_match);
    }

    #[test]
    fn test_renamed_index_is_equal() {
        let source = users("prod").with_index(IndexSchema::new("idx_a", &["x", "y"], true, "btree"));
        let target = users("uat").with_index(IndexSchema::new("idx_b", &["x", "y"], true, "btree"));

        let result = SchemaComparator::new(true).compare(&source, &target, "prod", "uat");

        assert!(result.index_differences.is_empty());
        assert!(result.is_match());
    }

    #[test]
    fn test_index_symmetric_difference() {
        let s1 = IndexSchema::new("s1", &["a"], false, "btree");
        let s2 = IndexSchema::new("s2", &["b"], true, "btree");
        let s3 = IndexSchema::new("s3", &["c"], false, "hash");
        let source = users("prod").with_index(s1).with_index(s2.clone());
        let target = users("uat").with_index(s2).with_index(s3);

        let result = SchemaComparator::new(true).compare(&source, &target, "prod", "uat");

        assert_eq!(result.index_differences.len(), 2);
        assert_eq!(result.index_differences[0].difference_type, DifferenceKind::MissingInTarget);
        assert_eq!(result.index_differences[0].source_name.as_deref(), Some("s1"));
        assert_eq!(result.index_differences[1].difference_type, DifferenceKind::MissingInSource);
        assert_eq!(result.index_differences[1].target_name.as_deref(), Some("s3"));
    }

    #[test]
    fn test_foreign_key_symmetric_difference() {
        let shared = ForeignKeySchema::new("fk_role", &["role_id"], "roles", &["id"]);
        let renamed = ForeignKeySchema::new("users_role_id_fkey", &["role_id"], "ROLES", &["id"]);
        let cascade = ForeignKeySchema::new("fk_org", &["org_id"], "orgs", &["id"]).actions("CASCADE", "NO ACTION");
        let restrict = ForeignKeySchema::new("fk_org", &["org_id"], "orgs", &["id"]).actions("RESTRICT", "NO ACTION");

        let source = users("prod").with_foreign_key(shared).with_foreign_key(cascade);
        let target = users("uat").with_foreign_key(renamed).with_foreign_key(restrict);

        let result = SchemaComparator::new(true).compare(&source, &target, "prod", "uat");

        assert_eq!(result.fk_differences.len(), 2);
        assert_eq!(result.fk_differences[0].on_delete, "CASCADE");
        assert_eq!(result.fk_differences[0].difference_type, DifferenceKind::MissingInTarget);
        assert_eq!(result.fk_differences[1].on_delete, "RESTRICT");
        assert_eq!(result.fk_differences[1].target_name.as_deref(), Some("fk_org"));
        assert!(!result.fks_match);
    }

    #[test]
    fn test_check_constraints_compare_normalized_sets() {
        let source = users("prod")
            .with_check_constraint(CheckConstraintSchema::new("ck_1", "(age >= 0)"))
            .with_check_constraint(CheckConstraintSchema::new("ck_2", "(score <= 100)"));
        let target = users("uat")
            .with_check_constraint(CheckConstraintSchema::new("other_name", "(AGE >=\n  0)"))
            .with_check_constraint(CheckConstraintSchema::new("ck_3", "(score < 100)"));

        let result = SchemaComparator::new(true).compare(&source, &target, "prod", "uat");

        let rendered: Vec<String> = result.check_differences.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "Missing in target: (SCORE <= 100)".to_string(),
                "Missing in source: (SCORE < 100)".to_string(),
            ]
        );
        assert_eq!(result.total_differences(), 2);
    }

    #[test]
    fn test_totals_consistent_across_categories() {
        let source = users("prod")
            .with_column(ColumnSchema::new("extra", "text"))
            .with_index(IndexSchema::new("i", &["username"], false, "btree"))
            .with_primary_key(&["username"]);
        let target = users("uat")
            .with_check_constraint(CheckConstraintSchema::new("c", "id > 0"));

        let result = SchemaComparator::new(true).compare(&source, &target, "prod", "uat");

        assert_eq!(result.total_differences(), 4);
        assert!(!result.is_match());
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["total_differences"], 4);
        assert_eq!(json["is_match"], false);
        assert_eq!(json["column_differences"][0]["difference_type"], "missing_in_target");
    }

    #[test]
    fn test_comparison_is_deterministic() {
        let source = users("prod")
            .with_column(ColumnSchema::new("b", "text"))
            .with_column(ColumnSchema::new("a", "text"))
            .with_index(IndexSchema::new("z", &["a"], false, "btree"))
            .with_index(IndexSchema::new("y", &["b"], false, "btree"));
        let target = users("uat");

        let comparator = SchemaComparator::new(true);
        let first = comparator.compare(&source, &target, "prod", "uat");
        let second = comparator.compare(&source, &target, "prod", "uat");

        assert_eq!(first, second);
        assert_eq!(first.column_differences[0].column_name, "a");
    }

    fn objects(hash: &str, with_view: bool) -> SchemaObjects {
        let views = if with_view {
            vec![ViewSchema {
                name: "active_users".to_string(),
                schema_name: "public".to_string(),
                definition_hash: "v1".to_string(),
                is_materialized: false,
                columns: vec!["id".to_string()],
            }]
        } else {
            Vec::new()
        };

        SchemaObjects {
            schema_name: "public".to_string(),
            stored_procedures: Extracted::complete(vec![StoredProcedureSchema {
                name: "get_user".to_string(),
                schema_name: "public".to_string(),
                language: "plpgsql".to_string(),
                parameter_list: "id integer".to_string(),
                return_type: "users".to_string(),
                definition_hash: hash.to_string(),
            }]),
            views: Extracted::complete(views),
            triggers: Extracted::complete(vec![TriggerSchema {
                name: "trg_audit".to_string(),
                schema_name: "public".to_string(),
                table_name: "orders".to_string(),
                event: "INSERT,UPDATE".to_string(),
                timing: "AFTER".to_string(),
                definition_hash: "t1".to_string(),
            }]),
        }
    }

    #[test]
    fn test_compare_objects() {
        assert!(compare_objects(&objects("p1", true), &objects("p1", true)).is_empty());

        let differences = compare_objects(&objects("p1", true), &objects("p2", false));

        assert_eq!(differences.len(), 2);
        assert_eq!(differences[0].category, ObjectCategory::StoredProcedures);
        assert_eq!(differences[0].difference_type, DifferenceKind::Mismatch);
        assert_eq!(differences[0].target_hash.as_deref(), Some("p2"));
        assert_eq!(differences[1].category, ObjectCategory::Views);
        assert_eq!(differences[1].difference_type, DifferenceKind::MissingInTarget);
    }

    fn routine(parameter_list: &str, hash: &str) -> StoredProcedureSchema {
        StoredProcedureSchema {
            name: "calc".to_string(),
            schema_name: "public".to_string(),
            language: "sql".to_string(),
            parameter_list: parameter_list.to_string(),
            return_type: "integer".to_string(),
            definition_hash: hash.to_string(),
        }
    }

    #[test]
    fn test_compare_objects_keeps_overloads_apart() {
        let mut source = objects("p1", true);
        let mut target = objects("p1", true);
        source.stored_procedures = Extracted::complete(vec![routine("a integer", "h1"), routine("a text", "h2")]);
        target.stored_procedures = Extracted::complete(vec![routine("a text", "h2")]);

        let differences = compare_objects(&source, &target);

        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].name, "calc");
        assert_eq!(differences[0].parameter_list.as_deref(), Some("a integer"));
        assert_eq!(differences[0].difference_type, DifferenceKind::MissingInTarget);
        assert_eq!(differences[0].source_hash.as_deref(), Some("h1"));
    }
}
