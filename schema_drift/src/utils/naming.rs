//! Naming utilities for SchemaDrift
//!
//! Identifier normalization per dialect and the small text canonicalizations
//! shared by all extractors.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::extractor::Dialect;

/// Implicit NOT NULL checks, e.g. `"col" IS NOT NULL` or `([col] IS NOT NULL)`
static IMPLICIT_NOT_NULL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"(?i)^\(*\s*(?:"[^"]+"|\[[^\]]+\]|`[^`]+`|[\w$#]+)\s+IS\s+NOT\s+NULL\s*\)*$"#).ok()
});

/// Normalize a user supplied identifier to the form stored in the catalog.
///
/// Oracle folds unquoted names to upper case and keeps quoted names verbatim.
/// SQL Server bracket quoting is stripped. PostgreSQL and MySQL names are
/// used as given.
pub fn normalize_identifier(dialect: Dialect, identifier: &str) -> String {
    let identifier = identifier.trim();

    match dialect {
        Dialect::Oracle => match strip_quotes(identifier, '"', '"') {
            Some(quoted) => quoted.to_string(),
            None => identifier.to_uppercase(),
        },
        Dialect::SqlServer => strip_quotes(identifier, '[', ']')
            .unwrap_or(identifier)
            .to_string(),
        Dialect::PostgreSQL | Dialect::MySql => identifier.to_string(),
    }
}

fn strip_quotes(identifier: &str, open: char, close: char) -> Option<&str> {
    identifier
        .strip_prefix(open)
        .and_then(|rest| rest.strip_suffix(close))
}

/// Canonical referential action: `SET_NULL` becomes `SET NULL`, empty is `NO ACTION`
pub fn canonical_action(action: Option<&str>) -> String {
    let action = action.map(str::trim).unwrap_or_default();

    if action.is_empty() {
        return "NO ACTION".to_string();
    }

    action
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Whether a check expression only restates a column's NOT NULL property
pub fn is_implicit_not_null(expression: &str) -> bool {
    IMPLICIT_NOT_NULL
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(expression.trim()))
}

/// Split a comma separated catalog list, dropping blanks
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Dialect::Oracle, "employees", "EMPLOYEES")]
    #[case(Dialect::Oracle, "\"MixedCase\"", "MixedCase")]
    #[case(Dialect::SqlServer, "[Order Details]", "Order Details")]
    #[case(Dialect::SqlServer, "Users", "Users")]
    #[case(Dialect::PostgreSQL, "Users", "Users")]
    #[case(Dialect::MySql, " users ", "users")]
    fn test_normalize_identifier(#[case] dialect: Dialect, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_identifier(dialect, input), expected);
    }

    #[rstest]
    #[case(None, "NO ACTION")]
    #[case(Some(""), "NO ACTION")]
    #[case(Some("SET_NULL"), "SET NULL")]
    #[case(Some("cascade"), "CASCADE")]
    #[case(Some("NO_ACTION"), "NO ACTION")]
    #[case(Some("set default"), "SET DEFAULT")]
    fn test_canonical_action(#[case] input: Option<&str>, #[case] expected: &str) {
        assert_eq!(canonical_action(input), expected);
    }

    #[rstest]
    #[case("\"EMAIL\" IS NOT NULL", true)]
    #[case("email IS NOT NULL", true)]
    #[case("(email is not null)", true)]
    #[case("([email] IS NOT NULL)", true)]
    #[case("`email` IS NOT NULL", true)]
    #[case("age >= 0", false)]
    #[case("email IS NOT NULL AND age > 0", false)]
    #[case("status IN ('a', 'b')", false)]
    fn test_is_implicit_not_null(#[case] expression: &str, #[case] expected: bool) {
        assert_eq!(is_implicit_not_null(expression), expected);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("id, name,,email "), vec!["id", "name", "email"]);
        assert!(split_list("").is_empty());
    }
}
