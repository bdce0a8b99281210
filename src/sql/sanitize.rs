//! SQL Identifier Sanitization Utilities
//!
//! Identifiers are always quoted when rendered, so names of existing objects
//! pass through untouched. Names supplied for new objects are validated here
//! first, and synthesized names are reduced to a portable character set.

use regex::Regex;

use crate::error::{Result, SchemaAdminError};
use crate::types::ObjectKind;

/// Longest identifier accepted on create (SQL Server's limit, the largest of the supported engines)
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Quote a SQL identifier with ANSI double quotes
///
/// # Example
/// ```
/// use runtara_schema_admin::sql::quote_identifier;
///
/// let quoted = quote_identifier("my_table");
/// assert_eq!(quoted, "\"my_table\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    // Escape any double quotes in the identifier by doubling them
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Validate a name supplied for a new schema object
///
/// Rules:
/// - Cannot be empty or only whitespace
/// - Cannot start or end with whitespace
/// - Cannot contain control characters
/// - At most [`MAX_IDENTIFIER_LENGTH`] characters
///
/// # Example
/// ```
/// use runtara_schema_admin::sql::validate_identifier;
/// use runtara_schema_admin::ObjectKind;
///
/// assert!(validate_identifier("Order Lines", ObjectKind::Table).is_ok());
/// assert!(validate_identifier("  ", ObjectKind::Table).is_err());
/// ```
pub fn validate_identifier(name: &str, kind: ObjectKind) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SchemaAdminError::invalid_argument(format!(
            "{} name cannot be empty",
            kind
        )));
    }

    if name.trim() != name {
        return Err(SchemaAdminError::invalid_argument(format!(
            "{} name '{}' cannot start or end with whitespace",
            kind, name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(SchemaAdminError::invalid_argument(format!(
            "{} name '{}' exceeds {} characters",
            kind, name, MAX_IDENTIFIER_LENGTH
        )));
    }

    let control = compile(r"[\x00-\x1f\x7f]")?;
    if control.is_match(name) {
        return Err(SchemaAdminError::invalid_argument(format!(
            "{} name contains control characters",
            kind
        )));
    }

    Ok(())
}

/// Reduce a name fragment to `[A-Za-z0-9_]`, collapsing runs of anything else to `_`
pub fn sanitize_fragment(fragment: &str) -> Result<String> {
    let re = compile(r"[^A-Za-z0-9_]+")?;
    Ok(re.replace_all(fragment.trim(), "_").trim_matches('_').to_string())
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| SchemaAdminError::invalid_argument(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // quote_identifier Tests
    // =========================================================================

    #[test]
    fn test_quote_identifier_simple() {
        assert_eq!(quote_identifier("my_table"), "\"my_table\"");
        assert_eq!(quote_identifier("users"), "\"users\"");
    }

    #[test]
    fn test_quote_identifier_with_quotes() {
        assert_eq!(
            quote_identifier("table\"with\"quotes"),
            "\"table\"\"with\"\"quotes\""
        );
    }

    #[test]
    fn test_quote_identifier_injection_attempt() {
        assert_eq!(
            quote_identifier("x\"; DROP TABLE users; --"),
            "\"x\"\"; DROP TABLE users; --\""
        );
    }

    #[test]
    fn test_quote_identifier_with_spaces_and_unicode() {
        assert_eq!(quote_identifier("my table"), "\"my table\"");
        assert_eq!(quote_identifier("日本語"), "\"日本語\"");
    }

    // =========================================================================
    // validate_identifier Tests
    // =========================================================================

    #[test]
    fn test_validate_identifier_accepts_mixed_case_and_spaces() {
        assert!(validate_identifier("Customers", ObjectKind::Table).is_ok());
        assert!(validate_identifier("order lines", ObjectKind::Table).is_ok());
        assert!(validate_identifier("ix_users_email", ObjectKind::Index).is_ok());
    }

    #[test]
    fn test_validate_identifier_empty() {
        let err = validate_identifier("", ObjectKind::Column).unwrap_err();
        assert!(err.to_string().contains("Column name cannot be empty"));
        assert!(validate_identifier("   ", ObjectKind::Column).is_err());
    }

    #[test]
    fn test_validate_identifier_surrounding_whitespace() {
        assert!(validate_identifier(" users", ObjectKind::Table).is_err());
        assert!(validate_identifier("users ", ObjectKind::Table).is_err());
    }

    #[test]
    fn test_validate_identifier_control_characters() {
        assert!(validate_identifier("bad\nname", ObjectKind::View).is_err());
        assert!(validate_identifier("bad\0name", ObjectKind::View).is_err());
    }

    #[test]
    fn test_validate_identifier_length() {
        let ok = "a".repeat(MAX_IDENTIFIER_LENGTH);
        let too_long = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_identifier(&ok, ObjectKind::Table).is_ok());
        assert!(validate_identifier(&too_long, ObjectKind::Table).is_err());
    }

    // =========================================================================
    // sanitize_fragment Tests
    // =========================================================================

    #[test]
    fn test_sanitize_fragment() {
        assert_eq!(sanitize_fragment("email").unwrap(), "email");
        assert_eq!(sanitize_fragment("first name").unwrap(), "first_name");
        assert_eq!(sanitize_fragment("a--b..c").unwrap(), "a_b_c");
        assert_eq!(sanitize_fragment(" [weird] ").unwrap(), "weird");
    }
}
