//! Schema normalization and deterministic object names

use uuid::Uuid;

use crate::error::Result;
use crate::sql::sanitize::sanitize_fragment;
use crate::types::TableRef;

/// Prefix for synthesized index names
pub const INDEX_PREFIX: &str = "ix";

/// Normalize a caller-supplied schema
///
/// `None`, blank text and the current-schema `token` all mean "the
/// connection's current schema" and normalize to `None`.
pub fn normalize_schema(schema: Option<&str>, token: &str) -> Option<String> {
    let schema = schema?.trim();
    if schema.is_empty() || schema == token {
        None
    } else {
        Some(schema.to_string())
    }
}

/// Build a [`TableRef`] with its schema normalized
pub fn table_ref(schema: Option<&str>, name: &str, token: &str) -> TableRef {
    TableRef {
        schema: normalize_schema(schema, token),
        name: name.to_string(),
    }
}

/// Synthesize `{prefix}_{schema?}_{table}_{col1}_{col2}...`
///
/// The result depends only on the inputs. Check constraints without columns
/// have nothing to make them distinct and get a random 8-hex suffix instead.
pub fn synthesize_name(prefix: &str, table: &TableRef, columns: &[String]) -> Result<String> {
    let mut parts = vec![prefix.to_string()];

    if let Some(schema) = &table.schema {
        parts.push(sanitize_fragment(schema)?);
    }
    parts.push(sanitize_fragment(&table.name)?);

    if columns.is_empty() {
        let suffix = Uuid::new_v4().simple().to_string();
        parts.push(suffix[..8].to_string());
    } else {
        for column in columns {
            parts.push(sanitize_fragment(column)?);
        }
    }

    Ok(parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_schema() {
        assert_eq!(normalize_schema(None, "_"), None);
        assert_eq!(normalize_schema(Some(""), "_"), None);
        assert_eq!(normalize_schema(Some("   "), "_"), None);
        assert_eq!(normalize_schema(Some("_"), "_"), None);
        assert_eq!(normalize_schema(Some("sales"), "_"), Some("sales".to_string()));
        assert_eq!(normalize_schema(Some("current"), "current"), None);
    }

    #[test]
    fn test_synthesize_unique_without_schema() {
        let name = synthesize_name("uq", &TableRef::new("users"), &["email".to_string()]).unwrap();
        assert_eq!(name, "uq_users_email");
    }

    #[test]
    fn test_synthesize_with_schema_and_columns() {
        let name = synthesize_name(
            INDEX_PREFIX,
            &TableRef::with_schema("sales", "orders"),
            &["customer_id".to_string(), "created at".to_string()],
        )
        .unwrap();
        assert_eq!(name, "ix_sales_orders_customer_id_created_at");
    }

    #[test]
    fn test_synthesize_is_deterministic() {
        let t = TableRef::new("orders");
        let cols = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            synthesize_name("fk", &t, &cols).unwrap(),
            synthesize_name("fk", &t, &cols).unwrap()
        );
    }

    #[test]
    fn test_synthesize_check_without_columns_is_random() {
        let t = TableRef::new("orders");
        let a = synthesize_name("chk", &t, &[]).unwrap();
        let b = synthesize_name("chk", &t, &[]).unwrap();
        assert!(a.starts_with("chk_orders_"));
        assert_eq!(a.len(), "chk_orders_".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_table_ref_normalizes() {
        let t = table_ref(Some("_"), "users", "_");
        assert!(t.schema.is_none());
        assert_eq!(t.name, "users");
    }
}
