//! Core type definitions for schema administration
//!
//! Includes object kinds, table references, column, index, and constraint definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Object Kinds
// ============================================================================

/// Kind of schema object an operation addresses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
    Schema,
    Table,
    View,
    Column,
    Index,
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    Default,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObjectKind::Schema => "Schema",
            ObjectKind::Table => "Table",
            ObjectKind::View => "View",
            ObjectKind::Column => "Column",
            ObjectKind::Index => "Index",
            ObjectKind::PrimaryKey => "Primary key",
            ObjectKind::ForeignKey => "Foreign key",
            ObjectKind::Unique => "Unique constraint",
            ObjectKind::Check => "Check constraint",
            ObjectKind::Default => "Default constraint",
        };
        f.write_str(label)
    }
}

/// Constraint flavours that can be attached to a table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    Default,
}

impl ConstraintKind {
    /// Prefix used when synthesizing a name for an unnamed constraint
    pub fn name_prefix(self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "pk",
            ConstraintKind::ForeignKey => "fk",
            ConstraintKind::Unique => "uq",
            ConstraintKind::Check => "chk",
            ConstraintKind::Default => "df",
        }
    }

    pub fn object_kind(self) -> ObjectKind {
        match self {
            ConstraintKind::PrimaryKey => ObjectKind::PrimaryKey,
            ConstraintKind::ForeignKey => ObjectKind::ForeignKey,
            ConstraintKind::Unique => ObjectKind::Unique,
            ConstraintKind::Check => ObjectKind::Check,
            ConstraintKind::Default => ObjectKind::Default,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.object_kind().fmt(f)
    }
}

// ============================================================================
// Table References
// ============================================================================

/// A table or view name, optionally qualified by schema
///
/// The schema is `None` when the object lives in the connection's current schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TableRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Same schema, different object name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            schema: self.schema.clone(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

// ============================================================================
// Columns
// ============================================================================

fn default_nullable() -> bool {
    true
}

/// Column definition, used both for creation and for introspected metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,

    /// Engine-native type text, e.g. `varchar(50)` or `BIGINT`
    pub data_type: String,

    /// Whether the column allows NULL values (default: true)
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Default value (SQL expression, e.g., "0", "NOW()", "'active'")
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "default")]
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    /// Create a new column definition with a name and type
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default_value: None,
        }
    }

    /// Set the column as non-nullable
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set a default value
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

// ============================================================================
// Indexes
// ============================================================================

/// Index definition as created or introspected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDefinition {
    /// Index name
    pub name: String,

    /// Columns included in the index, in key order
    pub columns: Vec<String>,

    /// Whether this is a UNIQUE index (default: false)
    #[serde(default)]
    pub unique: bool,
}

impl IndexDefinition {
    /// Create a new index definition
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
        }
    }

    /// Set the index as unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Request to create an index; the name is synthesized when absent
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateIndexRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl CreateIndexRequest {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            name: None,
            columns,
            unique: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

// ============================================================================
// Constraints
// ============================================================================

/// Referential action for foreign keys
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    pub fn to_sql(self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse the engine's textual rule (`NO ACTION`, `CASCADE`, ...)
    pub fn from_sql(rule: &str) -> Option<Self> {
        match rule.trim().to_uppercase().as_str() {
            "NO ACTION" => Some(ReferentialAction::NoAction),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" => Some(ReferentialAction::SetNull),
            "SET DEFAULT" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }
}

/// Kind-specific part of a constraint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConstraintSpec {
    PrimaryKey,
    #[serde(rename_all = "camelCase")]
    ForeignKey {
        references: TableRef,
        referenced_columns: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_delete: Option<ReferentialAction>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_update: Option<ReferentialAction>,
    },
    Unique,
    Check {
        expression: String,
    },
    Default {
        expression: String,
    },
}

impl ConstraintSpec {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            ConstraintSpec::PrimaryKey => ConstraintKind::PrimaryKey,
            ConstraintSpec::ForeignKey { .. } => ConstraintKind::ForeignKey,
            ConstraintSpec::Unique => ConstraintKind::Unique,
            ConstraintSpec::Check { .. } => ConstraintKind::Check,
            ConstraintSpec::Default { .. } => ConstraintKind::Default,
        }
    }
}

/// A constraint as created or introspected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Constraint {
    pub name: String,
    /// Constrained columns; empty for table-level check constraints
    pub columns: Vec<String>,
    #[serde(flatten)]
    pub spec: ConstraintSpec,
}

impl Constraint {
    pub fn new(name: impl Into<String>, columns: Vec<String>, spec: ConstraintSpec) -> Self {
        Self {
            name: name.into(),
            columns,
            spec,
        }
    }

    pub fn kind(&self) -> ConstraintKind {
        self.spec.kind()
    }
}

/// Request to create a constraint; the name is synthesized when absent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateConstraintRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(flatten)]
    pub spec: ConstraintSpec,
}

impl CreateConstraintRequest {
    pub fn new(columns: Vec<String>, spec: ConstraintSpec) -> Self {
        Self {
            name: None,
            columns,
            spec,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ============================================================================
// Tables and Views
// ============================================================================

/// Table with its introspected columns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableInfo {
    pub table: TableRef,
    pub columns: Vec<ColumnDefinition>,
}

/// Request to create a table
///
/// A non-empty `primary_key` becomes a `pk_<table>_<cols>` constraint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableRequest {
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub primary_key: Vec<String>,
}

impl CreateTableRequest {
    pub fn new(columns: Vec<ColumnDefinition>) -> Self {
        Self {
            columns,
            primary_key: Vec::new(),
        }
    }

    pub fn primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = columns;
        self
    }
}

/// View with its definition text, when the engine exposes it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewInfo {
    pub view: TableRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

/// Bulk table modification applied in one transaction
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTableRequest {
    #[serde(default)]
    pub add_columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub drop_columns: Vec<String>,
    #[serde(default)]
    pub add_indexes: Vec<CreateIndexRequest>,
    #[serde(default)]
    pub add_constraints: Vec<CreateConstraintRequest>,
}

impl UpdateTableRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_column(mut self, column: ColumnDefinition) -> Self {
        self.add_columns.push(column);
        self
    }

    pub fn drop_column(mut self, name: impl Into<String>) -> Self {
        self.drop_columns.push(name.into());
        self
    }

    pub fn add_index(mut self, index: CreateIndexRequest) -> Self {
        self.add_indexes.push(index);
        self
    }

    pub fn add_constraint(mut self, constraint: CreateConstraintRequest) -> Self {
        self.add_constraints.push(constraint);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add_columns.is_empty()
            && self.drop_columns.is_empty()
            && self.add_indexes.is_empty()
            && self.add_constraints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // TableRef Tests
    // =========================================================================

    #[test]
    fn test_table_ref_display() {
        assert_eq!(TableRef::new("users").to_string(), "users");
        assert_eq!(
            TableRef::with_schema("sales", "orders").to_string(),
            "sales.orders"
        );
    }

    #[test]
    fn test_table_ref_renamed_keeps_schema() {
        let t = TableRef::with_schema("sales", "orders").renamed("orders_archive");
        assert_eq!(t.schema.as_deref(), Some("sales"));
        assert_eq!(t.name, "orders_archive");
    }

    // =========================================================================
    // ColumnDefinition Tests
    // =========================================================================

    #[test]
    fn test_column_definition_new() {
        let col = ColumnDefinition::new("name", "TEXT");
        assert_eq!(col.name, "name");
        assert_eq!(col.data_type, "TEXT");
        assert!(col.nullable);
        assert!(col.default_value.is_none());
    }

    #[test]
    fn test_column_definition_chained_builders() {
        let col = ColumnDefinition::new("status", "varchar(20)")
            .not_null()
            .default("'active'");

        assert!(!col.nullable);
        assert_eq!(col.default_value, Some("'active'".to_string()));
    }

    #[test]
    fn test_column_definition_deserialization() {
        let json = r#"{"name":"count","dataType":"integer","nullable":false}"#;
        let col: ColumnDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(col.name, "count");
        assert_eq!(col.data_type, "integer");
        assert!(!col.nullable);
    }

    // =========================================================================
    // Constraint Tests
    // =========================================================================

    #[test]
    fn test_constraint_kind_prefixes() {
        assert_eq!(ConstraintKind::ForeignKey.name_prefix(), "fk");
        assert_eq!(ConstraintKind::Unique.name_prefix(), "uq");
        assert_eq!(ConstraintKind::Check.name_prefix(), "chk");
        assert_eq!(ConstraintKind::Default.name_prefix(), "df");
    }

    #[test]
    fn test_constraint_spec_serialization() {
        let c = Constraint::new(
            "fk_orders_user_id",
            vec!["user_id".to_string()],
            ConstraintSpec::ForeignKey {
                references: TableRef::new("users"),
                referenced_columns: vec!["id".to_string()],
                on_delete: Some(ReferentialAction::Cascade),
                on_update: None,
            },
        );

        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"kind\":\"foreignKey\""));
        assert!(json.contains("\"referencedColumns\":[\"id\"]"));
        assert!(json.contains("\"onDelete\":\"cascade\""));

        let back: Constraint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), ConstraintKind::ForeignKey);
    }

    #[test]
    fn test_create_constraint_request_without_name() {
        let json = r#"{"columns":["email"],"kind":"unique"}"#;
        let req: CreateConstraintRequest = serde_json::from_str(json).unwrap();
        assert!(req.name.is_none());
        assert_eq!(req.spec.kind(), ConstraintKind::Unique);
    }

    #[test]
    fn test_referential_action_round_trip_text() {
        assert_eq!(
            ReferentialAction::from_sql("set null"),
            Some(ReferentialAction::SetNull)
        );
        assert_eq!(ReferentialAction::Cascade.to_sql(), "CASCADE");
        assert_eq!(ReferentialAction::from_sql("bogus"), None);
    }

    // =========================================================================
    // UpdateTableRequest Tests
    // =========================================================================

    #[test]
    fn test_update_table_request_builder() {
        let req = UpdateTableRequest::new()
            .add_column(ColumnDefinition::new("notes", "TEXT"))
            .drop_column("legacy")
            .add_index(CreateIndexRequest::new(vec!["notes".to_string()]));

        assert!(!req.is_empty());
        assert_eq!(req.add_columns.len(), 1);
        assert_eq!(req.drop_columns, vec!["legacy"]);
        assert!(UpdateTableRequest::new().is_empty());
    }
}
