//! Database driver collaborator
//!
//! A [`Driver`] hands out [`Connection`]s; a connection exposes the per-kind
//! primitives the service is built from: list, exists, create-if-not-exists,
//! rename-if-exists, drop-if-exists, column introspection, parameterized
//! reads and explicit transactions.
//!
//! The crate bundles sqlx-backed drivers for PostgreSQL ([`postgres`]) and
//! SQLite ([`sqlite`]). Other engines plug in their own implementation.

pub mod postgres;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;

use crate::dialect::{Dialect, Engine};
use crate::error::Result;
use crate::query::Row;
use crate::sql::condition::BoundParameter;
use crate::types::{
    ColumnDefinition, Constraint, ConstraintKind, IndexDefinition, TableRef, ViewInfo,
};

/// A rendered SQL statement and the values bound to its placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<BoundParameter>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<BoundParameter>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Source of connections for one database
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    fn engine(&self) -> Engine;

    /// Acquire a connection; it is released when dropped
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// One database session
///
/// Names are matched exactly. Schema arguments are already normalized:
/// `None` means the connection's current schema.
#[async_trait]
pub trait Connection: Send {
    fn engine(&self) -> Engine;

    fn dialect(&self) -> &'static dyn Dialect {
        self.engine().dialect()
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    async fn list_schemas(&mut self) -> Result<Vec<String>>;

    async fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        Ok(self.list_schemas().await?.iter().any(|s| s == schema))
    }

    async fn create_schema_if_not_exists(&mut self, schema: &str) -> Result<()>;

    async fn drop_schema_if_exists(&mut self, schema: &str) -> Result<()>;

    // ========================================================================
    // Tables
    // ========================================================================

    async fn list_tables(&mut self, schema: Option<&str>) -> Result<Vec<TableRef>>;

    async fn table_exists(&mut self, table: &TableRef) -> Result<bool> {
        Ok(self
            .list_tables(table.schema.as_deref())
            .await?
            .iter()
            .any(|t| t.name == table.name))
    }

    /// Columns of a table or view in ordinal order
    async fn table_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnDefinition>>;

    async fn create_table_if_not_exists(
        &mut self,
        table: &TableRef,
        columns: &[ColumnDefinition],
        primary_key: Option<&Constraint>,
    ) -> Result<()>;

    async fn rename_table_if_exists(&mut self, table: &TableRef, new_name: &str) -> Result<()>;

    async fn drop_table_if_exists(&mut self, table: &TableRef) -> Result<()>;

    // ========================================================================
    // Views
    // ========================================================================

    async fn list_views(&mut self, schema: Option<&str>) -> Result<Vec<ViewInfo>>;

    async fn view_exists(&mut self, view: &TableRef) -> Result<bool> {
        Ok(self
            .list_views(view.schema.as_deref())
            .await?
            .iter()
            .any(|v| v.view.name == view.name))
    }

    async fn create_view_if_not_exists(&mut self, view: &TableRef, definition: &str)
    -> Result<()>;

    async fn rename_view_if_exists(&mut self, view: &TableRef, new_name: &str) -> Result<()>;

    async fn drop_view_if_exists(&mut self, view: &TableRef) -> Result<()>;

    // ========================================================================
    // Columns
    // ========================================================================

    async fn column_exists(&mut self, table: &TableRef, column: &str) -> Result<bool> {
        Ok(self
            .table_columns(table)
            .await?
            .iter()
            .any(|c| c.name == column))
    }

    async fn add_column_if_not_exists(
        &mut self,
        table: &TableRef,
        column: &ColumnDefinition,
    ) -> Result<()>;

    async fn rename_column_if_exists(
        &mut self,
        table: &TableRef,
        column: &str,
        new_name: &str,
    ) -> Result<()>;

    async fn drop_column_if_exists(&mut self, table: &TableRef, column: &str) -> Result<()>;

    // ========================================================================
    // Indexes
    // ========================================================================

    async fn list_indexes(&mut self, table: &TableRef) -> Result<Vec<IndexDefinition>>;

    async fn index_exists(&mut self, table: &TableRef, name: &str) -> Result<bool> {
        Ok(self
            .list_indexes(table)
            .await?
            .iter()
            .any(|i| i.name == name))
    }

    async fn create_index_if_not_exists(
        &mut self,
        table: &TableRef,
        index: &IndexDefinition,
    ) -> Result<()>;

    async fn rename_index_if_exists(
        &mut self,
        table: &TableRef,
        name: &str,
        new_name: &str,
    ) -> Result<()>;

    async fn drop_index_if_exists(&mut self, table: &TableRef, name: &str) -> Result<()>;

    // ========================================================================
    // Constraints
    // ========================================================================

    async fn list_constraints(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
    ) -> Result<Vec<Constraint>>;

    async fn constraint_exists(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
        name: &str,
    ) -> Result<bool> {
        Ok(self
            .list_constraints(table, kind)
            .await?
            .iter()
            .any(|c| c.name == name))
    }

    async fn create_constraint_if_not_exists(
        &mut self,
        table: &TableRef,
        constraint: &Constraint,
    ) -> Result<()>;

    async fn rename_constraint_if_exists(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
        name: &str,
        new_name: &str,
    ) -> Result<()>;

    async fn drop_constraint_if_exists(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
        name: &str,
    ) -> Result<()>;

    // ========================================================================
    // Data
    // ========================================================================

    async fn fetch_rows(&mut self, statement: &Statement) -> Result<Vec<Row>>;

    /// Run a statement whose first column of the first row is a count
    async fn fetch_count(&mut self, statement: &Statement) -> Result<i64>;

    // ========================================================================
    // Transactions
    // ========================================================================

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
