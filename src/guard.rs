//! Existence guards run before mutations and name-sensitive reads
//!
//! [`assert_exists`] fails with `NotFound` and [`assert_not_exists`] fails with
//! `AlreadyExists`; both ask the connection once and never retry.

use crate::driver::Connection;
use crate::error::{Result, SchemaAdminError};
use crate::types::{ConstraintKind, ObjectKind, TableRef};

/// Address of a schema object
#[derive(Debug, Clone, Copy)]
pub enum ObjectPath<'a> {
    Schema(&'a str),
    Table(&'a TableRef),
    View(&'a TableRef),
    Column(&'a TableRef, &'a str),
    Index(&'a TableRef, &'a str),
    Constraint(&'a TableRef, ConstraintKind, &'a str),
}

impl ObjectPath<'_> {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectPath::Schema(_) => ObjectKind::Schema,
            ObjectPath::Table(_) => ObjectKind::Table,
            ObjectPath::View(_) => ObjectKind::View,
            ObjectPath::Column(..) => ObjectKind::Column,
            ObjectPath::Index(..) => ObjectKind::Index,
            ObjectPath::Constraint(_, kind, _) => kind.object_kind(),
        }
    }

    /// Human-readable identity used in error messages, e.g. `sales.orders.email`
    pub fn identity(&self) -> String {
        match self {
            ObjectPath::Schema(name) => name.to_string(),
            ObjectPath::Table(table) | ObjectPath::View(table) => table.to_string(),
            ObjectPath::Column(table, name)
            | ObjectPath::Index(table, name)
            | ObjectPath::Constraint(table, _, name) => format!("{}.{}", table, name),
        }
    }

    pub async fn exists(&self, conn: &mut dyn Connection) -> Result<bool> {
        match *self {
            ObjectPath::Schema(name) => conn.schema_exists(name).await,
            ObjectPath::Table(table) => conn.table_exists(table).await,
            ObjectPath::View(view) => conn.view_exists(view).await,
            ObjectPath::Column(table, name) => conn.column_exists(table, name).await,
            ObjectPath::Index(table, name) => conn.index_exists(table, name).await,
            ObjectPath::Constraint(table, kind, name) => {
                conn.constraint_exists(table, kind, name).await
            }
        }
    }
}

/// Fail with `NotFound` unless the object exists
pub async fn assert_exists(conn: &mut dyn Connection, path: ObjectPath<'_>) -> Result<()> {
    if path.exists(conn).await? {
        Ok(())
    } else {
        Err(SchemaAdminError::not_found(path.kind(), path.identity()))
    }
}

/// Fail with `AlreadyExists` if the object exists
pub async fn assert_not_exists(conn: &mut dyn Connection, path: ObjectPath<'_>) -> Result<()> {
    if path.exists(conn).await? {
        Err(SchemaAdminError::already_exists(path.kind(), path.identity()))
    } else {
        Ok(())
    }
}
