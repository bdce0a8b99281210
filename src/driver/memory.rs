//! In-memory connection for unit tests
//!
//! Keeps a catalog of schemas, tables, views, indexes and constraints, records
//! every data statement, and can be told to rename or lose created objects to
//! imitate engines that assign their own names.
//!
//! A connection dropped with its transaction open rolls it back, as a sqlx
//! transaction does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Connection, Driver, Statement};
use crate::dialect::Engine;
use crate::error::{Result, SchemaAdminError};
use crate::query::Row;
use crate::types::{
    ColumnDefinition, Constraint, ConstraintKind, IndexDefinition, TableRef, ViewInfo,
};

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<ColumnDefinition>,
    pub indexes: Vec<IndexDefinition>,
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub schemas: Vec<String>,
    pub tables: HashMap<TableRef, MemoryTable>,
    pub views: HashMap<TableRef, String>,
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub catalog: Catalog,
    snapshot: Option<Catalog>,
    /// Data statements in execution order
    pub statements: Vec<Statement>,
    /// `begin` / `commit` / `rollback` in call order
    pub transactions: Vec<&'static str>,
    /// Rows returned by every data statement
    pub rows: Vec<Row>,
    /// Value returned by every count statement
    pub count: i64,
    /// Name given to the next created index or constraint instead of the requested one
    pub assign_name: Option<String>,
    /// Discard the next created index or constraint
    pub lose_next_create: bool,
    /// Fail the first add-column call for this column name
    pub fail_add_column: Option<String>,
    /// Cancel the token, then never finish, when this column is added
    pub cancel_on_add_column: Option<(String, CancellationToken)>,
}

/// Shared-state driver; every connection sees the same catalog
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    engine: Engine,
    pub state: Arc<Mutex<MemoryState>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::with_engine(Engine::Sqlite)
    }

    pub fn with_engine(engine: Engine) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn engine(&self) -> Engine {
        self.engine.clone()
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(MemoryConnection {
            engine: self.engine.clone(),
            state: Arc::clone(&self.state),
            in_transaction: false,
        }))
    }
}

pub struct MemoryConnection {
    engine: Engine,
    state: Arc<Mutex<MemoryState>>,
    in_transaction: bool,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            if let Some(snapshot) = state.snapshot.take() {
                state.catalog = snapshot;
            }
            state.transactions.push("rollback");
        }
    }
}

impl MemoryConnection {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    fn with_table<T>(
        &self,
        table: &TableRef,
        f: impl FnOnce(&mut MemoryTable) -> T,
    ) -> Result<T> {
        let mut state = self.state();
        match state.catalog.tables.get_mut(table) {
            Some(t) => Ok(f(t)),
            None => Err(SchemaAdminError::data_engine(format!(
                "no such table: {}",
                table
            ))),
        }
    }

    /// Name to store for a newly created object, or `None` to drop it
    fn assigned_name(&self, requested: &str) -> Option<String> {
        let mut state = self.state();
        if state.lose_next_create {
            state.lose_next_create = false;
            return None;
        }
        Some(
            state
                .assign_name
                .take()
                .unwrap_or_else(|| requested.to_string()),
        )
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn engine(&self) -> Engine {
        self.engine.clone()
    }

    async fn list_schemas(&mut self) -> Result<Vec<String>> {
        Ok(self.state().catalog.schemas.clone())
    }

    async fn create_schema_if_not_exists(&mut self, schema: &str) -> Result<()> {
        let mut state = self.state();
        if !state.catalog.schemas.iter().any(|s| s == schema) {
            state.catalog.schemas.push(schema.to_string());
        }
        Ok(())
    }

    async fn drop_schema_if_exists(&mut self, schema: &str) -> Result<()> {
        self.state().catalog.schemas.retain(|s| s != schema);
        Ok(())
    }

    async fn list_tables(&mut self, schema: Option<&str>) -> Result<Vec<TableRef>> {
        let mut tables: Vec<TableRef> = self
            .state()
            .catalog
            .tables
            .keys()
            .filter(|t| t.schema.as_deref() == schema)
            .cloned()
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    async fn table_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnDefinition>> {
        let state = self.state();
        if let Some(t) = state.catalog.tables.get(table) {
            return Ok(t.columns.clone());
        }
        if state.catalog.views.contains_key(table) {
            return Ok(vec![ColumnDefinition::new("value", "TEXT")]);
        }
        Ok(Vec::new())
    }

    async fn create_table_if_not_exists(
        &mut self,
        table: &TableRef,
        columns: &[ColumnDefinition],
        primary_key: Option<&Constraint>,
    ) -> Result<()> {
        let mut state = self.state();
        state
            .catalog
            .tables
            .entry(table.clone())
            .or_insert_with(|| MemoryTable {
                columns: columns.to_vec(),
                indexes: Vec::new(),
                constraints: primary_key.cloned().into_iter().collect(),
            });
        Ok(())
    }

    async fn rename_table_if_exists(&mut self, table: &TableRef, new_name: &str) -> Result<()> {
        let mut state = self.state();
        if let Some(t) = state.catalog.tables.remove(table) {
            state.catalog.tables.insert(table.renamed(new_name), t);
        }
        Ok(())
    }

    async fn drop_table_if_exists(&mut self, table: &TableRef) -> Result<()> {
        self.state().catalog.tables.remove(table);
        Ok(())
    }

    async fn list_views(&mut self, schema: Option<&str>) -> Result<Vec<ViewInfo>> {
        Ok(self
            .state()
            .catalog
            .views
            .iter()
            .filter(|(v, _)| v.schema.as_deref() == schema)
            .map(|(v, d)| ViewInfo {
                view: v.clone(),
                definition: Some(d.clone()),
            })
            .collect())
    }

    async fn create_view_if_not_exists(
        &mut self,
        view: &TableRef,
        definition: &str,
    ) -> Result<()> {
        self.state()
            .catalog
            .views
            .entry(view.clone())
            .or_insert_with(|| definition.to_string());
        Ok(())
    }

    async fn rename_view_if_exists(&mut self, view: &TableRef, new_name: &str) -> Result<()> {
        let mut state = self.state();
        if let Some(d) = state.catalog.views.remove(view) {
            state.catalog.views.insert(view.renamed(new_name), d);
        }
        Ok(())
    }

    async fn drop_view_if_exists(&mut self, view: &TableRef) -> Result<()> {
        self.state().catalog.views.remove(view);
        Ok(())
    }

    async fn add_column_if_not_exists(
        &mut self,
        table: &TableRef,
        column: &ColumnDefinition,
    ) -> Result<()> {
        let cancel = {
            let mut state = self.state();
            if state.fail_add_column.as_deref() == Some(column.name.as_str()) {
                state.fail_add_column = None;
                return Err(SchemaAdminError::data_engine(format!(
                    "cannot add column {}",
                    column.name
                )));
            }
            let hit = state
                .cancel_on_add_column
                .as_ref()
                .is_some_and(|(name, _)| *name == column.name);
            if hit {
                state.cancel_on_add_column.take().map(|(_, token)| token)
            } else {
                None
            }
        };
        if let Some(token) = cancel {
            token.cancel();
            std::future::pending::<()>().await;
        }
        self.with_table(table, |t| {
            if !t.columns.iter().any(|c| c.name == column.name) {
                t.columns.push(column.clone());
            }
        })
    }

    async fn rename_column_if_exists(
        &mut self,
        table: &TableRef,
        column: &str,
        new_name: &str,
    ) -> Result<()> {
        self.with_table(table, |t| {
            if let Some(c) = t.columns.iter_mut().find(|c| c.name == column) {
                c.name = new_name.to_string();
            }
        })
    }

    async fn drop_column_if_exists(&mut self, table: &TableRef, column: &str) -> Result<()> {
        self.with_table(table, |t| t.columns.retain(|c| c.name != column))
    }

    async fn list_indexes(&mut self, table: &TableRef) -> Result<Vec<IndexDefinition>> {
        Ok(self
            .state()
            .catalog
            .tables
            .get(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default())
    }

    async fn create_index_if_not_exists(
        &mut self,
        table: &TableRef,
        index: &IndexDefinition,
    ) -> Result<()> {
        let Some(name) = self.assigned_name(&index.name) else {
            return Ok(());
        };
        self.with_table(table, |t| {
            if !t.indexes.iter().any(|i| i.name == name) {
                t.indexes.push(IndexDefinition {
                    name,
                    columns: index.columns.clone(),
                    unique: index.unique,
                });
            }
        })
    }

    async fn rename_index_if_exists(
        &mut self,
        table: &TableRef,
        name: &str,
        new_name: &str,
    ) -> Result<()> {
        self.with_table(table, |t| {
            if let Some(i) = t.indexes.iter_mut().find(|i| i.name == name) {
                i.name = new_name.to_string();
            }
        })
    }

    async fn drop_index_if_exists(&mut self, table: &TableRef, name: &str) -> Result<()> {
        self.with_table(table, |t| t.indexes.retain(|i| i.name != name))
    }

    async fn list_constraints(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
    ) -> Result<Vec<Constraint>> {
        Ok(self
            .state()
            .catalog
            .tables
            .get(table)
            .map(|t| {
                t.constraints
                    .iter()
                    .filter(|c| c.kind() == kind)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_constraint_if_not_exists(
        &mut self,
        table: &TableRef,
        constraint: &Constraint,
    ) -> Result<()> {
        let Some(name) = self.assigned_name(&constraint.name) else {
            return Ok(());
        };
        self.with_table(table, |t| {
            if !t.constraints.iter().any(|c| c.name == name) {
                t.constraints.push(Constraint {
                    name,
                    columns: constraint.columns.clone(),
                    spec: constraint.spec.clone(),
                });
            }
        })
    }

    async fn rename_constraint_if_exists(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
        name: &str,
        new_name: &str,
    ) -> Result<()> {
        self.with_table(table, |t| {
            if let Some(c) = t
                .constraints
                .iter_mut()
                .find(|c| c.kind() == kind && c.name == name)
            {
                c.name = new_name.to_string();
            }
        })
    }

    async fn drop_constraint_if_exists(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
        name: &str,
    ) -> Result<()> {
        self.with_table(table, |t| {
            t.constraints
                .retain(|c| !(c.kind() == kind && c.name == name))
        })
    }

    async fn fetch_rows(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        let mut state = self.state();
        state.statements.push(statement.clone());
        Ok(state.rows.clone())
    }

    async fn fetch_count(&mut self, statement: &Statement) -> Result<i64> {
        let mut state = self.state();
        state.statements.push(statement.clone());
        Ok(state.count)
    }

    async fn begin(&mut self) -> Result<()> {
        let mut state = self.state();
        state.snapshot = Some(state.catalog.clone());
        state.transactions.push("begin");
        drop(state);
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state();
        state.snapshot = None;
        state.transactions.push("commit");
        drop(state);
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.state();
        if let Some(snapshot) = state.snapshot.take() {
            state.catalog = snapshot;
        }
        state.transactions.push("rollback");
        drop(state);
        self.in_transaction = false;
        Ok(())
    }
}
