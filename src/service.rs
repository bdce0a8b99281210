//! SchemaService - the public per-kind API
//!
//! Every call follows the same protocol: build an [`OperationDescriptor`],
//! fail fast if the token is already cancelled, ask the [`Authorizer`] once,
//! run the work on one connection while racing the cancellation token, then
//! report exactly one event to the [`AuditSink`].
//!
//! Schema arguments are normalized once here: `None`, blank text and the
//! configured current-schema token all mean the connection's current schema.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audit::{Action, AllowAll, AuditSink, Authorizer, OperationDescriptor, TracingAuditSink};
use crate::config::ServiceConfig;
use crate::dialect::Engine;
use crate::driver::postgres::PgDriver;
use crate::driver::sqlite::SqliteDriver;
use crate::driver::{Connection, Driver};
use crate::error::{Result, SchemaAdminError};
use crate::executor::{FieldSource, QueryExecutor};
use crate::guard::{ObjectPath, assert_exists, assert_not_exists};
use crate::naming::{normalize_schema, synthesize_name, table_ref};
use crate::query::{QueryRequest, QueryResult};
use crate::resolve::{self, Resolved};
use crate::sql::sanitize::validate_identifier;
use crate::types::{
    ColumnDefinition, Constraint, ConstraintKind, ConstraintSpec, CreateConstraintRequest,
    CreateIndexRequest, CreateTableRequest, IndexDefinition, ObjectKind, TableInfo, TableRef,
    UpdateTableRequest, ViewInfo,
};

/// Schema administration service over one database
pub struct SchemaService {
    driver: Arc<dyn Driver>,
    authorizer: Arc<dyn Authorizer>,
    audit: Arc<dyn AuditSink>,
    config: ServiceConfig,
    executor: QueryExecutor,
}

impl SchemaService {
    /// Connect the bundled driver for the configured engine
    ///
    /// PostgreSQL and SQLite are bundled; other engines need
    /// [`SchemaService::with_driver`].
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        let engine = config.resolved_engine().ok_or_else(|| {
            SchemaAdminError::invalid_argument(format!(
                "Cannot infer the database engine from '{}'",
                config.database_url
            ))
        })?;

        let driver: Arc<dyn Driver> = match engine {
            Engine::PostgreSql => Arc::new(
                PgDriver::connect(&config.database_url, config.max_connections).await?,
            ),
            Engine::Sqlite if config.database_url.contains(":memory:") => {
                Arc::new(SqliteDriver::in_memory().await?)
            }
            Engine::Sqlite => Arc::new(
                SqliteDriver::connect(&config.database_url, config.max_connections).await?,
            ),
            other => {
                return Err(SchemaAdminError::not_supported(format!(
                    "No bundled driver for {}",
                    other
                )));
            }
        };

        info!(engine = %engine, "Schema service connected");
        Ok(Self::with_driver(driver, config))
    }

    /// Use a caller-supplied driver
    pub fn with_driver(driver: Arc<dyn Driver>, config: ServiceConfig) -> Self {
        Self {
            executor: QueryExecutor::new(config.max_take),
            driver,
            authorizer: Arc::new(AllowAll),
            audit: Arc::new(TracingAuditSink),
            config,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn engine(&self) -> Engine {
        self.driver.engine()
    }

    // ========================================================================
    // Call protocol
    // ========================================================================

    async fn run<T, F>(
        &self,
        operation: OperationDescriptor,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = self.authorized(&operation, cancel, work).await;

        match &result {
            Ok(_) => self.audit.log_operation(&operation, true, None).await,
            Err(e) => {
                let message = e.to_string();
                self.audit
                    .log_operation(&operation, false, Some(&message))
                    .await
            }
        }

        result
    }

    async fn authorized<T, F>(
        &self,
        operation: &OperationDescriptor,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(SchemaAdminError::Cancelled);
        }
        if !self.authorizer.is_authorized(operation).await {
            return Err(SchemaAdminError::Unauthorized(operation.to_string()));
        }

        // Dropping `work` releases its connection; an open transaction rolls back
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SchemaAdminError::Cancelled),
            result = work => result,
        }
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        self.driver.connect().await
    }

    fn schema(&self, schema: Option<&str>) -> Option<String> {
        normalize_schema(schema, &self.config.current_schema_token)
    }

    fn table(&self, schema: Option<&str>, name: &str) -> TableRef {
        table_ref(schema, name, &self.config.current_schema_token)
    }

    fn op(action: Action, kind: ObjectKind, target: impl Into<String>) -> OperationDescriptor {
        OperationDescriptor::new(action, kind, target)
    }

    /// Normalize the schema of a foreign key's referenced table
    fn normalize_constraint(&self, request: &CreateConstraintRequest) -> CreateConstraintRequest {
        let mut request = request.clone();
        if let ConstraintSpec::ForeignKey { references, .. } = &mut request.spec {
            references.schema = self.schema(references.schema.as_deref());
        }
        request
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    pub async fn list_schemas(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let op = Self::op(Action::List, ObjectKind::Schema, "*");
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            conn.list_schemas().await
        })
        .await
    }

    pub async fn schema_exists(&self, schema: &str, cancel: &CancellationToken) -> Result<bool> {
        let op = Self::op(Action::Exists, ObjectKind::Schema, schema);
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            conn.schema_exists(schema).await
        })
        .await
    }

    pub async fn create_schema(&self, schema: &str, cancel: &CancellationToken) -> Result<()> {
        let op = Self::op(Action::Create, ObjectKind::Schema, schema);
        self.run(op, cancel, async {
            validate_identifier(schema, ObjectKind::Schema)?;
            let mut conn = self.connect().await?;
            assert_not_exists(conn.as_mut(), ObjectPath::Schema(schema)).await?;
            conn.create_schema_if_not_exists(schema).await?;
            info!(schema = %schema, "Created schema");
            Ok(())
        })
        .await
    }

    pub async fn drop_schema(&self, schema: &str, cancel: &CancellationToken) -> Result<()> {
        let op = Self::op(Action::Drop, ObjectKind::Schema, schema);
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            assert_exists(conn.as_mut(), ObjectPath::Schema(schema)).await?;
            conn.drop_schema_if_exists(schema).await?;
            info!(schema = %schema, "Dropped schema");
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Tables
    // ========================================================================

    pub async fn list_tables(
        &self,
        schema: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TableRef>> {
        let schema = self.schema(schema);
        let op = Self::op(Action::List, ObjectKind::Table, schema.as_deref().unwrap_or("*"));
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            if let Some(s) = &schema {
                assert_exists(conn.as_mut(), ObjectPath::Schema(s)).await?;
            }
            conn.list_tables(schema.as_deref()).await
        })
        .await
    }

    pub async fn get_table(
        &self,
        schema: Option<&str>,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<TableInfo> {
        let table = self.table(schema, name);
        let op = Self::op(Action::Get, ObjectKind::Table, table.to_string());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            table_info(conn.as_mut(), &table).await
        })
        .await
    }

    pub async fn table_exists(
        &self,
        schema: Option<&str>,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let table = self.table(schema, name);
        let op = Self::op(Action::Exists, ObjectKind::Table, table.to_string());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            conn.table_exists(&table).await
        })
        .await
    }

    pub async fn create_table(
        &self,
        schema: Option<&str>,
        name: &str,
        request: &CreateTableRequest,
        cancel: &CancellationToken,
    ) -> Result<TableInfo> {
        let table = self.table(schema, name);
        let op = Self::op(Action::Create, ObjectKind::Table, table.to_string());
        self.run(op, cancel, async {
            validate_identifier(&table.name, ObjectKind::Table)?;
            if request.columns.is_empty() {
                return Err(SchemaAdminError::invalid_argument(
                    "A table needs at least one column",
                ));
            }
            for column in &request.columns {
                validate_identifier(&column.name, ObjectKind::Column)?;
            }

            let primary_key = if request.primary_key.is_empty() {
                None
            } else {
                let name = synthesize_name(
                    ConstraintKind::PrimaryKey.name_prefix(),
                    &table,
                    &request.primary_key,
                )?;
                Some(Constraint::new(
                    name,
                    request.primary_key.clone(),
                    ConstraintSpec::PrimaryKey,
                ))
            };

            let mut conn = self.connect().await?;
            if let Some(s) = &table.schema {
                assert_exists(conn.as_mut(), ObjectPath::Schema(s)).await?;
            }
            assert_not_exists(conn.as_mut(), ObjectPath::Table(&table)).await?;

            conn.create_table_if_not_exists(&table, &request.columns, primary_key.as_ref())
                .await?;
            info!(table = %table, columns = request.columns.len(), "Created table");
            table_info(conn.as_mut(), &table).await
        })
        .await
    }

    pub async fn rename_table(
        &self,
        schema: Option<&str>,
        name: &str,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<TableRef> {
        let table = self.table(schema, name);
        let renamed = table.renamed(new_name);
        let op = Self::op(Action::Rename, ObjectKind::Table, table.to_string());
        self.run(op, cancel, async {
            validate_identifier(new_name, ObjectKind::Table)?;
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            assert_not_exists(conn.as_mut(), ObjectPath::Table(&renamed)).await?;
            conn.rename_table_if_exists(&table, new_name).await?;
            info!(table = %table, new_name = %new_name, "Renamed table");
            Ok(renamed.clone())
        })
        .await
    }

    pub async fn drop_table(
        &self,
        schema: Option<&str>,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let table = self.table(schema, name);
        let op = Self::op(Action::Drop, ObjectKind::Table, table.to_string());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            conn.drop_table_if_exists(&table).await?;
            info!(table = %table, "Dropped table");
            Ok(())
        })
        .await
    }

    /// Filtered, sorted, paginated read; fields come from the table's columns
    pub async fn query_table(
        &self,
        schema: Option<&str>,
        name: &str,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let table = self.table(schema, name);
        let op = Self::op(Action::Query, ObjectKind::Table, table.to_string());
        self.run(op, cancel, async {
            request.validate(self.config.max_take)?;
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            let columns = conn.table_columns(&table).await?;
            self.executor
                .execute(conn.as_mut(), &table, request, &columns, FieldSource::Declared)
                .await
        })
        .await
    }

    /// Apply column, index and constraint changes in one transaction
    ///
    /// Steps run in order: add columns, drop columns, add indexes, add
    /// constraints. Any failure rolls every step back.
    pub async fn update_table(
        &self,
        schema: Option<&str>,
        name: &str,
        request: &UpdateTableRequest,
        cancel: &CancellationToken,
    ) -> Result<TableInfo> {
        let table = self.table(schema, name);
        let op = Self::op(Action::Update, ObjectKind::Table, table.to_string());
        self.run(op, cancel, async {
            if request.is_empty() {
                return Err(SchemaAdminError::invalid_argument("Nothing to update"));
            }

            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;

            conn.begin().await?;
            if let Err(e) = self.apply_update(conn.as_mut(), &table, request).await {
                if let Err(rollback_error) = conn.rollback().await {
                    warn!(table = %table, error = %rollback_error, "Rollback failed");
                }
                return Err(e);
            }
            conn.commit().await?;

            info!(
                table = %table,
                added_columns = request.add_columns.len(),
                dropped_columns = request.drop_columns.len(),
                added_indexes = request.add_indexes.len(),
                added_constraints = request.add_constraints.len(),
                "Updated table"
            );
            table_info(conn.as_mut(), &table).await
        })
        .await
    }

    async fn apply_update(
        &self,
        conn: &mut dyn Connection,
        table: &TableRef,
        request: &UpdateTableRequest,
    ) -> Result<()> {
        for column in &request.add_columns {
            validate_identifier(&column.name, ObjectKind::Column)?;
            assert_not_exists(conn, ObjectPath::Column(table, &column.name)).await?;
            conn.add_column_if_not_exists(table, column).await?;
        }

        for column in &request.drop_columns {
            assert_exists(conn, ObjectPath::Column(table, column)).await?;
            conn.drop_column_if_exists(table, column).await?;
        }

        for index in &request.add_indexes {
            resolve::create_index(conn, table, index).await?;
        }

        for constraint in &request.add_constraints {
            let constraint = self.normalize_constraint(constraint);
            require_references(conn, &constraint).await?;
            resolve::create_constraint(conn, table, &constraint).await?;
        }

        Ok(())
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub async fn list_views(
        &self,
        schema: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ViewInfo>> {
        let schema = self.schema(schema);
        let op = Self::op(Action::List, ObjectKind::View, schema.as_deref().unwrap_or("*"));
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            if let Some(s) = &schema {
                assert_exists(conn.as_mut(), ObjectPath::Schema(s)).await?;
            }
            conn.list_views(schema.as_deref()).await
        })
        .await
    }

    pub async fn get_view(
        &self,
        schema: Option<&str>,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ViewInfo> {
        let view = self.table(schema, name);
        let op = Self::op(Action::Get, ObjectKind::View, view.to_string());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            find_view(conn.as_mut(), &view).await
        })
        .await
    }

    pub async fn view_exists(
        &self,
        schema: Option<&str>,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let view = self.table(schema, name);
        let op = Self::op(Action::Exists, ObjectKind::View, view.to_string());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            conn.view_exists(&view).await
        })
        .await
    }

    /// Create a view from a SELECT body
    pub async fn create_view(
        &self,
        schema: Option<&str>,
        name: &str,
        definition: &str,
        cancel: &CancellationToken,
    ) -> Result<ViewInfo> {
        let view = self.table(schema, name);
        let op = Self::op(Action::Create, ObjectKind::View, view.to_string());
        self.run(op, cancel, async {
            validate_identifier(&view.name, ObjectKind::View)?;
            if definition.trim().trim_end_matches(';').trim().is_empty() {
                return Err(SchemaAdminError::invalid_argument(
                    "A view needs a definition",
                ));
            }

            let mut conn = self.connect().await?;
            if let Some(s) = &view.schema {
                assert_exists(conn.as_mut(), ObjectPath::Schema(s)).await?;
            }
            assert_not_exists(conn.as_mut(), ObjectPath::View(&view)).await?;
            conn.create_view_if_not_exists(&view, definition).await?;
            info!(view = %view, "Created view");
            find_view(conn.as_mut(), &view).await
        })
        .await
    }

    pub async fn rename_view(
        &self,
        schema: Option<&str>,
        name: &str,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<TableRef> {
        let view = self.table(schema, name);
        let renamed = view.renamed(new_name);
        let op = Self::op(Action::Rename, ObjectKind::View, view.to_string());
        self.run(op, cancel, async {
            validate_identifier(new_name, ObjectKind::View)?;
            let mut conn = self.connect().await?;
            assert_exists(conn.as_mut(), ObjectPath::View(&view)).await?;
            assert_not_exists(conn.as_mut(), ObjectPath::View(&renamed)).await?;
            conn.rename_view_if_exists(&view, new_name).await?;
            info!(view = %view, new_name = %new_name, "Renamed view");
            Ok(renamed.clone())
        })
        .await
    }

    pub async fn drop_view(
        &self,
        schema: Option<&str>,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let view = self.table(schema, name);
        let op = Self::op(Action::Drop, ObjectKind::View, view.to_string());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            assert_exists(conn.as_mut(), ObjectPath::View(&view)).await?;
            conn.drop_view_if_exists(&view).await?;
            info!(view = %view, "Dropped view");
            Ok(())
        })
        .await
    }

    /// Filtered, sorted, paginated read; fields are inferred from the first row
    pub async fn query_view(
        &self,
        schema: Option<&str>,
        name: &str,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let view = self.table(schema, name);
        let op = Self::op(Action::Query, ObjectKind::View, view.to_string());
        self.run(op, cancel, async {
            request.validate(self.config.max_take)?;
            let mut conn = self.connect().await?;
            assert_exists(conn.as_mut(), ObjectPath::View(&view)).await?;
            let columns = conn.table_columns(&view).await?;
            self.executor
                .execute(conn.as_mut(), &view, request, &columns, FieldSource::FirstRow)
                .await
        })
        .await
    }

    // ========================================================================
    // Columns
    // ========================================================================

    pub async fn list_columns(
        &self,
        schema: Option<&str>,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ColumnDefinition>> {
        let table = self.table(schema, table);
        let op = Self::op(Action::List, ObjectKind::Column, table.to_string());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            conn.table_columns(&table).await
        })
        .await
    }

    pub async fn get_column(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        cancel: &CancellationToken,
    ) -> Result<ColumnDefinition> {
        let table = self.table(schema, table);
        let path = ObjectPath::Column(&table, column);
        let op = Self::op(Action::Get, ObjectKind::Column, path.identity());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            find_column(conn.as_mut(), &table, column).await
        })
        .await
    }

    pub async fn column_exists(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let table = self.table(schema, table);
        let path = ObjectPath::Column(&table, column);
        let op = Self::op(Action::Exists, ObjectKind::Column, path.identity());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            path.exists(conn.as_mut()).await
        })
        .await
    }

    pub async fn add_column(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &ColumnDefinition,
        cancel: &CancellationToken,
    ) -> Result<ColumnDefinition> {
        let table = self.table(schema, table);
        let path = ObjectPath::Column(&table, &column.name);
        let op = Self::op(Action::Create, ObjectKind::Column, path.identity());
        self.run(op, cancel, async {
            validate_identifier(&column.name, ObjectKind::Column)?;
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            assert_not_exists(conn.as_mut(), path).await?;
            conn.add_column_if_not_exists(&table, column).await?;
            info!(table = %table, column = %column.name, "Added column");
            find_column(conn.as_mut(), &table, &column.name).await
        })
        .await
    }

    pub async fn rename_column(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<ColumnDefinition> {
        let table = self.table(schema, table);
        let path = ObjectPath::Column(&table, column);
        let op = Self::op(Action::Rename, ObjectKind::Column, path.identity());
        self.run(op, cancel, async {
            validate_identifier(new_name, ObjectKind::Column)?;
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            assert_exists(conn.as_mut(), path).await?;
            assert_not_exists(conn.as_mut(), ObjectPath::Column(&table, new_name)).await?;
            conn.rename_column_if_exists(&table, column, new_name)
                .await?;
            info!(table = %table, column = %column, new_name = %new_name, "Renamed column");
            find_column(conn.as_mut(), &table, new_name).await
        })
        .await
    }

    pub async fn drop_column(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let table = self.table(schema, table);
        let path = ObjectPath::Column(&table, column);
        let op = Self::op(Action::Drop, ObjectKind::Column, path.identity());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            assert_exists(conn.as_mut(), path).await?;
            conn.drop_column_if_exists(&table, column).await?;
            info!(table = %table, column = %column, "Dropped column");
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    pub async fn list_indexes(
        &self,
        schema: Option<&str>,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<IndexDefinition>> {
        let table = self.table(schema, table);
        let op = Self::op(Action::List, ObjectKind::Index, table.to_string());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            conn.list_indexes(&table).await
        })
        .await
    }

    pub async fn get_index(
        &self,
        schema: Option<&str>,
        table: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<IndexDefinition> {
        let table = self.table(schema, table);
        let path = ObjectPath::Index(&table, name);
        let op = Self::op(Action::Get, ObjectKind::Index, path.identity());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            conn.list_indexes(&table)
                .await?
                .into_iter()
                .find(|i| i.name == name)
                .ok_or_else(|| SchemaAdminError::not_found(ObjectKind::Index, path.identity()))
        })
        .await
    }

    pub async fn index_exists(
        &self,
        schema: Option<&str>,
        table: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let table = self.table(schema, table);
        let path = ObjectPath::Index(&table, name);
        let op = Self::op(Action::Exists, ObjectKind::Index, path.identity());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            path.exists(conn.as_mut()).await
        })
        .await
    }

    /// Create an index, synthesizing `ix_<table>_<cols>` when unnamed
    pub async fn create_index(
        &self,
        schema: Option<&str>,
        table: &str,
        request: &CreateIndexRequest,
        cancel: &CancellationToken,
    ) -> Result<Resolved<IndexDefinition>> {
        let table = self.table(schema, table);
        let target = match &request.name {
            Some(name) => format!("{}.{}", table, name),
            None => table.to_string(),
        };
        let op = Self::op(Action::Create, ObjectKind::Index, target);
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            resolve::create_index(conn.as_mut(), &table, request).await
        })
        .await
    }

    pub async fn rename_index(
        &self,
        schema: Option<&str>,
        table: &str,
        name: &str,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let table = self.table(schema, table);
        let path = ObjectPath::Index(&table, name);
        let op = Self::op(Action::Rename, ObjectKind::Index, path.identity());
        self.run(op, cancel, async {
            validate_identifier(new_name, ObjectKind::Index)?;
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            assert_exists(conn.as_mut(), path).await?;
            assert_not_exists(conn.as_mut(), ObjectPath::Index(&table, new_name)).await?;
            conn.rename_index_if_exists(&table, name, new_name).await?;
            info!(table = %table, index = %name, new_name = %new_name, "Renamed index");
            Ok(())
        })
        .await
    }

    pub async fn drop_index(
        &self,
        schema: Option<&str>,
        table: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let table = self.table(schema, table);
        let path = ObjectPath::Index(&table, name);
        let op = Self::op(Action::Drop, ObjectKind::Index, path.identity());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            assert_exists(conn.as_mut(), path).await?;
            conn.drop_index_if_exists(&table, name).await?;
            info!(table = %table, index = %name, "Dropped index");
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    pub async fn list_constraints(
        &self,
        schema: Option<&str>,
        table: &str,
        kind: ConstraintKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<Constraint>> {
        let table = self.table(schema, table);
        let op = Self::op(Action::List, kind.object_kind(), table.to_string());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            conn.list_constraints(&table, kind).await
        })
        .await
    }

    pub async fn get_constraint(
        &self,
        schema: Option<&str>,
        table: &str,
        kind: ConstraintKind,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Constraint> {
        let table = self.table(schema, table);
        let path = ObjectPath::Constraint(&table, kind, name);
        let op = Self::op(Action::Get, kind.object_kind(), path.identity());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            conn.list_constraints(&table, kind)
                .await?
                .into_iter()
                .find(|c| c.name == name)
                .ok_or_else(|| SchemaAdminError::not_found(kind.object_kind(), path.identity()))
        })
        .await
    }

    pub async fn constraint_exists(
        &self,
        schema: Option<&str>,
        table: &str,
        kind: ConstraintKind,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let table = self.table(schema, table);
        let path = ObjectPath::Constraint(&table, kind, name);
        let op = Self::op(Action::Exists, kind.object_kind(), path.identity());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            path.exists(conn.as_mut()).await
        })
        .await
    }

    /// Create a constraint, synthesizing `<prefix>_<table>_<cols>` when unnamed
    pub async fn create_constraint(
        &self,
        schema: Option<&str>,
        table: &str,
        request: &CreateConstraintRequest,
        cancel: &CancellationToken,
    ) -> Result<Resolved<Constraint>> {
        let table = self.table(schema, table);
        let kind = request.spec.kind();
        let target = match &request.name {
            Some(name) => format!("{}.{}", table, name),
            None => table.to_string(),
        };
        let op = Self::op(Action::Create, kind.object_kind(), target);
        self.run(op, cancel, async {
            let request = self.normalize_constraint(request);
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            require_references(conn.as_mut(), &request).await?;
            resolve::create_constraint(conn.as_mut(), &table, &request).await
        })
        .await
    }

    pub async fn rename_constraint(
        &self,
        schema: Option<&str>,
        table: &str,
        kind: ConstraintKind,
        name: &str,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let table = self.table(schema, table);
        let path = ObjectPath::Constraint(&table, kind, name);
        let op = Self::op(Action::Rename, kind.object_kind(), path.identity());
        self.run(op, cancel, async {
            validate_identifier(new_name, kind.object_kind())?;
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            assert_exists(conn.as_mut(), path).await?;
            assert_not_exists(
                conn.as_mut(),
                ObjectPath::Constraint(&table, kind, new_name),
            )
            .await?;
            conn.rename_constraint_if_exists(&table, kind, name, new_name).await?;
            info!(
                table = %table,
                kind = %kind,
                name = %name,
                new_name = %new_name,
                "Renamed constraint"
            );
            Ok(())
        })
        .await
    }

    pub async fn drop_constraint(
        &self,
        schema: Option<&str>,
        table: &str,
        kind: ConstraintKind,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let table = self.table(schema, table);
        let path = ObjectPath::Constraint(&table, kind, name);
        let op = Self::op(Action::Drop, kind.object_kind(), path.identity());
        self.run(op, cancel, async {
            let mut conn = self.connect().await?;
            require_table(conn.as_mut(), &table).await?;
            assert_exists(conn.as_mut(), path).await?;
            conn.drop_constraint_if_exists(&table, kind, name).await?;
            info!(table = %table, kind = %kind, name = %name, "Dropped constraint");
            Ok(())
        })
        .await
    }
}

// ============================================================================
// Shared steps
// ============================================================================

/// Parent schema (when named) and table must both exist
async fn require_table(conn: &mut dyn Connection, table: &TableRef) -> Result<()> {
    if let Some(schema) = &table.schema {
        assert_exists(conn, ObjectPath::Schema(schema)).await?;
    }
    assert_exists(conn, ObjectPath::Table(table)).await
}

/// A foreign key's referenced table must exist
async fn require_references(
    conn: &mut dyn Connection,
    request: &CreateConstraintRequest,
) -> Result<()> {
    match &request.spec {
        ConstraintSpec::ForeignKey { references, .. } => require_table(conn, references).await,
        _ => Ok(()),
    }
}

async fn table_info(conn: &mut dyn Connection, table: &TableRef) -> Result<TableInfo> {
    Ok(TableInfo {
        table: table.clone(),
        columns: conn.table_columns(table).await?,
    })
}

async fn find_view(conn: &mut dyn Connection, view: &TableRef) -> Result<ViewInfo> {
    conn.list_views(view.schema.as_deref())
        .await?
        .into_iter()
        .find(|v| v.view.name == view.name)
        .ok_or_else(|| SchemaAdminError::not_found(ObjectKind::View, view.to_string()))
}

async fn find_column(
    conn: &mut dyn Connection,
    table: &TableRef,
    column: &str,
) -> Result<ColumnDefinition> {
    conn.table_columns(table)
        .await?
        .into_iter()
        .find(|c| c.name == column)
        .ok_or_else(|| {
            SchemaAdminError::not_found(
                ObjectKind::Column,
                ObjectPath::Column(table, column).identity(),
            )
        })
}
