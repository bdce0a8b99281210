//! PostgreSQL driver built on sqlx
//!
//! Introspection reads `pg_catalog` and `information_schema`, scoped to
//! `COALESCE($1, current_schema())` so an unqualified object means the
//! connection's search path. DDL text comes from [`DdlGenerator`]. Filter
//! values are bound as text.
//!
//! PostgreSQL has no named default constraints; a column default is reported
//! under the synthesized name `df_<table>_<column>`.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Number, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Postgres, Row, Transaction, TypeInfo};
use tracing::debug;

use super::{Connection, Driver, Statement};
use crate::dialect::Engine;
use crate::error::{Result, SchemaAdminError};
use crate::naming::synthesize_name;
use crate::query::Row as DataRow;
use crate::sql::ddl::DdlGenerator;
use crate::types::{
    ColumnDefinition, Constraint, ConstraintKind, ConstraintSpec, IndexDefinition,
    ReferentialAction, TableRef, ViewInfo,
};

/// Pool-backed PostgreSQL driver
#[derive(Debug, Clone)]
pub struct PgDriver {
    pool: PgPool,
}

impl PgDriver {
    /// Connect a new pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| {
                SchemaAdminError::Connection(format!("Database connection failed: {}", e))
            })?;
        Ok(Self { pool })
    }

    /// Use an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Driver for PgDriver {
    fn engine(&self) -> Engine {
        Engine::PostgreSql
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(PgSession {
            engine: Engine::PostgreSql,
            pool: self.pool.clone(),
            conn: None,
            tx: None,
        }))
    }
}

/// One PostgreSQL session
///
/// A pooled connection is acquired on first use. After `begin` every
/// statement runs on the open transaction until `commit` or `rollback`;
/// dropping the session with a transaction still open rolls it back.
pub struct PgSession {
    engine: Engine,
    pool: PgPool,
    conn: Option<PoolConnection<Postgres>>,
    tx: Option<Transaction<'static, Postgres>>,
}

const SCHEMA_SCOPE: &str = "COALESCE($1::text, current_schema()::text)";

impl PgSession {
    async fn executor(&mut self) -> Result<&mut sqlx::PgConnection> {
        if self.tx.is_some() {
            return self
                .tx
                .as_mut()
                .map(|tx| &mut **tx)
                .ok_or_else(|| SchemaAdminError::Connection("transaction closed".to_string()));
        }

        if self.conn.is_none() {
            let conn = self.pool.acquire().await.map_err(|e| {
                SchemaAdminError::Connection(format!("Failed to acquire connection: {}", e))
            })?;
            self.conn = Some(conn);
        }

        self.conn
            .as_mut()
            .map(|c| &mut **c)
            .ok_or_else(|| SchemaAdminError::Connection("connection released".to_string()))
    }

    fn ddl(&self) -> DdlGenerator<'_> {
        DdlGenerator::new(&self.engine)
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing DDL");
        let conn = self.executor().await?;
        sqlx::query(sql).execute(conn).await?;
        Ok(())
    }

    async fn fetch_scoped(&mut self, sql: &str, table: &TableRef) -> Result<Vec<PgRow>> {
        let conn = self.executor().await?;
        Ok(sqlx::query(sql)
            .bind(table.schema.as_deref())
            .bind(table.name.as_str())
            .fetch_all(conn)
            .await?)
    }

    async fn defaults(&mut self, table: &TableRef) -> Result<Vec<Constraint>> {
        let mut defaults = Vec::new();
        for column in self.table_columns(table).await? {
            if let Some(expression) = column.default_value {
                let name = synthesize_name(
                    ConstraintKind::Default.name_prefix(),
                    table,
                    std::slice::from_ref(&column.name),
                )?;
                defaults.push(Constraint::new(
                    name,
                    vec![column.name],
                    ConstraintSpec::Default { expression },
                ));
            }
        }
        Ok(defaults)
    }

    async fn find_constraint(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
        name: &str,
    ) -> Result<Option<Constraint>> {
        Ok(self
            .list_constraints(table, kind)
            .await?
            .into_iter()
            .find(|c| c.name == name))
    }
}

fn contype(kind: ConstraintKind) -> &'static str {
    match kind {
        ConstraintKind::PrimaryKey => "p",
        ConstraintKind::ForeignKey => "f",
        ConstraintKind::Unique => "u",
        ConstraintKind::Check => "c",
        ConstraintKind::Default => "",
    }
}

fn referential_action(code: Option<String>) -> Option<ReferentialAction> {
    match code.as_deref()? {
        "a" => Some(ReferentialAction::NoAction),
        "r" => Some(ReferentialAction::Restrict),
        "c" => Some(ReferentialAction::Cascade),
        "n" => Some(ReferentialAction::SetNull),
        "d" => Some(ReferentialAction::SetDefault),
        _ => None,
    }
}

fn row_to_constraint(row: &PgRow, kind: ConstraintKind) -> Result<Constraint> {
    let name: String = row.try_get("name")?;
    let columns: Vec<String> = row.try_get("columns")?;

    let spec = match kind {
        ConstraintKind::PrimaryKey => ConstraintSpec::PrimaryKey,
        ConstraintKind::Unique => ConstraintSpec::Unique,
        ConstraintKind::Check => {
            let definition: String = row.try_get("definition")?;
            let expression = definition
                .strip_prefix("CHECK ")
                .unwrap_or(&definition)
                .to_string();
            ConstraintSpec::Check { expression }
        }
        ConstraintKind::ForeignKey => {
            let ref_schema: Option<String> = row.try_get("ref_schema")?;
            let ref_table: Option<String> = row.try_get("ref_table")?;
            ConstraintSpec::ForeignKey {
                references: TableRef {
                    schema: ref_schema,
                    name: ref_table.unwrap_or_default(),
                },
                referenced_columns: row.try_get("ref_columns")?,
                on_delete: referential_action(row.try_get("on_delete")?),
                on_update: referential_action(row.try_get("on_update")?),
            }
        }
        ConstraintKind::Default => {
            return Err(SchemaAdminError::data_engine(
                "default constraints are not stored in pg_constraint",
            ));
        }
    };

    Ok(Constraint::new(name, columns, spec))
}

/// Decode one result row by the column's PostgreSQL type
fn decode_row(row: &PgRow) -> DataRow {
    let mut out = DataRow::new();
    for (i, col) in row.columns().iter().enumerate() {
        out.insert(col.name().to_string(), decode_value(row, i, col.type_info().name()));
    }
    out
}

fn decode_value(row: &PgRow, i: usize, type_name: &str) -> Value {
    let decoded = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(i).ok().flatten().map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(i)
            .ok()
            .flatten()
            .map(|v| Value::from(v as i64)),
        "INT4" => row
            .try_get::<Option<i32>, _>(i)
            .ok()
            .flatten()
            .map(|v| Value::from(v as i64)),
        "INT8" => row.try_get::<Option<i64>, _>(i).ok().flatten().map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(i)
            .ok()
            .flatten()
            .and_then(|v| Number::from_f64(v as f64))
            .map(Value::Number),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(i)
            .ok()
            .flatten()
            .and_then(Number::from_f64)
            .map(Value::Number),
        "NUMERIC" => row
            .try_get::<Option<rust_decimal::Decimal>, _>(i)
            .ok()
            .flatten()
            .and_then(|d| d.to_f64())
            .and_then(Number::from_f64)
            .map(Value::Number),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(i)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i).ok().flatten(),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(i)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(i)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string())),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(i)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string())),
        "TEXT[]" | "VARCHAR[]" => row
            .try_get::<Option<Vec<String>>, _>(i)
            .ok()
            .flatten()
            .map(|v| Value::Array(v.into_iter().map(Value::String).collect())),
        // TEXT, VARCHAR, BPCHAR, NAME and anything else with a text decoding
        _ => row
            .try_get::<Option<String>, _>(i)
            .ok()
            .flatten()
            .map(Value::String),
    };
    decoded.unwrap_or(Value::Null)
}

fn bind_all<'q>(
    statement: &'q Statement,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    statement
        .params
        .iter()
        .fold(sqlx::query(&statement.sql), |q, p| q.bind(p.value.as_str()))
}

#[async_trait]
impl Connection for PgSession {
    fn engine(&self) -> Engine {
        self.engine.clone()
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    async fn list_schemas(&mut self) -> Result<Vec<String>> {
        let conn = self.executor().await?;
        let rows = sqlx::query(
            "SELECT nspname::text AS name FROM pg_namespace \
             WHERE nspname !~ '^pg_' AND nspname <> 'information_schema' \
             ORDER BY nspname",
        )
        .fetch_all(conn)
        .await?;
        rows.iter()
            .map(|r| -> Result<String> { Ok(r.try_get("name")?) })
            .collect()
    }

    async fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        let conn = self.executor().await?;
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM pg_namespace WHERE nspname = $1)")
            .bind(schema)
            .fetch_one(conn)
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn create_schema_if_not_exists(&mut self, schema: &str) -> Result<()> {
        let sql = self.ddl().create_schema(schema);
        self.execute(&sql).await
    }

    async fn drop_schema_if_exists(&mut self, schema: &str) -> Result<()> {
        let sql = self.ddl().drop_schema(schema);
        self.execute(&sql).await
    }

    // ========================================================================
    // Tables
    // ========================================================================

    async fn list_tables(&mut self, schema: Option<&str>) -> Result<Vec<TableRef>> {
        let sql = format!(
            "SELECT table_name::text AS name FROM information_schema.tables \
             WHERE table_schema = {} AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
            SCHEMA_SCOPE
        );
        let conn = self.executor().await?;
        let rows = sqlx::query(&sql).bind(schema).fetch_all(conn).await?;
        rows.iter()
            .map(|r| -> Result<TableRef> {
                Ok(TableRef {
                    schema: schema.map(str::to_string),
                    name: r.try_get("name")?,
                })
            })
            .collect()
    }

    async fn table_exists(&mut self, table: &TableRef) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables \
             WHERE table_schema = {} AND table_name = $2 AND table_type = 'BASE TABLE')",
            SCHEMA_SCOPE
        );
        let rows = self.fetch_scoped(&sql, table).await?;
        match rows.first() {
            Some(row) => Ok(row.try_get(0)?),
            None => Ok(false),
        }
    }

    async fn table_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnDefinition>> {
        let sql = format!(
            "SELECT a.attname::text AS name, \
                    format_type(a.atttypid, a.atttypmod) AS data_type, \
                    NOT a.attnotnull AS nullable, \
                    pg_get_expr(d.adbin, d.adrelid) AS default_value \
             FROM pg_attribute a \
             JOIN pg_class c ON c.oid = a.attrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
             WHERE n.nspname = {} AND c.relname = $2 \
               AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum",
            SCHEMA_SCOPE
        );
        let rows = self.fetch_scoped(&sql, table).await?;
        rows.iter()
            .map(|r| -> Result<ColumnDefinition> {
                Ok(ColumnDefinition {
                    name: r.try_get("name")?,
                    data_type: r.try_get("data_type")?,
                    nullable: r.try_get("nullable")?,
                    default_value: r.try_get("default_value")?,
                })
            })
            .collect()
    }

    async fn create_table_if_not_exists(
        &mut self,
        table: &TableRef,
        columns: &[ColumnDefinition],
        primary_key: Option<&Constraint>,
    ) -> Result<()> {
        let sql = self.ddl().create_table(table, columns, primary_key);
        self.execute(&sql).await
    }

    async fn rename_table_if_exists(&mut self, table: &TableRef, new_name: &str) -> Result<()> {
        if !self.table_exists(table).await? {
            return Ok(());
        }
        let sql = self.ddl().rename_table(table, new_name);
        self.execute(&sql).await
    }

    async fn drop_table_if_exists(&mut self, table: &TableRef) -> Result<()> {
        let sql = self.ddl().drop_table(table);
        self.execute(&sql).await
    }

    // ========================================================================
    // Views
    // ========================================================================

    async fn list_views(&mut self, schema: Option<&str>) -> Result<Vec<ViewInfo>> {
        let sql = format!(
            "SELECT table_name::text AS name, view_definition::text AS definition \
             FROM information_schema.views WHERE table_schema = {} \
             ORDER BY table_name",
            SCHEMA_SCOPE
        );
        let conn = self.executor().await?;
        let rows = sqlx::query(&sql).bind(schema).fetch_all(conn).await?;
        rows.iter()
            .map(|r| -> Result<ViewInfo> {
                Ok(ViewInfo {
                    view: TableRef {
                        schema: schema.map(str::to_string),
                        name: r.try_get("name")?,
                    },
                    definition: r.try_get("definition")?,
                })
            })
            .collect()
    }

    async fn create_view_if_not_exists(
        &mut self,
        view: &TableRef,
        definition: &str,
    ) -> Result<()> {
        if self.view_exists(view).await? {
            return Ok(());
        }
        let sql = self.ddl().create_view(view, definition);
        self.execute(&sql).await
    }

    async fn rename_view_if_exists(&mut self, view: &TableRef, new_name: &str) -> Result<()> {
        if !self.view_exists(view).await? {
            return Ok(());
        }
        let sql = self.ddl().rename_view(view, new_name)?;
        self.execute(&sql).await
    }

    async fn drop_view_if_exists(&mut self, view: &TableRef) -> Result<()> {
        let sql = self.ddl().drop_view(view);
        self.execute(&sql).await
    }

    // ========================================================================
    // Columns
    // ========================================================================

    async fn add_column_if_not_exists(
        &mut self,
        table: &TableRef,
        column: &ColumnDefinition,
    ) -> Result<()> {
        if self.column_exists(table, &column.name).await? {
            return Ok(());
        }
        let sql = self.ddl().add_column(table, column);
        self.execute(&sql).await
    }

    async fn rename_column_if_exists(
        &mut self,
        table: &TableRef,
        column: &str,
        new_name: &str,
    ) -> Result<()> {
        if !self.column_exists(table, column).await? {
            return Ok(());
        }
        let sql = self.ddl().rename_column(table, column, new_name);
        self.execute(&sql).await
    }

    async fn drop_column_if_exists(&mut self, table: &TableRef, column: &str) -> Result<()> {
        if !self.column_exists(table, column).await? {
            return Ok(());
        }
        let sql = self.ddl().drop_column(table, column);
        self.execute(&sql).await
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    async fn list_indexes(&mut self, table: &TableRef) -> Result<Vec<IndexDefinition>> {
        let sql = format!(
            "SELECT i.relname::text AS name, ix.indisunique AS is_unique, \
                    array_agg(a.attname::text ORDER BY k.ord) AS columns \
             FROM pg_index ix \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
             WHERE n.nspname = {} AND t.relname = $2 \
             GROUP BY i.relname, ix.indisunique \
             ORDER BY i.relname",
            SCHEMA_SCOPE
        );
        let rows = self.fetch_scoped(&sql, table).await?;
        rows.iter()
            .map(|r| -> Result<IndexDefinition> {
                Ok(IndexDefinition {
                    name: r.try_get("name")?,
                    columns: r.try_get("columns")?,
                    unique: r.try_get("is_unique")?,
                })
            })
            .collect()
    }

    async fn create_index_if_not_exists(
        &mut self,
        table: &TableRef,
        index: &IndexDefinition,
    ) -> Result<()> {
        let sql = self.ddl().create_index(table, index);
        self.execute(&sql).await
    }

    async fn rename_index_if_exists(
        &mut self,
        table: &TableRef,
        name: &str,
        new_name: &str,
    ) -> Result<()> {
        if !self.index_exists(table, name).await? {
            return Ok(());
        }
        let sql = self.ddl().rename_index(table, name, new_name)?;
        self.execute(&sql).await
    }

    async fn drop_index_if_exists(&mut self, table: &TableRef, name: &str) -> Result<()> {
        let sql = self.ddl().drop_index(table, name);
        self.execute(&sql).await
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    async fn list_constraints(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
    ) -> Result<Vec<Constraint>> {
        if kind == ConstraintKind::Default {
            return self.defaults(table).await;
        }

        let sql = format!(
            "SELECT con.conname::text AS name, \
                    ARRAY(SELECT a.attname::text \
                          FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord) \
                          JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum \
                          ORDER BY k.ord) AS columns, \
                    rn.nspname::text AS ref_schema, \
                    rt.relname::text AS ref_table, \
                    ARRAY(SELECT a.attname::text \
                          FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord) \
                          JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum \
                          ORDER BY k.ord) AS ref_columns, \
                    con.confdeltype::text AS on_delete, \
                    con.confupdtype::text AS on_update, \
                    pg_get_constraintdef(con.oid) AS definition \
             FROM pg_constraint con \
             JOIN pg_class t ON t.oid = con.conrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             LEFT JOIN pg_class rt ON rt.oid = con.confrelid \
             LEFT JOIN pg_namespace rn ON rn.oid = rt.relnamespace \
             WHERE n.nspname = {} AND t.relname = $2 AND con.contype::text = $3 \
             ORDER BY con.conname",
            SCHEMA_SCOPE
        );

        let conn = self.executor().await?;
        let rows = sqlx::query(&sql)
            .bind(table.schema.as_deref())
            .bind(table.name.as_str())
            .bind(contype(kind))
            .fetch_all(conn)
            .await?;

        rows.iter().map(|r| row_to_constraint(r, kind)).collect()
    }

    async fn create_constraint_if_not_exists(
        &mut self,
        table: &TableRef,
        constraint: &Constraint,
    ) -> Result<()> {
        if self
            .constraint_exists(table, constraint.kind(), &constraint.name)
            .await?
        {
            return Ok(());
        }
        let sql = self.ddl().add_constraint(table, constraint)?;
        self.execute(&sql).await
    }

    async fn rename_constraint_if_exists(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
        name: &str,
        new_name: &str,
    ) -> Result<()> {
        if kind == ConstraintKind::Default {
            return Err(SchemaAdminError::not_supported(
                "PostgreSQL column defaults have no name to rename",
            ));
        }
        if !self.constraint_exists(table, kind, name).await? {
            return Ok(());
        }
        let sql = self.ddl().rename_constraint(table, name, new_name)?;
        self.execute(&sql).await
    }

    async fn drop_constraint_if_exists(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
        name: &str,
    ) -> Result<()> {
        let Some(constraint) = self.find_constraint(table, kind, name).await? else {
            return Ok(());
        };
        let sql = self.ddl().drop_constraint(table, &constraint)?;
        self.execute(&sql).await
    }

    // ========================================================================
    // Data
    // ========================================================================

    async fn fetch_rows(&mut self, statement: &Statement) -> Result<Vec<DataRow>> {
        let conn = self.executor().await?;
        let rows = bind_all(statement).fetch_all(conn).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn fetch_count(&mut self, statement: &Statement) -> Result<i64> {
        let conn = self.executor().await?;
        let row = bind_all(statement).fetch_one(conn).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(SchemaAdminError::data_engine("transaction already open"));
        }
        self.conn = None;
        self.tx = Some(self.pool.begin().await?);
        debug!("Transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!("Transaction committed");
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!("Transaction rolled back");
        }
        Ok(())
    }
}
