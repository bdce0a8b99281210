//! SQLite driver built on sqlx
//!
//! Catalog reads go through `sqlite_master` and the `pragma_*` table-valued
//! functions. A schema argument names an attached database (`main` when
//! absent), so schemas can be listed but not created or dropped.
//!
//! Unique constraints are unique indexes. SQLite names the ones it creates
//! itself (`sqlite_autoindex_<table>_<n>`), and those names are reported as
//! they are. Primary keys, foreign keys, checks and defaults can only be
//! declared with the table. Primary keys and checks named with `CONSTRAINT`
//! in the CREATE TABLE text keep that name; everything else is listed under a
//! synthesized one.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Number, Value};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, Transaction, TypeInfo, ValueRef};
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

/// Pool-backed SQLite driver
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    pool: SqlitePool,
}

impl SqliteDriver {
    /// Open a database file or URL, creating the file when missing
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| SchemaAdminError::Connection(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                SchemaAdminError::Connection(format!("Database connection failed: {}", e))
            })?;
        Ok(Self { pool })
    }

    /// Private in-memory database
    ///
    /// The pool keeps exactly one connection alive for its whole lifetime,
    /// since every new in-memory connection would see an empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                SchemaAdminError::Connection(format!("Database connection failed: {}", e))
            })?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(SqliteSession {
            engine: Engine::Sqlite,
            pool: self.pool.clone(),
            conn: None,
            tx: None,
        }))
    }
}

/// One SQLite session; same connection/transaction handling as the PostgreSQL one
pub struct SqliteSession {
    engine: Engine,
    pool: SqlitePool,
    conn: Option<PoolConnection<Sqlite>>,
    tx: Option<Transaction<'static, Sqlite>>,
}

fn database(schema: Option<&str>) -> &str {
    schema.unwrap_or("main")
}

fn master_table(schema: Option<&str>) -> String {
    match schema {
        Some(s) => format!("\"{}\".sqlite_master", s.replace('"', "\"\"")),
        None => "sqlite_master".to_string(),
    }
}

/// One row of `pragma_index_list` joined with `pragma_index_info`
struct IndexColumn {
    index: String,
    unique: bool,
    origin: String,
    column: String,
}

impl SqliteSession {
    async fn executor(&mut self) -> Result<&mut sqlx::SqliteConnection> {
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

    async fn master_entries(&mut self, kind: &str, schema: Option<&str>) -> Result<Vec<SqliteRow>> {
        let sql = format!(
            "SELECT name, sql FROM {} WHERE type = ?1 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            master_table(schema)
        );
        let conn = self.executor().await?;
        Ok(sqlx::query(&sql).bind(kind).fetch_all(conn).await?)
    }

    async fn index_columns(&mut self, table: &TableRef) -> Result<Vec<IndexColumn>> {
        let conn = self.executor().await?;
        let rows = sqlx::query(
            "SELECT il.name AS index_name, il.\"unique\" AS is_unique, il.origin AS origin, \
                    ii.name AS column_name \
             FROM pragma_index_list(?1, ?2) AS il \
             JOIN pragma_index_info(il.name, ?2) AS ii \
             ORDER BY il.name, ii.seqno",
        )
        .bind(table.name.as_str())
        .bind(database(table.schema.as_deref()))
        .fetch_all(conn)
        .await?;

        rows.iter()
            .map(|r| -> Result<IndexColumn> {
                Ok(IndexColumn {
                    index: r.try_get("index_name")?,
                    unique: r.try_get::<i64, _>("is_unique")? != 0,
                    origin: r.try_get("origin")?,
                    column: r.try_get::<Option<String>, _>("column_name")?.unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn primary_key(&mut self, table: &TableRef) -> Result<Vec<Constraint>> {
        let conn = self.executor().await?;
        let rows = sqlx::query(
            "SELECT name FROM pragma_table_info(?1, ?2) WHERE pk > 0 ORDER BY pk",
        )
        .bind(table.name.as_str())
        .bind(database(table.schema.as_deref()))
        .fetch_all(conn)
        .await?;

        let columns = rows
            .iter()
            .map(|r| r.try_get::<String, _>("name"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let declared = self
            .declared_constraints(table)
            .await?
            .into_iter()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
            .and_then(|c| c.name);
        let name = match declared {
            Some(name) => name,
            None => synthesize_name(ConstraintKind::PrimaryKey.name_prefix(), table, &columns)?,
        };
        Ok(vec![Constraint::new(name, columns, ConstraintSpec::PrimaryKey)])
    }

    /// Stored CREATE TABLE statement
    async fn table_sql(&mut self, table: &TableRef) -> Result<Option<String>> {
        let sql = format!(
            "SELECT sql FROM {} WHERE type = 'table' AND name = ?1",
            master_table(table.schema.as_deref())
        );
        let conn = self.executor().await?;
        let row = sqlx::query(&sql)
            .bind(table.name.as_str())
            .fetch_optional(conn)
            .await?;
        match row {
            Some(r) => Ok(r.try_get::<Option<String>, _>("sql")?),
            None => Ok(None),
        }
    }

    async fn declared_constraints(&mut self, table: &TableRef) -> Result<Vec<DeclaredConstraint>> {
        match self.table_sql(table).await? {
            Some(sql) => parse_declared_constraints(&sql),
            None => Ok(Vec::new()),
        }
    }

    /// CHECK clauses from the CREATE TABLE text
    ///
    /// Unnamed checks are numbered in declaration order: `chk_<table>_1`,
    /// `chk_<table>_2`, ...
    async fn checks(&mut self, table: &TableRef) -> Result<Vec<Constraint>> {
        let declared = self.declared_constraints(table).await?;
        let columns = self.table_columns(table).await?;

        let mut checks = Vec::new();
        let mut unnamed = 0usize;
        for clause in declared {
            if clause.kind != ConstraintKind::Check {
                continue;
            }
            let (Some(expression), Some(masked)) = (clause.body, clause.masked_body) else {
                continue;
            };
            let name = match clause.name {
                Some(name) => name,
                None => {
                    unnamed += 1;
                    synthesize_name(
                        ConstraintKind::Check.name_prefix(),
                        table,
                        &[unnamed.to_string()],
                    )?
                }
            };
            let referenced = referenced_columns(&masked, &columns)?;
            checks.push(Constraint::new(
                name,
                referenced,
                ConstraintSpec::Check { expression },
            ));
        }
        Ok(checks)
    }

    async fn foreign_keys(&mut self, table: &TableRef) -> Result<Vec<Constraint>> {
        let conn = self.executor().await?;
        let rows = sqlx::query(
            "SELECT id, \"table\" AS ref_table, \"from\" AS from_column, \"to\" AS to_column, \
                    on_update, on_delete \
             FROM pragma_foreign_key_list(?1, ?2) ORDER BY id, seq",
        )
        .bind(table.name.as_str())
        .bind(database(table.schema.as_deref()))
        .fetch_all(conn)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for r in &rows {
            let id: i64 = r.try_get("id")?;
            let ref_table: String = r.try_get("ref_table")?;
            let from: String = r.try_get("from_column")?;
            let to: Option<String> = r.try_get("to_column")?;
            let on_update: String = r.try_get("on_update")?;
            let on_delete: String = r.try_get("on_delete")?;
            entries.push((id, (ref_table, from, to.unwrap_or_default(), on_update, on_delete)));
        }

        let mut constraints = Vec::new();
        for (_, parts) in group_ordered(entries) {
            let Some((ref_table, _, _, on_update, on_delete)) = parts.first().cloned() else {
                continue;
            };
            let columns: Vec<String> = parts.iter().map(|p| p.1.clone()).collect();
            let referenced_columns = parts.iter().map(|p| p.2.clone()).collect();
            let name = synthesize_name(ConstraintKind::ForeignKey.name_prefix(), table, &columns)?;
            constraints.push(Constraint::new(
                name,
                columns,
                ConstraintSpec::ForeignKey {
                    references: table.renamed(ref_table),
                    referenced_columns,
                    on_delete: ReferentialAction::from_sql(&on_delete),
                    on_update: ReferentialAction::from_sql(&on_update),
                },
            ));
        }
        Ok(constraints)
    }

    async fn unique_constraints(&mut self, table: &TableRef) -> Result<Vec<Constraint>> {
        let columns = self.index_columns(table).await?;
        let grouped = group_ordered(
            columns
                .into_iter()
                .filter(|c| c.unique && c.origin != "pk")
                .map(|c| (c.index, c.column)),
        );
        Ok(grouped
            .into_iter()
            .map(|(name, columns)| Constraint::new(name, columns, ConstraintSpec::Unique))
            .collect())
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
}

/// Body of a `CREATE VIEW ... AS <body>` statement
fn view_body(create_sql: &str) -> Option<String> {
    let pattern = Regex::new(
        r"(?is)^\s*CREATE\s+(?:TEMP\s+|TEMPORARY\s+)?VIEW\s+(?:IF\s+NOT\s+EXISTS\s+)?.+?\s+AS\s+(.+)$",
    )
    .ok()?;
    pattern
        .captures(create_sql)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// A `CONSTRAINT <name> ...` clause or a bare CHECK in a CREATE TABLE statement
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeclaredConstraint {
    name: Option<String>,
    kind: ConstraintKind,
    /// Text inside the parentheses following the keyword
    body: Option<String>,
    /// `body` with string literal contents blanked
    masked_body: Option<String>,
}

const NAMED_CONSTRAINT: &str = concat!(
    r#"(?i)\bCONSTRAINT\s+("(?:[^"]|"")+"|\[[^\]]+\]|`[^`]+`|[A-Za-z_][A-Za-z0-9_$]*)"#,
    r"\s+(PRIMARY\s+KEY|CHECK|UNIQUE|FOREIGN\s+KEY|REFERENCES)\b",
);

const IDENTIFIER_TOKEN: &str = r#""(?:[^"]|"")+"|\[[^\]]+\]|`[^`]+`|[A-Za-z_][A-Za-z0-9_$]*"#;

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| SchemaAdminError::data_engine(e.to_string()))
}

/// Constraint clauses of a CREATE TABLE statement, in declaration order
fn parse_declared_constraints(create_sql: &str) -> Result<Vec<DeclaredConstraint>> {
    let named = compile(NAMED_CONSTRAINT)?;
    let bare_check = compile(r"(?i)\bCHECK\s*\(")?;
    let masked = mask_string_literals(create_sql);

    let body_at = |from: usize| -> (Option<String>, Option<String>) {
        let open = from + masked[from..].len() - masked[from..].trim_start().len();
        if !masked[open..].starts_with('(') {
            return (None, None);
        }
        match closing_paren(&masked, open) {
            Some(close) => (
                Some(create_sql[open + 1..close].trim().to_string()),
                Some(masked[open + 1..close].trim().to_string()),
            ),
            None => (None, None),
        }
    };

    let mut found: Vec<(usize, DeclaredConstraint)> = Vec::new();
    let mut named_checks = Vec::new();

    for caps in named.captures_iter(&masked) {
        let (Some(whole), Some(name), Some(keyword)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let keyword_text = keyword
            .as_str()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let kind = match keyword_text.as_str() {
            "PRIMARY KEY" => ConstraintKind::PrimaryKey,
            "CHECK" => {
                named_checks.push(keyword.start());
                ConstraintKind::Check
            }
            "UNIQUE" => ConstraintKind::Unique,
            _ => ConstraintKind::ForeignKey,
        };
        let (body, masked_body) = body_at(keyword.end());
        found.push((
            whole.start(),
            DeclaredConstraint {
                name: Some(unquote_identifier(&create_sql[name.range()])),
                kind,
                body,
                masked_body,
            },
        ));
    }

    for m in bare_check.find_iter(&masked) {
        if named_checks.contains(&m.start()) {
            continue;
        }
        let (body, masked_body) = body_at(m.end() - 1);
        found.push((
            m.start(),
            DeclaredConstraint {
                name: None,
                kind: ConstraintKind::Check,
                body,
                masked_body,
            },
        ));
    }

    found.sort_by_key(|(position, _)| *position);
    Ok(found.into_iter().map(|(_, c)| c).collect())
}

/// Blank the contents of single-quoted literals, keeping byte offsets
fn mask_string_literals(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    let mut closing: Option<char> = None;
    for ch in sql.chars() {
        match closing {
            Some('\'') if ch != '\'' => {
                masked.extend(std::iter::repeat_n(' ', ch.len_utf8()));
                continue;
            }
            Some(close) if ch == close => closing = None,
            Some(_) => {}
            None => {
                closing = match ch {
                    '\'' => Some('\''),
                    '"' => Some('"'),
                    '`' => Some('`'),
                    '[' => Some(']'),
                    _ => None,
                };
            }
        }
        masked.push(ch);
    }
    masked
}

/// Byte offset of the parenthesis matching the one at `open`
fn closing_paren(masked: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in masked.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn unquote_identifier(raw: &str) -> String {
    let inner = |open: char, close: char| raw.strip_prefix(open)?.strip_suffix(close);
    if let Some(name) = inner('"', '"') {
        name.replace("\"\"", "\"")
    } else if let Some(name) = inner('`', '`') {
        name.replace("``", "`")
    } else if let Some(name) = inner('[', ']') {
        name.to_string()
    } else {
        raw.to_string()
    }
}

/// Columns of the table named in a CHECK expression, in table order
fn referenced_columns(masked_body: &str, columns: &[ColumnDefinition]) -> Result<Vec<String>> {
    let token = compile(IDENTIFIER_TOKEN)?;
    let names: Vec<String> = token
        .find_iter(masked_body)
        .map(|m| unquote_identifier(m.as_str()))
        .collect();
    Ok(columns
        .iter()
        .filter(|c| names.iter().any(|n| n.eq_ignore_ascii_case(&c.name)))
        .map(|c| c.name.clone())
        .collect())
}

/// Group `(key, value)` pairs, keeping keys in first-seen order
fn group_ordered<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Vec<(K, Vec<V>)>
where
    K: std::hash::Hash + Eq + Clone,
{
    let mut order: Vec<K> = Vec::new();
    let mut groups: HashMap<K, Vec<V>> = HashMap::new();
    for (key, value) in pairs {
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(value);
    }
    order
        .into_iter()
        .filter_map(|k| groups.remove(&k).map(|v| (k, v)))
        .collect()
}

/// Decode one result row by each value's storage class
fn decode_row(row: &SqliteRow) -> DataRow {
    let mut out = DataRow::new();
    for (i, col) in row.columns().iter().enumerate() {
        out.insert(col.name().to_string(), decode_value(row, i));
    }
    out
}

fn decode_value(row: &SqliteRow, i: usize) -> Value {
    let storage = match row.try_get_raw(i) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    let decoded = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get::<Option<i64>, _>(i).ok().flatten().map(Value::from),
        "REAL" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(i)
            .ok()
            .flatten()
            .and_then(Number::from_f64)
            .map(Value::Number),
        "BLOB" => row.try_get::<Option<Vec<u8>>, _>(i).ok().flatten().map(|bytes| {
            Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect())
        }),
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
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    statement
        .params
        .iter()
        .fold(sqlx::query(&statement.sql), |q, p| q.bind(p.value.as_str()))
}

#[async_trait]
impl Connection for SqliteSession {
    fn engine(&self) -> Engine {
        self.engine.clone()
    }

    // ========================================================================
    // Schemas (attached databases)
    // ========================================================================

    async fn list_schemas(&mut self) -> Result<Vec<String>> {
        let conn = self.executor().await?;
        let rows = sqlx::query("SELECT name FROM pragma_database_list ORDER BY seq")
            .fetch_all(conn)
            .await?;
        rows.iter()
            .map(|r| -> Result<String> { Ok(r.try_get("name")?) })
            .collect()
    }

    async fn create_schema_if_not_exists(&mut self, _schema: &str) -> Result<()> {
        Err(SchemaAdminError::not_supported(
            "SQLite schemas are attached databases and cannot be created",
        ))
    }

    async fn drop_schema_if_exists(&mut self, _schema: &str) -> Result<()> {
        Err(SchemaAdminError::not_supported(
            "SQLite schemas are attached databases and cannot be dropped",
        ))
    }

    // ========================================================================
    // Tables
    // ========================================================================

    async fn list_tables(&mut self, schema: Option<&str>) -> Result<Vec<TableRef>> {
        let rows = self.master_entries("table", schema).await?;
        rows.iter()
            .map(|r| -> Result<TableRef> {
                Ok(TableRef {
                    schema: schema.map(str::to_string),
                    name: r.try_get("name")?,
                })
            })
            .collect()
    }

    async fn table_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnDefinition>> {
        let conn = self.executor().await?;
        let rows = sqlx::query(
            "SELECT name, type, \"notnull\" AS not_null, dflt_value \
             FROM pragma_table_info(?1, ?2) ORDER BY cid",
        )
        .bind(table.name.as_str())
        .bind(database(table.schema.as_deref()))
        .fetch_all(conn)
        .await?;

        rows.iter()
            .map(|r| -> Result<ColumnDefinition> {
                Ok(ColumnDefinition {
                    name: r.try_get("name")?,
                    data_type: r.try_get("type")?,
                    nullable: r.try_get::<i64, _>("not_null")? == 0,
                    default_value: r.try_get("dflt_value")?,
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
        let rows = self.master_entries("view", schema).await?;
        rows.iter()
            .map(|r| -> Result<ViewInfo> {
                let create_sql: Option<String> = r.try_get("sql")?;
                Ok(ViewInfo {
                    view: TableRef {
                        schema: schema.map(str::to_string),
                        name: r.try_get("name")?,
                    },
                    definition: create_sql.as_deref().and_then(view_body),
                })
            })
            .collect()
    }

    async fn create_view_if_not_exists(
        &mut self,
        view: &TableRef,
        definition: &str,
    ) -> Result<()> {
        let sql = self.ddl().create_view(view, definition);
        self.execute(&sql).await
    }

    /// SQLite has no ALTER VIEW; the view is dropped and recreated under the new name
    async fn rename_view_if_exists(&mut self, view: &TableRef, new_name: &str) -> Result<()> {
        let existing = self
            .list_views(view.schema.as_deref())
            .await?
            .into_iter()
            .find(|v| v.view.name == view.name);
        let Some(existing) = existing else {
            return Ok(());
        };
        let definition = existing.definition.ok_or_else(|| {
            SchemaAdminError::not_supported(format!("view {} has no readable definition", view))
        })?;

        let drop_sql = self.ddl().drop_view(view);
        self.execute(&drop_sql).await?;
        let create_sql = self.ddl().create_view(&view.renamed(new_name), &definition);
        self.execute(&create_sql).await
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
        let columns = self.index_columns(table).await?;
        let mut unique_by_name: HashMap<String, bool> = HashMap::new();
        let pairs: Vec<(String, String)> = columns
            .into_iter()
            .map(|c| {
                unique_by_name.insert(c.index.clone(), c.unique);
                (c.index, c.column)
            })
            .collect();

        Ok(group_ordered(pairs)
            .into_iter()
            .map(|(name, columns)| IndexDefinition {
                unique: unique_by_name.get(&name).copied().unwrap_or(false),
                name,
                columns,
            })
            .collect())
    }

    async fn create_index_if_not_exists(
        &mut self,
        table: &TableRef,
        index: &IndexDefinition,
    ) -> Result<()> {
        let sql = self.ddl().create_index(table, index);
        self.execute(&sql).await
    }

    /// Dropped and recreated with the same columns, since SQLite cannot rename indexes
    async fn rename_index_if_exists(
        &mut self,
        table: &TableRef,
        name: &str,
        new_name: &str,
    ) -> Result<()> {
        let existing = self
            .list_indexes(table)
            .await?
            .into_iter()
            .find(|i| i.name == name);
        let Some(existing) = existing else {
            return Ok(());
        };
        if existing.name.starts_with("sqlite_autoindex_") {
            return Err(SchemaAdminError::not_supported(format!(
                "{} is owned by a table constraint",
                name
            )));
        }

        let drop_sql = self.ddl().drop_index(table, name);
        self.execute(&drop_sql).await?;
        let renamed = IndexDefinition {
            name: new_name.to_string(),
            ..existing
        };
        let create_sql = self.ddl().create_index(table, &renamed);
        self.execute(&create_sql).await
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
        match kind {
            ConstraintKind::PrimaryKey => self.primary_key(table).await,
            ConstraintKind::ForeignKey => self.foreign_keys(table).await,
            ConstraintKind::Unique => self.unique_constraints(table).await,
            ConstraintKind::Default => self.defaults(table).await,
            ConstraintKind::Check => self.checks(table).await,
        }
    }

    async fn create_constraint_if_not_exists(
        &mut self,
        table: &TableRef,
        constraint: &Constraint,
    ) -> Result<()> {
        match constraint.spec {
            ConstraintSpec::Unique => {
                let index = IndexDefinition::new(&constraint.name, constraint.columns.clone())
                    .unique();
                let sql = self.ddl().create_index(table, &index);
                self.execute(&sql).await
            }
            _ => Err(SchemaAdminError::not_supported(format!(
                "SQLite cannot add a {} to an existing table",
                constraint.kind()
            ))),
        }
    }

    async fn rename_constraint_if_exists(
        &mut self,
        _table: &TableRef,
        kind: ConstraintKind,
        _name: &str,
        _new_name: &str,
    ) -> Result<()> {
        Err(SchemaAdminError::not_supported(format!(
            "SQLite cannot rename a {}",
            kind
        )))
    }

    async fn drop_constraint_if_exists(
        &mut self,
        table: &TableRef,
        kind: ConstraintKind,
        name: &str,
    ) -> Result<()> {
        if kind != ConstraintKind::Unique {
            return Err(SchemaAdminError::not_supported(format!(
                "SQLite cannot drop a {} from an existing table",
                kind
            )));
        }
        if name.starts_with("sqlite_autoindex_") {
            return Err(SchemaAdminError::not_supported(format!(
                "{} is declared in the table definition",
                name
            )));
        }
        self.drop_index_if_exists(table, name).await
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
