//! Query executor
//!
//! Renders a [`QueryRequest`] into a paginated data statement plus an optional
//! COUNT statement, runs them on one connection, and assembles a
//! [`QueryResult`].
//!
//! Both statements are rendered from a single [`Translation`], so their WHERE
//! fragments and bound parameters are identical. They run as two statements
//! without a transaction: a concurrent writer between them can make `total`
//! disagree with the page that was returned.
//!
//! Every filtered, sorted or selected column must be one of the target's
//! columns. SQLite reads an unknown double-quoted identifier as a string
//! literal, so an unchecked name would silently match every row.

use serde_json::Value;
use tracing::debug;

use crate::dialect::Dialect;
use crate::driver::{Connection, Statement};
use crate::error::{Result, SchemaAdminError};
use crate::guard::ObjectPath;
use crate::query::{FieldInfo, Pagination, QueryRequest, QueryResult, Row};
use crate::sql::condition::{Translation, translate_typed};
use crate::types::{ColumnDefinition, TableRef};

/// Statements prepared for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    pub data: Statement,
    pub count: Option<Statement>,
}

/// Where result field metadata comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// Declared column types, for tables
    Declared,
    /// Runtime values of the first row, for views
    FirstRow,
}

/// Executes filtered, sorted, paginated reads
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    max_take: u32,
}

impl QueryExecutor {
    pub fn new(max_take: u32) -> Self {
        Self { max_take }
    }

    /// Validate `request` against the target's `columns` and render its
    /// statements for `dialect`
    pub fn prepare(
        &self,
        dialect: &dyn Dialect,
        target: &TableRef,
        request: &QueryRequest,
        columns: &[ColumnDefinition],
    ) -> Result<PreparedQuery> {
        request.validate(self.max_take)?;
        check_columns(target, request, columns)?;
        let translation = translate_typed(request, dialect, columns)?;
        let from = dialect.qualify(target);

        let count = request.include_total.then(|| {
            Statement::new(
                format!("SELECT COUNT(*) FROM {}{}", from, translation.where_sql()),
                translation.params.clone(),
            )
        });

        let data = Statement::new(
            build_data_sql(dialect, &from, request, &translation),
            translation.params,
        );

        Ok(PreparedQuery { data, count })
    }

    /// Run `request` against `target`, whose columns are `columns`
    pub async fn execute(
        &self,
        conn: &mut dyn Connection,
        target: &TableRef,
        request: &QueryRequest,
        columns: &[ColumnDefinition],
        source: FieldSource,
    ) -> Result<QueryResult> {
        let prepared = self.prepare(conn.dialect(), target, request, columns)?;

        debug!(
            table = %target,
            sql = %prepared.data.sql,
            params = prepared.data.params.len(),
            "Executing data query"
        );
        let rows = conn.fetch_rows(&prepared.data).await?;

        let total = match &prepared.count {
            Some(count) => {
                debug!(
                    table = %target,
                    sql = %count.sql,
                    params = count.params.len(),
                    "Executing count query"
                );
                Some(conn.fetch_count(count).await?)
            }
            None => None,
        };

        let fields = match source {
            FieldSource::Declared => fields_from_metadata(columns, &request.projection()),
            FieldSource::FirstRow => fields_from_row(rows.first()),
        };

        let pagination = Pagination::compute(request.take, request.skip, rows.len(), total);

        Ok(QueryResult {
            rows,
            fields,
            pagination,
        })
    }
}

/// Fail with `NotFound` for the first referenced column `target` does not have
fn check_columns(
    target: &TableRef,
    request: &QueryRequest,
    columns: &[ColumnDefinition],
) -> Result<()> {
    let referenced = request
        .filters
        .iter()
        .map(|f| f.column.as_str())
        .chain(request.order_by.iter().map(|s| s.column.as_str()))
        .chain(request.projection());

    for name in referenced {
        if !columns.iter().any(|c| c.name == name) {
            let path = ObjectPath::Column(target, name);
            return Err(SchemaAdminError::not_found(path.kind(), path.identity()));
        }
    }
    Ok(())
}

fn build_data_sql(
    dialect: &dyn Dialect,
    from: &str,
    request: &QueryRequest,
    translation: &Translation,
) -> String {
    let projection = request.projection();
    let select = if projection.is_empty() {
        "*".to_string()
    } else {
        projection
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}{}", select, from, translation.where_sql());

    match &translation.order_clause {
        Some(order) => sql.push_str(&format!(" ORDER BY {}", order)),
        None if dialect.requires_order_by() => sql.push_str(" ORDER BY (SELECT NULL)"),
        None => {}
    }

    sql.push(' ');
    sql.push_str(&dialect.pagination_clause(request.take, request.skip));
    sql
}

/// Fields from table metadata, restricted to the projection when there is one
fn fields_from_metadata(columns: &[ColumnDefinition], projection: &[&str]) -> Vec<FieldInfo> {
    let to_field = |c: &ColumnDefinition| FieldInfo {
        name: c.name.clone(),
        declared_type: c.data_type.clone(),
        nullable: c.nullable,
    };

    if projection.is_empty() {
        return columns.iter().map(to_field).collect();
    }

    projection
        .iter()
        .filter_map(|name| columns.iter().find(|c| c.name == *name))
        .map(to_field)
        .collect()
}

/// Fields inferred from the runtime values of the first row
fn fields_from_row(row: Option<&Row>) -> Vec<FieldInfo> {
    let Some(row) = row else {
        return Vec::new();
    };

    row.iter()
        .map(|(name, value)| FieldInfo {
            name: name.clone(),
            declared_type: value_type_name(value).to_string(),
            nullable: value.is_null(),
        })
        .collect()
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
