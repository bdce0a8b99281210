//! SQL dialect policy
//!
//! Each engine family gets one [`Dialect`] strategy, resolved once per
//! connection through [`Engine::dialect`]. Dialects are stateless: they decide
//! identifier quoting, placeholder syntax, and the pagination clause.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sql::sanitize::quote_identifier;
use crate::types::TableRef;

/// Database engine identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Engine {
    SqlServer,
    PostgreSql,
    MySql,
    Sqlite,
    /// Any engine this crate has no specific rules for
    Other(String),
}

impl Engine {
    /// Map a provider identifier such as `"mssql"` or `"postgres"` to an engine
    pub fn from_identifier(identifier: &str) -> Self {
        match identifier.trim().to_lowercase().as_str() {
            "sqlserver" | "mssql" | "azuresql" | "sql_server" => Engine::SqlServer,
            "postgres" | "postgresql" | "pg" => Engine::PostgreSql,
            "mysql" | "mariadb" => Engine::MySql,
            "sqlite" | "sqlite3" => Engine::Sqlite,
            _ => Engine::Other(identifier.to_string()),
        }
    }

    /// Infer the engine from a connection URL scheme
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?;
        if scheme.is_empty() || scheme == url {
            return None;
        }
        match Engine::from_identifier(scheme) {
            Engine::Other(_) => None,
            engine => Some(engine),
        }
    }

    /// The dialect strategy for this engine
    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            Engine::SqlServer => &SqlServerDialect,
            Engine::PostgreSql => &PostgresDialect,
            Engine::MySql => &MySqlDialect,
            Engine::Sqlite => &SqliteDialect,
            Engine::Other(_) => &AnsiDialect,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::SqlServer => f.write_str("sqlserver"),
            Engine::PostgreSql => f.write_str("postgresql"),
            Engine::MySql => f.write_str("mysql"),
            Engine::Sqlite => f.write_str("sqlite"),
            Engine::Other(name) => f.write_str(name),
        }
    }
}

/// Engine-specific SQL rendering rules
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Quote a single identifier
    fn quote_identifier(&self, identifier: &str) -> String {
        quote_identifier(identifier)
    }

    /// Render a possibly schema-qualified table or view name
    fn qualify(&self, table: &TableRef) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&table.name)
            ),
            None => self.quote_identifier(&table.name),
        }
    }

    /// Placeholder for the bound parameter at zero-based `position`
    fn placeholder(&self, position: usize) -> String;

    /// Column expression used on the left of a parameterized comparison
    ///
    /// `data_type` is the column's declared type when it is known.
    fn comparable_column(&self, quoted_column: &str, _data_type: Option<&str>) -> String {
        quoted_column.to_string()
    }

    /// Placeholder as written on the right of a comparison with a column of `data_type`
    fn typed_placeholder(&self, placeholder: String, _data_type: Option<&str>) -> String {
        placeholder
    }

    /// Whether the pagination clause is only legal after an ORDER BY
    fn requires_order_by(&self) -> bool {
        false
    }

    /// Pagination clause appended after the ORDER BY clause (if any)
    fn pagination_clause(&self, take: u32, skip: u64) -> String {
        format!("LIMIT {} OFFSET {}", take, skip)
    }

    fn begin_transaction(&self) -> &'static str {
        "BEGIN"
    }
}

/// SQL Server family
#[derive(Debug, Clone, Copy)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("[{}]", identifier.replace(']', "]]"))
    }

    fn placeholder(&self, position: usize) -> String {
        format!("@param{}", position)
    }

    fn requires_order_by(&self) -> bool {
        true
    }

    fn pagination_clause(&self, take: u32, skip: u64) -> String {
        format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", skip, take)
    }

    fn begin_transaction(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }
}

/// PostgreSQL family
#[derive(Debug, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${}", position + 1)
    }

    // Parameters are bound as text. Columns of a known scalar type cast the
    // parameter; everything else compares on the column's text rendering.
    fn comparable_column(&self, quoted_column: &str, data_type: Option<&str>) -> String {
        match postgres_cast_type(data_type) {
            Some(_) => quoted_column.to_string(),
            None => format!("{}::text", quoted_column),
        }
    }

    fn typed_placeholder(&self, placeholder: String, data_type: Option<&str>) -> String {
        match postgres_cast_type(data_type) {
            Some(cast) => format!("{}::{}", placeholder, cast),
            None => placeholder,
        }
    }
}

/// Base types whose text input casts to a value with ordering and equality
const POSTGRES_CAST_TYPES: &[&str] = &[
    "smallint",
    "integer",
    "bigint",
    "numeric",
    "real",
    "double precision",
    "boolean",
    "uuid",
    "date",
    "time without time zone",
    "time with time zone",
    "timestamp without time zone",
    "timestamp with time zone",
    "interval",
];

/// Cast target for a `format_type` rendering, with any type modifier removed
///
/// `numeric(10,2)` casts to `numeric` so a filter value is never rounded.
fn postgres_cast_type(data_type: Option<&str>) -> Option<String> {
    let data_type = data_type?.to_lowercase();
    let base = match (data_type.find('('), data_type.find(')')) {
        (Some(open), Some(close)) if open < close => {
            format!("{} {}", &data_type[..open], &data_type[close + 1..])
        }
        _ => data_type,
    };
    let base = base.split_whitespace().collect::<Vec<_>>().join(" ");
    POSTGRES_CAST_TYPES
        .contains(&base.as_str())
        .then_some(base)
}

/// MySQL / MariaDB family
#[derive(Debug, Clone, Copy)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn begin_transaction(&self) -> &'static str {
        "START TRANSACTION"
    }
}

/// SQLite
#[derive(Debug, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, position: usize) -> String {
        format!("?{}", position + 1)
    }
}

/// Fallback for unrecognized engines: ANSI quoting and LIMIT/OFFSET
#[derive(Debug, Clone, Copy)]
pub struct AnsiDialect;

impl Dialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }
}
