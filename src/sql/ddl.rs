//! DDL Generation for Schema Objects
//!
//! Generates the DDL statements the bundled drivers execute. Every identifier
//! is quoted by the engine's dialect; type names, default expressions, check
//! expressions and view bodies are engine-native SQL text passed through as given.

use crate::dialect::{Dialect, Engine};
use crate::error::{Result, SchemaAdminError};
use crate::types::{ColumnDefinition, Constraint, ConstraintSpec, IndexDefinition, TableRef};

/// DDL generator for one engine
pub struct DdlGenerator<'a> {
    engine: &'a Engine,
    dialect: &'static dyn Dialect,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            dialect: engine.dialect(),
        }
    }

    fn quote(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    fn quote_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    pub fn create_schema(&self, schema: &str) -> String {
        match self.engine {
            Engine::SqlServer => format!("CREATE SCHEMA {}", self.quote(schema)),
            _ => format!("CREATE SCHEMA IF NOT EXISTS {}", self.quote(schema)),
        }
    }

    pub fn drop_schema(&self, schema: &str) -> String {
        format!("DROP SCHEMA IF EXISTS {}", self.quote(schema))
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// Generate CREATE TABLE, optionally with a named primary key
    pub fn create_table(
        &self,
        table: &TableRef,
        columns: &[ColumnDefinition],
        primary_key: Option<&Constraint>,
    ) -> String {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| self.format_column_definition(c))
            .collect();

        if let Some(pk) = primary_key {
            defs.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.quote(&pk.name),
                self.quote_list(&pk.columns)
            ));
        }

        let if_not_exists = match self.engine {
            Engine::SqlServer => "",
            _ => "IF NOT EXISTS ",
        };

        format!(
            "CREATE TABLE {}{} ({})",
            if_not_exists,
            self.dialect.qualify(table),
            defs.join(", ")
        )
    }

    pub fn rename_table(&self, table: &TableRef, new_name: &str) -> String {
        match self.engine {
            Engine::SqlServer => format!(
                "EXEC sp_rename '{}', '{}'",
                escape_literal(&table.to_string()),
                escape_literal(new_name)
            ),
            _ => format!(
                "ALTER TABLE {} RENAME TO {}",
                self.dialect.qualify(table),
                self.quote(new_name)
            ),
        }
    }

    pub fn drop_table(&self, table: &TableRef) -> String {
        format!("DROP TABLE IF EXISTS {}", self.dialect.qualify(table))
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Generate CREATE VIEW; `definition` is the SELECT body
    pub fn create_view(&self, view: &TableRef, definition: &str) -> String {
        let body = definition.trim().trim_end_matches(';');
        match self.engine {
            Engine::Sqlite => format!(
                "CREATE VIEW IF NOT EXISTS {} AS {}",
                self.dialect.qualify(view),
                body
            ),
            _ => format!("CREATE VIEW {} AS {}", self.dialect.qualify(view), body),
        }
    }

    /// Generate an in-place view rename, where the engine has one
    pub fn rename_view(&self, view: &TableRef, new_name: &str) -> Result<String> {
        match self.engine {
            Engine::PostgreSql => Ok(format!(
                "ALTER VIEW {} RENAME TO {}",
                self.dialect.qualify(view),
                self.quote(new_name)
            )),
            Engine::MySql => Ok(format!(
                "RENAME TABLE {} TO {}",
                self.dialect.qualify(view),
                self.dialect.qualify(&view.renamed(new_name))
            )),
            Engine::SqlServer => Ok(self.rename_table(view, new_name)),
            _ => Err(SchemaAdminError::not_supported(format!(
                "{} cannot rename views in place",
                self.engine
            ))),
        }
    }

    pub fn drop_view(&self, view: &TableRef) -> String {
        format!("DROP VIEW IF EXISTS {}", self.dialect.qualify(view))
    }

    // ========================================================================
    // Columns
    // ========================================================================

    pub fn add_column(&self, table: &TableRef, column: &ColumnDefinition) -> String {
        let keyword = match self.engine {
            Engine::SqlServer => "ADD",
            _ => "ADD COLUMN",
        };
        format!(
            "ALTER TABLE {} {} {}",
            self.dialect.qualify(table),
            keyword,
            self.format_column_definition(column)
        )
    }

    pub fn rename_column(&self, table: &TableRef, column: &str, new_name: &str) -> String {
        match self.engine {
            Engine::SqlServer => format!(
                "EXEC sp_rename '{}.{}', '{}', 'COLUMN'",
                escape_literal(&table.to_string()),
                escape_literal(column),
                escape_literal(new_name)
            ),
            _ => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.dialect.qualify(table),
                self.quote(column),
                self.quote(new_name)
            ),
        }
    }

    pub fn drop_column(&self, table: &TableRef, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.dialect.qualify(table),
            self.quote(column)
        )
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Generate CREATE INDEX; the index lives in the table's schema
    pub fn create_index(&self, table: &TableRef, index: &IndexDefinition) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        let columns = self.quote_list(&index.columns);

        match self.engine {
            // SQLite qualifies the index name, not the table
            Engine::Sqlite => format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                unique,
                self.dialect.qualify(&table.renamed(&index.name)),
                self.quote(&table.name),
                columns
            ),
            Engine::PostgreSql => format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                unique,
                self.quote(&index.name),
                self.dialect.qualify(table),
                columns
            ),
            _ => format!(
                "CREATE {}INDEX {} ON {} ({})",
                unique,
                self.quote(&index.name),
                self.dialect.qualify(table),
                columns
            ),
        }
    }

    pub fn rename_index(&self, table: &TableRef, index: &str, new_name: &str) -> Result<String> {
        match self.engine {
            Engine::PostgreSql => Ok(format!(
                "ALTER INDEX {} RENAME TO {}",
                self.dialect.qualify(&table.renamed(index)),
                self.quote(new_name)
            )),
            Engine::MySql => Ok(format!(
                "ALTER TABLE {} RENAME INDEX {} TO {}",
                self.dialect.qualify(table),
                self.quote(index),
                self.quote(new_name)
            )),
            Engine::SqlServer => Ok(format!(
                "EXEC sp_rename '{}.{}', '{}', 'INDEX'",
                escape_literal(&table.to_string()),
                escape_literal(index),
                escape_literal(new_name)
            )),
            _ => Err(SchemaAdminError::not_supported(format!(
                "{} cannot rename indexes in place",
                self.engine
            ))),
        }
    }

    pub fn drop_index(&self, table: &TableRef, index: &str) -> String {
        match self.engine {
            Engine::MySql | Engine::SqlServer => format!(
                "DROP INDEX {} ON {}",
                self.quote(index),
                self.dialect.qualify(table)
            ),
            _ => format!(
                "DROP INDEX IF EXISTS {}",
                self.dialect.qualify(&table.renamed(index))
            ),
        }
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    /// Generate the statement adding `constraint` to `table`
    ///
    /// Engines without named default constraints set a column default instead.
    pub fn add_constraint(&self, table: &TableRef, constraint: &Constraint) -> Result<String> {
        let qualified = self.dialect.qualify(table);
        let name = self.quote(&constraint.name);
        let columns = self.quote_list(&constraint.columns);

        let body = match &constraint.spec {
            ConstraintSpec::PrimaryKey => format!("PRIMARY KEY ({})", columns),
            ConstraintSpec::Unique => format!("UNIQUE ({})", columns),
            ConstraintSpec::Check { expression } => format!("CHECK ({})", expression),
            ConstraintSpec::ForeignKey {
                references,
                referenced_columns,
                on_delete,
                on_update,
            } => {
                let mut sql = format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    columns,
                    self.dialect.qualify(references),
                    self.quote_list(referenced_columns)
                );
                if let Some(action) = on_delete {
                    sql.push_str(&format!(" ON DELETE {}", action.to_sql()));
                }
                if let Some(action) = on_update {
                    sql.push_str(&format!(" ON UPDATE {}", action.to_sql()));
                }
                sql
            }
            ConstraintSpec::Default { expression } => {
                let column = single_column(constraint)?;
                return Ok(match self.engine {
                    Engine::SqlServer => format!(
                        "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
                        qualified,
                        name,
                        expression,
                        self.quote(column)
                    ),
                    _ => format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                        qualified,
                        self.quote(column),
                        expression
                    ),
                });
            }
        };

        Ok(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {}",
            qualified, name, body
        ))
    }

    pub fn rename_constraint(
        &self,
        table: &TableRef,
        constraint: &str,
        new_name: &str,
    ) -> Result<String> {
        match self.engine {
            Engine::PostgreSql => Ok(format!(
                "ALTER TABLE {} RENAME CONSTRAINT {} TO {}",
                self.dialect.qualify(table),
                self.quote(constraint),
                self.quote(new_name)
            )),
            Engine::SqlServer => Ok(format!(
                "EXEC sp_rename '{}', '{}', 'OBJECT'",
                escape_literal(&table.renamed(constraint).to_string()),
                escape_literal(new_name)
            )),
            _ => Err(SchemaAdminError::not_supported(format!(
                "{} cannot rename constraints",
                self.engine
            ))),
        }
    }

    /// Generate the statement removing `constraint` from `table`
    pub fn drop_constraint(&self, table: &TableRef, constraint: &Constraint) -> Result<String> {
        let qualified = self.dialect.qualify(table);

        if let (ConstraintSpec::Default { .. }, false) =
            (&constraint.spec, matches!(self.engine, Engine::SqlServer))
        {
            let column = single_column(constraint)?;
            return Ok(format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                qualified,
                self.quote(column)
            ));
        }

        let if_exists = match self.engine {
            Engine::PostgreSql | Engine::SqlServer => "IF EXISTS ",
            _ => "",
        };

        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}{}",
            qualified,
            if_exists,
            self.quote(&constraint.name)
        ))
    }

    /// Format a single column definition for CREATE TABLE or ADD COLUMN
    pub fn format_column_definition(&self, col: &ColumnDefinition) -> String {
        let mut parts = vec![self.quote(&col.name), col.data_type.clone()];

        if !col.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &col.default_value {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }
}

fn single_column(constraint: &Constraint) -> Result<&str> {
    match constraint.columns.as_slice() {
        [column] => Ok(column.as_str()),
        _ => Err(SchemaAdminError::invalid_argument(format!(
            "Default constraint '{}' must target exactly one column",
            constraint.name
        ))),
    }
}

/// Escape a value embedded in a single-quoted SQL string literal
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReferentialAction;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    // ==================== Schema Tests ====================

    #[test]
    fn test_create_and_drop_schema() {
        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        assert_eq!(ddl.create_schema("sales"), "CREATE SCHEMA IF NOT EXISTS \"sales\"");
        assert_eq!(ddl.drop_schema("sales"), "DROP SCHEMA IF EXISTS \"sales\"");
    }

    // ==================== CREATE TABLE Tests ====================

    #[test]
    fn test_create_table() {
        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        let columns = vec![
            ColumnDefinition::new("id", "BIGINT").not_null(),
            ColumnDefinition::new("status", "TEXT")
                .not_null()
                .default("'active'"),
            ColumnDefinition::new("notes", "TEXT"),
        ];

        let sql = ddl.create_table(&TableRef::with_schema("sales", "orders"), &columns, None);

        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"sales\".\"orders\" (\"id\" BIGINT NOT NULL, \"status\" TEXT NOT NULL DEFAULT 'active', \"notes\" TEXT)"
        );
    }

    #[test]
    fn test_create_table_with_primary_key() {
        let sqlite = Engine::Sqlite;
        let ddl = DdlGenerator::new(&sqlite);
        let pk = Constraint::new("pk_users_id", cols(&["id"]), ConstraintSpec::PrimaryKey);

        let sql = ddl.create_table(
            &TableRef::new("users"),
            &[ColumnDefinition::new("id", "INTEGER").not_null()],
            Some(&pk),
        );

        assert!(sql.ends_with("CONSTRAINT \"pk_users_id\" PRIMARY KEY (\"id\"))"));
    }

    #[test]
    fn test_sql_server_table_statements() {
        let mssql = Engine::SqlServer;
        let ddl = DdlGenerator::new(&mssql);
        let t = TableRef::with_schema("dbo", "users");

        assert!(ddl.create_table(&t, &[ColumnDefinition::new("id", "INT")], None)
            .starts_with("CREATE TABLE [dbo].[users]"));
        assert_eq!(
            ddl.rename_table(&t, "members"),
            "EXEC sp_rename 'dbo.users', 'members'"
        );
        assert_eq!(
            ddl.add_column(&t, &ColumnDefinition::new("x", "INT")),
            "ALTER TABLE [dbo].[users] ADD [x] INT"
        );
    }

    #[test]
    fn test_rename_and_drop_table() {
        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        let t = TableRef::new("users");
        assert_eq!(
            ddl.rename_table(&t, "members"),
            "ALTER TABLE \"users\" RENAME TO \"members\""
        );
        assert_eq!(ddl.drop_table(&t), "DROP TABLE IF EXISTS \"users\"");
    }

    // ==================== View Tests ====================

    #[test]
    fn test_create_view_strips_trailing_semicolon() {
        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        assert_eq!(
            ddl.create_view(&TableRef::new("active_users"), "SELECT * FROM users; "),
            "CREATE VIEW \"active_users\" AS SELECT * FROM users"
        );
    }

    #[test]
    fn test_rename_view_not_supported_on_sqlite() {
        let sqlite = Engine::Sqlite;
        let ddl = DdlGenerator::new(&sqlite);
        assert!(matches!(
            ddl.rename_view(&TableRef::new("v"), "w"),
            Err(SchemaAdminError::NotSupported(_))
        ));
    }

    // ==================== Column Tests ====================

    #[test]
    fn test_column_statements() {
        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        let t = TableRef::new("users");

        assert_eq!(
            ddl.add_column(&t, &ColumnDefinition::new("age", "INTEGER").default("0")),
            "ALTER TABLE \"users\" ADD COLUMN \"age\" INTEGER DEFAULT 0"
        );
        assert_eq!(
            ddl.rename_column(&t, "age", "years"),
            "ALTER TABLE \"users\" RENAME COLUMN \"age\" TO \"years\""
        );
        assert_eq!(
            ddl.drop_column(&t, "years"),
            "ALTER TABLE \"users\" DROP COLUMN \"years\""
        );
    }

    // ==================== Index Tests ====================

    #[test]
    fn test_create_index_postgres() {
        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        let index = IndexDefinition::new("ix_orders_a_b", cols(&["a", "b"])).unique();

        assert_eq!(
            ddl.create_index(&TableRef::with_schema("sales", "orders"), &index),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"ix_orders_a_b\" ON \"sales\".\"orders\" (\"a\", \"b\")"
        );
    }

    #[test]
    fn test_create_index_sqlite_qualifies_index_name() {
        let sqlite = Engine::Sqlite;
        let ddl = DdlGenerator::new(&sqlite);
        let index = IndexDefinition::new("ix_users_email", cols(&["email"]));

        assert_eq!(
            ddl.create_index(&TableRef::new("users"), &index),
            "CREATE INDEX IF NOT EXISTS \"ix_users_email\" ON \"users\" (\"email\")"
        );
    }

    #[test]
    fn test_rename_and_drop_index() {
        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        let t = TableRef::with_schema("sales", "orders");

        assert_eq!(
            ddl.rename_index(&t, "ix_old", "ix_new").unwrap(),
            "ALTER INDEX \"sales\".\"ix_old\" RENAME TO \"ix_new\""
        );
        assert_eq!(
            ddl.drop_index(&t, "ix_new"),
            "DROP INDEX IF EXISTS \"sales\".\"ix_new\""
        );

        let mysql = Engine::MySql;
        assert_eq!(
            DdlGenerator::new(&mysql).drop_index(&TableRef::new("orders"), "ix"),
            "DROP INDEX `ix` ON `orders`"
        );
    }

    // ==================== Constraint Tests ====================

    #[test]
    fn test_add_foreign_key() {
        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        let fk = Constraint::new(
            "fk_orders_user_id",
            cols(&["user_id"]),
            ConstraintSpec::ForeignKey {
                references: TableRef::new("users"),
                referenced_columns: cols(&["id"]),
                on_delete: Some(ReferentialAction::Cascade),
                on_update: None,
            },
        );

        assert_eq!(
            ddl.add_constraint(&TableRef::new("orders"), &fk).unwrap(),
            "ALTER TABLE \"orders\" ADD CONSTRAINT \"fk_orders_user_id\" FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_add_unique_and_check() {
        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        let t = TableRef::new("users");

        let uq = Constraint::new("uq_users_email", cols(&["email"]), ConstraintSpec::Unique);
        assert_eq!(
            ddl.add_constraint(&t, &uq).unwrap(),
            "ALTER TABLE \"users\" ADD CONSTRAINT \"uq_users_email\" UNIQUE (\"email\")"
        );

        let chk = Constraint::new(
            "chk_users_age",
            cols(&["age"]),
            ConstraintSpec::Check {
                expression: "age >= 0".to_string(),
            },
        );
        assert_eq!(
            ddl.add_constraint(&t, &chk).unwrap(),
            "ALTER TABLE \"users\" ADD CONSTRAINT \"chk_users_age\" CHECK (age >= 0)"
        );
    }

    #[test]
    fn test_default_constraint_per_engine() {
        let df = Constraint::new(
            "df_users_status",
            cols(&["status"]),
            ConstraintSpec::Default {
                expression: "'active'".to_string(),
            },
        );
        let t = TableRef::with_schema("dbo", "users");

        let mssql = Engine::SqlServer;
        assert_eq!(
            DdlGenerator::new(&mssql).add_constraint(&t, &df).unwrap(),
            "ALTER TABLE [dbo].[users] ADD CONSTRAINT [df_users_status] DEFAULT 'active' FOR [status]"
        );

        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        assert_eq!(
            ddl.add_constraint(&t, &df).unwrap(),
            "ALTER TABLE \"dbo\".\"users\" ALTER COLUMN \"status\" SET DEFAULT 'active'"
        );
        assert_eq!(
            ddl.drop_constraint(&t, &df).unwrap(),
            "ALTER TABLE \"dbo\".\"users\" ALTER COLUMN \"status\" DROP DEFAULT"
        );
    }

    #[test]
    fn test_default_constraint_needs_one_column() {
        let pg = Engine::PostgreSql;
        let df = Constraint::new(
            "df_x",
            cols(&["a", "b"]),
            ConstraintSpec::Default {
                expression: "0".to_string(),
            },
        );
        assert!(DdlGenerator::new(&pg)
            .add_constraint(&TableRef::new("t"), &df)
            .is_err());
    }

    #[test]
    fn test_rename_and_drop_constraint() {
        let pg = Engine::PostgreSql;
        let ddl = DdlGenerator::new(&pg);
        let t = TableRef::new("users");
        let uq = Constraint::new("uq_new", cols(&["email"]), ConstraintSpec::Unique);

        assert_eq!(
            ddl.rename_constraint(&t, "uq_old", "uq_new").unwrap(),
            "ALTER TABLE \"users\" RENAME CONSTRAINT \"uq_old\" TO \"uq_new\""
        );
        assert_eq!(
            ddl.drop_constraint(&t, &uq).unwrap(),
            "ALTER TABLE \"users\" DROP CONSTRAINT IF EXISTS \"uq_new\""
        );
    }

    #[test]
    fn test_literal_escaping_in_sp_rename() {
        let mssql = Engine::SqlServer;
        assert_eq!(
            DdlGenerator::new(&mssql).rename_table(&TableRef::new("o'brien"), "x"),
            "EXEC sp_rename 'o''brien', 'x'"
        );
    }

    // ==================== format_column_definition Tests ====================

    #[test]
    fn test_format_column_definition() {
        let mysql = Engine::MySql;
        let ddl = DdlGenerator::new(&mysql);
        let col = ColumnDefinition::new("amount", "DECIMAL(10,2)").not_null();
        assert_eq!(ddl.format_column_definition(&col), "`amount` DECIMAL(10,2) NOT NULL");
    }
}
