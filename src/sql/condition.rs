//! Condition building for SQL WHERE and ORDER BY clauses
//!
//! Translates the filters and sort terms of a [`QueryRequest`] into SQL
//! fragments for one [`Dialect`]. Filter values are never written into the SQL
//! text; each one becomes a named bound parameter (`param0`, `param1`, ...)
//! rendered with the dialect's placeholder syntax.
//!
//! Conditions are joined with `AND` only. There is no `OR` and no grouping.

use crate::dialect::Dialect;
use crate::error::{Result, SchemaAdminError};
use crate::query::{FilterCondition, FilterOperator, QueryRequest, SortColumn};
use crate::types::ColumnDefinition;

/// A value bound to one placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParameter {
    /// `param{n}`, where `n` is the bind position
    pub name: String,
    pub value: String,
}

/// SQL fragments produced from one request
///
/// The data statement and the count statement are both rendered from the same
/// `Translation`, so their predicates and parameters are identical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    /// Predicate without the `WHERE` keyword
    pub where_clause: Option<String>,
    /// Sort terms without the `ORDER BY` keyword
    pub order_clause: Option<String>,
    pub params: Vec<BoundParameter>,
}

impl Translation {
    /// ` WHERE ...` suffix, or an empty string
    pub fn where_sql(&self) -> String {
        match &self.where_clause {
            Some(clause) => format!(" WHERE {}", clause),
            None => String::new(),
        }
    }

    pub fn param_values(&self) -> Vec<String> {
        self.params.iter().map(|p| p.value.clone()).collect()
    }
}

/// Translate filters and sort order of `request` into SQL fragments
pub fn translate(request: &QueryRequest, dialect: &dyn Dialect) -> Result<Translation> {
    translate_typed(request, dialect, &[])
}

/// Like [`translate`], passing each filtered column's declared type to the dialect
///
/// Columns missing from `columns` are compared without a type.
pub fn translate_typed(
    request: &QueryRequest,
    dialect: &dyn Dialect,
    columns: &[ColumnDefinition],
) -> Result<Translation> {
    let mut params = Vec::new();

    let mut predicates = Vec::with_capacity(request.filters.len());
    for condition in &request.filters {
        let data_type = columns
            .iter()
            .find(|c| c.name == condition.column)
            .map(|c| c.data_type.as_str());
        predicates.push(build_predicate(condition, dialect, data_type, &mut params)?);
    }

    let where_clause = if predicates.is_empty() {
        None
    } else {
        Some(predicates.join(" AND "))
    };

    Ok(Translation {
        where_clause,
        order_clause: build_order_by_clause(&request.order_by, dialect),
        params,
    })
}

/// Build one predicate, appending its parameters to `params`
fn build_predicate(
    condition: &FilterCondition,
    dialect: &dyn Dialect,
    data_type: Option<&str>,
    params: &mut Vec<BoundParameter>,
) -> Result<String> {
    let column = dialect.quote_identifier(&condition.column);

    match condition.operator {
        FilterOperator::IsNull => Ok(format!("{} IS NULL", column)),
        FilterOperator::NotNull => Ok(format!("{} IS NOT NULL", column)),
        FilterOperator::In | FilterOperator::NotIn => {
            let values = condition.list_values();
            if values.is_empty() {
                return Err(SchemaAdminError::invalid_argument(format!(
                    "'{}' filter on '{}' needs at least one value",
                    condition.operator, condition.column
                )));
            }

            let placeholders: Vec<String> = values
                .into_iter()
                .map(|value| dialect.typed_placeholder(bind(params, dialect, value), data_type))
                .collect();

            let keyword = if condition.operator == FilterOperator::In {
                "IN"
            } else {
                "NOT IN"
            };
            Ok(format!(
                "{} {} ({})",
                dialect.comparable_column(&column, data_type),
                keyword,
                placeholders.join(", ")
            ))
        }
        FilterOperator::Like | FilterOperator::NotLike => {
            let value = required_value(condition)?;
            let placeholder = bind(params, dialect, format!("%{}%", value));
            let keyword = if condition.operator == FilterOperator::Like {
                "LIKE"
            } else {
                "NOT LIKE"
            };
            // Pattern matching is always textual
            Ok(format!(
                "{} {} {}",
                dialect.comparable_column(&column, None),
                keyword,
                placeholder
            ))
        }
        op => {
            let value = required_value(condition)?;
            let placeholder =
                dialect.typed_placeholder(bind(params, dialect, value.to_string()), data_type);
            let operator = match op {
                FilterOperator::Eq => "=",
                FilterOperator::Neq => "<>",
                FilterOperator::Gt => ">",
                FilterOperator::Gte => ">=",
                FilterOperator::Lt => "<",
                _ => "<=",
            };
            Ok(format!(
                "{} {} {}",
                dialect.comparable_column(&column, data_type),
                operator,
                placeholder
            ))
        }
    }
}

fn required_value(condition: &FilterCondition) -> Result<&str> {
    condition.value.as_deref().ok_or_else(|| {
        SchemaAdminError::invalid_argument(format!(
            "'{}' filter on '{}' needs a value",
            condition.operator, condition.column
        ))
    })
}

/// Record a parameter and return its placeholder
fn bind(params: &mut Vec<BoundParameter>, dialect: &dyn Dialect, value: String) -> String {
    let position = params.len();
    params.push(BoundParameter {
        name: format!("param{}", position),
        value,
    });
    dialect.placeholder(position)
}

/// Build the ORDER BY terms in request order, or `None` when no sort is requested
pub fn build_order_by_clause(order_by: &[SortColumn], dialect: &dyn Dialect) -> Option<String> {
    if order_by.is_empty() {
        return None;
    }

    let parts: Vec<String> = order_by
        .iter()
        .map(|sort| {
            format!(
                "{} {}",
                dialect.quote_identifier(&sort.column),
                if sort.ascending { "ASC" } else { "DESC" }
            )
        })
        .collect();

    Some(parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Engine;

    fn eq(column: &str, value: &str) -> FilterCondition {
        FilterCondition::new(column, FilterOperator::Eq, Some(value))
    }

    // ==================== Comparison Operations ====================

    #[test]
    fn test_eq_condition_sqlite() {
        let req = QueryRequest::new().filter(eq("status", "active"));
        let t = translate(&req, Engine::Sqlite.dialect()).unwrap();

        assert_eq!(t.where_clause.as_deref(), Some("\"status\" = ?1"));
        assert_eq!(t.params.len(), 1);
        assert_eq!(t.params[0].name, "param0");
        assert_eq!(t.params[0].value, "active");
    }

    #[test]
    fn test_eq_condition_postgres_compares_text() {
        let req = QueryRequest::new().filter(eq("age", "25"));
        let t = translate(&req, Engine::PostgreSql.dialect()).unwrap();

        assert_eq!(t.where_clause.as_deref(), Some("\"age\"::text = $1"));
    }

    #[test]
    fn test_typed_column_postgres_casts_parameter() {
        let columns = vec![
            ColumnDefinition::new("age", "integer"),
            ColumnDefinition::new("name", "text"),
        ];
        let req = QueryRequest::new()
            .filter(FilterCondition::new("age", FilterOperator::Gt, Some("9")))
            .filter(FilterCondition::new("age", FilterOperator::In, Some("1,2")))
            .filter(FilterCondition::new("name", FilterOperator::Like, Some("a%")));
        let t = translate_typed(&req, Engine::PostgreSql.dialect(), &columns).unwrap();

        assert_eq!(
            t.where_clause.as_deref(),
            Some(
                "\"age\" > $1::integer AND \"age\" IN ($2::integer, $3::integer) \
                 AND \"name\"::text LIKE $4"
            )
        );
    }

    #[test]
    fn test_typed_column_sqlite_unchanged() {
        let columns = vec![ColumnDefinition::new("age", "INTEGER")];
        let req = QueryRequest::new().filter(FilterCondition::new(
            "age",
            FilterOperator::Gt,
            Some("9"),
        ));
        let t = translate_typed(&req, Engine::Sqlite.dialect(), &columns).unwrap();

        assert_eq!(t.where_clause.as_deref(), Some("\"age\" > ?1"));
    }

    #[test]
    fn test_comparison_operators() {
        let cases = [
            (FilterOperator::Neq, "<>"),
            (FilterOperator::Gt, ">"),
            (FilterOperator::Gte, ">="),
            (FilterOperator::Lt, "<"),
            (FilterOperator::Lte, "<="),
        ];
        for (op, sql) in cases {
            let req = QueryRequest::new().filter(FilterCondition::new("n", op, Some("1")));
            let t = translate(&req, Engine::MySql.dialect()).unwrap();
            assert_eq!(t.where_clause.unwrap(), format!("`n` {} ?", sql));
        }
    }

    #[test]
    fn test_comparison_without_value_rejected() {
        let req = QueryRequest::new().filter(FilterCondition::new(
            "n",
            FilterOperator::Gt,
            None::<String>,
        ));
        assert!(matches!(
            translate(&req, Engine::Sqlite.dialect()),
            Err(SchemaAdminError::InvalidArgument(_))
        ));
    }

    // ==================== Pattern Operations ====================

    #[test]
    fn test_like_wraps_value_in_parameter() {
        let req = QueryRequest::new()
            .filter(FilterCondition::new("name", FilterOperator::Like, Some("ann")))
            .filter(FilterCondition::new("name", FilterOperator::NotLike, Some("bob")));
        let t = translate(&req, Engine::SqlServer.dialect()).unwrap();

        assert_eq!(
            t.where_clause.as_deref(),
            Some("[name] LIKE @param0 AND [name] NOT LIKE @param1")
        );
        assert_eq!(t.params[0].value, "%ann%");
        assert_eq!(t.params[1].value, "%bob%");
    }

    // ==================== List Operations ====================

    #[test]
    fn test_in_binds_one_parameter_per_element() {
        let req = QueryRequest::new().filter(FilterCondition::new(
            "id",
            FilterOperator::In,
            Some("1, 2, ,3"),
        ));
        let t = translate(&req, Engine::SqlServer.dialect()).unwrap();

        assert_eq!(
            t.where_clause.as_deref(),
            Some("[id] IN (@param0, @param1, @param2)")
        );
        assert_eq!(t.param_values(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_not_in() {
        let req = QueryRequest::new().filter(FilterCondition::new(
            "id",
            FilterOperator::NotIn,
            Some("7,8"),
        ));
        let t = translate(&req, Engine::Sqlite.dialect()).unwrap();
        assert_eq!(t.where_clause.as_deref(), Some("\"id\" NOT IN (?1, ?2)"));
    }

    #[test]
    fn test_empty_in_list_rejected() {
        let req = QueryRequest::new().filter(FilterCondition::new(
            "id",
            FilterOperator::In,
            Some(" , "),
        ));
        assert!(translate(&req, Engine::Sqlite.dialect()).is_err());
    }

    // ==================== Nullability Operations ====================

    #[test]
    fn test_nullity_binds_nothing() {
        let req = QueryRequest::new()
            .filter(FilterCondition::new(
                "deleted_at",
                FilterOperator::IsNull,
                Some("ignored"),
            ))
            .filter(FilterCondition::new(
                "email",
                FilterOperator::NotNull,
                None::<String>,
            ));
        let t = translate(&req, Engine::PostgreSql.dialect()).unwrap();

        assert_eq!(
            t.where_clause.as_deref(),
            Some("\"deleted_at\" IS NULL AND \"email\" IS NOT NULL")
        );
        assert!(t.params.is_empty());
    }

    // ==================== Parameter Positions ====================

    #[test]
    fn test_param_positions_follow_bind_order() {
        let req = QueryRequest::new()
            .filter(eq("a", "1"))
            .filter(FilterCondition::new("b", FilterOperator::In, Some("x,y")))
            .filter(FilterCondition::new("c", FilterOperator::IsNull, None::<String>))
            .filter(eq("d", "4"));
        let t = translate(&req, Engine::PostgreSql.dialect()).unwrap();

        let clause = t.where_clause.unwrap();
        assert!(clause.contains("\"a\"::text = $1"));
        assert!(clause.contains("\"b\"::text IN ($2, $3)"));
        assert!(clause.contains("\"d\"::text = $4"));
        let names: Vec<_> = t.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["param0", "param1", "param2", "param3"]);
    }

    #[test]
    fn test_injection_value_stays_in_parameter() {
        let payload = "' OR 1=1 --";
        let req = QueryRequest::new().filter(eq("name", payload));
        let t = translate(&req, Engine::Sqlite.dialect()).unwrap();

        assert!(!t.where_clause.as_deref().unwrap().contains(payload));
        assert_eq!(t.params[0].value, payload);
    }

    #[test]
    fn test_hostile_column_name_is_quoted() {
        let req = QueryRequest::new().filter(eq("x\" = x OR \"1", "1"));
        let t = translate(&req, Engine::Sqlite.dialect()).unwrap();
        assert_eq!(
            t.where_clause.as_deref(),
            Some("\"x\"\" = x OR \"\"1\" = ?1")
        );
    }

    #[test]
    fn test_no_filters_no_where() {
        let t = translate(&QueryRequest::new(), Engine::Sqlite.dialect()).unwrap();
        assert!(t.where_clause.is_none());
        assert_eq!(t.where_sql(), "");
    }

    // ==================== build_order_by_clause Tests ====================

    #[test]
    fn test_order_by_none() {
        assert!(build_order_by_clause(&[], Engine::Sqlite.dialect()).is_none());
    }

    #[test]
    fn test_order_by_preserves_request_order() {
        let sort = vec![SortColumn::desc("created"), SortColumn::asc("id")];
        assert_eq!(
            build_order_by_clause(&sort, Engine::SqlServer.dialect()).unwrap(),
            "[created] DESC, [id] ASC"
        );
    }
}
