//! Query request and result types
//!
//! A [`QueryRequest`] is the engine-neutral description of a filtered,
//! sorted, paginated read. It is translated to SQL by [`crate::sql::condition`]
//! and executed by [`crate::executor::QueryExecutor`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaAdminError};

/// Row returned by a data query, keyed by column name in result order
pub type Row = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Filters
// ============================================================================

/// Comparison operator of a single filter condition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    NotNull,
}

impl FilterOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::NotLike => "nlike",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "nin",
            FilterOperator::IsNull => "isnull",
            FilterOperator::NotNull => "notnull",
        }
    }

    /// Operators that never bind a parameter
    pub fn is_nullity(self) -> bool {
        matches!(self, FilterOperator::IsNull | FilterOperator::NotNull)
    }

    /// Operators whose value is a comma-separated list
    pub fn is_list(self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::NotIn)
    }
}

impl FromStr for FilterOperator {
    type Err = SchemaAdminError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "eq" => Ok(FilterOperator::Eq),
            "neq" => Ok(FilterOperator::Neq),
            "gt" => Ok(FilterOperator::Gt),
            "gte" => Ok(FilterOperator::Gte),
            "lt" => Ok(FilterOperator::Lt),
            "lte" => Ok(FilterOperator::Lte),
            "like" => Ok(FilterOperator::Like),
            "nlike" => Ok(FilterOperator::NotLike),
            "in" => Ok(FilterOperator::In),
            "nin" => Ok(FilterOperator::NotIn),
            "isnull" => Ok(FilterOperator::IsNull),
            "notnull" => Ok(FilterOperator::NotNull),
            _ => Err(SchemaAdminError::InvalidFilterOperator(s.to_string())),
        }
    }
}

impl TryFrom<String> for FilterOperator {
    type Error = SchemaAdminError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FilterOperator> for String {
    fn from(op: FilterOperator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `column operator value` predicate; conditions are ANDed together
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterCondition {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<String>,
}

impl FilterCondition {
    pub fn new(
        column: impl Into<String>,
        operator: FilterOperator,
        value: Option<impl Into<String>>,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.map(Into::into),
        }
    }

    /// Build a condition from operator text, rejecting unknown operators
    pub fn parse(
        column: impl Into<String>,
        operator: &str,
        value: Option<impl Into<String>>,
    ) -> Result<Self> {
        Ok(Self::new(column, operator.parse()?, value))
    }

    /// Elements of an `in`/`nin` value: comma-split, trimmed, empties dropped
    pub fn list_values(&self) -> Vec<String> {
        self.value
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Ordering term; request order defines the tie-break order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SortColumn {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl SortColumn {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

// ============================================================================
// Query Request
// ============================================================================

fn default_take() -> u32 {
    100
}

/// Filtered, sorted, paginated read against one table or view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Page size
    #[serde(default = "default_take")]
    pub take: u32,
    /// Rows to skip
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default)]
    pub order_by: Vec<SortColumn>,
    /// Projected columns; empty selects every column
    #[serde(default)]
    pub select_columns: Vec<String>,
    /// Whether to run the COUNT statement alongside the page
    #[serde(default)]
    pub include_total: bool,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            take: default_take(),
            skip: 0,
            filters: Vec::new(),
            order_by: Vec::new(),
            select_columns: Vec::new(),
            include_total: false,
        }
    }
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paginate(mut self, take: u32, skip: u64) -> Self {
        self.take = take;
        self.skip = skip;
        self
    }

    pub fn filter(mut self, condition: FilterCondition) -> Self {
        self.filters.push(condition);
        self
    }

    pub fn order_by(mut self, sort: SortColumn) -> Self {
        self.order_by.push(sort);
        self
    }

    pub fn select(mut self, columns: Vec<String>) -> Self {
        self.select_columns = columns;
        self
    }

    pub fn with_total(mut self) -> Self {
        self.include_total = true;
        self
    }

    /// Check the input invariants that do not need a connection
    pub fn validate(&self, max_take: u32) -> Result<()> {
        if self.take < 1 || self.take > max_take {
            return Err(SchemaAdminError::invalid_argument(format!(
                "take must be between 1 and {}, got {}",
                max_take, self.take
            )));
        }

        for condition in &self.filters {
            if condition.column.trim().is_empty() {
                return Err(SchemaAdminError::invalid_argument(
                    "filter column cannot be empty",
                ));
            }
            if condition.operator.is_list() {
                if condition.list_values().is_empty() {
                    return Err(SchemaAdminError::invalid_argument(format!(
                        "'{}' filter on '{}' needs at least one value",
                        condition.operator, condition.column
                    )));
                }
            } else if !condition.operator.is_nullity() && condition.value.is_none() {
                return Err(SchemaAdminError::invalid_argument(format!(
                    "'{}' filter on '{}' needs a value",
                    condition.operator, condition.column
                )));
            }
        }

        if self.order_by.iter().any(|s| s.column.trim().is_empty()) {
            return Err(SchemaAdminError::invalid_argument(
                "sort column cannot be empty",
            ));
        }
        if self.select_columns.iter().any(|c| c.trim().is_empty()) {
            return Err(SchemaAdminError::invalid_argument(
                "selected column cannot be empty",
            ));
        }

        Ok(())
    }

    /// Projection with duplicates removed, first occurrence wins
    pub fn projection(&self) -> Vec<&str> {
        let mut seen = Vec::with_capacity(self.select_columns.len());
        for column in &self.select_columns {
            if !seen.contains(&column.as_str()) {
                seen.push(column.as_str());
            }
        }
        seen
    }
}

// ============================================================================
// Query Result
// ============================================================================

/// Column metadata attached to a result page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
}

/// Pagination envelope of a result page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub take: u32,
    pub skip: u64,
    pub total: Option<i64>,
    pub has_more: bool,
}

impl Pagination {
    /// More rows exist iff the page is full and the total (when known) lies beyond it
    pub fn compute(take: u32, skip: u64, returned: usize, total: Option<i64>) -> Self {
        let page_full = returned == take as usize;
        let beyond = match total {
            None => true,
            Some(total) => (skip as i128 + take as i128) < total as i128,
        };
        Self {
            take,
            skip,
            total,
            has_more: page_full && beyond,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub fields: Vec<FieldInfo>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // FilterOperator Tests
    // =========================================================================

    #[test]
    fn test_operator_parsing() {
        assert_eq!("eq".parse::<FilterOperator>().unwrap(), FilterOperator::Eq);
        assert_eq!("NLIKE".parse::<FilterOperator>().unwrap(), FilterOperator::NotLike);
        assert_eq!("nin".parse::<FilterOperator>().unwrap(), FilterOperator::NotIn);
        assert_eq!(
            "notnull".parse::<FilterOperator>().unwrap(),
            FilterOperator::NotNull
        );
    }

    #[test]
    fn test_operator_rejects_unknown() {
        let err = "between".parse::<FilterOperator>().unwrap_err();
        assert!(matches!(
            err,
            SchemaAdminError::InvalidFilterOperator(op) if op == "between"
        ));
    }

    #[test]
    fn test_condition_deserialization_rejects_unknown_operator() {
        let json = r#"{"column":"status","operator":"~=","value":"x"}"#;
        let err = serde_json::from_str::<FilterCondition>(json).unwrap_err();
        assert!(err.to_string().contains("Invalid filter operator"));
    }

    // =========================================================================
    // List Value Tests
    // =========================================================================

    #[test]
    fn test_list_values_trim_and_drop_empty() {
        let c = FilterCondition::new("id", FilterOperator::In, Some("1, 2, ,3"));
        assert_eq!(c.list_values(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_list_values_without_value() {
        let c = FilterCondition::new("id", FilterOperator::In, None::<String>);
        assert!(c.list_values().is_empty());
    }

    // =========================================================================
    // Validation Tests
    // =========================================================================

    #[test]
    fn test_take_bounds() {
        assert!(QueryRequest::new().paginate(1, 0).validate(1000).is_ok());
        assert!(QueryRequest::new().paginate(1000, 0).validate(1000).is_ok());
        assert!(QueryRequest::new().paginate(0, 0).validate(1000).is_err());
        assert!(QueryRequest::new().paginate(1001, 0).validate(1000).is_err());
    }

    #[test]
    fn test_comparison_requires_value() {
        let req = QueryRequest::new().filter(FilterCondition::new(
            "status",
            FilterOperator::Eq,
            None::<String>,
        ));
        assert!(matches!(
            req.validate(1000),
            Err(SchemaAdminError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_nullity_needs_no_value() {
        let req = QueryRequest::new().filter(FilterCondition::new(
            "deleted_at",
            FilterOperator::IsNull,
            None::<String>,
        ));
        assert!(req.validate(1000).is_ok());
    }

    #[test]
    fn test_empty_in_list_rejected() {
        let req = QueryRequest::new().filter(FilterCondition::new(
            "id",
            FilterOperator::In,
            Some(" , ,"),
        ));
        assert!(req.validate(1000).is_err());
    }

    #[test]
    fn test_request_deserialization_defaults() {
        let json = r#"{"take":50,"filters":[{"column":"status","operator":"eq","value":"active"}],"includeTotal":true}"#;
        let req: QueryRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.take, 50);
        assert_eq!(req.skip, 0);
        assert!(req.include_total);
        assert_eq!(req.filters[0].operator, FilterOperator::Eq);
        assert!(req.order_by.is_empty());
    }

    #[test]
    fn test_projection_dedupes() {
        let req = QueryRequest::new().select(vec![
            "id".to_string(),
            "name".to_string(),
            "id".to_string(),
        ]);
        assert_eq!(req.projection(), vec!["id", "name"]);
    }

    // =========================================================================
    // Pagination Tests
    // =========================================================================

    #[test]
    fn test_has_more_full_page_with_remaining_total() {
        let p = Pagination::compute(50, 0, 50, Some(80));
        assert!(p.has_more);
    }

    #[test]
    fn test_has_more_partial_page() {
        let p = Pagination::compute(50, 75, 5, Some(80));
        assert!(!p.has_more);
    }

    #[test]
    fn test_has_more_full_last_page() {
        let p = Pagination::compute(40, 40, 40, Some(80));
        assert!(!p.has_more);
    }

    #[test]
    fn test_has_more_unknown_total() {
        assert!(Pagination::compute(10, 0, 10, None).has_more);
        assert!(!Pagination::compute(10, 0, 9, None).has_more);
    }
}
