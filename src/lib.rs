//! # runtara-schema-admin
//!
//! Structural administration and generic querying of relational databases.
//!
//! This crate manages schemas, tables, views, columns, indexes and
//! constraints (primary key, foreign key, unique, check, default) through one
//! per-kind API, and answers filtered, sorted, paginated reads against any
//! table or view. SQL is rendered per engine through a [`Dialect`].
//!
//! ## Features
//!
//! - **Existence Guards**: Every mutation checks the target (and its parents)
//!   first, so callers get `NotFound` / `AlreadyExists` instead of engine errors
//! - **Name Resolution**: Indexes and constraints created without a name get a
//!   deterministic one; objects the engine renamed are located by column set
//! - **Safe Queries**: Filter values are always bound parameters; identifiers
//!   are validated and quoted
//! - **Transactional Updates**: `update_table` applies column, index and
//!   constraint changes atomically
//! - **Cancellation**: Every call takes a `CancellationToken`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runtara_schema_admin::{
//!     ColumnDefinition, CreateTableRequest, FilterCondition, FilterOperator, QueryRequest,
//!     SchemaService, ServiceConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder("postgres://localhost/mydb").build();
//!     let service = SchemaService::new(config).await?;
//!     let cancel = CancellationToken::new();
//!
//!     service
//!         .create_table(
//!             Some("sales"),
//!             "orders",
//!             &CreateTableRequest::new(vec![
//!                 ColumnDefinition::new("id", "integer").not_null(),
//!                 ColumnDefinition::new("status", "text"),
//!             ])
//!             .primary_key(vec!["id".to_string()]),
//!             &cancel,
//!         )
//!         .await?;
//!
//!     let page = service
//!         .query_table(
//!             Some("sales"),
//!             "orders",
//!             &QueryRequest::new()
//!                 .filter(FilterCondition::new("status", FilterOperator::Eq, Some("open")))
//!                 .paginate(50, 0)
//!                 .with_total(),
//!             &cancel,
//!         )
//!         .await?;
//!
//!     println!("{} of {:?}", page.rows.len(), page.pagination.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use runtara_schema_admin::ServiceConfig;
//!
//! let config = ServiceConfig::builder("sqlite::memory:")
//!     .max_take(500)               // Largest page a query may request
//!     .current_schema_token("_")   // Schema argument meaning "current schema"
//!     .max_connections(5)
//!     .build();
//! ```

pub mod audit;
pub mod config;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod executor;
pub mod guard;
pub mod naming;
pub mod query;
pub mod resolve;
pub mod service;
pub mod sql;
pub mod types;

// Re-export main types for convenience
pub use audit::{Action, AllowAll, AuditSink, Authorizer, OperationDescriptor, TracingAuditSink};
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use dialect::{Dialect, Engine};
pub use driver::{Connection, Driver, Statement};
pub use error::{Result, SchemaAdminError};
pub use query::{
    FieldInfo, FilterCondition, FilterOperator, Pagination, QueryRequest, QueryResult, Row,
    SortColumn,
};
pub use resolve::{ResolutionMethod, Resolved};
pub use service::SchemaService;
pub use types::{
    ColumnDefinition, Constraint, ConstraintKind, ConstraintSpec, CreateConstraintRequest,
    CreateIndexRequest, CreateTableRequest, IndexDefinition, ObjectKind, ReferentialAction,
    TableInfo, TableRef, UpdateTableRequest, ViewInfo,
};

// Re-export SQL utilities for advanced users
pub use sql::condition::{translate, translate_typed};
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::{quote_identifier, validate_identifier};
