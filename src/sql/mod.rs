//! SQL utilities
//!
//! Provides filter translation, DDL generation, and identifier sanitization.

pub mod condition;
pub mod ddl;
pub mod sanitize;

pub use condition::{
    BoundParameter, Translation, build_order_by_clause, translate, translate_typed,
};
pub use ddl::DdlGenerator;
pub use sanitize::{quote_identifier, sanitize_fragment, validate_identifier};
