//! Error types for schema administration operations

use thiserror::Error;

use crate::types::ObjectKind;

/// Errors that can occur during schema administration and data queries
#[derive(Debug, Error)]
pub enum SchemaAdminError {
    #[error("{kind} not found: {identity}")]
    NotFound { kind: ObjectKind, identity: String },

    #[error("{kind} already exists: {identity}")]
    AlreadyExists { kind: ObjectKind, identity: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid filter operator: {0}")]
    InvalidFilterOperator(String),

    #[error("{kind} '{requested}' on {table} was created but could not be located")]
    CreationUnverified {
        kind: ObjectKind,
        table: String,
        requested: String,
    },

    #[error("Data engine error: {0}")]
    DataEngine(String),

    #[error("Data engine error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Connection error: {0}")]
    Connection(String),
}

impl SchemaAdminError {
    pub fn not_found(kind: ObjectKind, identity: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            identity: identity.into(),
        }
    }

    pub fn already_exists(kind: ObjectKind, identity: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            identity: identity.into(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn data_engine(msg: impl Into<String>) -> Self {
        Self::DataEngine(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// True for failures reported by the underlying engine or driver
    pub fn is_data_engine(&self) -> bool {
        matches!(self, Self::DataEngine(_) | Self::Sql(_))
    }
}

pub type Result<T> = std::result::Result<T, SchemaAdminError>;
