//! Authorization and audit collaborators
//!
//! Every public service call builds one [`OperationDescriptor`], asks the
//! [`Authorizer`] once before doing any work, and reports to the [`AuditSink`]
//! exactly once on the way out.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::ObjectKind;

/// Verb of a public operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    List,
    Get,
    Exists,
    Create,
    Rename,
    Drop,
    Update,
    Query,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::List => "list",
            Action::Get => "get",
            Action::Exists => "exists",
            Action::Create => "create",
            Action::Rename => "rename",
            Action::Drop => "drop",
            Action::Update => "update",
            Action::Query => "query",
        };
        f.write_str(label)
    }
}

/// What a call is about to do, for authorization and audit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub action: Action,
    pub kind: ObjectKind,
    /// Identity of the addressed object, e.g. `sales.orders.ix_orders_date`
    pub target: String,
}

impl OperationDescriptor {
    pub fn new(action: Action, kind: ObjectKind, target: impl Into<String>) -> Self {
        Self {
            action,
            kind,
            target: target.into(),
        }
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} '{}'", self.action, self.kind, self.target)
    }
}

/// Authorization gate consulted once per call
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_authorized(&self, operation: &OperationDescriptor) -> bool;
}

/// Receives one event per call, on success and on failure
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_operation(
        &self,
        operation: &OperationDescriptor,
        success: bool,
        message: Option<&str>,
    );
}

/// Authorizes everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn is_authorized(&self, _operation: &OperationDescriptor) -> bool {
        true
    }
}

/// Writes audit events as `tracing` events under the `audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_operation(
        &self,
        operation: &OperationDescriptor,
        success: bool,
        message: Option<&str>,
    ) {
        if success {
            info!(
                target: "audit",
                action = %operation.action,
                kind = %operation.kind,
                object = %operation.target,
                "Operation succeeded"
            );
        } else {
            warn!(
                target: "audit",
                action = %operation.action,
                kind = %operation.kind,
                object = %operation.target,
                error = message.unwrap_or_default(),
                "Operation failed"
            );
        }
    }
}
