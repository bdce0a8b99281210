//! Idempotent creation of indexes and constraints
//!
//! Unnamed requests get a deterministic name (see [`crate::naming`]). After
//! the create call the object is looked up again, because some engines store
//! it under a name of their own choosing. Resolution stops at the first hit:
//!
//! 1. exact name, compared case-insensitively
//! 2. column multiset, ignoring order and case
//! 3. for check constraints only, the single constraint of that kind on the table
//!
//! When nothing matches the call fails with `CreationUnverified`. When step 2
//! matches more than one object the first is returned and the others are
//! listed in [`Resolved::alternatives`].

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::driver::Connection;
use crate::error::{Result, SchemaAdminError};
use crate::guard::{ObjectPath, assert_not_exists};
use crate::naming::{INDEX_PREFIX, synthesize_name};
use crate::sql::sanitize::validate_identifier;
use crate::types::{
    Constraint, ConstraintKind, ConstraintSpec, CreateConstraintRequest, CreateIndexRequest,
    IndexDefinition, ObjectKind, TableRef,
};

/// How a created object was located
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionMethod {
    ExactName,
    ColumnSet,
    SoleCandidate,
}

/// A created object together with how it was found
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resolved<T> {
    pub object: T,
    pub resolved_by: ResolutionMethod,
    /// Other objects that matched equally well
    pub alternatives: Vec<String>,
}

/// Named object with an ordered column list
pub trait Candidate: Clone {
    fn name(&self) -> &str;
    fn columns(&self) -> &[String];
}

impl Candidate for IndexDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Candidate for Constraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// True when both lists hold the same columns, ignoring order and case
pub fn same_column_set(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let normalize = |cols: &[String]| {
        let mut v: Vec<String> = cols.iter().map(|c| c.to_lowercase()).collect();
        v.sort();
        v
    };
    normalize(a) == normalize(b)
}

/// Pick the created object out of everything of its kind on the table
pub fn resolve<T: Candidate>(
    requested_name: &str,
    requested_columns: &[String],
    candidates: &[T],
    allow_sole_candidate: bool,
) -> Option<Resolved<T>> {
    if let Some(found) = candidates
        .iter()
        .find(|c| c.name().eq_ignore_ascii_case(requested_name))
    {
        return Some(Resolved {
            object: found.clone(),
            resolved_by: ResolutionMethod::ExactName,
            alternatives: Vec::new(),
        });
    }

    if !requested_columns.is_empty() {
        let mut matches = candidates
            .iter()
            .filter(|c| same_column_set(c.columns(), requested_columns));
        if let Some(first) = matches.next() {
            return Some(Resolved {
                object: first.clone(),
                resolved_by: ResolutionMethod::ColumnSet,
                alternatives: matches.map(|c| c.name().to_string()).collect(),
            });
        }
    }

    match candidates {
        [only] if allow_sole_candidate => Some(Resolved {
            object: only.clone(),
            resolved_by: ResolutionMethod::SoleCandidate,
            alternatives: Vec::new(),
        }),
        _ => None,
    }
}

fn report<T: Candidate>(
    kind: ObjectKind,
    table: &TableRef,
    requested: &str,
    resolved: &Resolved<T>,
) {
    if !resolved.alternatives.is_empty() {
        warn!(
            kind = %kind,
            table = %table,
            requested = %requested,
            chosen = %resolved.object.name(),
            alternatives = ?resolved.alternatives,
            "Created object matched more than one candidate"
        );
    }
    info!(
        kind = %kind,
        table = %table,
        name = %resolved.object.name(),
        resolved_by = ?resolved.resolved_by,
        "Created schema object"
    );
}

/// Create an index, synthesizing its name when none is given
///
/// The caller has already checked that `table` exists.
pub async fn create_index(
    conn: &mut dyn Connection,
    table: &TableRef,
    request: &CreateIndexRequest,
) -> Result<Resolved<IndexDefinition>> {
    if request.columns.is_empty() {
        return Err(SchemaAdminError::invalid_argument(
            "An index needs at least one column",
        ));
    }

    let name = match &request.name {
        Some(name) => name.clone(),
        None => synthesize_name(INDEX_PREFIX, table, &request.columns)?,
    };
    validate_identifier(&name, ObjectKind::Index)?;
    assert_not_exists(conn, ObjectPath::Index(table, &name)).await?;

    let index = IndexDefinition {
        name: name.clone(),
        columns: request.columns.clone(),
        unique: request.unique,
    };
    debug!(table = %table, name = %name, "Creating index");
    conn.create_index_if_not_exists(table, &index).await?;

    let candidates = conn.list_indexes(table).await?;
    let resolved = resolve(&name, &request.columns, &candidates, false).ok_or_else(|| {
        SchemaAdminError::CreationUnverified {
            kind: ObjectKind::Index,
            table: table.to_string(),
            requested: name.clone(),
        }
    })?;

    report(ObjectKind::Index, table, &name, &resolved);
    Ok(resolved)
}

/// Create a constraint, synthesizing its name when none is given
///
/// The caller has already checked that `table` exists.
pub async fn create_constraint(
    conn: &mut dyn Connection,
    table: &TableRef,
    request: &CreateConstraintRequest,
) -> Result<Resolved<Constraint>> {
    let kind = request.spec.kind();
    validate_request(kind, request)?;

    let name = match &request.name {
        Some(name) => name.clone(),
        None => synthesize_name(kind.name_prefix(), table, &request.columns)?,
    };
    validate_identifier(&name, kind.object_kind())?;
    assert_not_exists(conn, ObjectPath::Constraint(table, kind, &name)).await?;

    let existing = conn.list_constraints(table, kind).await?;
    check_collision(kind, &request.columns, &existing)?;

    let constraint = Constraint {
        name: name.clone(),
        columns: request.columns.clone(),
        spec: request.spec.clone(),
    };
    debug!(table = %table, kind = %kind, name = %name, "Creating constraint");
    conn.create_constraint_if_not_exists(table, &constraint).await?;

    let candidates = conn.list_constraints(table, kind).await?;
    let resolved = resolve(
        &name,
        &request.columns,
        &candidates,
        kind == ConstraintKind::Check,
    )
    .ok_or_else(|| SchemaAdminError::CreationUnverified {
        kind: kind.object_kind(),
        table: table.to_string(),
        requested: name.clone(),
    })?;

    report(kind.object_kind(), table, &name, &resolved);
    Ok(resolved)
}

fn validate_request(kind: ConstraintKind, request: &CreateConstraintRequest) -> Result<()> {
    if request.columns.is_empty() && kind != ConstraintKind::Check {
        return Err(SchemaAdminError::invalid_argument(format!(
            "{} needs at least one column",
            kind
        )));
    }

    match &request.spec {
        ConstraintSpec::ForeignKey {
            referenced_columns, ..
        } if referenced_columns.len() != request.columns.len() => {
            Err(SchemaAdminError::invalid_argument(format!(
                "Foreign key has {} columns but references {}",
                request.columns.len(),
                referenced_columns.len()
            )))
        }
        ConstraintSpec::Default { .. } if request.columns.len() != 1 => Err(
            SchemaAdminError::invalid_argument("Default constraint must target exactly one column"),
        ),
        ConstraintSpec::Check { expression } | ConstraintSpec::Default { expression }
            if expression.trim().is_empty() =>
        {
            Err(SchemaAdminError::invalid_argument(format!(
                "{} needs an expression",
                kind
            )))
        }
        _ => Ok(()),
    }
}

/// Reject a second primary key, or a unique constraint duplicating an existing column set
fn check_collision(
    kind: ConstraintKind,
    columns: &[String],
    existing: &[Constraint],
) -> Result<()> {
    let clash = match kind {
        ConstraintKind::PrimaryKey => existing.first(),
        ConstraintKind::Unique => existing
            .iter()
            .find(|c| same_column_set(&c.columns, columns)),
        _ => None,
    };

    match clash {
        Some(c) => Err(SchemaAdminError::already_exists(
            kind.object_kind(),
            c.name.clone(),
        )),
        None => Ok(()),
    }
}
