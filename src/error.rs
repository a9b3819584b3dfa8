//! Typed error surfaces. Following the host's own split between a
//! `thiserror` enum at a library boundary and `anyhow` at call sites that
//! consume it, `Diagnostic` and `SchemaError` are the only error types this
//! crate exposes; there is no `anyhow` in the core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A source location within the original query string, used to anchor a
/// diagnostic to the offending fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub offset: usize,
    pub len: usize,
}

impl Location {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    pub fn unknown() -> Self {
        Self { offset: 0, len: 0 }
    }
}

/// One diagnosed policy violation or structural rejection. This is the
/// stable per-query wire format (spec.md §6): `kind`, `message`, plus the
/// optional `table`/`column` that produced it and a `location`.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Diagnostic {
    #[error("table access denied: {table}")]
    TableAccessError { table: String, location: Location, message: String },

    #[error("column access denied: {table}.{column}")]
    ColumnAccessError {
        table: String,
        column: String,
        location: Location,
        message: String,
    },

    #[error("join violation: {message}")]
    JoinViolationError {
        table: Option<String>,
        location: Location,
        message: String,
    },

    #[error("query complexity violation: {message}")]
    QueryComplexityError {
        table: Option<String>,
        location: Location,
        message: String,
    },

    #[error("query syntax error: {message}")]
    QuerySyntaxError { location: Location, message: String },

    #[error("sql injection heuristic triggered: {message}")]
    SQLInjectionError { location: Location, message: String },
}

impl Diagnostic {
    pub fn message(&self) -> &str {
        match self {
            Diagnostic::TableAccessError { message, .. }
            | Diagnostic::ColumnAccessError { message, .. }
            | Diagnostic::JoinViolationError { message, .. }
            | Diagnostic::QueryComplexityError { message, .. }
            | Diagnostic::QuerySyntaxError { message, .. }
            | Diagnostic::SQLInjectionError { message, .. } => message,
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            Diagnostic::TableAccessError { table, .. } => Some(table),
            Diagnostic::ColumnAccessError { table, .. } => Some(table),
            Diagnostic::JoinViolationError { table, .. }
            | Diagnostic::QueryComplexityError { table, .. } => table.as_deref(),
            _ => None,
        }
    }
}

/// Outcome of a query validation: either the statement is allowed, or one
/// (fail-fast) or many (collect-all) diagnostics explain why it is not.
#[derive(Debug, Clone)]
pub enum ValidationFailure {
    Single(Diagnostic),
    Many(Vec<Diagnostic>),
}

impl ValidationFailure {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            ValidationFailure::Single(d) => std::slice::from_ref(d),
            ValidationFailure::Many(v) => v,
        }
    }
}

pub type ValidationOutcome = Result<(), ValidationFailure>;

/// Schema construction failures (spec.md §6/§7): narrower than
/// `Diagnostic` because these can only occur before any query is even
/// considered, so they never appear in the per-query wire format.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum SchemaError {
    #[error("table '{table}' has column '{column}' with inconsistent policy: {reason}")]
    InconsistentColumn { table: String, column: String, reason: String },

    #[error("table '{table}' allows joins to unknown table '{target}'")]
    UnknownJoinTarget { table: String, target: String },
}
