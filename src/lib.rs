//! LangSec: a structural SQL security policy engine.
//!
//! A SQL statement is inspected before it ever reaches a database, and
//! approved only if every table, column, join, aggregation, and structural
//! feature it touches is permitted by a declarative [`SecuritySchema`].
//! Intended users are applications that accept SQL from low-trust sources
//! — most prominently LLM-driven text-to-SQL systems — that need a
//! deterministic gate between query generation and execution, the same
//! role the host's own tool layer gives a permission check ahead of a
//! shell or filesystem call.
//!
//! The crate does not execute SQL, rewrite SQL, or sandbox a database
//! connection; it answers one question: is this statement allowed under
//! this schema. The outer façade (configuration threading, query logging,
//! raise-vs-return presentation) is deliberately out of scope (spec.md
//! §1) — a caller wraps [`validate_query`] the way a binary wraps this
//! crate's library surface with its own `tracing_subscriber` init and
//! config loader.
//!
//! Pipeline (spec.md §2): pre-parse gate -> parser adapter -> resolver ->
//! rule engine, each a pure function of its predecessor's output plus the
//! schema. No stage performs I/O or retains state across calls.

pub mod ast;
pub mod error;
pub mod parser;
pub mod preparse;
pub mod resolver;
pub mod schema;
pub mod validators;

pub use error::{Diagnostic, Location, SchemaError, ValidationFailure, ValidationOutcome};
pub use schema::{
    AccessLevel, AggregationType, ColumnSchema, JoinType, Operation, SecuritySchema,
    SecuritySchemaBuilder, TableSchema,
};

/// Whether the engine stops at the first diagnostic or runs every
/// validator to completion and reports them all (spec.md §4.4). Both
/// modes must agree on pass/fail; only the shape of a failure differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    FailFast,
    CollectAll,
}

/// Options for [`validate_query_with_options`]. Mirrors the host's own
/// small, explicit options structs (e.g. a `ToolExecutor` execution
/// context) rather than a grab-bag of boolean parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    pub mode: FailureMode,
}

/// Runs the full pipeline in fail-fast mode: pre-parse gate, parse,
/// resolve, then every validator in spec.md §4.4's fixed order, stopping
/// at (and returning) the first diagnostic.
///
/// `(schema, query) -> Result<(), Diagnostic>` is a pure function
/// (spec.md §5): it allocates only the per-call AST and resolution
/// tables, which are dropped before returning, and never mutates
/// `schema`. Any number of callers may validate concurrently against one
/// shared, immutable `SecuritySchema`.
pub fn validate_query(schema: &SecuritySchema, query: &str) -> ValidationOutcome {
    validate_query_with_options(schema, query, ValidationOptions::default())
}

/// As [`validate_query`], but the failure mode is explicit. In
/// [`FailureMode::CollectAll`], every validator runs to completion and a
/// composite [`ValidationFailure::Many`] lists every finding; in
/// [`FailureMode::FailFast`] the engine returns
/// [`ValidationFailure::Single`] for the first one found. Tie-break order
/// (spec.md §4.4: table errors precede column errors on the same table;
/// within a validator, source order) is identical in both modes, so they
/// always agree on `is_ok()`.
pub fn validate_query_with_options(
    schema: &SecuritySchema,
    query: &str,
    options: ValidationOptions,
) -> ValidationOutcome {
    tracing::debug!(query_len = query.len(), "validating query");

    if let Err(diagnostic) = preparse::run(schema, query) {
        tracing::warn!(?diagnostic, "query rejected at pre-parse gate");
        return Err(single_or_many(diagnostic, options.mode));
    }

    let statement = match parser::parse(query) {
        Ok(statement) => statement,
        Err(diagnostic) => {
            tracing::warn!(?diagnostic, "query failed to parse");
            return Err(single_or_many(diagnostic, options.mode));
        }
    };

    let resolved = match resolver::resolve(&statement, schema) {
        Ok(resolved) => resolved,
        Err(diagnostic) => {
            tracing::warn!(?diagnostic, "query failed to resolve");
            return Err(single_or_many(diagnostic, options.mode));
        }
    };

    match options.mode {
        FailureMode::FailFast => {
            for validator in validators::VALIDATORS {
                let findings = validator.check(&resolved, schema);
                if let Some(first) = findings.into_iter().next() {
                    tracing::warn!(validator = validator.name(), ?first, "validator rejected query");
                    return Err(ValidationFailure::Single(first));
                }
            }
            tracing::debug!("query passed all validators");
            Ok(())
        }
        FailureMode::CollectAll => {
            let mut all = Vec::new();
            for validator in validators::VALIDATORS {
                all.extend(validator.check(&resolved, schema));
            }
            if all.is_empty() {
                tracing::debug!("query passed all validators");
                Ok(())
            } else {
                tracing::warn!(count = all.len(), "validators rejected query");
                Err(ValidationFailure::Many(all))
            }
        }
    }
}

fn single_or_many(diagnostic: Diagnostic, mode: FailureMode) -> ValidationFailure {
    match mode {
        FailureMode::FailFast => ValidationFailure::Single(diagnostic),
        FailureMode::CollectAll => ValidationFailure::Many(vec![diagnostic]),
    }
}
