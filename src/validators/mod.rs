//! Rule engine (SPEC_FULL.md §4.4): eight validators run in a fixed order
//! against a [`ResolvedQuery`] and a [`SecuritySchema`]. Each validator is a
//! concrete unit struct implementing [`Validator`]; the engine dispatches
//! through one `const VALIDATORS: &[&dyn Validator]` array rather than a
//! runtime plugin registry, per the host's own preference for exhaustive,
//! compile-time-checked dispatch over dynamic indirection.

mod aggregation;
mod column_access;
mod join;
mod join_count;
mod row_limit;
mod subquery;
mod table_access;
mod where_required;

pub use aggregation::AggregationValidator;
pub use column_access::ColumnAccessValidator;
pub use join::JoinValidator;
pub use join_count::JoinCountValidator;
pub use row_limit::RowLimitValidator;
pub use subquery::SubqueryValidator;
pub use table_access::TableAccessValidator;
pub use where_required::WhereRequiredValidator;

use crate::error::Diagnostic;
use crate::resolver::ResolvedQuery;
use crate::schema::SecuritySchema;

/// One ordered rule in the pipeline. Implementations never panic: a
/// structural impossibility (e.g. a candidate table no longer present in
/// the schema) is reported as a diagnostic, not a bug.
pub trait Validator: Sync {
    fn name(&self) -> &'static str;

    /// Returns every violation this validator finds, in source order.
    /// Empty means the query passes this rule.
    fn check(&self, query: &ResolvedQuery, schema: &SecuritySchema) -> Vec<Diagnostic>;
}

/// Fixed evaluation order, matching the order spec.md §4.4 names the
/// validators in: table access is checked before anything about the
/// columns or structure of a query that is going to be rejected outright
/// anyway.
pub const VALIDATORS: &[&dyn Validator] = &[
    &TableAccessValidator,
    &ColumnAccessValidator,
    &JoinValidator,
    &JoinCountValidator,
    &AggregationValidator,
    &SubqueryValidator,
    &WhereRequiredValidator,
    &RowLimitValidator,
];

/// Resolves a column reference's candidate base tables down to exactly one
/// concrete table using the schema (a visible table "declares" the column
/// if it has an explicit entry or a `default_column_schema`). Returns
/// `Err` with a descriptive message when the reference cannot be resolved
/// unambiguously.
pub(crate) fn disambiguate<'a>(
    schema: &SecuritySchema,
    candidates: &'a [String],
    column: &str,
) -> Result<&'a str, String> {
    if candidates.is_empty() {
        return Err("column reference has no table in scope".to_string());
    }
    if candidates.len() == 1 {
        return Ok(&candidates[0]);
    }
    let declaring: Vec<&str> = candidates
        .iter()
        .filter(|t| {
            schema
                .table_policy(t)
                .map(|p| p.column_policy(column).is_some())
                .unwrap_or(false)
        })
        .map(|s| s.as_str())
        .collect();
    match declaring.len() {
        0 => Err(format!("column '{column}' is not declared on any visible table")),
        1 => Ok(declaring[0]),
        _ => Err(format!(
            "column reference '{column}' is ambiguous across tables: {}",
            declaring.join(", ")
        )),
    }
}
