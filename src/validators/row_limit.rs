use super::Validator;
use crate::error::{Diagnostic, Location};
use crate::resolver::{ResolvedQuery, StatementKind};
use crate::schema::SecuritySchema;

/// If the statement has an explicit `LIMIT n` and any table it touches
/// declares `max_rows`, `n` must not exceed the smallest such bound
/// (spec.md §4.4 RowLimit: "advisory... enforced only if the query has an
/// explicit LIMIT"). A query with no `LIMIT` is not synthesized one and is
/// not flagged by this rule.
pub struct RowLimitValidator;

impl Validator for RowLimitValidator {
    fn name(&self) -> &'static str {
        "row_limit"
    }

    fn check(&self, query: &ResolvedQuery, schema: &SecuritySchema) -> Vec<Diagnostic> {
        if query.statement_kind != StatementKind::Select {
            return Vec::new();
        }
        let Some(limit) = query.limit else { return Vec::new() };

        let bound = query
            .root_tables
            .iter()
            .filter_map(|t| schema.table_policy(t).and_then(|p| p.max_rows))
            .min();
        let Some(max) = bound else { return Vec::new() };

        if limit > max {
            vec![Diagnostic::QueryComplexityError {
                table: None,
                location: Location::unknown(),
                message: format!("LIMIT {limit} exceeds the maximum of {max}"),
            }]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::resolver::resolve;
    use crate::schema::{AccessLevel, SecuritySchemaBuilder, TableSchema};

    fn schema() -> SecuritySchema {
        SecuritySchemaBuilder::new()
            .table("orders", TableSchema::new())
            .max_row_limit("orders", 100)
            .build()
            .unwrap()
    }

    #[test]
    fn missing_limit_is_not_flagged() {
        let stmt = parse("SELECT * FROM orders").unwrap();
        let resolved = resolve(&stmt, &schema()).unwrap();
        assert!(RowLimitValidator.check(&resolved, &schema()).is_empty());
    }

    #[test]
    fn allows_limit_within_bound() {
        let stmt = parse("SELECT * FROM orders LIMIT 50").unwrap();
        let resolved = resolve(&stmt, &schema()).unwrap();
        assert!(RowLimitValidator.check(&resolved, &schema()).is_empty());
    }

    #[test]
    fn denies_limit_over_bound() {
        let stmt = parse("SELECT * FROM orders LIMIT 500").unwrap();
        let resolved = resolve(&stmt, &schema()).unwrap();
        assert_eq!(RowLimitValidator.check(&resolved, &schema()).len(), 1);
    }
}
