use super::Validator;
use crate::error::{Diagnostic, Location};
use crate::resolver::ResolvedQuery;
use crate::schema::SecuritySchema;

/// Caps the total number of joins in a query at `schema.max_joins`, when
/// set. Counted across the whole statement, not per scope: a query that
/// spreads joins across subqueries to dodge a per-scope cap is still
/// structurally as complex as one that doesn't.
pub struct JoinCountValidator;

impl Validator for JoinCountValidator {
    fn name(&self) -> &'static str {
        "join_count"
    }

    fn check(&self, query: &ResolvedQuery, schema: &SecuritySchema) -> Vec<Diagnostic> {
        let Some(max) = schema.max_joins else { return Vec::new() };
        if query.joins.len() > max {
            vec![Diagnostic::QueryComplexityError {
                table: None,
                location: Location::unknown(),
                message: format!("query uses {} joins, exceeding the limit of {max}", query.joins.len()),
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

    fn schema_with_max(max: usize) -> SecuritySchema {
        SecuritySchemaBuilder::new()
            .table("a", TableSchema::new())
            .table("b", TableSchema::new())
            .table("c", TableSchema::new())
            .max_joins(max)
            .build()
            .unwrap()
    }

    #[test]
    fn allows_within_limit() {
        let stmt = parse("SELECT a.id FROM a JOIN b ON a.id = b.id").unwrap();
        let resolved = resolve(&stmt, &schema_with_max(1)).unwrap();
        assert!(JoinCountValidator.check(&resolved, &schema_with_max(1)).is_empty());
    }

    #[test]
    fn denies_over_limit() {
        let stmt = parse("SELECT a.id FROM a JOIN b ON a.id = b.id JOIN c ON b.id = c.id").unwrap();
        let resolved = resolve(&stmt, &schema_with_max(1)).unwrap();
        let diags = JoinCountValidator.check(&resolved, &schema_with_max(1));
        assert_eq!(diags.len(), 1);
    }
}
