use super::Validator;
use crate::error::{Diagnostic, Location};
use crate::resolver::ResolvedQuery;
use crate::schema::SecuritySchema;

/// Rejects any query containing a derived table, CTE, or expression
/// subquery when `schema.allow_subqueries` is `false`.
pub struct SubqueryValidator;

impl Validator for SubqueryValidator {
    fn name(&self) -> &'static str {
        "subquery"
    }

    fn check(&self, query: &ResolvedQuery, schema: &SecuritySchema) -> Vec<Diagnostic> {
        if !schema.allow_subqueries && query.subquery_count > 0 {
            vec![Diagnostic::QueryComplexityError {
                table: None,
                location: Location::unknown(),
                message: "subqueries are not permitted by this schema".to_string(),
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

    fn schema(allow: bool) -> SecuritySchema {
        SecuritySchemaBuilder::new()
            .table("users", TableSchema::new())
            .table("orders", TableSchema::new())
            .allow_subqueries(allow)
            .build()
            .unwrap()
    }

    #[test]
    fn allows_subquery_when_permitted() {
        let stmt = parse("SELECT id FROM users WHERE id IN (SELECT user_id FROM orders)").unwrap();
        let resolved = resolve(&stmt, &schema(true)).unwrap();
        assert!(SubqueryValidator.check(&resolved, &schema(true)).is_empty());
    }

    #[test]
    fn denies_subquery_when_forbidden() {
        let stmt = parse("SELECT id FROM users WHERE EXISTS (SELECT 1 FROM orders)").unwrap();
        let resolved = resolve(&stmt, &schema(false)).unwrap();
        assert_eq!(SubqueryValidator.check(&resolved, &schema(false)).len(), 1);
    }
}
