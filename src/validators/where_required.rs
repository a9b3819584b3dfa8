use super::Validator;
use crate::error::{Diagnostic, Location};
use crate::resolver::ResolvedQuery;
use crate::schema::SecuritySchema;

/// A table whose policy sets `require_where_clause` must have an explicit
/// WHERE clause on the top-level statement — an unconditional `SELECT *
/// FROM orders` or `DELETE FROM orders` is exactly what this guards
/// against (spec.md §3/§4.4).
pub struct WhereRequiredValidator;

impl Validator for WhereRequiredValidator {
    fn name(&self) -> &'static str {
        "where_required"
    }

    fn check(&self, query: &ResolvedQuery, schema: &SecuritySchema) -> Vec<Diagnostic> {
        if query.root_has_where {
            return Vec::new();
        }

        query
            .root_tables
            .iter()
            .filter(|t| schema.table_policy(t).is_some_and(|p| p.require_where_clause))
            .map(|table| Diagnostic::QueryComplexityError {
                table: Some(table.clone()),
                location: Location::unknown(),
                message: format!("table '{table}' requires a WHERE clause"),
            })
            .collect()
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
            .require_where("orders")
            .build()
            .unwrap()
    }

    #[test]
    fn denies_missing_where() {
        let stmt = parse("SELECT * FROM orders").unwrap();
        let resolved = resolve(&stmt, &schema()).unwrap();
        assert_eq!(WhereRequiredValidator.check(&resolved, &schema()).len(), 1);
    }

    #[test]
    fn allows_present_where() {
        let stmt = parse("SELECT * FROM orders WHERE id = 1").unwrap();
        let resolved = resolve(&stmt, &schema()).unwrap();
        assert!(WhereRequiredValidator.check(&resolved, &schema()).is_empty());
    }
}
