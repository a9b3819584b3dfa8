use super::{disambiguate, Validator};
use crate::error::{Diagnostic, Location};
use crate::resolver::ResolvedQuery;
use crate::schema::{AccessLevel, AggregationType, ColumnSchema, SecuritySchema};

/// A column wrapped in an aggregate function must be `Read`-able (checked
/// by `ColumnAccessValidator`) and, when the column declares a non-empty
/// `allowed_aggregations` set, the specific aggregation used must be in
/// that set. `COUNT(*)` is checked separately: it is permitted iff every
/// table the enclosing scope's `FROM` touches allows `COUNT` on at least
/// one readable column (spec.md §4.4).
pub struct AggregationValidator;

fn table_allows_count(schema: &SecuritySchema, table: &str) -> bool {
    let Some(policy) = schema.table_policy(table) else { return false };
    let explicit = policy.columns.values().any(column_permits_count);
    let fallback = policy.default_column_schema.as_ref().is_some_and(column_permits_count);
    explicit || fallback
}

fn column_permits_count(column: &ColumnSchema) -> bool {
    column.access != AccessLevel::Denied
        && (column.allowed_aggregations.is_empty() || column.allowed_aggregations.contains(&AggregationType::Count))
}

impl Validator for AggregationValidator {
    fn name(&self) -> &'static str {
        "aggregation"
    }

    fn check(&self, query: &ResolvedQuery, schema: &SecuritySchema) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for col_ref in &query.column_refs {
            let Some(agg) = col_ref.aggregation else { continue };
            let Ok(table) = disambiguate(schema, &col_ref.candidates, &col_ref.column) else { continue };
            let Some(policy) = schema.table_policy(table).and_then(|t| t.column_policy(&col_ref.column)) else {
                continue;
            };
            if !policy.allowed_aggregations.is_empty() && !policy.allowed_aggregations.contains(&agg) {
                diagnostics.push(Diagnostic::QueryComplexityError {
                    table: Some(table.to_string()),
                    location: col_ref.location,
                    message: format!(
                        "aggregation {:?} is not permitted on column '{}.{}'",
                        agg, table, col_ref.column
                    ),
                });
            }
        }

        for wildcard in &query.aggregate_wildcards {
            if wildcard.aggregation != AggregationType::Count {
                continue;
            }
            let scope = &query.scopes[wildcard.scope];
            for (_, table) in &scope.tables {
                if table.starts_with("derived:") {
                    continue;
                }
                if !table_allows_count(schema, table) {
                    diagnostics.push(Diagnostic::ColumnAccessError {
                        table: table.clone(),
                        column: "*".to_string(),
                        location: wildcard.location,
                        message: format!("table '{table}' does not permit COUNT(*): no readable column allows COUNT"),
                    });
                }
            }
        }

        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::resolver::resolve;
    use crate::schema::{AccessLevel, AggregationType, ColumnSchema, SecuritySchemaBuilder, TableSchema};
    use std::collections::HashSet;

    fn schema() -> SecuritySchema {
        let mut amount = ColumnSchema::new(AccessLevel::Read);
        amount.allowed_aggregations = HashSet::from([AggregationType::Sum, AggregationType::Avg]);
        let mut orders = TableSchema::new();
        orders.columns.insert("amount".into(), amount);
        SecuritySchemaBuilder::new().table("orders", orders).build().unwrap()
    }

    fn check(sql: &str) -> Vec<Diagnostic> {
        let stmt = parse(sql).unwrap();
        let resolved = resolve(&stmt, &schema()).unwrap();
        AggregationValidator.check(&resolved, &schema())
    }

    #[test]
    fn allows_permitted_aggregation() {
        assert!(check("SELECT SUM(amount) FROM orders").is_empty());
    }

    #[test]
    fn denies_unpermitted_aggregation() {
        let diags = check("SELECT COUNT(amount) FROM orders");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn count_star_denied_when_no_column_allows_count() {
        let diags = check("SELECT COUNT(*) FROM orders");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn count_star_allowed_when_a_column_allows_count() {
        let mut id = ColumnSchema::new(AccessLevel::Read);
        id.allowed_aggregations = HashSet::from([AggregationType::Count]);
        let mut orders = TableSchema::new();
        orders.columns.insert("id".into(), id);
        let schema = SecuritySchemaBuilder::new().table("orders", orders).build().unwrap();

        let stmt = parse("SELECT COUNT(*) FROM orders").unwrap();
        let resolved = resolve(&stmt, &schema).unwrap();
        assert!(AggregationValidator.check(&resolved, &schema).is_empty());
    }
}
