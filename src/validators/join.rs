use super::Validator;
use crate::ast::JoinKind;
use crate::error::{Diagnostic, Location};
use crate::resolver::ResolvedQuery;
use crate::schema::{JoinType, SecuritySchema};

fn to_join_type(kind: JoinKind) -> Option<JoinType> {
    match kind {
        JoinKind::Inner => Some(JoinType::Inner),
        JoinKind::Left => Some(JoinType::Left),
        JoinKind::Right => Some(JoinType::Right),
        JoinKind::Full => Some(JoinType::Full),
        JoinKind::Cross => Some(JoinType::Cross),
    }
}

fn permits(schema: &SecuritySchema, from: &str, to: &str, kind: JoinType) -> bool {
    schema.table_policy(from).is_some_and(|p| p.permits_join(to, kind))
}

/// A join between two base tables must be explicitly permitted, on at
/// least one side, under the join kind actually used (spec.md's
/// `allowed_joins` table-to-table-set map).
pub struct JoinValidator;

impl Validator for JoinValidator {
    fn name(&self) -> &'static str {
        "join"
    }

    fn check(&self, query: &ResolvedQuery, schema: &SecuritySchema) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for join in &query.joins {
            if join.left_table.starts_with("derived:") || join.right_table.starts_with("derived:") {
                continue;
            }
            let Some(kind) = to_join_type(join.kind) else { continue };

            let ok = permits(schema, &join.left_table, &join.right_table, kind)
                || permits(schema, &join.right_table, &join.left_table, kind);

            if !ok {
                diagnostics.push(Diagnostic::JoinViolationError {
                    table: Some(join.right_table.clone()),
                    location: Location::unknown(),
                    message: format!(
                        "join between '{}' and '{}' is not permitted under {:?}",
                        join.left_table, join.right_table, kind
                    ),
                });
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
    use crate::schema::{AccessLevel, SecuritySchemaBuilder, TableSchema};
    use std::collections::HashSet;

    fn schema() -> SecuritySchema {
        let mut users = TableSchema::new();
        users.allowed_joins.insert("orders".into(), HashSet::from([JoinType::Inner]));
        let orders = TableSchema::new();
        SecuritySchemaBuilder::new()
            .table("users", users)
            .table("orders", orders)
            .build()
            .unwrap()
    }

    fn check(sql: &str) -> Vec<Diagnostic> {
        let stmt = parse(sql).unwrap();
        let resolved = resolve(&stmt, &schema()).unwrap();
        JoinValidator.check(&resolved, &schema())
    }

    #[test]
    fn allows_permitted_join() {
        assert!(check("SELECT u.id FROM users u JOIN orders o ON u.id = o.user_id").is_empty());
    }

    #[test]
    fn denies_unpermitted_join_kind() {
        let diags = check("SELECT u.id FROM users u LEFT JOIN orders o ON u.id = o.user_id");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn default_allowed_join_covers_unlisted_partner() {
        let mut users = TableSchema::new();
        users.default_allowed_join = Some(HashSet::from([JoinType::Inner]));
        let logs = TableSchema::new();
        let schema = SecuritySchemaBuilder::new()
            .table("users", users)
            .table("logs", logs)
            .build()
            .unwrap();

        let stmt = parse("SELECT u.id FROM users u JOIN logs l ON u.id = l.user_id").unwrap();
        let resolved = resolve(&stmt, &schema).unwrap();
        assert!(JoinValidator.check(&resolved, &schema).is_empty());
    }

    #[test]
    fn no_default_allowed_join_denies_unlisted_partner() {
        let users = TableSchema::new();
        let logs = TableSchema::new();
        let schema = SecuritySchemaBuilder::new()
            .table("users", users)
            .table("logs", logs)
            .build()
            .unwrap();

        let stmt = parse("SELECT u.id FROM users u JOIN logs l ON u.id = l.user_id").unwrap();
        let resolved = resolve(&stmt, &schema).unwrap();
        assert_eq!(JoinValidator.check(&resolved, &schema).len(), 1);
    }
}
