use std::collections::HashSet;

use super::Validator;
use crate::error::{Diagnostic, Location};
use crate::resolver::ResolvedQuery;
use crate::schema::SecuritySchema;

/// Every base table a query touches must be declared (have an entry in
/// `schema.tables`) or be covered by `default_table_schema` — a table with
/// neither is implicitly denied (spec.md §3: "table name absent ⇒ table
/// denied"). There is no table-level access tier beyond presence; read vs.
/// write permission is a per-column matter (`ColumnAccessValidator`).
pub struct TableAccessValidator;

impl Validator for TableAccessValidator {
    fn name(&self) -> &'static str {
        "table_access"
    }

    fn check(&self, query: &ResolvedQuery, schema: &SecuritySchema) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut seen = HashSet::new();

        for (_, table) in &query.table_refs {
            if table.starts_with("derived:") || !seen.insert(table.clone()) {
                continue;
            }

            if schema.table_policy(table).is_none() {
                diagnostics.push(Diagnostic::TableAccessError {
                    table: table.clone(),
                    location: Location::unknown(),
                    message: format!("table '{table}' is not covered by the security schema"),
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
    use crate::schema::{SecuritySchemaBuilder, TableSchema};

    fn schema() -> SecuritySchema {
        SecuritySchemaBuilder::new().table("users", TableSchema::new()).build().unwrap()
    }

    fn check(sql: &str) -> Vec<Diagnostic> {
        let stmt = parse(sql).unwrap();
        let resolved = resolve(&stmt, &schema()).unwrap();
        TableAccessValidator.check(&resolved, &schema())
    }

    #[test]
    fn allows_read_on_readable_table() {
        assert!(check("SELECT id FROM users").is_empty());
    }

    #[test]
    fn allows_write_on_declared_table() {
        assert!(check("DELETE FROM users").is_empty());
    }

    #[test]
    fn denies_unknown_table() {
        let diags = check("SELECT id FROM ghost");
        assert_eq!(diags.len(), 1);
    }
}
