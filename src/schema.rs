//! Declarative security schema: the policy a query is validated against.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Whether a column may be read, written, or must never appear in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
    Denied,
}

/// A join kind a table is willing to participate in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// An aggregation function a column may be wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// A statement kind `allowed_operations` can name (spec.md §3:
/// `allowed_operations: set<string>`, refining `access` where stricter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

/// Policy for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSchema {
    pub access: AccessLevel,
    /// Explicit subset of `{SELECT, INSERT, UPDATE, DELETE}` this column
    /// may be referenced under. Empty means "no additional restriction
    /// beyond `access`" (spec.md §3) — every statement kind `access`
    /// already permits is allowed.
    #[serde(default)]
    pub allowed_operations: HashSet<Operation>,
    /// Aggregation functions this column may appear under. Empty means any
    /// aggregation is permitted provided the column itself is `Read`.
    #[serde(default)]
    pub allowed_aggregations: HashSet<AggregationType>,
}

impl ColumnSchema {
    pub fn new(access: AccessLevel) -> Self {
        Self { access, allowed_operations: HashSet::new(), allowed_aggregations: HashSet::new() }
    }

    /// Whether `op` is permitted under `allowed_operations`. An empty set
    /// imposes no extra restriction beyond `access` (spec.md §3).
    pub fn permits_operation(&self, op: Operation) -> bool {
        self.allowed_operations.is_empty() || self.allowed_operations.contains(&op)
    }
}

/// Policy for a single table. Table-level access is purely a function of
/// whether the table is declared (or covered by `default_table_schema`) —
/// there is no table-level `access` field (spec.md §3): gating reads vs.
/// writes happens per column via `ColumnSchema::access`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSchema {
    #[serde(default)]
    pub columns: HashMap<String, ColumnSchema>,
    #[serde(default)]
    pub default_column_schema: Option<ColumnSchema>,
    /// Tables (lower-cased) this table may be joined to, and under which
    /// join kinds.
    #[serde(default)]
    pub allowed_joins: HashMap<String, HashSet<JoinType>>,
    /// Join kinds permitted against a partner not listed in
    /// `allowed_joins`. `None` means "deny" (spec.md §3).
    #[serde(default)]
    pub default_allowed_join: Option<HashSet<JoinType>>,
    /// If true, any top-level `SELECT`/`UPDATE`/`DELETE` whose `FROM`
    /// contains this table must carry a non-trivial `WHERE` (spec.md §3).
    #[serde(default)]
    pub require_where_clause: bool,
    /// Soft advisory cap: enforced only against an explicit `LIMIT`
    /// (spec.md §3, §9 Open Question c).
    #[serde(default)]
    pub max_rows: Option<i64>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self {
            columns: HashMap::new(),
            default_column_schema: None,
            allowed_joins: HashMap::new(),
            default_allowed_join: None,
            require_where_clause: false,
            max_rows: None,
        }
    }

    /// Resolve the effective policy for a column, applying the
    /// explicit-entry-first, `Denied`-wins-over-default rule (DESIGN.md,
    /// Open Question §9b).
    pub fn column_policy(&self, column: &str) -> Option<&ColumnSchema> {
        if let Some(col) = self.columns.get(column) {
            return Some(col);
        }
        self.default_column_schema.as_ref()
    }

    /// Whether a join to `other` under `kind` is permitted from this
    /// table's side, honoring the explicit map first and
    /// `default_allowed_join` as the fallback (spec.md §3/§4.4).
    pub fn permits_join(&self, other: &str, kind: JoinType) -> bool {
        if let Some(kinds) = self.allowed_joins.get(other) {
            return kinds.contains(&kind);
        }
        self.default_allowed_join.as_ref().is_some_and(|kinds| kinds.contains(&kind))
    }
}

/// The top-level security policy a query is validated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecuritySchema {
    pub tables: HashMap<String, TableSchema>,
    #[serde(default)]
    pub default_table_schema: Option<TableSchema>,
    #[serde(default)]
    pub max_joins: Option<usize>,
    #[serde(default = "default_allow_subqueries")]
    pub allow_subqueries: bool,
    #[serde(default)]
    pub max_query_length: Option<usize>,
    #[serde(default = "default_injection_protection")]
    pub sql_injection_protection: bool,
    #[serde(default)]
    pub forbidden_keywords: HashSet<String>,
}

fn default_allow_subqueries() -> bool {
    true
}

fn default_injection_protection() -> bool {
    true
}

impl SecuritySchema {
    /// Looks up the policy for a table, falling back to
    /// `default_table_schema` when no explicit entry exists.
    pub fn table_policy(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table).or(self.default_table_schema.as_ref())
    }
}

/// Fallible, validating constructor for [`SecuritySchema`], mirroring the
/// host's `AppConfig::load` convention of rejecting malformed policy at
/// construction rather than scattering checks through the engine.
#[derive(Debug, Default)]
pub struct SecuritySchemaBuilder {
    tables: HashMap<String, TableSchema>,
    default_table_schema: Option<TableSchema>,
    max_joins: Option<usize>,
    allow_subqueries: bool,
    max_query_length: Option<usize>,
    sql_injection_protection: bool,
    forbidden_keywords: HashSet<String>,
}

impl SecuritySchemaBuilder {
    pub fn new() -> Self {
        Self {
            allow_subqueries: true,
            sql_injection_protection: true,
            ..Default::default()
        }
    }

    pub fn table(mut self, name: impl Into<String>, schema: TableSchema) -> Self {
        self.tables.insert(normalize(&name.into()), schema);
        self
    }

    pub fn default_table_schema(mut self, schema: TableSchema) -> Self {
        self.default_table_schema = Some(schema);
        self
    }

    pub fn max_joins(mut self, n: usize) -> Self {
        self.max_joins = Some(n);
        self
    }

    pub fn allow_subqueries(mut self, allow: bool) -> Self {
        self.allow_subqueries = allow;
        self
    }

    pub fn max_query_length(mut self, n: usize) -> Self {
        self.max_query_length = Some(n);
        self
    }

    pub fn sql_injection_protection(mut self, enabled: bool) -> Self {
        self.sql_injection_protection = enabled;
        self
    }

    pub fn forbidden_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.forbidden_keywords.insert(keyword.into().to_uppercase());
        self
    }

    /// Marks an already-registered table as requiring a `WHERE` clause on
    /// any top-level statement that touches it (spec.md §3
    /// `require_where_clause`).
    pub fn require_where(mut self, table: impl Into<String>) -> Self {
        let name = normalize(&table.into());
        self.tables.entry(name).or_insert_with(|| TableSchema::new()).require_where_clause = true;
        self
    }

    /// Sets the advisory `max_rows` bound on an already-registered table
    /// (spec.md §3 `max_rows`).
    pub fn max_row_limit(mut self, table: impl Into<String>, n: i64) -> Self {
        let name = normalize(&table.into());
        self.tables.entry(name).or_insert_with(|| TableSchema::new()).max_rows = Some(n);
        self
    }

    /// Validates construction-time consistency (spec.md §6: "construction
    /// is the only time schema consistency is checked") and produces an
    /// immutable [`SecuritySchema`].
    pub fn build(self) -> Result<SecuritySchema, SchemaError> {
        for (name, table) in &self.tables {
            for (column, col_schema) in &table.columns {
                if col_schema.access == AccessLevel::Denied
                    && !col_schema.allowed_aggregations.is_empty()
                {
                    return Err(SchemaError::InconsistentColumn {
                        table: name.clone(),
                        column: column.clone(),
                        reason: "a denied column cannot declare allowed aggregations".into(),
                    });
                }
            }
            for joined in table.allowed_joins.keys() {
                if !self.tables.contains_key(joined) && self.default_table_schema.is_none() {
                    return Err(SchemaError::UnknownJoinTarget {
                        table: name.clone(),
                        target: joined.clone(),
                    });
                }
            }
        }

        Ok(SecuritySchema {
            tables: self.tables,
            default_table_schema: self.default_table_schema,
            max_joins: self.max_joins,
            allow_subqueries: self.allow_subqueries,
            max_query_length: self.max_query_length,
            sql_injection_protection: self.sql_injection_protection,
            forbidden_keywords: self.forbidden_keywords,
        })
    }
}

/// Case-insensitive identifier normalization (Open Question §9a): every
/// identifier entering the schema or the AST is lower-cased.
pub fn normalize(ident: &str) -> String {
    ident.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_column_with_aggregations_is_rejected() {
        let mut col = ColumnSchema::new(AccessLevel::Denied);
        col.allowed_aggregations.insert(AggregationType::Sum);
        let mut table = TableSchema::new();
        table.columns.insert("email".into(), col);

        let result = SecuritySchemaBuilder::new().table("users", table).build();
        assert!(matches!(result, Err(SchemaError::InconsistentColumn { .. })));
    }

    #[test]
    fn join_target_must_exist() {
        let mut users = TableSchema::new();
        users.allowed_joins.insert("ghost".into(), HashSet::from([JoinType::Inner]));

        let result = SecuritySchemaBuilder::new().table("users", users).build();
        assert!(matches!(result, Err(SchemaError::UnknownJoinTarget { .. })));
    }

    #[test]
    fn denied_wins_over_default_column_schema() {
        let mut table = TableSchema::new();
        table.default_column_schema = Some(ColumnSchema::new(AccessLevel::Read));
        table.columns.insert("email".into(), ColumnSchema::new(AccessLevel::Denied));

        let policy = table.column_policy("email").unwrap();
        assert_eq!(policy.access, AccessLevel::Denied);
    }

    #[test]
    fn table_names_are_case_normalized_on_insert() {
        let schema = SecuritySchemaBuilder::new()
            .table("Users", TableSchema::new())
            .build()
            .unwrap();
        assert!(schema.table_policy("users").is_some());
    }
}
