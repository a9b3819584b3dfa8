//! Resolver (SPEC_FULL.md §4.3): walks the canonical AST to build per-scope
//! symbol tables (alias -> base table), annotate every column reference
//! with its resolved binding (or a candidate set when more than one table
//! is visible and the column is unqualified), and flatten joins and
//! subquery structure into the shape the rule engine consumes.
//!
//! Scopes nest: a derived table or scalar subquery introduces a child scope
//! whose parent is the enclosing scope. The cross-scope rule lets a nested
//! scope see its ancestors' tables (correlated subqueries); the reverse
//! never holds.

use crate::ast::*;
use crate::error::{Diagnostic, Location};
use crate::schema::{AccessLevel, AggregationType, SecuritySchema};

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    /// (alias, base_table) pairs, in FROM order. An unaliased table is
    /// bound under its own name.
    pub tables: Vec<(String, String)>,
}

impl Scope {
    fn lookup_alias(&self, alias: &str) -> Option<&str> {
        self.tables.iter().find(|(a, _)| a == alias).map(|(_, t)| t.as_str())
    }
}

/// A resolved column reference: either bound to exactly one base table, or
/// left with a candidate set for the rule engine to disambiguate using
/// schema knowledge (SPEC_FULL.md §9, "ambiguous/unresolved column
/// detection").
#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub scope: ScopeId,
    pub role: ExprRole,
    pub column: String,
    pub candidates: Vec<String>,
    pub location: Location,
    /// Set when this reference is (transitively) an argument of an
    /// aggregate function call, e.g. the `amount` in `SUM(amount)`.
    pub aggregation: Option<AggregationType>,
}

fn aggregation_type(name: &str) -> Option<AggregationType> {
    match name {
        "count" => Some(AggregationType::Count),
        "sum" => Some(AggregationType::Sum),
        "avg" => Some(AggregationType::Avg),
        "min" => Some(AggregationType::Min),
        "max" => Some(AggregationType::Max),
        _ => None,
    }
}

/// A `COUNT(*)`-shaped call: an aggregate applied to `*` rather than a
/// column, checked separately from [`ColumnRef`]-based aggregation
/// (spec.md §4.4 Aggregation: "`COUNT(*)` is permitted iff the table(s) in
/// `FROM` each allow `COUNT` on at least one readable column").
#[derive(Debug, Clone)]
pub struct AggregateWildcardRef {
    pub scope: ScopeId,
    pub aggregation: AggregationType,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct JoinRef {
    pub scope: ScopeId,
    pub left_table: String,
    pub right_table: String,
    pub kind: JoinKind,
}

#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub statement_kind: StatementKind,
    pub scopes: Vec<Scope>,
    pub root_scope: ScopeId,
    pub column_refs: Vec<ColumnRef>,
    pub aggregate_wildcards: Vec<AggregateWildcardRef>,
    /// Every (scope, base_table) pair touched anywhere in the query.
    pub table_refs: Vec<(ScopeId, String)>,
    pub joins: Vec<JoinRef>,
    pub subquery_count: usize,
    pub root_has_where: bool,
    pub root_tables: Vec<String>,
    pub limit: Option<i64>,
}

struct Resolver<'a> {
    schema: &'a SecuritySchema,
    scopes: Vec<Scope>,
    column_refs: Vec<ColumnRef>,
    aggregate_wildcards: Vec<AggregateWildcardRef>,
    table_refs: Vec<(ScopeId, String)>,
    joins: Vec<JoinRef>,
    subquery_count: usize,
}

impl<'a> Resolver<'a> {
    fn new(schema: &'a SecuritySchema) -> Self {
        Self {
            schema,
            scopes: Vec::new(),
            column_refs: Vec::new(),
            aggregate_wildcards: Vec::new(),
            table_refs: Vec::new(),
            joins: Vec::new(),
            subquery_count: 0,
        }
    }

    /// Expands a `*`/`table.*` projection into one `ColumnRef` per
    /// schema-declared column on `table` that is not `Denied` (spec.md
    /// §4.3 point 4). Columns only covered by `default_column_schema`
    /// aren't enumerable and are left unexpanded; an undeclared table is
    /// left to `TableAccessValidator` to reject.
    fn push_wildcard_columns(&mut self, scope: ScopeId, role: ExprRole, table: &str) {
        let Some(policy) = self.schema.table_policy(table) else {
            return;
        };
        for (column, col_schema) in &policy.columns {
            if col_schema.access == AccessLevel::Denied {
                continue;
            }
            self.column_refs.push(ColumnRef {
                scope,
                role,
                column: column.clone(),
                candidates: vec![table.to_string()],
                location: Location::unknown(),
                aggregation: None,
            });
        }
    }

    fn push_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope { id, parent, tables: Vec::new() });
        id
    }

    fn visible_tables(&self, scope: ScopeId) -> Vec<(String, String)> {
        let mut out = self.scopes[scope].tables.clone();
        let mut cur = self.scopes[scope].parent;
        while let Some(id) = cur {
            out.extend(self.scopes[id].tables.clone());
            cur = self.scopes[id].parent;
        }
        out
    }

    fn resolve_alias(&self, scope: ScopeId, alias: &str) -> Option<String> {
        if let Some(t) = self.scopes[scope].lookup_alias(alias) {
            return Some(t.to_string());
        }
        let mut cur = self.scopes[scope].parent;
        while let Some(id) = cur {
            if let Some(t) = self.scopes[id].lookup_alias(alias) {
                return Some(t.to_string());
            }
            cur = self.scopes[id].parent;
        }
        None
    }

    fn bind_table_factor(&mut self, scope: ScopeId, factor: &TableFactor) -> Result<String, Diagnostic> {
        match factor {
            TableFactor::Table { name, alias } => {
                let binding = alias.clone().unwrap_or_else(|| name.clone());
                self.scopes[scope].tables.push((binding, name.clone()));
                self.table_refs.push((scope, name.clone()));
                Ok(name.clone())
            }
            TableFactor::Derived { query, alias } => {
                self.subquery_count += 1;
                let child = self.push_scope(Some(scope));
                self.resolve_select_query(child, query)?;
                let representative = format!("derived:{}", alias.clone().unwrap_or_else(|| child.to_string()));
                if let Some(a) = alias {
                    self.scopes[scope].tables.push((a.clone(), representative.clone()));
                }
                Ok(representative)
            }
            TableFactor::NestedJoin(twj) => self.bind_table_with_joins(scope, twj),
        }
    }

    fn bind_table_with_joins(&mut self, scope: ScopeId, twj: &TableWithJoins) -> Result<String, Diagnostic> {
        let mut left = self.bind_table_factor(scope, &twj.relation)?;
        for join in &twj.joins {
            let right = self.bind_table_factor(scope, &join.relation)?;
            self.joins.push(JoinRef {
                scope,
                left_table: left.clone(),
                right_table: right.clone(),
                kind: join.kind,
            });
            if let Some(on) = &join.on {
                self.walk_expr(scope, ExprRole::Predicate, None, on)?;
            }
            left = right;
        }
        Ok(left)
    }

    fn resolve_select_query(&mut self, scope: ScopeId, query: &SelectQuery) -> Result<(), Diagnostic> {
        for cte in &query.ctes {
            self.subquery_count += 1;
            let child = self.push_scope(Some(scope));
            self.resolve_select_query(child, &cte.query)?;
            self.scopes[scope].tables.push((cte.alias.clone(), format!("derived:{}", cte.alias)));
        }
        self.resolve_set_expr(scope, &query.body)?;
        for expr in &query.order_by {
            self.walk_expr(scope, ExprRole::OrderBy, None, expr)?;
        }
        Ok(())
    }

    fn resolve_set_expr(&mut self, scope: ScopeId, expr: &SetExpr) -> Result<(), Diagnostic> {
        match expr {
            SetExpr::Select(select) => self.resolve_select(scope, select),
            SetExpr::Query(query) => self.resolve_select_query(scope, query),
            SetExpr::SetOperation { left, right } => {
                let left_scope = self.push_scope(Some(scope));
                self.resolve_set_expr(left_scope, left)?;
                let right_scope = self.push_scope(Some(scope));
                self.resolve_set_expr(right_scope, right)
            }
        }
    }

    fn resolve_select(&mut self, scope: ScopeId, select: &Select) -> Result<(), Diagnostic> {
        for twj in &select.from {
            self.bind_table_with_joins(scope, twj)?;
        }
        for item in &select.projection {
            match item {
                SelectItem::Expr { expr, .. } => self.walk_expr(scope, ExprRole::Projection, None, expr)?,
                SelectItem::Wildcard => {
                    for (_, table) in self.scopes[scope].tables.clone() {
                        self.push_wildcard_columns(scope, ExprRole::Projection, &table);
                    }
                }
                SelectItem::QualifiedWildcard(alias) => {
                    if let Some(table) = self.resolve_alias(scope, alias) {
                        self.push_wildcard_columns(scope, ExprRole::Projection, &table);
                    }
                }
            }
        }
        if let Some(where_expr) = &select.selection {
            self.walk_expr(scope, ExprRole::Predicate, None, where_expr)?;
        }
        for expr in &select.group_by {
            self.walk_expr(scope, ExprRole::GroupBy, None, expr)?;
        }
        if let Some(having) = &select.having {
            self.walk_expr(scope, ExprRole::Predicate, None, having)?;
        }
        Ok(())
    }

    fn walk_expr(
        &mut self,
        scope: ScopeId,
        role: ExprRole,
        agg: Option<AggregationType>,
        expr: &Expr,
    ) -> Result<(), Diagnostic> {
        match expr {
            Expr::Identifier(column) => {
                // Candidates span the whole scope chain, not just this
                // scope's own tables, so an unqualified reference inside a
                // correlated subquery can still bind to an outer-scope
                // column (spec.md §4.3 point 2).
                let candidates: Vec<String> =
                    self.visible_tables(scope).into_iter().map(|(_, t)| t).collect();
                self.column_refs.push(ColumnRef {
                    scope,
                    role,
                    column: column.clone(),
                    candidates,
                    location: Location::unknown(),
                    aggregation: agg,
                });
                Ok(())
            }
            Expr::Compound(alias, column) => {
                let table = self.resolve_alias(scope, alias).ok_or_else(|| Diagnostic::QuerySyntaxError {
                    location: Location::unknown(),
                    message: format!("unknown table or alias reference: {alias}"),
                })?;
                self.column_refs.push(ColumnRef {
                    scope,
                    role,
                    column: column.clone(),
                    candidates: vec![table],
                    location: Location::unknown(),
                    aggregation: agg,
                });
                Ok(())
            }
            Expr::Function { name, args } => {
                let this_agg = aggregation_type(name);
                if let (Some(agg_type), [Expr::Wildcard]) = (this_agg, args.as_slice()) {
                    self.aggregate_wildcards.push(AggregateWildcardRef {
                        scope,
                        aggregation: agg_type,
                        location: Location::unknown(),
                    });
                    return Ok(());
                }
                let arg_role = if matches!(role, ExprRole::Projection | ExprRole::GroupBy | ExprRole::OrderBy)
                    && this_agg.is_some()
                {
                    ExprRole::AggregateArg
                } else {
                    role
                };
                let next_agg = this_agg.or(agg);
                for arg in args {
                    self.walk_expr(scope, arg_role, next_agg, arg)?;
                }
                Ok(())
            }
            Expr::BinaryOp { left, right } => {
                self.walk_expr(scope, role, agg, left)?;
                self.walk_expr(scope, role, agg, right)
            }
            Expr::UnaryOp { expr } => self.walk_expr(scope, role, agg, expr),
            Expr::Other(exprs) => {
                for e in exprs {
                    self.walk_expr(scope, role, agg, e)?;
                }
                Ok(())
            }
            Expr::Subquery(query) => {
                self.subquery_count += 1;
                let child = self.push_scope(Some(scope));
                self.resolve_select_query(child, query)
            }
            Expr::Literal | Expr::Wildcard => Ok(()),
        }
    }
}

/// Runs resolution over a parsed statement, producing the flattened,
/// schema-independent view the rule engine operates on.
pub fn resolve(statement: &Statement, schema: &SecuritySchema) -> Result<ResolvedQuery, Diagnostic> {
    let mut r = Resolver::new(schema);
    let root = r.push_scope(None);

    let (statement_kind, root_has_where, root_tables, limit) = match statement {
        Statement::Select(query) => {
            r.resolve_select_query(root, query)?;
            let has_where = select_query_has_where(query);
            (StatementKind::Select, has_where, r.scopes[root].tables.iter().map(|(_, t)| t.clone()).collect(), query.limit)
        }
        Statement::Insert(insert) => {
            r.table_refs.push((root, insert.table.clone()));
            r.scopes[root].tables.push((insert.table.clone(), insert.table.clone()));
            for (i, column) in insert.columns.iter().enumerate() {
                r.column_refs.push(ColumnRef {
                    scope: root,
                    role: ExprRole::AssignTarget,
                    column: column.clone(),
                    candidates: vec![insert.table.clone()],
                    location: Location::new(i, 0),
                    aggregation: None,
                });
            }
            match &insert.source {
                Some(InsertSource::Values(rows)) => {
                    for row in rows {
                        for expr in row {
                            r.walk_expr(root, ExprRole::Projection, None, expr)?;
                        }
                    }
                }
                Some(InsertSource::Query(query)) => {
                    let child = r.push_scope(Some(root));
                    r.resolve_select_query(child, query)?;
                }
                None => {}
            }
            (StatementKind::Insert, true, vec![insert.table.clone()], None)
        }
        Statement::Update(update) => {
            let table = r.bind_table_with_joins(root, &update.table)?;
            for column in &update.assign_targets {
                r.column_refs.push(ColumnRef {
                    scope: root,
                    role: ExprRole::AssignTarget,
                    column: column.clone(),
                    candidates: vec![table.clone()],
                    location: Location::unknown(),
                    aggregation: None,
                });
            }
            let has_where = update.selection.is_some();
            if let Some(selection) = &update.selection {
                r.walk_expr(root, ExprRole::Predicate, None, selection)?;
            }
            (StatementKind::Update, has_where, vec![table], None)
        }
        Statement::Delete(delete) => {
            let mut tables = Vec::new();
            for twj in &delete.from {
                tables.push(r.bind_table_with_joins(root, twj)?);
            }
            let has_where = delete.selection.is_some();
            if let Some(selection) = &delete.selection {
                r.walk_expr(root, ExprRole::Predicate, None, selection)?;
            }
            (StatementKind::Delete, has_where, tables, None)
        }
    };

    Ok(ResolvedQuery {
        statement_kind,
        scopes: r.scopes,
        root_scope: root,
        column_refs: r.column_refs,
        aggregate_wildcards: r.aggregate_wildcards,
        table_refs: r.table_refs,
        joins: r.joins,
        subquery_count: r.subquery_count,
        root_has_where,
        root_tables,
        limit,
    })
}

fn select_query_has_where(query: &SelectQuery) -> bool {
    match &query.body {
        SetExpr::Select(select) => select.selection.is_some(),
        SetExpr::Query(inner) => select_query_has_where(inner),
        SetExpr::SetOperation { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::schema::{AccessLevel, ColumnSchema, SecuritySchemaBuilder, TableSchema};

    fn schema() -> SecuritySchema {
        let mut users = TableSchema::new();
        users.columns.insert("id".into(), ColumnSchema::new(AccessLevel::Read));
        users.columns.insert("name".into(), ColumnSchema::new(AccessLevel::Read));
        users.columns.insert("email".into(), ColumnSchema::new(AccessLevel::Denied));
        let mut orders = TableSchema::new();
        orders.columns.insert("id".into(), ColumnSchema::new(AccessLevel::Read));
        orders.columns.insert("user_id".into(), ColumnSchema::new(AccessLevel::Read));
        SecuritySchemaBuilder::new().table("users", users).table("orders", orders).build().unwrap()
    }

    fn resolve_sql(sql: &str) -> ResolvedQuery {
        let stmt = parse(sql).unwrap();
        resolve(&stmt, &schema()).unwrap()
    }

    #[test]
    fn resolves_unqualified_column_in_single_table_scope() {
        let resolved = resolve_sql("SELECT id FROM users WHERE id = 1");
        let col = resolved.column_refs.iter().find(|c| c.column == "id" && c.role == ExprRole::Projection).unwrap();
        assert_eq!(col.candidates, vec!["users".to_string()]);
    }

    #[test]
    fn resolves_qualified_column_via_alias() {
        let resolved = resolve_sql("SELECT u.id FROM users u");
        let col = resolved.column_refs.iter().find(|c| c.column == "id").unwrap();
        assert_eq!(col.candidates, vec!["users".to_string()]);
    }

    #[test]
    fn unknown_alias_is_a_syntax_error() {
        let stmt = parse("SELECT z.id FROM users u").unwrap();
        assert!(resolve(&stmt, &schema()).is_err());
    }

    #[test]
    fn counts_joins() {
        let resolved = resolve_sql("SELECT u.id FROM users u JOIN orders o ON u.id = o.user_id");
        assert_eq!(resolved.joins.len(), 1);
        assert_eq!(resolved.joins[0].kind, JoinKind::Inner);
    }

    #[test]
    fn subquery_sees_outer_scope_table() {
        let resolved = resolve_sql(
            "SELECT id FROM users u WHERE EXISTS (SELECT 1 FROM orders o WHERE o.user_id = u.id)",
        );
        assert_eq!(resolved.subquery_count, 1);
    }

    #[test]
    fn correlated_subquery_resolves_unqualified_outer_column() {
        let resolved = resolve_sql(
            "SELECT id FROM users u WHERE EXISTS (SELECT 1 FROM orders WHERE user_id = id)",
        );
        let col = resolved.column_refs.iter().rfind(|c| c.column == "id").unwrap();
        assert!(col.candidates.contains(&"users".to_string()));
    }

    #[test]
    fn wildcard_expands_to_readable_columns_only() {
        let resolved = resolve_sql("SELECT * FROM users");
        let names: Vec<_> = resolved.column_refs.iter().map(|c| c.column.as_str()).collect();
        assert!(names.contains(&"id"));
        assert!(names.contains(&"name"));
        assert!(!names.contains(&"email"));
    }

    #[test]
    fn qualified_wildcard_expands_only_its_own_table() {
        let resolved = resolve_sql("SELECT u.* FROM users u JOIN orders o ON u.id = o.user_id");
        for col in &resolved.column_refs {
            if col.candidates == vec!["users".to_string()] && col.role == ExprRole::Projection {
                assert!(col.column == "id" || col.column == "name");
            }
        }
    }

    #[test]
    fn insert_select_resolves_source_query_columns() {
        let stmt = parse("INSERT INTO orders (id) SELECT email FROM users").unwrap();
        let resolved = resolve(&stmt, &schema()).unwrap();
        let col = resolved.column_refs.iter().find(|c| c.column == "email").unwrap();
        assert_eq!(col.candidates, vec!["users".to_string()]);
    }
}
