//! Canonical, tagged-variant AST. This is the only tree the resolver and
//! validators ever see; the parser adapter (`parser` module) is the sole
//! translator between `sqlparser`'s types and these.

use crate::error::Location;

#[derive(Debug, Clone)]
pub enum Statement {
    Select(SelectQuery),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub ctes: Vec<Cte>,
    pub body: SetExpr,
    pub order_by: Vec<Expr>,
    pub limit: Option<i64>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct Cte {
    pub alias: String,
    pub query: Box<SelectQuery>,
}

/// A `SELECT`, or a set operation (`UNION`/`INTERSECT`/`EXCEPT`) combining
/// two arms. Each arm is validated as its own scope (SPEC_FULL.md §4.2).
#[derive(Debug, Clone)]
pub enum SetExpr {
    Select(Box<Select>),
    SetOperation { left: Box<SetExpr>, right: Box<SetExpr> },
    Query(Box<SelectQuery>),
}

#[derive(Debug, Clone)]
pub struct Select {
    pub projection: Vec<SelectItem>,
    pub from: Vec<TableWithJoins>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum SelectItem {
    /// A plain expression, optionally aliased.
    Expr { expr: Expr, alias: Option<String> },
    /// `*`
    Wildcard,
    /// `table.*`
    QualifiedWildcard(String),
}

#[derive(Debug, Clone)]
pub struct TableWithJoins {
    pub relation: TableFactor,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone)]
pub enum TableFactor {
    Table { name: String, alias: Option<String> },
    Derived { query: Box<SelectQuery>, alias: Option<String> },
    NestedJoin(Box<TableWithJoins>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub relation: TableFactor,
    pub kind: JoinKind,
    pub on: Option<Expr>,
}

/// Where in a query an expression occurs, used by validators (e.g.
/// `AggregationValidator` only inspects `AggregateArg`, `ColumnAccess`
/// inspects everything).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprRole {
    Projection,
    Predicate,
    GroupBy,
    OrderBy,
    AggregateArg,
    AssignTarget,
}

#[derive(Debug, Clone)]
pub enum Expr {
    /// Unqualified identifier, e.g. `id`.
    Identifier(String),
    /// `table.column` or `alias.column`.
    Compound(String, String),
    Function { name: String, args: Vec<Expr> },
    BinaryOp { left: Box<Expr>, right: Box<Expr> },
    UnaryOp { expr: Box<Expr> },
    Subquery(Box<SelectQuery>),
    Literal,
    /// `*` in function-argument position, e.g. `COUNT(*)`. Distinct from
    /// `SelectItem::Wildcard`, which is projection-position `*`.
    Wildcard,
    /// Anything this crate does not need to inspect structurally (casts,
    /// case expressions, etc.) but still needs to recurse into for nested
    /// subqueries and column references.
    Other(Vec<Expr>),
}

/// The data an `INSERT` supplies: either literal rows (`VALUES (...), (...)`)
/// or a nested `SELECT` whose projected columns become the inserted row —
/// the shape `INSERT INTO t (c) SELECT secret FROM other` takes.
#[derive(Debug, Clone)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(Box<SelectQuery>),
}

#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub source: Option<InsertSource>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct UpdateStatement {
    pub table: TableWithJoins,
    pub assign_targets: Vec<String>,
    pub selection: Option<Expr>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct DeleteStatement {
    pub from: Vec<TableWithJoins>,
    pub selection: Option<Expr>,
    pub location: Location,
}
