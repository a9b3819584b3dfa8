//! Parser adapter (SPEC_FULL.md §4.2). This is the *only* module permitted
//! to name `sqlparser::*` types; it wraps `sqlparser::parser::Parser` with
//! `GenericDialect`, the same combination the host's own `SqlExecutor` uses
//! to validate SQLite statements, and converts the result into this
//! crate's own canonical `ast` tree so the resolver and validators never
//! have to track the parser crate's AST shape.

use sqlparser::ast::{
    self as sp, Expr as SpExpr, FunctionArg, FunctionArgExpr, GroupByExpr, Join as SpJoin,
    JoinOperator, SelectItem as SpSelectItem, SetExpr as SpSetExpr, Statement as SpStatement,
    TableFactor as SpTableFactor, TableWithJoins as SpTableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::ast::*;
use crate::error::{Diagnostic, Location};
use crate::schema::normalize;

/// Parses `query` and returns its single canonical statement, or a
/// `QuerySyntaxError` if the text fails to parse or contains anything other
/// than exactly one top-level statement (SPEC_FULL.md §4.2).
pub fn parse(query: &str) -> Result<Statement, Diagnostic> {
    let dialect = GenericDialect {};
    let statements = Parser::parse_sql(&dialect, query).map_err(|e| Diagnostic::QuerySyntaxError {
        location: Location::unknown(),
        message: format!("failed to parse query: {e}"),
    })?;

    match statements.len() {
        0 => Err(Diagnostic::QuerySyntaxError {
            location: Location::unknown(),
            message: "query contained no statements".into(),
        }),
        1 => convert_statement(&statements[0]),
        n => Err(Diagnostic::QuerySyntaxError {
            location: Location::unknown(),
            message: format!("expected exactly one statement, found {n}"),
        }),
    }
}

fn convert_statement(stmt: &SpStatement) -> Result<Statement, Diagnostic> {
    match stmt {
        SpStatement::Query(query) => Ok(Statement::Select(convert_query(query)?)),
        SpStatement::Insert { table_name, columns, source, .. } => Ok(Statement::Insert(InsertStatement {
            table: object_name_to_string(table_name),
            columns: columns.iter().map(|i| normalize(&i.value)).collect(),
            source: source.as_deref().map(convert_insert_source).transpose()?,
            location: Location::unknown(),
        })),
        SpStatement::Update { table, assignments, selection, .. } => {
            Ok(Statement::Update(UpdateStatement {
                table: convert_table_with_joins(table)?,
                assign_targets: assignments
                    .iter()
                    .map(|a| normalize(&a.id.last().map(|i| i.value.clone()).unwrap_or_default()))
                    .collect(),
                selection: selection.as_ref().map(convert_expr).transpose()?,
                location: Location::unknown(),
            }))
        }
        SpStatement::Delete { from, selection, .. } => {
            let tables = match from {
                sp::FromTable::WithFromKeyword(tables) | sp::FromTable::WithoutKeyword(tables) => tables,
            };
            let mut converted = Vec::with_capacity(tables.len());
            for t in tables {
                converted.push(convert_table_with_joins(t)?);
            }
            Ok(Statement::Delete(DeleteStatement {
                from: converted,
                selection: selection.as_ref().map(convert_expr).transpose()?,
                location: Location::unknown(),
            }))
        }
        other => Err(Diagnostic::QuerySyntaxError {
            location: Location::unknown(),
            message: format!("unsupported statement kind: {other}"),
        }),
    }
}

/// Converts the source of an `INSERT`: a literal `VALUES` list is kept as
/// raw row expressions (nothing to resolve against a base table), anything
/// else (a nested `SELECT`, a set operation) is resolved as its own scope so
/// an `INSERT ... SELECT` is checked exactly like any other query.
fn convert_insert_source(query: &sp::Query) -> Result<InsertSource, Diagnostic> {
    match query.body.as_ref() {
        SpSetExpr::Values(values) => {
            let mut rows = Vec::with_capacity(values.rows.len());
            for row in &values.rows {
                let mut converted = Vec::with_capacity(row.len());
                for e in row {
                    converted.push(convert_expr(e)?);
                }
                rows.push(converted);
            }
            Ok(InsertSource::Values(rows))
        }
        _ => Ok(InsertSource::Query(Box::new(convert_query(query)?))),
    }
}

fn convert_query(query: &sp::Query) -> Result<SelectQuery, Diagnostic> {
    let mut ctes = Vec::new();
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            ctes.push(Cte {
                alias: normalize(&cte.alias.name.value),
                query: Box::new(convert_query(&cte.query)?),
            });
        }
    }
    let mut order_by = Vec::new();
    if let Some(ob) = &query.order_by {
        for item in &ob.exprs {
            order_by.push(convert_expr(&item.expr)?);
        }
    }

    let limit = match &query.limit {
        Some(SpExpr::Value(sp::Value::Number(n, _))) => n.parse::<i64>().ok(),
        _ => None,
    };

    Ok(SelectQuery {
        ctes,
        body: convert_set_expr(&query.body)?,
        order_by,
        limit,
        location: Location::unknown(),
    })
}

fn convert_set_expr(expr: &SpSetExpr) -> Result<SetExpr, Diagnostic> {
    match expr {
        SpSetExpr::Select(select) => Ok(SetExpr::Select(Box::new(convert_select(select)?))),
        SpSetExpr::Query(query) => Ok(SetExpr::Query(Box::new(convert_query(query)?))),
        SpSetExpr::SetOperation { left, right, .. } => Ok(SetExpr::SetOperation {
            left: Box::new(convert_set_expr(left)?),
            right: Box::new(convert_set_expr(right)?),
        }),
        other => Err(Diagnostic::QuerySyntaxError {
            location: Location::unknown(),
            message: format!("unsupported query body: {other}"),
        }),
    }
}

fn convert_select(select: &sp::Select) -> Result<Select, Diagnostic> {
    let mut projection = Vec::with_capacity(select.projection.len());
    for item in &select.projection {
        projection.push(convert_select_item(item)?);
    }

    let mut from = Vec::with_capacity(select.from.len());
    for twj in &select.from {
        from.push(convert_table_with_joins(twj)?);
    }

    let group_by = match &select.group_by {
        GroupByExpr::All(_) => Vec::new(),
        GroupByExpr::Expressions(exprs, _) => {
            let mut out = Vec::with_capacity(exprs.len());
            for e in exprs {
                out.push(convert_expr(e)?);
            }
            out
        }
    };

    Ok(Select {
        projection,
        from,
        selection: select.selection.as_ref().map(convert_expr).transpose()?,
        group_by,
        having: select.having.as_ref().map(convert_expr).transpose()?,
    })
}

fn convert_select_item(item: &SpSelectItem) -> Result<SelectItem, Diagnostic> {
    match item {
        SpSelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr { expr: convert_expr(expr)?, alias: None }),
        SpSelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
            expr: convert_expr(expr)?,
            alias: Some(normalize(&alias.value)),
        }),
        SpSelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
        SpSelectItem::QualifiedWildcard(name, _) => Ok(SelectItem::QualifiedWildcard(object_name_to_string(name))),
    }
}

fn convert_table_with_joins(twj: &SpTableWithJoins) -> Result<TableWithJoins, Diagnostic> {
    let mut joins = Vec::with_capacity(twj.joins.len());
    for j in &twj.joins {
        joins.push(convert_join(j)?);
    }
    Ok(TableWithJoins { relation: convert_table_factor(&twj.relation)?, joins })
}

fn convert_table_factor(factor: &SpTableFactor) -> Result<TableFactor, Diagnostic> {
    match factor {
        SpTableFactor::Table { name, alias, .. } => Ok(TableFactor::Table {
            name: object_name_to_string(name),
            alias: alias.as_ref().map(|a| normalize(&a.name.value)),
        }),
        SpTableFactor::Derived { subquery, alias, .. } => Ok(TableFactor::Derived {
            query: Box::new(convert_query(subquery)?),
            alias: alias.as_ref().map(|a| normalize(&a.name.value)),
        }),
        SpTableFactor::NestedJoin { table_with_joins, .. } => {
            Ok(TableFactor::NestedJoin(Box::new(convert_table_with_joins(table_with_joins)?)))
        }
        other => Err(Diagnostic::QuerySyntaxError {
            location: Location::unknown(),
            message: format!("unsupported table expression: {other}"),
        }),
    }
}

fn convert_join(join: &SpJoin) -> Result<Join, Diagnostic> {
    let (kind, on) = match &join.join_operator {
        JoinOperator::Inner(constraint) => (JoinKind::Inner, constraint_to_expr(constraint)?),
        JoinOperator::LeftOuter(constraint) => (JoinKind::Left, constraint_to_expr(constraint)?),
        JoinOperator::RightOuter(constraint) => (JoinKind::Right, constraint_to_expr(constraint)?),
        JoinOperator::FullOuter(constraint) => (JoinKind::Full, constraint_to_expr(constraint)?),
        JoinOperator::CrossJoin => (JoinKind::Cross, None),
        other => {
            return Err(Diagnostic::QuerySyntaxError {
                location: Location::unknown(),
                message: format!("unsupported join kind: {other:?}"),
            })
        }
    };
    Ok(Join { relation: convert_table_factor(&join.relation)?, kind, on })
}

fn constraint_to_expr(constraint: &sp::JoinConstraint) -> Result<Option<Expr>, Diagnostic> {
    match constraint {
        sp::JoinConstraint::On(expr) => Ok(Some(convert_expr(expr)?)),
        _ => Ok(None),
    }
}

fn convert_expr(expr: &SpExpr) -> Result<Expr, Diagnostic> {
    match expr {
        SpExpr::Identifier(ident) => Ok(Expr::Identifier(normalize(&ident.value))),
        SpExpr::CompoundIdentifier(parts) => {
            if parts.len() >= 2 {
                let column = parts.last().unwrap().value.clone();
                let table = parts[parts.len() - 2].value.clone();
                Ok(Expr::Compound(normalize(&table), normalize(&column)))
            } else {
                Ok(Expr::Identifier(normalize(&parts.last().map(|i| i.value.clone()).unwrap_or_default())))
            }
        }
        SpExpr::Function(func) => {
            let mut args = Vec::new();
            for arg in &func.args {
                if let Some(e) = function_arg_expr(arg)? {
                    args.push(e);
                }
            }
            Ok(Expr::Function { name: object_name_to_string(&func.name).to_lowercase(), args })
        }
        SpExpr::BinaryOp { left, right, .. } => Ok(Expr::BinaryOp {
            left: Box::new(convert_expr(left)?),
            right: Box::new(convert_expr(right)?),
        }),
        SpExpr::UnaryOp { expr, .. } => Ok(Expr::UnaryOp { expr: Box::new(convert_expr(expr)?) }),
        SpExpr::Nested(inner) => convert_expr(inner),
        SpExpr::Subquery(query) => Ok(Expr::Subquery(Box::new(convert_query(query)?))),
        SpExpr::Exists { subquery, .. } => Ok(Expr::Subquery(Box::new(convert_query(subquery)?))),
        SpExpr::InSubquery { expr, subquery, .. } => Ok(Expr::Other(vec![
            convert_expr(expr)?,
            Expr::Subquery(Box::new(convert_query(subquery)?)),
        ])),
        SpExpr::Value(_) => Ok(Expr::Literal),
        SpExpr::Cast { expr, .. } => convert_expr(expr),
        SpExpr::Between { expr, low, high, .. } => Ok(Expr::Other(vec![
            convert_expr(expr)?,
            convert_expr(low)?,
            convert_expr(high)?,
        ])),
        SpExpr::IsNull(inner) | SpExpr::IsNotNull(inner) => {
            Ok(Expr::UnaryOp { expr: Box::new(convert_expr(inner)?) })
        }
        _ => Ok(Expr::Other(Vec::new())),
    }
}

fn function_arg_expr(arg: &FunctionArg) -> Result<Option<Expr>, Diagnostic> {
    let inner = match arg {
        FunctionArg::Named { arg, .. } | FunctionArg::Unnamed(arg) => arg,
    };
    match inner {
        FunctionArgExpr::Expr(e) => Ok(Some(convert_expr(e)?)),
        FunctionArgExpr::Wildcard | FunctionArgExpr::QualifiedWildcard(_) => Ok(Some(Expr::Wildcard)),
    }
}

fn object_name_to_string(name: &sp::ObjectName) -> String {
    normalize(&name.0.last().map(|i| i.value.clone()).unwrap_or_default())
}
