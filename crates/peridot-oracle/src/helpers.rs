//! Query-level helpers shared by the oracles.

use std::collections::BTreeMap;

use peridot_ast::{ColumnRef, Expr, SelectQuery};
use peridot_schema::{DataType, State, TableMeta};

// ============================================================================
// Cached-analysis wrappers
// ============================================================================

/// Prefers the generator's cached analysis, falling back to traversal.
pub fn query_has_aggregate(query: &SelectQuery) -> bool {
    match &query.analysis {
        Some(a) => a.has_aggregate,
        None => query.compute_analysis().has_aggregate,
    }
}

pub fn query_has_subquery(query: &SelectQuery) -> bool {
    match &query.analysis {
        Some(a) => a.has_subquery,
        None => query.compute_analysis().has_subquery,
    }
}

pub fn query_has_window(query: &SelectQuery) -> bool {
    match &query.analysis {
        Some(a) => a.has_window,
        None => query.compute_analysis().has_window,
    }
}

pub fn query_deterministic(query: &SelectQuery) -> bool {
    query.is_deterministic()
}

// ============================================================================
// Column validation
// ============================================================================

#[derive(Debug, Clone)]
enum ScopeEntry {
    Table(Vec<String>),
    /// Derived table or CTE: only output aliases are addressable.
    Synthetic(Vec<String>),
}

impl ScopeEntry {
    fn has_column(&self, name: &str) -> bool {
        match self {
            ScopeEntry::Table(cols) | ScopeEntry::Synthetic(cols) => {
                cols.iter().any(|c| c == name)
            }
        }
    }
}

fn scope_of(query: &SelectQuery, state: &State) -> Result<BTreeMap<String, ScopeEntry>, &'static str> {
    let mut ctes: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for cte in &query.with {
        let cols = if cte.columns.is_empty() {
            cte.query.column_aliases()
        } else {
            cte.columns.clone()
        };
        ctes.insert(cte.name.as_str(), cols);
    }

    let mut scope = BTreeMap::new();
    let mut add_factor = |name: &str,
                          table: &str,
                          derived: Option<&SelectQuery>|
     -> Result<(), &'static str> {
        let entry = if let Some(q) = derived {
            ScopeEntry::Synthetic(q.column_aliases())
        } else if let Some(cols) = ctes.get(table) {
            ScopeEntry::Synthetic(cols.clone())
        } else if let Some(meta) = state.table_by_name(table) {
            ScopeEntry::Table(meta.columns.iter().map(|c| c.name.clone()).collect())
        } else {
            return Err("unknown_table");
        };
        scope.insert(name.to_string(), entry);
        Ok(())
    };

    add_factor(
        query.from.base_effective_name(),
        &query.from.base_table,
        query.from.base_query.as_deref(),
    )?;
    for join in &query.from.joins {
        add_factor(join.effective_name(), &join.table, join.table_query.as_deref())?;
    }
    Ok(scope)
}

/// Checks that every column reference in `query` resolves against the
/// schema, with `outer` naming the enclosing queries' factors. Returns
/// the closed-set failure reason on the first problem found.
pub fn query_columns_valid(
    query: &SelectQuery,
    state: &State,
    outer: &BTreeMap<String, Vec<String>>,
) -> Result<(), &'static str> {
    let scope = scope_of(query, state)?;

    // USING columns must exist on both sides of their join.
    let mut seen: Vec<&str> = vec![query.from.base_effective_name()];
    for join in &query.from.joins {
        for col in &join.using {
            let right_ok = scope
                .get(join.effective_name())
                .is_some_and(|e| e.has_column(col));
            let left_ok = seen
                .iter()
                .any(|n| scope.get(*n).is_some_and(|e| e.has_column(col)));
            if !right_ok || !left_ok {
                return Err("using_column_missing");
            }
        }
        seen.push(join.effective_name());
    }

    let mut problem: Option<&'static str> = None;
    let mut check_col = |col: &ColumnRef| {
        if problem.is_some() || col.table.is_empty() {
            return;
        }
        match scope.get(&col.table) {
            Some(entry) => {
                if !entry.has_column(&col.name) {
                    problem = Some("unknown_column");
                }
            }
            None => match outer.get(&col.table) {
                Some(cols) => {
                    if !cols.iter().any(|c| c == &col.name) {
                        problem = Some("unknown_column");
                    }
                }
                None => problem = Some("unknown_table"),
            },
        }
    };
    query.visit_own_exprs(&mut |e| e.visit_columns(&mut check_col));
    if let Some(reason) = problem {
        return Err(reason);
    }

    // Subqueries see the current scope as their outer environment.
    let mut extended = outer.clone();
    for (name, entry) in &scope {
        let cols = match entry {
            ScopeEntry::Table(c) | ScopeEntry::Synthetic(c) => c.clone(),
        };
        extended.insert(name.clone(), cols);
    }
    let mut nested_err: Option<&'static str> = None;
    let mut visit_nested = |q: &SelectQuery| {
        if nested_err.is_none() {
            if let Err(reason) = query_columns_valid(q, state, &extended) {
                nested_err = Some(reason);
            }
        }
    };
    for q in query.nested_queries() {
        visit_nested(q);
    }
    let mut sub_err: Option<&'static str> = None;
    query.visit_own_exprs(&mut |e| {
        collect_expr_subqueries(e, &mut |q| {
            if sub_err.is_none() {
                if let Err(reason) = query_columns_valid(q, state, &extended) {
                    sub_err = Some(reason);
                }
            }
        });
    });
    if let Some(reason) = nested_err.or(sub_err) {
        return Err(reason);
    }
    Ok(())
}

fn collect_expr_subqueries<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a SelectQuery)) {
    match expr {
        Expr::Subquery(q) => f(q),
        Expr::Exists { query, .. } => f(query),
        Expr::CompareSubquery { left, query, .. } => {
            collect_expr_subqueries(left, f);
            f(query);
        }
        Expr::Unary { expr, .. } => collect_expr_subqueries(expr, f),
        Expr::Binary { left, right, .. } => {
            collect_expr_subqueries(left, f);
            collect_expr_subqueries(right, f);
        }
        Expr::Func { args, .. } => {
            for a in args {
                collect_expr_subqueries(a, f);
            }
        }
        Expr::Case { whens, else_arm } => {
            for (w, t) in whens {
                collect_expr_subqueries(w, f);
                collect_expr_subqueries(t, f);
            }
            if let Some(e) = else_arm {
                collect_expr_subqueries(e, f);
            }
        }
        Expr::In { left, list, .. } => {
            collect_expr_subqueries(left, f);
            for item in list {
                collect_expr_subqueries(item, f);
            }
        }
        _ => {}
    }
}

// ============================================================================
// USING normalization
// ============================================================================

/// Outcome of rewriting `USING` joins into explicit `ON` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsingNormalize {
    Unchanged,
    Normalized,
    /// A merged column is still referenced through a non-preferred
    /// qualifier; the caller must skip.
    Ambiguous,
}

/// Rewrites every `USING (c, ...)` join into `ON p.c = r.c`, taking the
/// base factor as the preferred owner of each merged column.
pub fn normalize_using_joins(query: &mut SelectQuery, state: &State) -> UsingNormalize {
    let preferred = query.from.base_effective_name().to_string();
    let mut merged: Vec<(String, String)> = Vec::new(); // (right factor, column)
    let mut any = false;

    for join in &mut query.from.joins {
        if join.using.is_empty() {
            continue;
        }
        any = true;
        let right = join.effective_name().to_string();
        let mut on: Option<Expr> = None;
        for col in join.using.drain(..) {
            let ty = state
                .table_by_name(&join.table)
                .and_then(|t| t.column(&col))
                .map_or(DataType::Int, |c| c.ty);
            let eq = Expr::binary(
                peridot_ast::BinaryOp::Eq,
                Expr::Column(ColumnRef::new(preferred.clone(), col.clone(), ty)),
                Expr::Column(ColumnRef::new(right.clone(), col.clone(), ty)),
            );
            on = Some(match on.take() {
                Some(acc) => Expr::and(acc, eq),
                None => eq,
            });
            merged.push((right.clone(), col));
        }
        join.on = on;
    }

    if !any {
        return UsingNormalize::Unchanged;
    }

    // References to a merged column through the right-side qualifier are
    // ambiguous once the merge is undone; detect them outside join ONs.
    let mut ambiguous = false;
    let mut check = |col: &ColumnRef| {
        if merged.iter().any(|(t, c)| *t == col.table && *c == col.name) {
            ambiguous = true;
        }
    };
    for item in &query.items {
        item.expr.visit_columns(&mut check);
    }
    if let Some(w) = &query.where_clause {
        w.visit_columns(&mut check);
    }
    if let Some(h) = &query.having {
        h.visit_columns(&mut check);
    }
    for g in &query.group_by {
        g.visit_columns(&mut check);
    }
    for o in &query.order_by {
        o.expr.visit_columns(&mut check);
    }

    if ambiguous {
        UsingNormalize::Ambiguous
    } else {
        UsingNormalize::Normalized
    }
}

// ============================================================================
// Sanitization
// ============================================================================

fn first_column(meta: &TableMeta, factor: &str) -> Option<ColumnRef> {
    meta.columns
        .first()
        .map(|c| ColumnRef::new(factor, c.name.clone(), c.ty))
}

#[derive(PartialEq)]
enum Fix {
    Clean,
    Changed,
    Broken,
}

fn fix_expr(expr: &mut Expr, scope: &BTreeMap<String, TableMeta>, preferred: &str) -> Fix {
    fn merge(s: Fix, status: &mut Fix) {
        if s == Fix::Broken {
            *status = Fix::Broken;
        } else if s == Fix::Changed && *status == Fix::Clean {
            *status = Fix::Changed;
        }
    }
    let mut status = Fix::Clean;
    match expr {
        Expr::Column(col) => {
            let known = scope
                .get(&col.table)
                .is_some_and(|m| m.column(&col.name).is_some());
            if !known {
                let replacement = scope
                    .get(&col.table)
                    .and_then(|m| first_column(m, &col.table))
                    .or_else(|| {
                        scope
                            .get(preferred)
                            .and_then(|m| first_column(m, preferred))
                    });
                match replacement {
                    Some(r) => {
                        *col = r;
                        return Fix::Changed;
                    }
                    None => return Fix::Broken,
                }
            }
            Fix::Clean
        }
        Expr::Literal(_) | Expr::Param | Expr::GroupByOrdinal { .. } => Fix::Clean,
        Expr::Unary { expr, .. } => fix_expr(expr, scope, preferred),
        Expr::Binary { left, right, .. } => {
            merge(fix_expr(left, scope, preferred), &mut status);
            merge(fix_expr(right, scope, preferred), &mut status);
            status
        }
        Expr::Func { args, .. } => {
            for a in args {
                merge(fix_expr(a, scope, preferred), &mut status);
            }
            status
        }
        Expr::Case { whens, else_arm } => {
            for (w, t) in whens {
                merge(fix_expr(w, scope, preferred), &mut status);
                merge(fix_expr(t, scope, preferred), &mut status);
            }
            if let Some(e) = else_arm {
                merge(fix_expr(e, scope, preferred), &mut status);
            }
            status
        }
        Expr::In { left, list, .. } => {
            merge(fix_expr(left, scope, preferred), &mut status);
            for item in list {
                merge(fix_expr(item, scope, preferred), &mut status);
            }
            status
        }
        // Subquery internals are left alone; scope recursion is the
        // validator's job, repair stays shallow.
        Expr::Subquery(_) | Expr::Exists { .. } | Expr::CompareSubquery { .. } => Fix::Clean,
        Expr::Window {
            args, partition_by, ..
        } => {
            for a in args.iter_mut().chain(partition_by.iter_mut()) {
                merge(fix_expr(a, scope, preferred), &mut status);
            }
            status
        }
    }
}

/// Best-effort repair of a mildly broken query: drops joins onto
/// unknown tables, remaps unknown column references to the first column
/// of the preferred table, and falls back to `1 = 1` for conditions
/// that cannot be repaired. Returns whether anything changed.
pub fn sanitize_query_columns(query: &mut SelectQuery, state: &State) -> bool {
    let mut changed = false;

    let cte_names: Vec<String> = query.with.iter().map(|c| c.name.clone()).collect();
    let keep = |table: &str, is_derived: bool| {
        is_derived || cte_names.iter().any(|c| c == table) || state.table_by_name(table).is_some()
    };

    let before = query.from.joins.len();
    query
        .from
        .joins
        .retain(|j| keep(&j.table, j.table_query.is_some()));
    changed |= query.from.joins.len() != before;

    // Scope over concrete tables only; synthetic factors are not
    // repair targets.
    let mut scope: BTreeMap<String, TableMeta> = BTreeMap::new();
    if query.from.base_query.is_none() {
        if let Some(meta) = state.table_by_name(&query.from.base_table) {
            let mut meta = meta.clone();
            meta.name = query.from.base_effective_name().to_string();
            scope.insert(meta.name.clone(), meta);
        }
    }
    for join in &query.from.joins {
        if join.table_query.is_none() {
            if let Some(meta) = state.table_by_name(&join.table) {
                let mut meta = meta.clone();
                meta.name = join.effective_name().to_string();
                scope.insert(meta.name.clone(), meta);
            }
        }
    }
    let preferred = query.from.base_effective_name().to_string();

    let mut fix_condition = |cond: &mut Option<Expr>, changed: &mut bool| {
        if let Some(expr) = cond {
            match fix_expr(expr, &scope, &preferred) {
                Fix::Clean => {}
                Fix::Changed => *changed = true,
                Fix::Broken => {
                    *cond = Some(Expr::trivially_true());
                    *changed = true;
                }
            }
        }
    };

    let mut where_clause = query.where_clause.take();
    fix_condition(&mut where_clause, &mut changed);
    query.where_clause = where_clause;

    let mut having = query.having.take();
    fix_condition(&mut having, &mut changed);
    query.having = having;

    for join in &mut query.from.joins {
        let mut on = join.on.take();
        fix_condition(&mut on, &mut changed);
        join.on = on;
    }

    let mut items = std::mem::take(&mut query.items);
    for item in &mut items {
        match fix_expr(&mut item.expr, &scope, &preferred) {
            Fix::Clean => {}
            Fix::Changed => changed = true,
            Fix::Broken => {
                if let Some(r) = scope.get(&preferred).and_then(|m| first_column(m, &preferred)) {
                    item.expr = Expr::Column(r);
                } else {
                    item.expr = Expr::lit(peridot_ast::Literal::Int(1));
                }
                changed = true;
            }
        }
    }
    query.items = items;

    let mut order_by = std::mem::take(&mut query.order_by);
    order_by.retain_mut(|o| match fix_expr(&mut o.expr, &scope, &preferred) {
        Fix::Clean => true,
        Fix::Changed => {
            changed = true;
            true
        }
        Fix::Broken => {
            changed = true;
            false
        }
    });
    query.order_by = order_by;

    let mut group_by = std::mem::take(&mut query.group_by);
    group_by.retain_mut(|g| match fix_expr(g, &scope, &preferred) {
        Fix::Clean => true,
        Fix::Changed => {
            changed = true;
            true
        }
        Fix::Broken => {
            changed = true;
            false
        }
    });
    query.group_by = group_by;

    changed
}
