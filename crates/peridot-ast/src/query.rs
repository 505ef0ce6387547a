//! Select queries: clause structs, SQL emission, signature wrapper.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::expr::{ColumnRef, Expr};

/// A common table expression in a `WITH` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cte {
    pub name: String,
    /// Optional explicit column list, `WITH w (a, b) AS ...`.
    pub columns: Vec<String>,
    pub query: SelectQuery,
}

/// One entry of the select list. Every generated item carries an alias;
/// the alias list is dense by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
    Straight,
}

impl JoinType {
    pub fn sql(self) -> &'static str {
        match self {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Cross => "CROSS JOIN",
            JoinType::Straight => "STRAIGHT_JOIN",
        }
    }
}

/// One joined table factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub join_type: JoinType,
    pub natural: bool,
    pub table: String,
    pub table_alias: Option<String>,
    /// Present when the factor is a derived table.
    pub table_query: Option<Box<SelectQuery>>,
    pub on: Option<Expr>,
    pub using: Vec<String>,
}

impl Join {
    pub fn inner(table: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Inner,
            natural: false,
            table: table.into(),
            table_alias: None,
            table_query: None,
            on: Some(on),
            using: Vec::new(),
        }
    }

    /// The name other clauses use to reference this factor.
    pub fn effective_name(&self) -> &str {
        self.table_alias.as_deref().unwrap_or(&self.table)
    }
}

/// The FROM clause: a base factor plus zero or more joins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FromClause {
    pub base_table: String,
    pub base_alias: Option<String>,
    pub base_query: Option<Box<SelectQuery>>,
    pub joins: Vec<Join>,
}

impl FromClause {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            base_table: name.into(),
            ..Self::default()
        }
    }

    pub fn base_effective_name(&self) -> &str {
        self.base_alias.as_deref().unwrap_or(&self.base_table)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expr: Expr,
    pub desc: bool,
}

impl OrderByItem {
    pub fn asc(expr: Expr) -> Self {
        Self { expr, desc: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetOpType {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl SetOpType {
    pub fn sql(self) -> &'static str {
        match self {
            SetOpType::Union => "UNION",
            SetOpType::UnionAll => "UNION ALL",
            SetOpType::Intersect => "INTERSECT",
            SetOpType::Except => "EXCEPT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOp {
    pub op: SetOpType,
    pub query: SelectQuery,
}

/// A named window in the `WINDOW` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDef {
    pub name: String,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByItem>,
}

/// Generator-computed facts about a query, cached so oracles avoid
/// re-walking the tree. Helpers fall back to traversal when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub has_aggregate: bool,
    pub has_subquery: bool,
    pub has_window: bool,
    pub deterministic: bool,
}

/// A SELECT query as produced by the generator and rewritten by oracles.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectQuery {
    pub with: Vec<Cte>,
    pub with_recursive: bool,
    pub items: Vec<SelectItem>,
    pub from: FromClause,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<u64>,
    pub distinct: bool,
    pub set_ops: Vec<SetOp>,
    pub window_defs: Vec<WindowDef>,
    pub analysis: Option<Analysis>,
}

impl SelectQuery {
    pub fn from_table(name: impl Into<String>) -> Self {
        Self {
            from: FromClause::table(name),
            ..Self::default()
        }
    }

    // ------------------------------------------------------------------
    // Structure queries
    // ------------------------------------------------------------------

    pub fn has_joins(&self) -> bool {
        !self.from.joins.is_empty()
    }

    /// Aliases of the select list, in order. Dense for generated queries.
    pub fn column_aliases(&self) -> Vec<String> {
        self.items.iter().map(|i| i.alias.clone()).collect()
    }

    /// Effective names of every factor in this query's own FROM.
    pub fn from_names(&self) -> Vec<&str> {
        let mut names = vec![self.from.base_effective_name()];
        names.extend(self.from.joins.iter().map(Join::effective_name));
        names
    }

    /// Concrete table names in FROM, derived tables skipped.
    pub fn concrete_from_tables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if self.from.base_query.is_none() {
            names.push(self.from.base_table.as_str());
        }
        for j in &self.from.joins {
            if j.table_query.is_none() {
                names.push(j.table.as_str());
            }
        }
        names
    }

    pub fn cte_names(&self) -> Vec<&str> {
        self.with.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of table factors, recursing into derived tables, CTE
    /// bodies and set-op arms. EET uses this as its complexity guard.
    pub fn table_factor_count_with_cte(&self) -> usize {
        let mut count = 1 + self.from.joins.len();
        if let Some(q) = &self.from.base_query {
            count += q.table_factor_count_with_cte();
        }
        for j in &self.from.joins {
            if let Some(q) = &j.table_query {
                count += q.table_factor_count_with_cte();
            }
        }
        for cte in &self.with {
            count += cte.query.table_factor_count_with_cte();
        }
        for s in &self.set_ops {
            count += s.query.table_factor_count_with_cte();
        }
        count
    }

    // ------------------------------------------------------------------
    // Traversals
    // ------------------------------------------------------------------

    /// Visits every expression hanging off this query, excluding those
    /// inside CTE bodies, derived tables and set-op arms (callers that
    /// care recurse themselves through `subqueries`).
    pub fn visit_own_exprs(&self, f: &mut impl FnMut(&Expr)) {
        for item in &self.items {
            f(&item.expr);
        }
        if let Some(w) = &self.where_clause {
            f(w);
        }
        for g in &self.group_by {
            f(g);
        }
        if let Some(h) = &self.having {
            f(h);
        }
        for o in &self.order_by {
            f(&o.expr);
        }
        for j in &self.from.joins {
            if let Some(on) = &j.on {
                f(on);
            }
        }
        for w in &self.window_defs {
            for p in &w.partition_by {
                f(p);
            }
            for o in &w.order_by {
                f(&o.expr);
            }
        }
    }

    /// All nested queries one level down.
    pub fn nested_queries(&self) -> Vec<&SelectQuery> {
        let mut out = Vec::new();
        for cte in &self.with {
            out.push(&cte.query);
        }
        if let Some(q) = &self.from.base_query {
            out.push(q);
        }
        for j in &self.from.joins {
            if let Some(q) = &j.table_query {
                out.push(q);
            }
        }
        for s in &self.set_ops {
            out.push(&s.query);
        }
        out
    }

    /// Calls `f` on every column reference in the whole tree.
    pub fn visit_columns(&self, f: &mut impl FnMut(&ColumnRef)) {
        self.visit_own_exprs(&mut |e| e.visit_columns(f));
        for q in self.nested_queries() {
            q.visit_columns(f);
        }
    }

    fn traverse_any(&self, pred: &impl Fn(&Expr) -> bool) -> bool {
        let mut hit = false;
        self.visit_own_exprs(&mut |e| hit |= pred(e));
        hit || self.nested_queries().iter().any(|q| q.traverse_any(pred))
    }

    /// Computes the cached analysis from scratch.
    pub fn compute_analysis(&self) -> Analysis {
        Analysis {
            has_aggregate: self.traverse_any(&Expr::contains_aggregate),
            has_subquery: self.traverse_any(&Expr::contains_subquery)
                || self.from.base_query.is_some()
                || self.from.joins.iter().any(|j| j.table_query.is_some()),
            has_window: self.traverse_any(&Expr::contains_window) || !self.window_defs.is_empty(),
            deterministic: self.compute_deterministic(),
        }
    }

    fn compute_deterministic(&self) -> bool {
        let mut det = true;
        self.visit_own_exprs(&mut |e| det &= e.is_deterministic());
        det && self.nested_queries().iter().all(|q| q.compute_deterministic())
    }

    /// Deterministic iff every item, predicate, group/order key, having
    /// and join condition is deterministic. Prefers the cached analysis.
    pub fn is_deterministic(&self) -> bool {
        match &self.analysis {
            Some(a) => a.deterministic,
            None => self.compute_deterministic(),
        }
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn write_with(&self, out: &mut String) {
        if self.with.is_empty() {
            return;
        }
        out.push_str("WITH ");
        if self.with_recursive {
            out.push_str("RECURSIVE ");
        }
        for (i, cte) in self.with.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&cte.name);
            if !cte.columns.is_empty() {
                let _ = write!(out, " ({})", cte.columns.join(", "));
            }
            let _ = write!(out, " AS ({})", cte.query.sql_string());
        }
        out.push(' ');
    }

    /// The `WITH` prefix alone, used by oracles that re-home the body.
    pub fn with_prefix_sql(&self) -> String {
        let mut out = String::new();
        self.write_with(&mut out);
        out
    }

    /// The FROM clause text without the leading keyword.
    pub fn from_sql(&self) -> String {
        let mut out = String::new();
        self.write_from(&mut out);
        out
    }

    fn write_from(&self, out: &mut String) {
        if let Some(q) = &self.from.base_query {
            let _ = write!(out, "({}) AS {}", q.sql_string(), self.from.base_effective_name());
        } else {
            out.push_str(&self.from.base_table);
            if let Some(a) = &self.from.base_alias {
                let _ = write!(out, " AS {a}");
            }
        }
        for j in &self.from.joins {
            out.push(' ');
            if j.natural {
                out.push_str("NATURAL ");
            }
            out.push_str(j.join_type.sql());
            out.push(' ');
            if let Some(q) = &j.table_query {
                let _ = write!(out, "({}) AS {}", q.sql_string(), j.effective_name());
            } else {
                out.push_str(&j.table);
                if let Some(a) = &j.table_alias {
                    let _ = write!(out, " AS {a}");
                }
            }
            if let Some(on) = &j.on {
                out.push_str(" ON ");
                on.write_sql(out);
            } else if !j.using.is_empty() {
                let _ = write!(out, " USING ({})", j.using.join(", "));
            }
        }
    }

    /// Emits the query as SQL.
    pub fn sql_string(&self) -> String {
        let mut out = String::new();
        self.write_with(&mut out);
        out.push_str("SELECT ");
        if self.distinct {
            out.push_str("DISTINCT ");
        }
        if self.items.is_empty() {
            out.push('*');
        } else {
            for (i, item) in self.items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                item.expr.write_sql(&mut out);
                let _ = write!(out, " AS {}", item.alias);
            }
        }
        out.push_str(" FROM ");
        self.write_from(&mut out);
        if let Some(w) = &self.where_clause {
            out.push_str(" WHERE ");
            w.write_sql(&mut out);
        }
        if !self.group_by.is_empty() {
            out.push_str(" GROUP BY ");
            for (i, g) in self.group_by.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                g.write_sql(&mut out);
            }
        }
        if let Some(h) = &self.having {
            out.push_str(" HAVING ");
            h.write_sql(&mut out);
        }
        if !self.window_defs.is_empty() {
            out.push_str(" WINDOW ");
            for (i, w) in self.window_defs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{} AS (", w.name);
                if !w.partition_by.is_empty() {
                    out.push_str("PARTITION BY ");
                    for (j, p) in w.partition_by.iter().enumerate() {
                        if j > 0 {
                            out.push_str(", ");
                        }
                        p.write_sql(&mut out);
                    }
                }
                if !w.order_by.is_empty() {
                    if !w.partition_by.is_empty() {
                        out.push(' ');
                    }
                    out.push_str("ORDER BY ");
                    for (j, o) in w.order_by.iter().enumerate() {
                        if j > 0 {
                            out.push_str(", ");
                        }
                        o.expr.write_sql(&mut out);
                        if o.desc {
                            out.push_str(" DESC");
                        }
                    }
                }
                out.push(')');
            }
        }
        if !self.order_by.is_empty() {
            out.push_str(" ORDER BY ");
            for (i, o) in self.order_by.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                o.expr.write_sql(&mut out);
                if o.desc {
                    out.push_str(" DESC");
                }
            }
        }
        if let Some(n) = self.limit {
            let _ = write!(out, " LIMIT {n}");
        }
        for s in &self.set_ops {
            let _ = write!(out, " {} {}", s.op.sql(), s.query.sql_string());
        }
        out
    }

    /// Wraps the query in the canonical signature shape:
    ///
    /// ```sql
    /// SELECT COUNT(*) AS cnt,
    ///        IFNULL(BIT_XOR(CRC32(CONCAT_WS('#', q.a0, ...))), 0) AS checksum
    /// FROM (<query>) q
    /// ```
    pub fn signature_sql(&self) -> String {
        signature_sql_for(&self.sql_string(), &self.column_aliases())
    }
}

/// Builds the signature wrapper for an arbitrary SELECT and its output
/// alias list.
pub fn signature_sql_for(sql: &str, aliases: &[String]) -> String {
    let cols = aliases
        .iter()
        .map(|a| format!("q.{a}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT COUNT(*) AS cnt, IFNULL(BIT_XOR(CRC32(CONCAT_WS('#', {cols}))), 0) AS checksum FROM ({sql}) q"
    )
}
