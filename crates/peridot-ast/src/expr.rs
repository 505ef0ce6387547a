//! Expression sum type and its traversals.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use peridot_schema::DataType;

use crate::literal::Literal;
use crate::query::{OrderByItem, SelectQuery};

/// Functions whose result varies between evaluations. A query touching
/// any of these is useless to a differential oracle.
const NONDETERMINISTIC_FUNCS: &[&str] = &[
    "RAND",
    "NOW",
    "UUID",
    "UUID_SHORT",
    "CURRENT_TIMESTAMP",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURDATE",
    "CURTIME",
    "SYSDATE",
    "UNIX_TIMESTAMP",
    "LAST_INSERT_ID",
    "CONNECTION_ID",
    "ROW_COUNT",
    "FOUND_ROWS",
    "SLEEP",
];

const AGGREGATE_FUNCS: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX"];

/// A resolved reference to a table column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub name: String,
    pub ty: DataType,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, name: impl Into<String>, ty: DataType) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            ty,
        }
    }

    /// `table.name`, the form used in emitted SQL and dedup keys.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    BitNot,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// MySQL `<=>`, null-safe equality.
    NullSafeEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Like,
    BitAnd,
    BitOr,
}

impl BinaryOp {
    pub fn sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::NullSafeEq => "<=>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Xor => "XOR",
            BinaryOp::Like => "LIKE",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
        }
    }

    /// Comparison operators accepted by the simple-predicate policy.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::NullSafeEq
        )
    }
}

/// Quantifier of a comparison against a subquery (`= ANY (...)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantifier {
    Any,
    All,
}

impl Quantifier {
    pub fn sql(self) -> &'static str {
        match self {
            Quantifier::Any => "ANY",
            Quantifier::All => "ALL",
        }
    }
}

/// A SQL expression. Subqueries own their query outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Literal),
    /// Prepared-statement placeholder, `?`.
    Param,
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Func {
        name: String,
        args: Vec<Expr>,
    },
    Case {
        whens: Vec<(Expr, Expr)>,
        else_arm: Option<Box<Expr>>,
    },
    In {
        left: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Subquery(Box<SelectQuery>),
    Exists {
        query: Box<SelectQuery>,
        negated: bool,
    },
    CompareSubquery {
        left: Box<Expr>,
        op: BinaryOp,
        quantifier: Quantifier,
        query: Box<SelectQuery>,
    },
    Window {
        name: String,
        args: Vec<Expr>,
        partition_by: Vec<Expr>,
        order_by: Vec<OrderByItem>,
        window_name: Option<String>,
    },
    /// An ordinal position in GROUP BY, optionally resolved to the
    /// select item it refers to.
    GroupByOrdinal {
        n: usize,
        expr: Option<Box<Expr>>,
    },
}

impl Expr {
    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn column(col: ColumnRef) -> Self {
        Expr::Column(col)
    }

    pub fn lit(value: Literal) -> Self {
        Expr::Literal(value)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::Or, left, right)
    }

    pub fn not(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    pub fn is_null(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::IsNull,
            expr: Box::new(expr),
        }
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Func {
            name: name.into(),
            args,
        }
    }

    /// `1 = 1`, the vacuous predicate used by sanitization fallbacks.
    pub fn trivially_true() -> Self {
        Expr::binary(BinaryOp::Eq, Expr::lit(Literal::Int(1)), Expr::lit(Literal::Int(1)))
    }

    // ------------------------------------------------------------------
    // Traversals
    // ------------------------------------------------------------------

    /// Calls `f` on every column reference in the tree, including those
    /// inside subqueries.
    pub fn visit_columns(&self, f: &mut impl FnMut(&ColumnRef)) {
        match self {
            Expr::Column(col) => f(col),
            Expr::Literal(_) | Expr::Param => {}
            Expr::Unary { expr, .. } => expr.visit_columns(f),
            Expr::Binary { left, right, .. } => {
                left.visit_columns(f);
                right.visit_columns(f);
            }
            Expr::Func { args, .. } => {
                for a in args {
                    a.visit_columns(f);
                }
            }
            Expr::Case { whens, else_arm } => {
                for (w, t) in whens {
                    w.visit_columns(f);
                    t.visit_columns(f);
                }
                if let Some(e) = else_arm {
                    e.visit_columns(f);
                }
            }
            Expr::In { left, list, .. } => {
                left.visit_columns(f);
                for item in list {
                    item.visit_columns(f);
                }
            }
            Expr::Subquery(q) => q.visit_columns(f),
            Expr::Exists { query, .. } => query.visit_columns(f),
            Expr::CompareSubquery { left, query, .. } => {
                left.visit_columns(f);
                query.visit_columns(f);
            }
            Expr::Window {
                args,
                partition_by,
                order_by,
                ..
            } => {
                for a in args {
                    a.visit_columns(f);
                }
                for p in partition_by {
                    p.visit_columns(f);
                }
                for o in order_by {
                    o.expr.visit_columns(f);
                }
            }
            Expr::GroupByOrdinal { expr, .. } => {
                if let Some(e) = expr {
                    e.visit_columns(f);
                }
            }
        }
    }

    /// All column references used transitively.
    pub fn columns(&self) -> Vec<ColumnRef> {
        let mut out = Vec::new();
        self.visit_columns(&mut |c| out.push(c.clone()));
        out
    }

    /// Whether evaluation is repeatable: no nondeterministic function
    /// anywhere in the tree, subqueries included.
    pub fn is_deterministic(&self) -> bool {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Param | Expr::GroupByOrdinal { expr: None, .. } => true,
            Expr::Unary { expr, .. } => expr.is_deterministic(),
            Expr::Binary { left, right, .. } => left.is_deterministic() && right.is_deterministic(),
            Expr::Func { name, args } => {
                !NONDETERMINISTIC_FUNCS.contains(&name.to_ascii_uppercase().as_str())
                    && args.iter().all(Expr::is_deterministic)
            }
            Expr::Case { whens, else_arm } => {
                whens.iter().all(|(w, t)| w.is_deterministic() && t.is_deterministic())
                    && else_arm.as_ref().is_none_or(|e| e.is_deterministic())
            }
            Expr::In { left, list, .. } => {
                left.is_deterministic() && list.iter().all(Expr::is_deterministic)
            }
            Expr::Subquery(q) => q.is_deterministic(),
            Expr::Exists { query, .. } => query.is_deterministic(),
            Expr::CompareSubquery { left, query, .. } => {
                left.is_deterministic() && query.is_deterministic()
            }
            Expr::Window {
                name,
                args,
                partition_by,
                order_by,
                ..
            } => {
                !NONDETERMINISTIC_FUNCS.contains(&name.to_ascii_uppercase().as_str())
                    && args.iter().all(Expr::is_deterministic)
                    && partition_by.iter().all(Expr::is_deterministic)
                    && order_by.iter().all(|o| o.expr.is_deterministic())
            }
            Expr::GroupByOrdinal { expr: Some(e), .. } => e.is_deterministic(),
        }
    }

    /// Whether an aggregate call appears outside of window position.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Func { name, args } => {
                AGGREGATE_FUNCS.contains(&name.to_ascii_uppercase().as_str())
                    || args.iter().any(Expr::contains_aggregate)
            }
            Expr::Unary { expr, .. } => expr.contains_aggregate(),
            Expr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Case { whens, else_arm } => {
                whens.iter().any(|(w, t)| w.contains_aggregate() || t.contains_aggregate())
                    || else_arm.as_ref().is_some_and(|e| e.contains_aggregate())
            }
            Expr::In { left, list, .. } => {
                left.contains_aggregate() || list.iter().any(Expr::contains_aggregate)
            }
            Expr::CompareSubquery { left, .. } => left.contains_aggregate(),
            Expr::GroupByOrdinal { expr: Some(e), .. } => e.contains_aggregate(),
            // Aggregates inside a subquery belong to that subquery.
            _ => false,
        }
    }

    /// Whether any subquery appears in the tree.
    pub fn contains_subquery(&self) -> bool {
        match self {
            Expr::Subquery(_) | Expr::Exists { .. } | Expr::CompareSubquery { .. } => true,
            Expr::Unary { expr, .. } => expr.contains_subquery(),
            Expr::Binary { left, right, .. } => {
                left.contains_subquery() || right.contains_subquery()
            }
            Expr::Func { args, .. } => args.iter().any(Expr::contains_subquery),
            Expr::Case { whens, else_arm } => {
                whens.iter().any(|(w, t)| w.contains_subquery() || t.contains_subquery())
                    || else_arm.as_ref().is_some_and(|e| e.contains_subquery())
            }
            Expr::In { left, list, .. } => {
                left.contains_subquery() || list.iter().any(Expr::contains_subquery)
            }
            Expr::GroupByOrdinal { expr: Some(e), .. } => e.contains_subquery(),
            _ => false,
        }
    }

    pub fn contains_window(&self) -> bool {
        match self {
            Expr::Window { .. } => true,
            Expr::Unary { expr, .. } => expr.contains_window(),
            Expr::Binary { left, right, .. } => left.contains_window() || right.contains_window(),
            Expr::Func { args, .. } => args.iter().any(Expr::contains_window),
            Expr::Case { whens, else_arm } => {
                whens.iter().any(|(w, t)| w.contains_window() || t.contains_window())
                    || else_arm.as_ref().is_some_and(|e| e.contains_window())
            }
            Expr::In { left, list, .. } => {
                left.contains_window() || list.iter().any(Expr::contains_window)
            }
            Expr::GroupByOrdinal { expr: Some(e), .. } => e.contains_window(),
            _ => false,
        }
    }

    /// Whether the expression is free of column references, i.e. a
    /// constant under any row binding.
    pub fn is_constant(&self) -> bool {
        let mut any = false;
        self.visit_columns(&mut |_| any = true);
        !any
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    pub fn sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        match self {
            Expr::Column(col) => {
                if col.table.is_empty() {
                    out.push_str(&col.name);
                } else {
                    let _ = write!(out, "{}.{}", col.table, col.name);
                }
            }
            Expr::Literal(lit) => {
                let _ = write!(out, "{lit}");
            }
            Expr::Param => out.push('?'),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => {
                    out.push_str("NOT (");
                    expr.write_sql(out);
                    out.push(')');
                }
                UnaryOp::Neg => {
                    out.push_str("-(");
                    expr.write_sql(out);
                    out.push(')');
                }
                UnaryOp::BitNot => {
                    out.push_str("~(");
                    expr.write_sql(out);
                    out.push(')');
                }
                UnaryOp::IsNull => {
                    out.push('(');
                    expr.write_sql(out);
                    out.push_str(" IS NULL)");
                }
                UnaryOp::IsNotNull => {
                    out.push('(');
                    expr.write_sql(out);
                    out.push_str(" IS NOT NULL)");
                }
            },
            Expr::Binary { op, left, right } => {
                out.push('(');
                left.write_sql(out);
                let _ = write!(out, " {} ", op.sql());
                right.write_sql(out);
                out.push(')');
            }
            Expr::Func { name, args } => {
                out.push_str(name);
                out.push('(');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    a.write_sql(out);
                }
                out.push(')');
            }
            Expr::Case { whens, else_arm } => {
                out.push_str("CASE");
                for (w, t) in whens {
                    out.push_str(" WHEN ");
                    w.write_sql(out);
                    out.push_str(" THEN ");
                    t.write_sql(out);
                }
                if let Some(e) = else_arm {
                    out.push_str(" ELSE ");
                    e.write_sql(out);
                }
                out.push_str(" END");
            }
            Expr::In { left, list, negated } => {
                out.push('(');
                left.write_sql(out);
                out.push_str(if *negated { " NOT IN (" } else { " IN (" });
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_sql(out);
                }
                out.push_str("))");
            }
            Expr::Subquery(q) => {
                out.push('(');
                out.push_str(&q.sql_string());
                out.push(')');
            }
            Expr::Exists { query, negated } => {
                out.push_str(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                out.push_str(&query.sql_string());
                out.push(')');
            }
            Expr::CompareSubquery {
                left,
                op,
                quantifier,
                query,
            } => {
                out.push('(');
                left.write_sql(out);
                let _ = write!(out, " {} {} (", op.sql(), quantifier.sql());
                out.push_str(&query.sql_string());
                out.push_str("))");
            }
            Expr::Window {
                name,
                args,
                partition_by,
                order_by,
                window_name,
            } => {
                out.push_str(name);
                out.push('(');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    a.write_sql(out);
                }
                out.push_str(") OVER ");
                if let Some(w) = window_name {
                    out.push_str(w);
                } else {
                    out.push('(');
                    if !partition_by.is_empty() {
                        out.push_str("PARTITION BY ");
                        for (i, p) in partition_by.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            p.write_sql(out);
                        }
                    }
                    if !order_by.is_empty() {
                        if !partition_by.is_empty() {
                            out.push(' ');
                        }
                        out.push_str("ORDER BY ");
                        for (i, o) in order_by.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            o.expr.write_sql(out);
                            if o.desc {
                                out.push_str(" DESC");
                            }
                        }
                    }
                    out.push(')');
                }
            }
            Expr::GroupByOrdinal { n, .. } => {
                let _ = write!(out, "{n}");
            }
        }
    }
}
