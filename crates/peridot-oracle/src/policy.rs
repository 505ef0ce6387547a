//! Predicate shape policy.
//!
//! Oracles that rewrite predicates can only afford expression shapes
//! they know how to reason about. The policy is derived from the run's
//! `predicate_level` and then checked structurally: acceptable
//! predicates are those reachable from simple comparisons over columns
//! and non-null literals, with each connective gated by its flag.

use peridot_ast::{Expr, UnaryOp};
use peridot_gen::PredicateLevel;

/// Which connectives a predicate may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredicatePolicy {
    pub allow_or: bool,
    pub allow_not: bool,
    pub allow_is_null: bool,
    pub allow_subquery: bool,
}

impl PredicatePolicy {
    /// `strict` allows only conjunctions of comparisons; `moderate`
    /// adds OR; `loose` adds NOT and IS [NOT] NULL. Subqueries are
    /// never enabled by level, only by an oracle profile.
    pub fn from_level(level: PredicateLevel) -> Self {
        match level {
            PredicateLevel::Strict => Self::default(),
            PredicateLevel::Moderate => Self {
                allow_or: true,
                ..Self::default()
            },
            PredicateLevel::Loose => Self {
                allow_or: true,
                allow_not: true,
                allow_is_null: true,
                allow_subquery: false,
            },
        }
    }

    pub fn with_subquery(mut self) -> Self {
        self.allow_subquery = true;
        self
    }

    pub fn without_is_null(mut self) -> Self {
        self.allow_is_null = false;
        self
    }
}

/// A column, or a literal that is not NULL.
fn is_simple_operand(expr: &Expr) -> bool {
    match expr {
        Expr::Column(_) => true,
        Expr::Literal(lit) => !lit.is_null(),
        _ => false,
    }
}

/// Whether `expr` stays inside the policy's shape.
pub fn predicate_matches(expr: &Expr, policy: &PredicatePolicy) -> bool {
    match expr {
        Expr::Binary { op, left, right } if op.is_comparison() => {
            is_simple_operand(left) && is_simple_operand(right)
        }
        Expr::Binary { op, left, right } if *op == peridot_ast::BinaryOp::And => {
            predicate_matches(left, policy) && predicate_matches(right, policy)
        }
        Expr::Binary { op, left, right } if *op == peridot_ast::BinaryOp::Or => {
            policy.allow_or && predicate_matches(left, policy) && predicate_matches(right, policy)
        }
        Expr::Unary {
            op: UnaryOp::Not,
            expr,
        } => policy.allow_not && predicate_matches(expr, policy),
        Expr::Unary {
            op: UnaryOp::IsNull | UnaryOp::IsNotNull,
            expr,
        } => policy.allow_is_null && matches!(expr.as_ref(), Expr::Column(_)),
        Expr::In { left, list, .. } => {
            is_simple_operand(left)
                && !list.is_empty()
                && list.iter().all(|item| match item {
                    Expr::Subquery(_) => policy.allow_subquery,
                    other => is_simple_operand(other),
                })
        }
        Expr::Exists { .. } => policy.allow_subquery,
        _ => false,
    }
}
