//! Semantic properties behind TLP and NoREC, checked against a small
//! three-valued reference evaluator.
//!
//! TLP's soundness rests on `{P, NOT P, P IS NULL}` being an exhaustive
//! and disjoint partition under Kleene logic; NoREC's on `COUNT(σ_P)`
//! equaling `SUM(CASE WHEN P THEN 1 ELSE 0)`. Both are checked here
//! over arbitrary single-column tables and predicate trees.

use peridot_ast::{BinaryOp, ColumnRef, Expr, Literal};
use peridot_schema::DataType;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum T3 {
    True,
    False,
    Null,
}

fn t3(b: bool) -> T3 {
    if b {
        T3::True
    } else {
        T3::False
    }
}

/// Kleene evaluation of the predicate shapes the TLP/NoREC builders
/// accept, against a single-column row.
fn eval(expr: &Expr, value: Option<i64>) -> T3 {
    match expr {
        Expr::Binary { op, left, right } if op.is_comparison() => {
            let lhs = operand(left, value);
            let rhs = operand(right, value);
            match (lhs, rhs) {
                (Some(a), Some(b)) => t3(match op {
                    BinaryOp::Eq | BinaryOp::NullSafeEq => a == b,
                    BinaryOp::Ne => a != b,
                    BinaryOp::Lt => a < b,
                    BinaryOp::Le => a <= b,
                    BinaryOp::Gt => a > b,
                    BinaryOp::Ge => a >= b,
                    _ => unreachable!("comparison shape"),
                }),
                _ if *op == BinaryOp::NullSafeEq => t3(operand(left, value) == operand(right, value)),
                _ => T3::Null,
            }
        }
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => match (eval(left, value), eval(right, value)) {
            (T3::False, _) | (_, T3::False) => T3::False,
            (T3::Null, _) | (_, T3::Null) => T3::Null,
            _ => T3::True,
        },
        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => match (eval(left, value), eval(right, value)) {
            (T3::True, _) | (_, T3::True) => T3::True,
            (T3::Null, _) | (_, T3::Null) => T3::Null,
            _ => T3::False,
        },
        Expr::Unary {
            op: peridot_ast::UnaryOp::Not,
            expr,
        } => match eval(expr, value) {
            T3::True => T3::False,
            T3::False => T3::True,
            T3::Null => T3::Null,
        },
        Expr::Unary {
            op: peridot_ast::UnaryOp::IsNull,
            expr,
        } => t3(eval(expr, value) == T3::Null),
        other => panic!("evaluator does not model: {other:?}"),
    }
}

fn operand(expr: &Expr, value: Option<i64>) -> Option<i64> {
    match expr {
        Expr::Column(_) => value,
        Expr::Literal(Literal::Int(v)) => Some(*v),
        Expr::Literal(Literal::Null) => None,
        other => panic!("operand shape: {other:?}"),
    }
}

fn col() -> Expr {
    Expr::Column(ColumnRef::new("t0", "c0", DataType::Int))
}

/// Comparison-over-column predicates, optionally composed.
fn predicate_strategy() -> impl Strategy<Value = Expr> {
    let leaf = (any::<i8>(), 0..6_u8).prop_map(|(lit, op)| {
        let op = match op {
            0 => BinaryOp::Eq,
            1 => BinaryOp::Ne,
            2 => BinaryOp::Lt,
            3 => BinaryOp::Le,
            4 => BinaryOp::Gt,
            _ => BinaryOp::Ge,
        };
        Expr::binary(op, col(), Expr::lit(Literal::Int(i64::from(lit))))
    });
    leaf.prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::and(a, b)),
            (inner.clone(), inner).prop_map(|(a, b)| Expr::or(a, b)),
        ]
    })
}

fn table_strategy() -> impl Strategy<Value = Vec<Option<i64>>> {
    proptest::collection::vec(proptest::option::of(-4_i64..5), 0..24)
}

proptest! {
    /// TLP: the three partitions are disjoint and exhaustive, so the
    /// UNION ALL row count equals the unfiltered count.
    #[test]
    fn tlp_partitions_are_exhaustive_and_disjoint(
        rows in table_strategy(),
        predicate in predicate_strategy(),
    ) {
        let not_p = Expr::not(predicate.clone());
        let p_null = Expr::is_null(predicate.clone());

        let mut partitioned = 0_usize;
        for &row in &rows {
            let in_p = eval(&predicate, row) == T3::True;
            let in_not_p = eval(&not_p, row) == T3::True;
            let in_null = eval(&p_null, row) == T3::True;
            let memberships = usize::from(in_p) + usize::from(in_not_p) + usize::from(in_null);
            prop_assert_eq!(memberships, 1, "row {:?} must land in exactly one partition", row);
            partitioned += memberships;
        }
        prop_assert_eq!(partitioned, rows.len());
    }

    /// NoREC: the optimized filter count equals the unoptimized
    /// CASE-projection sum.
    #[test]
    fn norec_count_equals_case_sum(
        rows in table_strategy(),
        predicate in predicate_strategy(),
    ) {
        let filtered = rows
            .iter()
            .filter(|&&row| eval(&predicate, row) == T3::True)
            .count() as i64;
        let case_sum: i64 = rows
            .iter()
            .map(|&row| match eval(&predicate, row) {
                T3::True => 1,
                T3::False | T3::Null => 0,
            })
            .sum();
        prop_assert_eq!(filtered, case_sum);
    }

    /// DQE: rows "affected" by a predicate-guarded delete is exactly
    /// the predicate count (the engine-side counterpart of comparing
    /// RowsAffected against a COUNT probe).
    #[test]
    fn dqe_affected_equals_predicate_count(
        rows in table_strategy(),
        predicate in predicate_strategy(),
    ) {
        let survivors: Vec<Option<i64>> = rows
            .iter()
            .copied()
            .filter(|&row| eval(&predicate, row) != T3::True)
            .collect();
        let affected = rows.len() - survivors.len();
        let predicted = rows
            .iter()
            .filter(|&&row| eval(&predicate, row) == T3::True)
            .count();
        prop_assert_eq!(affected, predicted);
    }
}
