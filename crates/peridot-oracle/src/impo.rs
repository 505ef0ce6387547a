//! Impo: implication oracles over query mutations.
//!
//! Each mutation of a seed query is labeled *upper* (its result must be
//! a superset of the seed's, as a multiset) or *lower* (a subset).
//! Row multisets are compared through a canonical serialization; any
//! violated inclusion is a witnessed bug.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use peridot_ast::{BinaryOp, Expr, JoinType, SelectQuery, UnaryOp};
use peridot_exec::Row;
use peridot_gen::{BuildConstraints, PredicateLevel};

use crate::helpers::{
    query_columns_valid, query_has_aggregate, query_has_subquery, query_has_window,
    sanitize_query_columns,
};
use crate::registry::{Oracle, OracleCx};
use crate::report::{skip_reason, Report};
use crate::spec::{build_query_with_spec, QuerySpec};

const ORACLE: &str = "impo";

/// Canonical row serialization: unit separator between fields, `NULL`
/// sentinel. Base and mutant executions share LIMIT and column order,
/// so equal rows serialize identically.
const FIELD_SEP: char = '\u{1f}';

#[derive(Debug, Default)]
pub struct Impo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Result must contain every base row.
    Upper,
    /// Result must be contained in the base rows.
    Lower,
}

#[derive(Debug)]
struct Mutation {
    label: &'static str,
    direction: Direction,
    query: SelectQuery,
}

fn row_key(row: &Row) -> String {
    let mut out = String::new();
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEP);
        }
        match cell {
            Some(v) => out.push_str(v),
            None => out.push_str("NULL"),
        }
    }
    out
}

fn multiset(rows: &[Row]) -> HashMap<String, usize> {
    let mut set = HashMap::new();
    for row in rows {
        *set.entry(row_key(row)).or_insert(0) += 1;
    }
    set
}

/// `-1` base ⊂ other, `0` equal, `1` base ⊃ other, `2` incomparable.
fn compare_row_sets(base: &HashMap<String, usize>, other: &HashMap<String, usize>) -> i32 {
    let base_le_other = base
        .iter()
        .all(|(k, n)| other.get(k).copied().unwrap_or(0) >= *n);
    let other_le_base = other
        .iter()
        .all(|(k, n)| base.get(k).copied().unwrap_or(0) >= *n);
    match (base_le_other, other_le_base) {
        (true, true) => 0,
        (true, false) => -1,
        (false, true) => 1,
        (false, false) => 2,
    }
}

fn implication_holds(direction: Direction, cmp: i32) -> bool {
    match direction {
        Direction::Upper => cmp == 0 || cmp == -1,
        Direction::Lower => cmp == 0 || cmp == 1,
    }
}

/// Swaps the first comparison op found in `expr` according to `swap`.
fn rewrite_first_compare(expr: &mut Expr, swap: &[(BinaryOp, BinaryOp)]) -> bool {
    match expr {
        Expr::Binary { op, left, right } => {
            if let Some((_, to)) = swap.iter().find(|(from, _)| from == op) {
                *op = *to;
                return true;
            }
            rewrite_first_compare(left, swap) || rewrite_first_compare(right, swap)
        }
        Expr::Unary { expr, .. } => rewrite_first_compare(expr, swap),
        _ => false,
    }
}

fn mutate_all(cx: &mut OracleCx<'_>, seed: &SelectQuery, budget: usize) -> Vec<Mutation> {
    let mut out: Vec<Mutation> = Vec::new();
    let mut push = |label: &'static str, direction: Direction, query: SelectQuery| {
        out.push(Mutation {
            label,
            direction,
            query,
        });
    };

    let scope = cx.generator.tables_for_query_scope(seed);
    let scope_refs: Vec<&peridot_schema::TableMeta> = scope.iter().collect();
    let random_pred = cx.generator.generate_simple_predicate(
        &scope_refs,
        PredicateLevel::Strict,
        2,
    );

    if let Some(p) = seed.where_clause.clone() {
        if let Some(rand) = random_pred.clone() {
            let mut q = seed.clone();
            q.where_clause = Some(Expr::or(p.clone(), rand.clone()));
            q.analysis = None;
            push("or_random", Direction::Upper, q);

            let mut q = seed.clone();
            q.where_clause = Some(Expr::and(p.clone(), rand));
            q.analysis = None;
            push("and_random", Direction::Lower, q);
        }

        let mut relaxed = seed.clone();
        if let Some(w) = &mut relaxed.where_clause {
            if rewrite_first_compare(w, &[(BinaryOp::Lt, BinaryOp::Le), (BinaryOp::Gt, BinaryOp::Ge)])
            {
                relaxed.analysis = None;
                push("relax_compare", Direction::Upper, relaxed);
            }
        }

        let mut tightened = seed.clone();
        if let Some(w) = &mut tightened.where_clause {
            if rewrite_first_compare(w, &[(BinaryOp::Le, BinaryOp::Lt), (BinaryOp::Ge, BinaryOp::Gt)])
            {
                tightened.analysis = None;
                push("tighten_compare", Direction::Lower, tightened);
            }
        }

        let mut dropped = seed.clone();
        dropped.where_clause = None;
        dropped.analysis = None;
        push("drop_where", Direction::Upper, dropped);

        if let Some(col) = p.columns().into_iter().next() {
            let mut q = seed.clone();
            q.where_clause = Some(Expr::or(p.clone(), Expr::is_null(Expr::Column(col))));
            q.analysis = None;
            push("or_is_null", Direction::Upper, q);
        }

        let mut doubled = seed.clone();
        doubled.where_clause = Some(Expr::not(Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(p),
        }));
        doubled.analysis = None;
        push("double_not", Direction::Upper, doubled);
    } else if let Some(rand) = random_pred {
        let mut q = seed.clone();
        q.where_clause = Some(rand);
        q.analysis = None;
        push("and_random", Direction::Lower, q);
    }

    if !seed.distinct {
        let mut q = seed.clone();
        q.distinct = true;
        push("add_distinct", Direction::Lower, q);
    }

    for (i, join) in seed.from.joins.iter().enumerate() {
        match join.join_type {
            JoinType::Inner => {
                let mut q = seed.clone();
                q.from.joins[i].join_type = JoinType::Left;
                push("inner_to_left", Direction::Upper, q);
            }
            JoinType::Left => {
                let mut q = seed.clone();
                q.from.joins[i].join_type = JoinType::Inner;
                push("left_to_inner", Direction::Lower, q);
            }
            _ => {}
        }
    }

    out.truncate(budget);
    out
}

impl Oracle for Impo {
    fn name(&self) -> &'static str {
        ORACLE
    }

    fn check(&mut self, cx: &mut OracleCx<'_>) -> Report {
        let spec = QuerySpec {
            oracle: ORACLE,
            constraints: BuildConstraints {
                require_deterministic: true,
                ..BuildConstraints::default()
            },
            profile: crate::profile::profile_by_name(ORACLE),
            max_tries: 8,
            ..QuerySpec::default()
        };
        let mut query = match build_query_with_spec(cx.generator, &spec).into_report(ORACLE) {
            Ok(q) => q,
            Err(report) => return report,
        };

        // Seed guardrails: the implication argument needs a stable,
        // scalar-free, resolvable seed.
        if !query.is_deterministic() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "seed_guardrail"))
                .with_detail("seed_guardrail", "nondeterministic");
        }
        if query_has_aggregate(&query) || query_has_subquery(&query) || query_has_window(&query) {
            return Report::skip(ORACLE, skip_reason(ORACLE, "seed_guardrail"))
                .with_detail("seed_guardrail", "nonscalar_shape");
        }
        if query_columns_valid(&query, cx.state(), &Default::default()).is_err() {
            sanitize_query_columns(&mut query, cx.state());
            if let Err(reason) = query_columns_valid(&query, cx.state(), &Default::default()) {
                return Report::skip(ORACLE, skip_reason(ORACLE, "seed_guardrail"))
                    .with_detail("seed_guardrail", reason);
            }
        }
        if !query.with.is_empty() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "with_clause"));
        }

        // Stage-1 normalization: ordering is irrelevant to multisets.
        query.order_by.clear();
        query.analysis = None;

        let cfg = cx.config().oracles.clone();
        let count_sql = format!("SELECT COUNT(*) FROM ({}) q", query.sql_string());
        match cx.executor.query_count(cx.cancel, &count_sql) {
            Ok(n) if n as u64 > cfg.impo_max_rows => {
                return Report::skip(ORACLE, skip_reason(ORACLE, "row_budget"));
            }
            Ok(_) => {}
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        }

        let base_sql = query.sql_string();
        let base_set = match cx
            .executor
            .query_rows(cx.cancel, &base_sql, cfg.impo_max_rows as usize)
        {
            Ok(set) if set.truncated => {
                return Report::skip(ORACLE, skip_reason(ORACLE, "truncated"));
            }
            Ok(set) => set,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };
        let base_rows = multiset(&base_set.rows);

        let mutations = mutate_all(cx, &query, cfg.impo_mutation_budget);
        let deadline = Instant::now() + Duration::from_millis(cfg.impo_timeout_ms);
        let mut checked = 0_i64;

        for mutation in &mutations {
            if Instant::now() >= deadline {
                if checked == 0 {
                    return Report::skip(ORACLE, skip_reason(ORACLE, "mutation_timeout"));
                }
                break;
            }
            let mutant_sql = mutation.query.sql_string();
            let precheck = format!("SELECT COUNT(*) FROM ({mutant_sql}) q");
            match cx.executor.query_count(cx.cancel, &precheck) {
                Ok(n) if n as u64 > cfg.impo_max_rows => continue,
                Ok(_) => {}
                Err(e) if e.is_timeout() => return Report::from_exec_error(ORACLE, &e),
                Err(_) => continue,
            }
            let mutant_set = match cx
                .executor
                .query_rows(cx.cancel, &mutant_sql, cfg.impo_max_rows as usize)
            {
                Ok(set) if set.truncated => continue,
                Ok(set) => set,
                Err(e) if e.is_timeout() => return Report::from_exec_error(ORACLE, &e),
                Err(e) => {
                    // A mutant failing where the seed ran points at the
                    // engine, not the generator.
                    let reason = peridot_exec::sql_error_reason(ORACLE, &e);
                    if reason.ends_with("missing_column") || reason.ends_with("plan_ref_missing") {
                        return Report::bug(
                            ORACLE,
                            "mutation_error",
                            "mutant evaluates",
                            e.to_string(),
                            base_sql.clone(),
                            mutant_sql,
                        )
                        .with_detail("impo_mutation", mutation.label);
                    }
                    continue;
                }
            };
            checked += 1;

            let cmp = compare_row_sets(&base_rows, &multiset(&mutant_set.rows));
            if !implication_holds(mutation.direction, cmp) {
                let relation = match mutation.direction {
                    Direction::Upper => "base rows \u{2286} mutant rows",
                    Direction::Lower => "mutant rows \u{2286} base rows",
                };
                return Report::bug(
                    ORACLE,
                    "row_set",
                    relation,
                    format!("multiset comparison {cmp}"),
                    base_sql.clone(),
                    mutant_sql,
                )
                .with_detail("impo_mutation", mutation.label)
                .with_metric("base_rows", base_set.rows.len() as i64)
                .with_metric("mutant_rows", mutant_set.rows.len() as i64);
            }
        }

        Report::pass(ORACLE)
            .with_sql(base_sql)
            .with_metric("mutations_checked", checked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(keys: &[&[Option<&str>]]) -> Vec<Row> {
        keys.iter()
            .map(|r| r.iter().map(|c| c.map(String::from)).collect())
            .collect()
    }

    #[test]
    fn row_key_uses_sentinel_and_separator() {
        let row: Row = vec![Some("1".into()), None, Some("x".into())];
        assert_eq!(row_key(&row), "1\u{1f}NULL\u{1f}x");
    }

    #[test]
    fn compare_detects_all_four_relations() {
        let a = multiset(&rows(&[&[Some("1")], &[Some("2")]]));
        let b = multiset(&rows(&[&[Some("1")], &[Some("2")], &[Some("3")]]));
        let c = multiset(&rows(&[&[Some("1")]]));
        let d = multiset(&rows(&[&[Some("9")], &[Some("1")]]));
        assert_eq!(compare_row_sets(&a, &a), 0);
        assert_eq!(compare_row_sets(&a, &b), -1);
        assert_eq!(compare_row_sets(&a, &c), 1);
        assert_eq!(compare_row_sets(&a, &d), 2);
    }

    #[test]
    fn multiset_counts_duplicates() {
        let one = multiset(&rows(&[&[Some("1")]]));
        let two = multiset(&rows(&[&[Some("1")], &[Some("1")]]));
        // Duplicates matter: one copy is a strict subset of two.
        assert_eq!(compare_row_sets(&one, &two), -1);
    }

    #[test]
    fn implication_accepts_equality_both_ways() {
        assert!(implication_holds(Direction::Upper, 0));
        assert!(implication_holds(Direction::Lower, 0));
        assert!(implication_holds(Direction::Upper, -1));
        assert!(!implication_holds(Direction::Upper, 1));
        assert!(implication_holds(Direction::Lower, 1));
        assert!(!implication_holds(Direction::Lower, 2));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn multiset_strategy() -> impl Strategy<Value = HashMap<String, usize>> {
            proptest::collection::hash_map("[a-c]", 1_usize..4, 0..4)
        }

        proptest! {
            /// The comparison is a partial order over multisets:
            /// swapping the arguments flips containment and preserves
            /// equality/incomparability.
            #[test]
            fn comparison_is_antisymmetric(a in multiset_strategy(), b in multiset_strategy()) {
                let forward = compare_row_sets(&a, &b);
                let backward = compare_row_sets(&b, &a);
                match forward {
                    0 => prop_assert_eq!(backward, 0),
                    -1 => prop_assert_eq!(backward, 1),
                    1 => prop_assert_eq!(backward, -1),
                    _ => prop_assert_eq!(backward, 2),
                }
            }

            /// Adding rows to a set can only move it "up".
            #[test]
            fn adding_rows_grows_the_set(a in multiset_strategy(), key in "[a-c]") {
                let mut bigger = a.clone();
                *bigger.entry(key).or_insert(0) += 1;
                let cmp = compare_row_sets(&a, &bigger);
                prop_assert_eq!(cmp, -1, "strict superset must compare as containing");
            }

            /// Every multiset equals itself.
            #[test]
            fn comparison_is_reflexive(a in multiset_strategy()) {
                prop_assert_eq!(compare_row_sets(&a, &a), 0);
            }
        }
    }

    #[test]
    fn rewrite_swaps_first_matching_op() {
        let mut e = Expr::and(
            Expr::binary(
                BinaryOp::Gt,
                Expr::lit(peridot_ast::Literal::Int(1)),
                Expr::lit(peridot_ast::Literal::Int(2)),
            ),
            Expr::binary(
                BinaryOp::Lt,
                Expr::lit(peridot_ast::Literal::Int(3)),
                Expr::lit(peridot_ast::Literal::Int(4)),
            ),
        );
        assert!(rewrite_first_compare(
            &mut e,
            &[(BinaryOp::Gt, BinaryOp::Ge), (BinaryOp::Lt, BinaryOp::Le)]
        ));
        assert_eq!(e.sql(), "((1 >= 2) AND (3 < 4))");
    }
}
