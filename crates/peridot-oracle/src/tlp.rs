//! TLP: ternary logic partitioning.
//!
//! For a deterministic predicate `P`, the three partitions `P`, `NOT P`
//! and `P IS NULL` are exhaustive and disjoint under SQL's three-valued
//! logic, so their UNION ALL must carry the same signature as the query
//! with the predicate removed.

use peridot_ast::{Expr, OrderByItem, SelectQuery};
use peridot_gen::BuildConstraints;

use crate::helpers::{normalize_using_joins, UsingNormalize};
use crate::policy::PredicatePolicy;
use crate::registry::{Oracle, OracleCx};
use crate::report::{skip_reason, Report};
use crate::signature::{explain_or_error, signature_sql_for};
use crate::spec::{build_query_with_spec, QuerySpec};

const ORACLE: &str = "tlp";

#[derive(Debug, Default)]
pub struct Tlp;

/// One partition: the base query with a replaced predicate and no
/// ORDER BY (ordering is meaningless under UNION ALL).
fn partition(base: &SelectQuery, predicate: Expr) -> SelectQuery {
    let mut q = base.clone();
    q.where_clause = Some(predicate);
    q.order_by.clear();
    q.with.clear();
    q.analysis = None;
    q
}

/// Deterministic ORDER BY over distinct select-list columns, capped.
fn stable_order_by(query: &mut SelectQuery, max_cols: usize) {
    let mut seen = std::collections::HashSet::new();
    let mut order = Vec::new();
    for item in &query.items {
        if order.len() >= max_cols {
            break;
        }
        if let Expr::Column(col) = &item.expr {
            if seen.insert(col.qualified()) {
                order.push(OrderByItem::asc(Expr::Column(col.clone())));
            }
        }
    }
    query.order_by = order;
}

impl Oracle for Tlp {
    fn name(&self) -> &'static str {
        ORACLE
    }

    fn check(&mut self, cx: &mut OracleCx<'_>) -> Report {
        let level = cx.config().oracles.predicate_level;
        let spec = QuerySpec {
            oracle: ORACLE,
            constraints: BuildConstraints {
                require_where: true,
                require_deterministic: true,
                ..BuildConstraints::default()
            },
            profile: crate::profile::profile_by_name(ORACLE),
            max_tries: 8,
            predicate_guard: true,
            // NULL partitioning needs P itself to be IS-NULL-free.
            guard_policy: PredicatePolicy::from_level(level).without_is_null(),
            reason_overrides: [("predicate_rejected", "unsupported_predicate")]
                .into_iter()
                .collect(),
            ..QuerySpec::default()
        };
        let mut query = match build_query_with_spec(cx.generator, &spec).into_report(ORACLE) {
            Ok(q) => q,
            Err(report) => return report,
        };

        if query.limit.is_some() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "limit"));
        }
        let Some(predicate) = query.where_clause.clone() else {
            return Report::skip(ORACLE, skip_reason(ORACLE, "no_where"));
        };
        if !predicate.is_deterministic() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "nondeterministic"));
        }
        match normalize_using_joins(&mut query, cx.state()) {
            UsingNormalize::Ambiguous => {
                return Report::skip(ORACLE, skip_reason(ORACLE, "ambiguous_using_column"));
            }
            UsingNormalize::Unchanged | UsingNormalize::Normalized => {}
        }

        let with_prefix = query.with_prefix_sql();
        let aliases = query.column_aliases();

        let p_true = partition(&query, predicate.clone());
        let p_false = partition(&query, Expr::not(predicate.clone()));
        let p_null = partition(&query, Expr::is_null(predicate));
        let union_inner = format!(
            "{} UNION ALL {} UNION ALL {}",
            p_true.sql_string(),
            p_false.sql_string(),
            p_null.sql_string()
        );
        let union_sql = format!(
            "{with_prefix}{}",
            signature_sql_for(&union_inner, &aliases)
        );

        let mut base = query.clone();
        base.where_clause = None;
        base.analysis = None;
        stable_order_by(&mut base, cx.config().oracles.tlp_max_order_by_cols);
        let base_sql = base.signature_sql();

        let base_sig = match cx.executor.query_signature(cx.cancel, &base_sql) {
            Ok(s) => s,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };
        let union_sig = match cx.executor.query_signature(cx.cancel, &union_sql) {
            Ok(s) => s,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };

        if base_sig == union_sig {
            return Report::pass(ORACLE)
                .with_sql(base_sql)
                .with_sql(union_sql)
                .with_metric("rows", base_sig.count);
        }

        let explain_base = explain_or_error(cx.executor, cx.cancel, &base_sql);
        let explain_union = explain_or_error(cx.executor, cx.cancel, &union_sql);
        Report::bug(
            ORACLE,
            "signature",
            base_sig.to_string(),
            union_sig.to_string(),
            base_sql,
            union_sql,
        )
        .with_sql(query.sql_string())
        .with_explains(explain_base, explain_union)
    }
}
