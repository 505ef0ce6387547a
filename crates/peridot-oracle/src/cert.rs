//! CERT: cardinality estimation restriction testing.
//!
//! Adding a conjunct can only shrink a result, so the optimizer's
//! estimated row count for `P AND R` must not exceed the estimate for
//! `P` (beyond a configured tolerance). Estimates come from `EXPLAIN`,
//! no rows are fetched.

use rand::Rng;

use peridot_ast::{BinaryOp, ColumnRef, Expr, Join, JoinType, SelectQuery};
use peridot_gen::BuildConstraints;
use peridot_schema::{State, TableMeta};

use crate::registry::{Oracle, OracleCx};
use crate::report::{skip_reason, Report};
use crate::signature::explain_or_error;
use crate::spec::{build_query_with_spec, QuerySpec};

const ORACLE: &str = "cert";

#[derive(Debug, Default)]
pub struct Cert;

/// Picks an equi-join key pair between two tables: `k`-prefixed
/// columns first, then any type-compatible pair. `None` when no pair
/// is type-compatible.
fn pick_join_key(left: &TableMeta, right: &TableMeta) -> Option<(ColumnRef, ColumnRef)> {
    let candidate = |prefer_k: bool| {
        for lc in &left.columns {
            if prefer_k && !lc.name.starts_with('k') {
                continue;
            }
            for rc in &right.columns {
                if prefer_k && !rc.name.starts_with('k') {
                    continue;
                }
                if lc.ty.join_compatible(rc.ty) {
                    return Some((
                        ColumnRef::new(left.name.clone(), lc.name.clone(), lc.ty),
                        ColumnRef::new(right.name.clone(), rc.name.clone(), rc.ty),
                    ));
                }
            }
        }
        None
    };
    candidate(true).or_else(|| candidate(false))
}

fn join_for(state: &State, anchor: &str, table: &str) -> Join {
    let key = state
        .table_by_name(anchor)
        .zip(state.table_by_name(table))
        .and_then(|(l, r)| pick_join_key(l, r));
    match key {
        Some((lk, rk)) => Join::inner(
            table,
            Expr::binary(BinaryOp::Eq, Expr::Column(lk), Expr::Column(rk)),
        ),
        None => Join {
            join_type: JoinType::Cross,
            natural: false,
            table: table.to_string(),
            table_alias: None,
            table_query: None,
            on: None,
            using: Vec::new(),
        },
    }
}

/// Rebuilds the scoped FROM so every table the WHERE references is
/// present, regenerating the select list and stripping every clause
/// that would perturb the estimate.
fn build_base_query(cx: &mut OracleCx<'_>, query: &SelectQuery) -> SelectQuery {
    let mut base = query.clone();
    base.order_by.clear();
    base.limit = None;
    base.having = None;
    base.group_by.clear();
    base.distinct = false;
    base.set_ops.clear();
    base.window_defs.clear();
    base.analysis = None;

    // A CTE can sit in FROM either as the anchor or as a joined factor.
    if let Some(cte) = query.with.first() {
        let concrete: Vec<String> = query
            .concrete_from_tables()
            .iter()
            .filter(|t| **t != cte.name)
            .map(|t| (*t).to_string())
            .collect();
        let cte_first = cx.generator.rng().gen_bool(0.5);
        if cte_first {
            base.from.base_table = cte.name.clone();
            base.from.base_alias = None;
            base.from.base_query = None;
            // The CTE's shape is opaque here, so the first concrete
            // factor crosses in and the rest key off it.
            base.from.joins = concrete
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    if i == 0 {
                        Join {
                            join_type: JoinType::Cross,
                            natural: false,
                            table: t.clone(),
                            table_alias: None,
                            table_query: None,
                            on: None,
                            using: Vec::new(),
                        }
                    } else {
                        join_for(cx.state(), &concrete[0], t)
                    }
                })
                .collect();
        } else if let Some(first) = concrete.first() {
            base.from.base_table = first.clone();
            base.from.base_alias = None;
            base.from.base_query = None;
            base.from.joins = concrete[1..]
                .iter()
                .map(|t| join_for(cx.state(), first, t))
                .collect();
            base.from.joins.push(Join {
                join_type: JoinType::Cross,
                natural: false,
                table: cte.name.clone(),
                table_alias: None,
                table_query: None,
                on: None,
                using: Vec::new(),
            });
        }
    }

    // Every table the predicate references must be a FROM factor.
    if let Some(where_clause) = &base.where_clause {
        let mut referenced: Vec<String> = Vec::new();
        where_clause.visit_columns(&mut |c| {
            if !c.table.is_empty() && !referenced.contains(&c.table) {
                referenced.push(c.table.clone());
            }
        });
        let anchor = base.from.base_effective_name().to_string();
        for table in referenced {
            let present = base.from_names().iter().any(|n| *n == table)
                || base.cte_names().iter().any(|n| *n == table);
            if !present {
                base.from.joins.push(join_for(cx.state(), &anchor, &table));
            }
        }
    }

    let scope = cx.generator.tables_for_query_scope(&base);
    let scope_refs: Vec<&TableMeta> = scope.iter().collect();
    let items = cx.generator.generate_select_list(&scope_refs);
    if !items.is_empty() {
        base.items = items;
    }
    base
}

impl Oracle for Cert {
    fn name(&self) -> &'static str {
        ORACLE
    }

    fn check(&mut self, cx: &mut OracleCx<'_>) -> Report {
        let spec = QuerySpec {
            oracle: ORACLE,
            constraints: BuildConstraints {
                require_where: true,
                require_deterministic: true,
                ..BuildConstraints::default()
            },
            profile: crate::profile::profile_by_name(ORACLE),
            max_tries: 8,
            ..QuerySpec::default()
        };
        let query = match build_query_with_spec(cx.generator, &spec).into_report(ORACLE) {
            Ok(q) => q,
            Err(report) => return report,
        };
        if query.where_clause.is_none() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "no_where"));
        }

        // A restrictive column-literal conjunct, scope-validated.
        let tries = cx.config().oracles.cert_restrict_tries;
        let scope = cx.generator.tables_for_query_scope(&query);
        let mut restriction = None;
        for _ in 0..tries {
            if scope.is_empty() {
                break;
            }
            let idx = cx.generator.rng().gen_range(0..scope.len());
            let Some(candidate) = cx
                .generator
                .generate_simple_column_literal_predicate(&scope[idx])
            else {
                continue;
            };
            if cx.generator.validate_expr_in_query_scope(&candidate, &query) {
                restriction = Some(candidate);
                break;
            }
        }
        let Some(restriction) = restriction else {
            return Report::skip(ORACLE, skip_reason(ORACLE, "no_restriction"));
        };

        let base = build_base_query(cx, &query);
        let base_sql = base.sql_string();
        let base_rows = match cx.executor.query_plan_rows(cx.cancel, &base_sql) {
            Ok(rows) => rows,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };
        let min_base = cx.config().oracles.cert_min_base_rows;
        if base_rows < min_base {
            return Report::skip(ORACLE, skip_reason(ORACLE, "small_base"));
        }

        let mut restricted = base.clone();
        restricted.where_clause = match restricted.where_clause.take() {
            Some(p) => Some(Expr::and(p, restriction.clone())),
            None => Some(restriction.clone()),
        };
        let restricted_sql = restricted.sql_string();
        let restricted_rows = match cx.executor.query_plan_rows(cx.cancel, &restricted_sql) {
            Ok(rows) => rows,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };

        let tolerance = cx.config().oracles.cert_tolerance;
        if restricted_rows <= base_rows * (1.0 + tolerance) {
            return Report::pass(ORACLE)
                .with_sql(base_sql)
                .with_sql(restricted_sql)
                .with_metric("base_est_rows", base_rows as i64)
                .with_metric("restricted_est_rows", restricted_rows as i64);
        }

        let explain_base = explain_or_error(cx.executor, cx.cancel, &base_sql);
        let explain_restricted = explain_or_error(cx.executor, cx.cancel, &restricted_sql);
        Report::bug(
            ORACLE,
            "plan_rows",
            format!("restricted estRows <= {base_rows:.2}"),
            format!("restricted estRows {restricted_rows:.2}"),
            base_sql,
            restricted_sql,
        )
        .with_detail("restriction", restriction.sql())
        .with_explains(explain_base, explain_restricted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peridot_schema::{ColumnMeta, DataType};

    fn table(name: &str, cols: &[(&str, DataType)]) -> TableMeta {
        TableMeta::new(
            name,
            cols.iter()
                .map(|(n, ty)| ColumnMeta::new(*n, *ty))
                .collect(),
        )
    }

    #[test]
    fn join_key_prefers_k_columns() {
        let left = table("t0", &[("c0", DataType::Int), ("k0", DataType::BigInt)]);
        let right = table("t1", &[("c1", DataType::Int), ("k0", DataType::BigInt)]);
        let (lk, rk) = pick_join_key(&left, &right).unwrap();
        assert_eq!(lk.name, "k0");
        assert_eq!(rk.name, "k0");
    }

    #[test]
    fn join_key_falls_back_to_compatible_pair() {
        let left = table("t0", &[("name", DataType::Varchar)]);
        let right = table("t1", &[("title", DataType::Text)]);
        let (lk, rk) = pick_join_key(&left, &right).unwrap();
        assert_eq!(lk.name, "name");
        assert_eq!(rk.name, "title");
    }

    #[test]
    fn incompatible_tables_have_no_key() {
        let left = table("t0", &[("j", DataType::Json)]);
        let right = table("t1", &[("b", DataType::Blob)]);
        assert!(pick_join_key(&left, &right).is_none());
    }
}
