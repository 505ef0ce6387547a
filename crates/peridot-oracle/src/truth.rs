//! GroundTruth: in-process join counting.
//!
//! For a plain inner/left join chain over integer keys the engine can
//! compute the exact result count itself, either by fetching the key
//! columns and hash-joining here, or through the key material the
//! state generator registered ([`peridot_schema::JoinTruth`]). The
//! server must agree with that count.

use std::collections::{BTreeMap, HashMap};

use peridot_ast::{BinaryOp, Expr, JoinType, SelectQuery};
use peridot_exec::ExecError;
use peridot_schema::{JoinEdge, JoinKind, KeyTable};

use crate::helpers::{query_has_aggregate, query_has_subquery};
use crate::registry::{Oracle, OracleCx};
use crate::report::{skip_reason, Report, TruthInfo};
use crate::spec::{build_query_with_spec, QuerySpec};

const ORACLE: &str = "ground_truth";

#[derive(Debug, Default)]
pub struct GroundTruth;

/// Extracts one equi-join edge per join, or the reason it cannot.
fn derive_edges(query: &SelectQuery) -> Result<Vec<JoinEdge>, &'static str> {
    let mut edges = Vec::new();
    let mut factors: Vec<&str> = vec![query.from.base_effective_name()];
    for join in &query.from.joins {
        let kind = match join.join_type {
            JoinType::Inner => JoinKind::Inner,
            JoinType::Left => JoinKind::Left,
            _ => return Err("unsupported_join"),
        };
        let right = join.effective_name();
        let (left_col, right_col) = if let Some(on) = &join.on {
            let Expr::Binary { op, left, right: rhs } = on else {
                return Err("unsupported_join");
            };
            if *op != BinaryOp::Eq {
                return Err("unsupported_join");
            }
            let (Expr::Column(a), Expr::Column(b)) = (left.as_ref(), rhs.as_ref()) else {
                return Err("unsupported_join");
            };
            // One side must be the joined table, the other an earlier
            // factor.
            if a.table == right && factors.contains(&b.table.as_str()) {
                (b.clone(), a.clone())
            } else if b.table == right && factors.contains(&a.table.as_str()) {
                (a.clone(), b.clone())
            } else {
                return Err("unsupported_join");
            }
        } else if join.using.len() == 1 {
            let col = &join.using[0];
            let left_table = factors[0];
            (
                peridot_ast::ColumnRef::new(left_table, col.clone(), peridot_schema::DataType::BigInt),
                peridot_ast::ColumnRef::new(right, col.clone(), peridot_schema::DataType::BigInt),
            )
        } else {
            return Err("unsupported_join");
        };
        edges.push(JoinEdge {
            left_table: left_col.table,
            left_col: left_col.name,
            right_table: right.to_string(),
            right_col: right_col.name,
            kind,
        });
        factors.push(right);
    }
    Ok(edges)
}

/// The `t0->INNER:t1->LEFT:t2` chain signature.
fn join_signature(edges: &[JoinEdge]) -> String {
    let mut sig = edges
        .first()
        .map_or_else(String::new, |e| e.left_table.clone());
    for edge in edges {
        sig.push_str("->");
        sig.push_str(edge.kind.as_str());
        sig.push(':');
        sig.push_str(&edge.right_table);
    }
    sig
}

/// DSG key conventions: dimension table `tN` joins through `k0` or
/// `k(N-1)`.
fn dsg_keys_ok(edges: &[JoinEdge]) -> bool {
    edges.iter().all(|edge| {
        let Some(idx) = edge
            .right_table
            .strip_prefix('t')
            .and_then(|n| n.parse::<usize>().ok())
        else {
            return false;
        };
        let expected = if idx == 0 {
            "k0".to_string()
        } else {
            format!("k{}", idx - 1)
        };
        edge.right_col == "k0" || edge.right_col == expected
    })
}

/// Capped left-deep hash join over fetched key tables. `None` when the
/// working set outgrew `cap`.
fn hash_join_count(
    tables: &BTreeMap<String, KeyTable>,
    edges: &[JoinEdge],
    cap: usize,
) -> Option<u64> {
    let first = edges.first()?;
    let base = tables.get(&first.left_table)?;
    let mut joined: Vec<HashMap<&str, usize>> = (0..base.rows.len())
        .map(|i| HashMap::from([(first.left_table.as_str(), i)]))
        .collect();

    for edge in edges {
        let left = tables.get(&edge.left_table)?;
        let left_idx = left.columns.iter().position(|c| *c == edge.left_col)?;
        let right = tables.get(&edge.right_table)?;
        let right_idx = right.columns.iter().position(|c| *c == edge.right_col)?;

        let mut index: HashMap<i64, Vec<usize>> = HashMap::new();
        for (i, row) in right.rows.iter().enumerate() {
            if let Some(key) = row.get(right_idx).copied().flatten() {
                index.entry(key).or_default().push(i);
            }
        }

        let mut next = Vec::new();
        for entry in &joined {
            let left_row = *entry.get(edge.left_table.as_str())?;
            let key = left.rows.get(left_row)?.get(left_idx).copied().flatten();
            match key.and_then(|k| index.get(&k)) {
                Some(matches) => {
                    for &r in matches {
                        let mut extended = entry.clone();
                        extended.insert(edge.right_table.as_str(), r);
                        next.push(extended);
                        if next.len() > cap {
                            return None;
                        }
                    }
                }
                None if edge.kind == JoinKind::Left => {
                    next.push(entry.clone());
                    if next.len() > cap {
                        return None;
                    }
                }
                None => {}
            }
        }
        joined = next;
    }
    Some(joined.len() as u64)
}

impl Oracle for GroundTruth {
    fn name(&self) -> &'static str {
        ORACLE
    }

    fn check(&mut self, cx: &mut OracleCx<'_>) -> Report {
        let spec = QuerySpec {
            oracle: ORACLE,
            constraints: peridot_gen::BuildConstraints::deterministic_no_limit(),
            profile: crate::profile::profile_by_name(ORACLE),
            max_tries: 8,
            ..QuerySpec::default()
        };
        let query = match build_query_with_spec(cx.generator, &spec).into_report(ORACLE) {
            Ok(q) => q,
            Err(report) => return report,
        };

        if !query.with.is_empty()
            || query.where_clause.is_some()
            || !query.group_by.is_empty()
            || query.having.is_some()
            || !query.order_by.is_empty()
            || query.limit.is_some()
            || query.distinct
            || query_has_aggregate(&query)
            || query_has_subquery(&query)
        {
            return Report::skip(ORACLE, skip_reason(ORACLE, "not_simple_join"));
        }
        if !query.has_joins() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "no_join"));
        }

        let edges = match derive_edges(&query) {
            Ok(edges) => edges,
            Err(reason) => return Report::skip(ORACLE, skip_reason(ORACLE, reason)),
        };
        let cfg = cx.config().oracles.clone();
        if cfg.truth_dsg_mode && !dsg_keys_ok(&edges) {
            return Report::skip(ORACLE, skip_reason(ORACLE, "dsg_key_convention"));
        }
        let sig = join_signature(&edges);

        let mut tables: Vec<&str> = vec![];
        for edge in &edges {
            for t in [edge.left_table.as_str(), edge.right_table.as_str()] {
                if !tables.contains(&t) {
                    tables.push(t);
                }
            }
        }

        // Truth-executor path when registered key material covers the
        // chain; otherwise fetch keys and hash-join here.
        let (truth_count, truth_executor) =
            if cx.state().join_truth().is_some_and(|t| t.covers(&tables)) {
                let Some(count) = cx
                    .state()
                    .join_truth()
                    .and_then(|t| t.eval_join_chain_exact(&edges))
                else {
                    return Report::skip(ORACLE, skip_reason(ORACLE, "truth_unavailable"));
                };
                (count, true)
            } else {
                match self.fetch_and_join(cx, &edges, &tables, cfg.truth_max_rows) {
                    Ok(Some(count)) => (count, false),
                    Ok(None) => {
                        return Report::skip(ORACLE, skip_reason(ORACLE, "row_budget"));
                    }
                    Err(report) => return report,
                }
            };

        let count_sql = format!("SELECT COUNT(*) FROM ({}) q", query.sql_string());
        let db_count = match cx.executor.query_count(cx.cancel, &count_sql) {
            Ok(n) => n,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };

        let truth = TruthInfo {
            enabled: truth_executor,
            mismatch: db_count as u64 != truth_count,
            join_sig: sig,
            row_count: truth_count,
        };
        if db_count as u64 == truth_count {
            return Report::pass(ORACLE)
                .with_sql(count_sql)
                .with_metric("truth_count", truth_count as i64)
                .with_truth(truth);
        }
        Report::bug(
            ORACLE,
            "count",
            format!("count {truth_count}"),
            format!("count {db_count}"),
            query.sql_string(),
            count_sql,
        )
        .with_truth(truth)
    }
}

impl GroundTruth {
    fn fetch_and_join(
        &self,
        cx: &mut OracleCx<'_>,
        edges: &[JoinEdge],
        tables: &[&str],
        max_rows: usize,
    ) -> Result<Option<u64>, Report> {
        let mut fetched: BTreeMap<String, KeyTable> = BTreeMap::new();
        for table in tables {
            let mut cols: Vec<String> = Vec::new();
            for edge in edges {
                if edge.left_table == *table && !cols.contains(&edge.left_col) {
                    cols.push(edge.left_col.clone());
                }
                if edge.right_table == *table && !cols.contains(&edge.right_col) {
                    cols.push(edge.right_col.clone());
                }
            }
            let sql = format!("SELECT {} FROM {table}", cols.join(", "));
            let set = match cx.executor.query_rows(cx.cancel, &sql, max_rows) {
                Ok(set) => set,
                // A missing column here is a catalog inconsistency the
                // oracle itself witnessed, not generator noise.
                Err(e @ ExecError::Server { .. })
                    if peridot_exec::sql_error_reason(ORACLE, &e).ends_with("missing_column") =>
                {
                    return Err(Report::bug(
                        ORACLE,
                        "missing_column",
                        format!("columns {} exist on {table}", cols.join(", ")),
                        e.to_string(),
                        format!("SHOW COLUMNS FROM {table}"),
                        sql,
                    ));
                }
                Err(e) => return Err(Report::from_exec_error(ORACLE, &e)),
            };
            if set.truncated {
                return Ok(None);
            }
            let mut key_table = KeyTable::new(cols.clone());
            for row in &set.rows {
                let mut parsed = Vec::with_capacity(row.len());
                for cell in row {
                    match cell {
                        None => parsed.push(None),
                        Some(text) => match text.parse::<i64>() {
                            Ok(v) => parsed.push(Some(v)),
                            Err(_) => {
                                return Err(Report::skip(
                                    ORACLE,
                                    skip_reason(ORACLE, "non_integer_key"),
                                ));
                            }
                        },
                    }
                }
                key_table.push_row(parsed);
            }
            fetched.insert((*table).to_string(), key_table);
        }
        Ok(hash_join_count(&fetched, edges, max_rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peridot_ast::{ColumnRef, Join, SelectItem};
    use peridot_schema::DataType;

    fn joined_query() -> SelectQuery {
        let mut q = SelectQuery::from_table("t0");
        q.items = vec![SelectItem {
            expr: Expr::Column(ColumnRef::new("t0", "k0", DataType::BigInt)),
            alias: "a0".into(),
        }];
        q.from.joins.push(Join::inner(
            "t1",
            Expr::binary(
                BinaryOp::Eq,
                Expr::Column(ColumnRef::new("t0", "k0", DataType::BigInt)),
                Expr::Column(ColumnRef::new("t1", "k0", DataType::BigInt)),
            ),
        ));
        q
    }

    #[test]
    fn derives_inner_edge() {
        let edges = derive_edges(&joined_query()).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].left_table, "t0");
        assert_eq!(edges[0].right_table, "t1");
        assert_eq!(edges[0].kind, JoinKind::Inner);
    }

    #[test]
    fn rejects_non_equi_join() {
        let mut q = joined_query();
        q.from.joins[0].on = Some(Expr::binary(
            BinaryOp::Lt,
            Expr::Column(ColumnRef::new("t0", "k0", DataType::BigInt)),
            Expr::Column(ColumnRef::new("t1", "k0", DataType::BigInt)),
        ));
        assert_eq!(derive_edges(&q), Err("unsupported_join"));
    }

    #[test]
    fn signature_format() {
        let edges = derive_edges(&joined_query()).unwrap();
        assert_eq!(join_signature(&edges), "t0->INNER:t1");
    }

    #[test]
    fn dsg_convention() {
        let edges = derive_edges(&joined_query()).unwrap();
        assert!(dsg_keys_ok(&edges));
        let mut bad = edges;
        bad[0].right_col = "c3".into();
        assert!(!dsg_keys_ok(&bad));
    }

    #[test]
    fn hash_join_respects_cap() {
        let mut tables = BTreeMap::new();
        let mut t0 = KeyTable::new(vec!["k0".into()]);
        let mut t1 = KeyTable::new(vec!["k0".into()]);
        for _ in 0..4 {
            t0.push_row(vec![Some(1)]);
            t1.push_row(vec![Some(1)]);
        }
        tables.insert("t0".to_string(), t0);
        tables.insert("t1".to_string(), t1);
        let edges = derive_edges(&joined_query()).unwrap();
        assert_eq!(hash_join_count(&tables, &edges, 100), Some(16));
        assert_eq!(hash_join_count(&tables, &edges, 10), None);
    }
}
