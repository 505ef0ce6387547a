//! CODDTest: constant folding as a differential oracle.
//!
//! A deterministic predicate over a finite table can be folded away:
//! either it references no columns (evaluate once, substitute the
//! constant) or it can be replaced by a CASE mapping each observed
//! column combination to the predicate's value on that combination.
//! Folding must not change the query's signature.

use peridot_ast::{BinaryOp, ColumnRef, Expr, Literal, SelectQuery};
use peridot_gen::{BuildConstraints, PredicateLevel};
use peridot_schema::TypeCategory;

use crate::policy::PredicatePolicy;
use crate::registry::{Oracle, OracleCx};
use crate::report::{skip_reason, Report};
use crate::spec::{build_query_with_spec, QuerySpec};

const ORACLE: &str = "codd";

#[derive(Debug, Default)]
pub struct CoddTest;

fn supported_category(cat: TypeCategory) -> bool {
    matches!(
        cat,
        TypeCategory::Integer
            | TypeCategory::Float
            | TypeCategory::Decimal
            | TypeCategory::String
            | TypeCategory::Temporal
    )
}

/// Turns a text-protocol cell back into a literal for CASE arms,
/// using the column's declared type to decide quoting.
fn cell_to_literal(cell: Option<&String>, cat: TypeCategory) -> Expr {
    match cell {
        None => Expr::lit(Literal::Null),
        Some(text) => match cat {
            TypeCategory::Integer => text
                .parse::<i64>()
                .map(|v| Expr::lit(Literal::Int(v)))
                .unwrap_or_else(|_| Expr::lit(Literal::Str(text.clone()))),
            TypeCategory::Float | TypeCategory::Decimal => text
                .parse::<f64>()
                .map(|v| Expr::lit(Literal::Float(v)))
                .unwrap_or_else(|_| Expr::lit(Literal::Str(text.clone()))),
            _ => Expr::lit(Literal::Str(text.clone())),
        },
    }
}

/// `0`/`1`/NULL from the sampled predicate value column.
fn truth_literal(cell: Option<&String>) -> Expr {
    match cell {
        None => Expr::lit(Literal::Null),
        Some(v) if v == "1" => Expr::lit(Literal::Int(1)),
        Some(_) => Expr::lit(Literal::Int(0)),
    }
}

impl Oracle for CoddTest {
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
            predicate_guard: true,
            guard_policy: PredicatePolicy::from_level(PredicateLevel::Moderate).without_is_null(),
            ..QuerySpec::default()
        };
        let query = match build_query_with_spec(cx.generator, &spec).into_report(ORACLE) {
            Ok(q) => q,
            Err(report) => return report,
        };
        let Some(predicate) = query.where_clause.clone() else {
            return Report::skip(ORACLE, skip_reason(ORACLE, "no_where"));
        };
        if !predicate.is_deterministic() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "nondeterministic"));
        }

        // Columns the predicate depends on, deduped.
        let mut columns: Vec<ColumnRef> = Vec::new();
        predicate.visit_columns(&mut |c| {
            if !columns.iter().any(|k| k == c) {
                columns.push(c.clone());
            }
        });
        if columns.len() > 2 {
            return Report::skip(ORACLE, skip_reason(ORACLE, "too_many_columns"));
        }
        if columns.iter().any(|c| !supported_category(c.ty.category())) {
            return Report::skip(ORACLE, skip_reason(ORACLE, "unsupported_type"));
        }

        // Null-bearing dependencies make the CASE mapping unsound.
        for col in &columns {
            let Some(meta) = cx
                .state()
                .table_by_name(&col.table)
                .and_then(|t| t.column(&col.name).cloned())
            else {
                continue;
            };
            if meta.nullable {
                let null_probe = format!(
                    "SELECT IFNULL(SUM({} IS NULL), 0) FROM {}",
                    col.qualified(),
                    col.table
                );
                match cx.executor.query_count(cx.cancel, &null_probe) {
                    Ok(0) => {}
                    Ok(_) => {
                        return Report::skip(ORACLE, skip_reason(ORACLE, "nullable_column"));
                    }
                    Err(e) => return Report::from_exec_error(ORACLE, &e),
                }
            }
        }

        let folded = if columns.is_empty() {
            match self.fold_independent(cx, &predicate) {
                Ok(expr) => expr,
                Err(report) => return report,
            }
        } else {
            match self.fold_dependent(cx, &query, &predicate, &columns) {
                Ok(Some(expr)) => expr,
                Ok(None) => {
                    return Report::skip(ORACLE, skip_reason(ORACLE, "insufficient_coverage"));
                }
                Err(report) => return report,
            }
        };

        let mut folded_query = query.clone();
        folded_query.where_clause = Some(folded);
        folded_query.analysis = None;

        let base_sql = query.signature_sql();
        let folded_sql = folded_query.signature_sql();
        let base_sig = match cx.executor.query_signature(cx.cancel, &base_sql) {
            Ok(s) => s,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };
        let folded_sig = match cx.executor.query_signature(cx.cancel, &folded_sql) {
            Ok(s) => s,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };

        if base_sig == folded_sig {
            return Report::pass(ORACLE)
                .with_sql(base_sql)
                .with_sql(folded_sql)
                .with_metric("rows", base_sig.count);
        }
        Report::bug(
            ORACLE,
            "signature",
            base_sig.to_string(),
            folded_sig.to_string(),
            base_sql,
            folded_sql,
        )
        .with_detail("folded_predicate", folded_query.where_clause.map_or_else(String::new, |p| p.sql()))
    }
}

impl CoddTest {
    /// Column-free predicate: evaluate once, substitute the constant.
    fn fold_independent(
        &self,
        cx: &mut OracleCx<'_>,
        predicate: &Expr,
    ) -> Result<Expr, Report> {
        let probe = format!("SELECT {}", predicate.sql());
        match cx.executor.query_row(cx.cancel, &probe) {
            Ok(Some(row)) => Ok(truth_literal(row.first().and_then(Option::as_ref))),
            Ok(None) => Ok(Expr::lit(Literal::Null)),
            Err(e) => Err(Report::from_exec_error(ORACLE, &e)),
        }
    }

    /// Column-dependent predicate: sample distinct combinations and
    /// build `CASE WHEN c1 <=> v1 AND ... THEN v ... ELSE NULL END`.
    /// `Ok(None)` when the table holds combinations the CASE cannot
    /// cover.
    fn fold_dependent(
        &self,
        cx: &mut OracleCx<'_>,
        query: &SelectQuery,
        predicate: &Expr,
        columns: &[ColumnRef],
    ) -> Result<Option<Expr>, Report> {
        let cfg = cx.config().oracles.clone();
        let col_list = columns
            .iter()
            .map(ColumnRef::qualified)
            .collect::<Vec<_>>()
            .join(", ");
        let sample_sql = format!(
            "SELECT {col_list}, {} AS v FROM {} LIMIT {}",
            predicate.sql(),
            query.from_sql(),
            cfg.codd_sample_limit
        );
        let sample = match cx
            .executor
            .query_rows(cx.cancel, &sample_sql, cfg.codd_sample_limit)
        {
            Ok(set) => set,
            Err(e) => return Err(Report::from_exec_error(ORACLE, &e)),
        };

        let mut keys = std::collections::HashSet::new();
        let mut arms: Vec<(Expr, Expr)> = Vec::new();
        let mut overflow = false;
        for row in &sample.rows {
            let key = row[..columns.len()]
                .iter()
                .map(|c| c.clone().unwrap_or_else(|| "\u{0}NULL".into()))
                .collect::<Vec<_>>()
                .join("\u{1f}");
            if !keys.insert(key) {
                continue;
            }
            if arms.len() >= cfg.codd_case_when_max {
                overflow = true;
                break;
            }
            let mut when: Option<Expr> = None;
            for (i, col) in columns.iter().enumerate() {
                let eq = Expr::binary(
                    BinaryOp::NullSafeEq,
                    Expr::Column(col.clone()),
                    cell_to_literal(row.get(i).and_then(Option::as_ref), col.ty.category()),
                );
                when = Some(match when.take() {
                    Some(acc) => Expr::and(acc, eq),
                    None => eq,
                });
            }
            let Some(when) = when else { continue };
            arms.push((when, truth_literal(row.get(columns.len()).and_then(Option::as_ref))));
        }

        // The mapping must cover every combination the table holds.
        let count_sql = format!("SELECT COUNT(*) FROM {}", query.from_sql());
        let total = match cx.executor.query_count(cx.cancel, &count_sql) {
            Ok(n) => n,
            Err(e) => return Err(Report::from_exec_error(ORACLE, &e)),
        };
        if overflow || sample.truncated || total > sample.rows.len() as i64 {
            return Ok(None);
        }

        Ok(Some(Expr::Case {
            whens: arms,
            else_arm: Some(Box::new(Expr::lit(Literal::Null))),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peridot_schema::DataType;

    #[test]
    fn truth_literal_maps_text_protocol_booleans() {
        assert_eq!(truth_literal(Some(&"1".to_string())).sql(), "1");
        assert_eq!(truth_literal(Some(&"0".to_string())).sql(), "0");
        assert_eq!(truth_literal(None).sql(), "NULL");
    }

    #[test]
    fn cell_literal_quotes_by_category() {
        assert_eq!(
            cell_to_literal(Some(&"42".to_string()), TypeCategory::Integer).sql(),
            "42"
        );
        assert_eq!(
            cell_to_literal(Some(&"x".to_string()), TypeCategory::String).sql(),
            "'x'"
        );
        assert_eq!(cell_to_literal(None, TypeCategory::Integer).sql(), "NULL");
    }

    #[test]
    fn unsupported_categories_rejected() {
        assert!(supported_category(DataType::Int.category()));
        assert!(supported_category(DataType::Varchar.category()));
        assert!(!supported_category(DataType::Json.category()));
        assert!(!supported_category(DataType::Blob.category()));
    }
}
