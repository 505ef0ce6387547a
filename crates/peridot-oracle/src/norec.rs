//! NoREC: non-optimizing reference checking.
//!
//! The optimizer is free to push `WHERE P` into index scans; the
//! unoptimized formulation forces row-at-a-time evaluation of `P` in
//! the projection. Both must count the same rows:
//!
//! ```sql
//! SELECT COUNT(*) FROM (<q>) q
//! -- versus
//! SELECT IFNULL(SUM(CASE WHEN <P> THEN 1 ELSE 0 END), 0) FROM <from>
//! ```

use peridot_gen::BuildConstraints;

use crate::helpers::{query_has_aggregate, query_has_subquery};
use crate::registry::{Oracle, OracleCx};
use crate::report::{skip_reason, Report};
use crate::signature::explain_or_error;
use crate::spec::{build_query_with_spec, QuerySpec};

const ORACLE: &str = "norec";

#[derive(Debug, Default)]
pub struct NoRec;

impl Oracle for NoRec {
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

        // The rewrite is only meaningful for a plain filtered scan.
        let Some(where_clause) = query.where_clause.clone() else {
            return Report::skip(ORACLE, skip_reason(ORACLE, "no_where"));
        };
        if !query.with.is_empty() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "with_clause"));
        }
        if query.distinct {
            return Report::skip(ORACLE, skip_reason(ORACLE, "distinct"));
        }
        if !query.group_by.is_empty() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "group_by"));
        }
        if query.having.is_some() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "having"));
        }
        if query.limit.is_some() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "limit"));
        }
        if query_has_aggregate(&query) {
            return Report::skip(ORACLE, skip_reason(ORACLE, "aggregate"));
        }
        if query_has_subquery(&query) {
            return Report::skip(ORACLE, skip_reason(ORACLE, "subquery"));
        }

        let optimized_sql = format!("SELECT COUNT(*) FROM ({}) q", query.sql_string());
        let unoptimized_sql = format!(
            "{}SELECT IFNULL(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0) FROM {}",
            query.with_prefix_sql(),
            where_clause.sql(),
            query.from_sql(),
        );

        let optimized = match cx.executor.query_count(cx.cancel, &optimized_sql) {
            Ok(n) => n,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };
        let unoptimized = match cx.executor.query_count(cx.cancel, &unoptimized_sql) {
            Ok(n) => n,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };

        if optimized == unoptimized {
            return Report::pass(ORACLE)
                .with_sql(optimized_sql)
                .with_sql(unoptimized_sql)
                .with_metric("rows", optimized);
        }

        let explain_opt = explain_or_error(cx.executor, cx.cancel, &optimized_sql);
        let explain_unopt = explain_or_error(cx.executor, cx.cancel, &unoptimized_sql);
        Report::bug(
            ORACLE,
            "count",
            format!("count {optimized}"),
            format!("count {unoptimized}"),
            optimized_sql,
            unoptimized_sql,
        )
        .with_sql(query.sql_string())
        .with_explains(explain_opt, explain_unopt)
    }
}
