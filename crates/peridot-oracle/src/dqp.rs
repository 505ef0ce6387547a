//! DQP: differential query plans.
//!
//! Optimizer hints and SET_VAR toggles steer the planner onto different
//! physical plans for the same query; every plan must produce the same
//! result signature. Hint selection is adaptive: the process-wide UCB1
//! bandit prefers hints that historically diverged.

use tracing::debug;

use crate::bandit::{pick_hints_bandit, update_hint_bandit};
use crate::helpers::{query_has_aggregate, query_has_subquery};
use crate::hints;
use crate::registry::{Oracle, OracleCx};
use crate::report::{skip_reason, Report};
use crate::signature::{explain_or_error, signature_sql_for};
use crate::spec::{build_query_with_spec, QuerySpec};
use crate::subquery::detect_subquery_features;

const ORACLE: &str = "dqp";

/// Reward convention: agreement pays 1.0, divergence 0.0; the picker
/// prefers low-scoring (historically diverging) arms by playing
/// unplayed arms first and exploring via UCB1.
const REWARD_MATCH: f64 = 1.0;
const REWARD_MISMATCH: f64 = 0.0;

#[derive(Debug, Default)]
pub struct Dqp;

impl Oracle for Dqp {
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

        // A CTE with LIMIT but no ORDER BY may legally return different
        // rows under different plans.
        for cte in &query.with {
            if cte.query.limit.is_some() && cte.query.order_by.is_empty() {
                return Report::skip(ORACLE, skip_reason(ORACLE, "unstable_cte_limit"));
            }
        }

        let has_aggregate = query_has_aggregate(&query);
        let has_subquery = query_has_subquery(&query);
        let indexed_tables: Vec<&str> = query
            .concrete_from_tables()
            .into_iter()
            .filter(|t| {
                cx.state()
                    .table_by_name(t)
                    .is_some_and(peridot_schema::TableMeta::has_indexed_column)
            })
            .collect();
        if !query.has_joins() && !has_aggregate && !has_subquery && indexed_tables.is_empty() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "insufficient_plan_surface"));
        }

        let sql = query.sql_string();
        let aliases = query.column_aliases();
        let features = detect_subquery_features(&sql);
        let semi_join = features.has_in_subquery;
        let correlated = features.has_exists || features.has_not_exists;

        let cfg = cx.config().oracles.clone();
        let adaptive = cx.config().adaptive.clone();
        let run_features = cx.config().features.clone();

        let mut base_pool =
            hints::base_hints(&query, has_aggregate, semi_join, correlated, &indexed_tables);
        let mpp_allowed = run_features.tiflash_replica && !run_features.disable_mpp;
        let mut set_var_pool =
            hints::set_var_hints(query.table_factor_count_with_cte(), mpp_allowed);
        for raw in &cfg.dqp_user_hints {
            let Some(hint) = hints::classify_user_hint(raw) else {
                debug!(hint = raw.as_str(), "user hint rejected");
                continue;
            };
            if hints::is_set_var_hint(&hint) {
                set_var_pool.push(hint);
            } else {
                base_pool.push(hint);
            }
        }

        let window = adaptive.hint_bandit_window;
        let exploration = adaptive.hint_bandit_exploration;
        let picked_base = pick_hints_bandit(
            cx.generator.rng(),
            &base_pool,
            cfg.dqp_base_hint_pick,
            window,
            exploration,
        );
        let mut picked_set_vars = pick_hints_bandit(
            cx.generator.rng(),
            &set_var_pool,
            cfg.dqp_set_var_hint_pick,
            window,
            exploration,
        );
        // Pair completion: toggles should show up as on/off pairs while
        // the pick budget allows.
        hints::complete_set_var_pairs(
            &mut picked_set_vars,
            &set_var_pool,
            cfg.dqp_set_var_hint_pick,
        );

        let mut variants: Vec<String> = Vec::new();
        variants.extend(picked_base.iter().cloned());
        variants.extend(picked_set_vars.iter().cloned());
        variants.extend(hints::combine_hints(
            &picked_set_vars,
            &picked_base,
            cfg.dqp_combined_hint_max,
        ));
        if variants.is_empty() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "no_variants"));
        }

        let base_sig_sql = query.signature_sql();
        let base_sig = match cx.executor.query_signature(cx.cancel, &base_sig_sql) {
            Ok(s) => s,
            Err(e) => return signature_error_report(&e),
        };

        let mut checked = 0_i64;
        let mut variant_errors = 0_i64;
        for hint in &variants {
            let Some(hinted) = hints::inject_hint(&sql, hint) else {
                continue;
            };
            let variant_sig_sql = signature_sql_for(&hinted, &aliases);
            let variant_sig = match cx.executor.query_signature(cx.cancel, &variant_sig_sql) {
                Ok(s) => s,
                Err(e) if e.is_timeout() => return Report::from_exec_error(ORACLE, &e),
                Err(e) => {
                    let reason = peridot_exec::sql_error_reason(ORACLE, &e);
                    if reason.ends_with("missing_column") || reason.ends_with("plan_ref_missing") {
                        return Report::sql_error(ORACLE, "dqp:signature_missing_column")
                            .with_detail("bug_hint", "tidb:schema_column_missing")
                            .with_detail("hint", hint.clone());
                    }
                    debug!(hint = hint.as_str(), error = %e, "variant errored");
                    variant_errors += 1;
                    continue;
                }
            };
            checked += 1;

            if variant_sig == base_sig {
                update_hint_bandit(hint, REWARD_MATCH, window, exploration);
                continue;
            }
            update_hint_bandit(hint, REWARD_MISMATCH, window, exploration);
            let explain_base = explain_or_error(cx.executor, cx.cancel, &sql);
            let explain_variant = explain_or_error(cx.executor, cx.cancel, &hinted);
            return Report::bug(
                ORACLE,
                "signature",
                base_sig.to_string(),
                variant_sig.to_string(),
                base_sig_sql.clone(),
                variant_sig_sql,
            )
            .with_sql(sql.clone())
            .with_sql(hinted)
            .with_detail("hint", hint.clone())
            .with_explains(explain_base, explain_variant);
        }

        Report::pass(ORACLE)
            .with_sql(base_sig_sql)
            .with_metric("variants_checked", checked)
            .with_metric("variant_errors", variant_errors)
    }
}

fn signature_error_report(err: &peridot_exec::ExecError) -> Report {
    let reason = peridot_exec::sql_error_reason(ORACLE, err);
    if reason.ends_with("missing_column") || reason.ends_with("plan_ref_missing") {
        return Report::sql_error(ORACLE, "dqp:signature_missing_column")
            .with_detail("bug_hint", "tidb:schema_column_missing");
    }
    Report::from_exec_error(ORACLE, err)
}
