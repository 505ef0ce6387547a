//! Query specs: how an oracle asks the generator for a query.

use std::collections::BTreeMap;

use tracing::debug;

use peridot_gen::{BuildConstraints, QueryGenerator};

use peridot_ast::SelectQuery;

use crate::policy::{predicate_matches, PredicatePolicy};
use crate::profile::{apply_profile_to_spec, Profile};
use crate::report::skip_reason;

/// Everything one oracle build needs: constraints, an optional profile,
/// the retry budget, whether to attach the predicate guard, and any
/// builder-reason overrides.
#[derive(Debug, Default)]
pub struct QuerySpec {
    pub oracle: &'static str,
    pub constraints: BuildConstraints,
    pub profile: Option<Profile>,
    pub max_tries: u32,
    /// Attach a guard rejecting predicates outside `guard_policy`.
    pub predicate_guard: bool,
    pub guard_policy: PredicatePolicy,
    /// Builder-reason token to custom skip reason. Reasons not listed
    /// fall back to `<oracle>:<token>`.
    pub reason_overrides: BTreeMap<&'static str, &'static str>,
}

/// Result of [`build_query_with_spec`].
#[derive(Debug)]
pub enum BuildOutcome {
    Built(SelectQuery),
    /// No query; carries the translated skip reason plus the raw
    /// builder reason and attempt count for the report details.
    Skip {
        skip: String,
        builder_reason: String,
        attempts: u32,
    },
}

/// Applies the profile, hands the constraints to the generator, and
/// translates a failure into the oracle's skip vocabulary.
pub fn build_query_with_spec(
    generator: &mut dyn QueryGenerator,
    spec: &QuerySpec,
) -> BuildOutcome {
    let mut constraints = spec.constraints.clone();
    if let Some(profile) = &spec.profile {
        apply_profile_to_spec(profile, &mut constraints);
    }

    let policy = spec.guard_policy;
    let guard = |expr: &peridot_ast::Expr| predicate_matches(expr, &policy);
    let guard_ref: &peridot_gen::PredicateGuard<'_> = &guard;

    // Guard rejections are retried up to the spec's budget; structural
    // failures (no tables, disabled features) never heal by retrying.
    let mut attempts = 0;
    let mut last_err;
    loop {
        attempts += 1;
        match generator.generate_select_query_with_constraints(
            &constraints,
            if spec.predicate_guard { Some(guard_ref) } else { None },
        ) {
            Ok(query) => return BuildOutcome::Built(query),
            Err(err) => {
                let retryable = matches!(err.reason, peridot_gen::BuildReason::PredicateRejected);
                last_err = err;
                if !retryable || attempts >= spec.max_tries.max(1) {
                    break;
                }
            }
        }
    }

    let token = last_err.reason.as_token();
    let skip = match spec.reason_overrides.get(token.as_str()) {
        Some(custom) => skip_reason(spec.oracle, custom),
        None => skip_reason(spec.oracle, &token),
    };
    debug!(oracle = spec.oracle, %skip, attempts, "build skipped");
    BuildOutcome::Skip {
        skip,
        builder_reason: token,
        attempts,
    }
}

impl BuildOutcome {
    /// Folds a skip outcome into a report, passing a built query
    /// through.
    pub fn into_report(self, oracle: &'static str) -> Result<SelectQuery, crate::report::Report> {
        match self {
            BuildOutcome::Built(q) => Ok(q),
            BuildOutcome::Skip {
                skip,
                builder_reason,
                attempts,
            } => Err(crate::report::Report::skip(oracle, skip)
                .with_detail("builder_reason", builder_reason)
                .with_detail("builder_attempts", i64::from(attempts))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Report;
    use peridot_gen::PredicateLevel;
    use peridot_testkit::{simple_filtered_query, two_table_state, ScriptedGenerator};

    #[test]
    fn guard_rejection_retries_within_budget() {
        let mut bad = simple_filtered_query();
        bad.where_clause = Some(peridot_ast::Expr::func(
            "ABS",
            vec![peridot_ast::Expr::lit(peridot_ast::Literal::Int(1))],
        ));
        let mut generator = ScriptedGenerator::new(two_table_state());
        generator.queries.push_back(Ok(bad));
        generator.queries.push_back(Ok(simple_filtered_query()));

        let spec = QuerySpec {
            oracle: "tlp",
            max_tries: 3,
            predicate_guard: true,
            guard_policy: crate::policy::PredicatePolicy::from_level(PredicateLevel::Moderate),
            ..QuerySpec::default()
        };
        match build_query_with_spec(&mut generator, &spec) {
            BuildOutcome::Built(query) => {
                assert!(query.where_clause.is_some());
            }
            BuildOutcome::Skip { skip, .. } => panic!("retry should have built: {skip}"),
        }
        assert_eq!(generator.requested_constraints.len(), 2);
    }

    #[test]
    fn skip_outcome_becomes_skip_report() {
        let outcome = BuildOutcome::Skip {
            skip: "tlp:no_tables".into(),
            builder_reason: "no_tables".into(),
            attempts: 3,
        };
        let report: Report = outcome.into_report("tlp").unwrap_err();
        assert!(report.is_skip());
        assert_eq!(report.skip_reason(), Some("tlp:no_tables"));
        assert_eq!(
            report.details.get("builder_attempts").and_then(serde_json::Value::as_i64),
            Some(3)
        );
    }
}
