//! Per-oracle generation profiles.
//!
//! A profile bundles the feature overrides an oracle applies before
//! every build. Applying a profile only ever tightens the constraint
//! set: a `Some(false)` override raises the matching `disallow` flag,
//! and a missing override leaves the run configuration in charge.

use peridot_gen::{BuildConstraints, PredicateLevel};

/// How generated joins must be conditioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOnPolicy {
    /// Whatever the generator prefers.
    Any,
    /// Every join carries an explicit ON.
    RequireOn,
    /// USING is preferred where a shared column exists.
    PreferUsing,
}

/// Feature and predicate overrides for one oracle.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub cte: Option<bool>,
    pub views: Option<bool>,
    pub derived_tables: Option<bool>,
    pub set_ops: Option<bool>,
    pub natural_joins: Option<bool>,
    pub aggregates: Option<bool>,
    pub group_by: Option<bool>,
    pub having: Option<bool>,
    pub distinct: Option<bool>,
    pub order_by: Option<bool>,
    pub limit: Option<bool>,
    pub window: Option<bool>,
    pub subqueries: Option<bool>,
    pub not_exists: Option<bool>,
    pub not_in: Option<bool>,
    pub allow_subquery: Option<bool>,
    pub predicate_mode: Option<PredicateLevel>,
    pub min_join_tables: Option<usize>,
    pub join_on_policy: Option<JoinOnPolicy>,
}

/// Folds a profile into build constraints, tightening only.
pub fn apply_profile_to_spec(profile: &Profile, constraints: &mut BuildConstraints) {
    let mut forbid = |flag: Option<bool>, target: &mut bool| {
        if flag == Some(false) {
            *target = true;
        }
    };
    forbid(profile.cte, &mut constraints.disallow_cte);
    forbid(profile.set_ops, &mut constraints.disallow_set_ops);
    forbid(profile.natural_joins, &mut constraints.disallow_natural_join);
    forbid(profile.aggregates, &mut constraints.disallow_aggregate);
    forbid(profile.group_by, &mut constraints.disallow_group_by);
    forbid(profile.having, &mut constraints.disallow_having);
    forbid(profile.distinct, &mut constraints.disallow_distinct);
    forbid(profile.order_by, &mut constraints.disallow_order_by);
    forbid(profile.limit, &mut constraints.disallow_limit);
    forbid(profile.window, &mut constraints.disallow_window);
    forbid(profile.subqueries, &mut constraints.disallow_subquery);
    forbid(profile.derived_tables, &mut constraints.disallow_derived_tables);
    if profile.allow_subquery == Some(false) {
        constraints.disallow_subquery = true;
    }
    if let Some(mode) = profile.predicate_mode {
        constraints.predicate_level = Some(mode);
    }
    if let Some(n) = profile.min_join_tables {
        constraints.min_join_tables = Some(n);
    }
}

/// The static profile for a named oracle.
pub fn profile_by_name(name: &str) -> Option<Profile> {
    let profile = match name {
        "norec" => Profile {
            cte: Some(false),
            distinct: Some(false),
            group_by: Some(false),
            having: Some(false),
            limit: Some(false),
            aggregates: Some(false),
            subqueries: Some(false),
            window: Some(false),
            set_ops: Some(false),
            ..Profile::default()
        },
        "tlp" => Profile {
            limit: Some(false),
            window: Some(false),
            set_ops: Some(false),
            subqueries: Some(false),
            predicate_mode: Some(PredicateLevel::Moderate),
            ..Profile::default()
        },
        "dqp" => Profile {
            limit: Some(false),
            window: Some(false),
            ..Profile::default()
        },
        "dqe" => Profile::default(),
        "cert" => Profile {
            aggregates: Some(false),
            distinct: Some(false),
            group_by: Some(false),
            having: Some(false),
            order_by: Some(false),
            set_ops: Some(false),
            window: Some(false),
            subqueries: Some(false),
            predicate_mode: Some(PredicateLevel::Strict),
            ..Profile::default()
        },
        "eet" => Profile {
            set_ops: Some(false),
            ..Profile::default()
        },
        "codd" => Profile {
            cte: Some(false),
            set_ops: Some(false),
            subqueries: Some(false),
            window: Some(false),
            aggregates: Some(false),
            group_by: Some(false),
            having: Some(false),
            distinct: Some(false),
            limit: Some(false),
            ..Profile::default()
        },
        "pqs" => Profile {
            set_ops: Some(false),
            window: Some(false),
            ..Profile::default()
        },
        "impo" => Profile {
            cte: Some(false),
            set_ops: Some(false),
            aggregates: Some(false),
            subqueries: Some(false),
            window: Some(false),
            limit: Some(false),
            ..Profile::default()
        },
        "ground_truth" => Profile {
            cte: Some(false),
            group_by: Some(false),
            having: Some(false),
            order_by: Some(false),
            limit: Some(false),
            distinct: Some(false),
            aggregates: Some(false),
            subqueries: Some(false),
            window: Some(false),
            set_ops: Some(false),
            derived_tables: Some(false),
            natural_joins: Some(false),
            min_join_tables: Some(2),
            join_on_policy: Some(JoinOnPolicy::RequireOn),
            ..Profile::default()
        },
        _ => return None,
    };
    Some(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_only_tighten() {
        let mut constraints = BuildConstraints {
            disallow_limit: true,
            ..BuildConstraints::default()
        };
        // dqe's empty profile must not clear an existing restriction.
        let profile = profile_by_name("dqe").unwrap();
        apply_profile_to_spec(&profile, &mut constraints);
        assert!(constraints.disallow_limit);
    }

    #[test]
    fn false_overrides_raise_disallow_flags() {
        let mut constraints = BuildConstraints::default();
        let profile = profile_by_name("norec").unwrap();
        apply_profile_to_spec(&profile, &mut constraints);
        assert!(constraints.disallow_cte);
        assert!(constraints.disallow_aggregate);
        assert!(constraints.disallow_limit);
        // norec leaves ORDER BY to the run config.
        assert!(!constraints.disallow_order_by);
    }

    #[test]
    fn ground_truth_requires_join_width() {
        let mut constraints = BuildConstraints::default();
        let profile = profile_by_name("ground_truth").unwrap();
        apply_profile_to_spec(&profile, &mut constraints);
        assert_eq!(constraints.min_join_tables, Some(2));
        assert!(constraints.disallow_cte);
    }

    #[test]
    fn unknown_oracle_has_no_profile() {
        assert!(profile_by_name("nope").is_none());
    }

    #[test]
    fn predicate_mode_override_is_copied() {
        let mut constraints = BuildConstraints::default();
        apply_profile_to_spec(&profile_by_name("cert").unwrap(), &mut constraints);
        assert_eq!(constraints.predicate_level, Some(PredicateLevel::Strict));
    }
}
