//! Per-build constraints an oracle hands to the generator.

use serde::{Deserialize, Serialize};

use crate::config::PredicateLevel;

/// Restrictions for one query build. Everything defaults to "allowed";
/// oracles tighten what their comparison cannot tolerate. Profiles
/// (`peridot-oracle`) only ever set flags to `true`, never back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConstraints {
    pub require_where: bool,
    pub disallow_aggregate: bool,
    pub disallow_group_by: bool,
    pub disallow_having: bool,
    pub disallow_distinct: bool,
    pub disallow_order_by: bool,
    pub disallow_limit: bool,
    pub disallow_window: bool,
    pub disallow_set_ops: bool,
    pub disallow_cte: bool,
    pub disallow_subquery: bool,
    pub disallow_natural_join: bool,
    pub disallow_derived_tables: bool,
    /// Require at least this many table factors when present.
    pub min_join_tables: Option<usize>,
    /// Predicate shape the WHERE must stay inside, when set.
    pub predicate_level: Option<PredicateLevel>,
    /// Require every generated expression to be deterministic.
    pub require_deterministic: bool,
}

impl BuildConstraints {
    /// The loosest constraint set: anything the run config allows.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Shared base for signature-comparing oracles: deterministic, no
    /// LIMIT (row-set comparisons are order-free but size-sensitive).
    pub fn deterministic_no_limit() -> Self {
        Self {
            require_deterministic: true,
            disallow_limit: true,
            ..Self::default()
        }
    }
}
