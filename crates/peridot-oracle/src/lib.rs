//! # peridot-oracle: the oracle engine
//!
//! Each oracle is a differential property over generated SQL: it builds
//! one or more semantically related queries, runs them against the
//! server under test, and reports either agreement, a benign skip, or a
//! witnessed divergence with full replay material.
//!
//! ## Oracles
//!
//! | Oracle | Property |
//! |--------|----------|
//! | [`norec::NoRec`] | `COUNT(σ_P(q))` equals the unoptimized `SUM(CASE WHEN P ...)` |
//! | [`tlp::Tlp`] | `q` equals `q(P) ∪all q(¬P) ∪all q(P IS NULL)` |
//! | [`dqp::Dqp`] | plan hints must not change the result signature |
//! | [`dqe::Dqe`] | DML rows-affected equals the predicate count |
//! | [`cert::Cert`] | a tighter filter must not raise estimated rows |
//! | [`eet::Eet`] | identity rewrites of predicates keep the signature |
//! | [`codd::CoddTest`] | constant-folding a predicate keeps the signature |
//! | [`pqs::Pqs`] | a pivot row satisfying the predicate must be returned |
//! | [`impo::Impo`] | upper/lower mutations respect multiset containment |
//! | [`truth::GroundTruth`] | in-process join count equals the server's |
//!
//! ## Result contract
//!
//! A [`Report`] with `ok = true` and a `skip_reason` detail means the
//! oracle's preconditions were unmet, never that a bug was tolerated.
//! `ok = false` always carries `replay_kind` and both replay SQLs.
//! Skip reasons follow `<oracle>:<snake_reason>` with closed per-oracle
//! reason sets.

mod bandit;
mod helpers;
mod policy;
mod profile;
mod report;
mod signature;
mod spec;
mod subquery;

pub mod cert;
pub mod codd;
pub mod dqe;
pub mod dqp;
pub mod eet;
pub mod impo;
pub mod norec;
pub mod pqs;
pub mod registry;
pub mod tlp;
pub mod truth;

mod hints;

pub use bandit::{pick_hints_bandit, reset_hint_bandit, update_hint_bandit, HintBandit};
pub use helpers::{
    normalize_using_joins, query_columns_valid, query_deterministic, query_has_aggregate,
    query_has_subquery, query_has_window, sanitize_query_columns, UsingNormalize,
};
pub use policy::{predicate_matches, PredicatePolicy};
pub use profile::{apply_profile_to_spec, profile_by_name, JoinOnPolicy, Profile};
pub use report::{skip_reason, Report, TruthInfo};
pub use signature::{explain_sql, query_signature, signature_sql_for};
pub use spec::{build_query_with_spec, BuildOutcome, QuerySpec};
pub use subquery::{detect_subquery_features, SubqueryFeatures};

pub use registry::{all_oracle_names, all_oracles, oracle_by_name, pick_oracle, Oracle, OracleCx};
